use crate::detect::result::Detection;

/// Order detections most urgent first. Stable: equal priorities keep their input order.
pub fn rank(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by_key(Detection::priority);
    detections
}
