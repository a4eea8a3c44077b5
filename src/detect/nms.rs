use crate::detect::result::RawDetection;

/// Default overlap above which the lower-confidence box is discarded.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Greedy non-maximum suppression.
///
/// Candidates are stably sorted by descending confidence, so equal scores keep
/// their decode order. Each selected box discards every remaining box whose IoU
/// with it is strictly greater than `iou_threshold`. With `class_aware` set,
/// only boxes of the same class are compared.
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    class_aware: bool,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; candidates.len()];
    let mut kept = Vec::new();
    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..candidates.len() {
            if suppressed[j] {
                continue;
            }
            if class_aware && candidates[i].class_index != candidates[j].class_index {
                continue;
            }
            if candidates[i].iou(&candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
        kept.push(i);
    }

    let mut selected = Vec::with_capacity(kept.len());
    let mut kept = kept.into_iter().peekable();
    for (index, candidate) in candidates.into_iter().enumerate() {
        if kept.peek() == Some(&index) {
            kept.next();
            selected.push(candidate);
        }
    }
    selected
}
