mod backend;
pub mod backends;
pub mod decode;
mod labels;
pub mod nms;
mod rank;
mod result;

pub use backend::{nhwc_input_size, InferenceBackend};
pub use backends::{load_model, StubBackend};
pub use decode::{
    infer_layout, BoxCoordinates, DecoderConfig, DetectorDecoder, FrameGeometry, LayoutInfo,
    OutputLayout, DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use labels::{LabelTable, COCO_LABELS, OBSTACLE_LABELS, UNKNOWN_LABEL};
pub use nms::{non_max_suppression, DEFAULT_IOU_THRESHOLD};
pub use rank::rank;
pub use result::{BoundingBox, Detection, DistanceCategory, RawDetection, FAR_DISTANCE};
