//! Perception Kernel
//!
//! Turns a live camera stream into a ranked list of nearby obstacles and at
//! most one spoken/haptic alert per processed frame.
//!
//! # Pipeline
//!
//! 1. **Color conversion**: YUV 4:2:0 or BGRA planes to interleaved RGB.
//! 2. **Preprocessing**: nearest-neighbor resize into NHWC float tensors.
//! 3. **Detection**: detector network, layout-agnostic decoding, greedy NMS.
//! 4. **Depth fusion**: optional depth network, one inverse-depth sample per box.
//! 5. **Ranking**: stable sort by distance category.
//! 6. **Alerting**: per-(class, category) cooldowns, one alert per run.
//!
//! # Module Structure
//!
//! - `frame`: camera-owned views, owned snapshots, RGB buffers
//! - `ingest`: color conversion and the synthetic `stub://` source
//! - `tensor`: tensors and network input preparation
//! - `detect`: inference backends, decoding, suppression, ranking
//! - `depth`: depth maps and fusion
//! - `alert`: alert selection and sinks
//! - `pipeline`: one pipeline run, admission gate, frame scheduler
//! - `config`: file and environment configuration

pub mod alert;
pub mod config;
pub mod depth;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod tensor;

pub use alert::{
    AlertEvent, AlertSelector, AlertSink, ChannelAlertSink, CooldownPolicy, CooldownTable,
    HapticUrgency, LogAlertSink,
};
pub use config::PerceptionConfig;
pub use depth::DepthMap;
pub use detect::{
    BoundingBox, Detection, DistanceCategory, InferenceBackend, LabelTable, RawDetection,
    StubBackend,
};
pub use error::PipelineError;
pub use frame::{FrameView, PixelFormat, Plane, PlaneView, RawFrame, RgbBuffer};
pub use pipeline::{
    AdmissionGate, AdmissionIntervals, FrameScheduler, Pipeline, PipelineSettings, SchedulerStats,
    SubmitOutcome,
};
pub use tensor::Tensor;
