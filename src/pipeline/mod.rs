//! One pipeline run: color conversion through ranking.

mod gate;
mod scheduler;

use crate::depth::{fuse, DepthMap};
use crate::detect::{
    nhwc_input_size, non_max_suppression, rank, BoxCoordinates, DecoderConfig, Detection,
    DetectorDecoder, FrameGeometry, InferenceBackend, LabelTable, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_IOU_THRESHOLD,
};
use crate::error::PipelineError;
use crate::frame::{RawFrame, RgbBuffer};
use crate::ingest::to_rgb;
use crate::tensor::{preprocess, Normalization, Tensor};

pub use gate::{Admission, AdmissionGate, AdmissionIntervals, AdmissionTicket};
pub use scheduler::{FrameScheduler, SchedulerStats, SubmitOutcome};

/// Tunables for decoding and suppression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineSettings {
    pub confidence_threshold: f32,
    pub box_coordinates: BoxCoordinates,
    pub iou_threshold: f32,
    pub class_aware_nms: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            box_coordinates: BoxCoordinates::default(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            class_aware_nms: false,
        }
    }
}

struct Network {
    backend: Box<dyn InferenceBackend>,
    width: usize,
    height: usize,
}

impl Network {
    fn new(backend: Box<dyn InferenceBackend>) -> Result<Self, PipelineError> {
        let (height, width) =
            nhwc_input_size(backend.input_shape()).ok_or_else(|| PipelineError::ModelLoad {
                model: backend.name().to_string(),
                source: anyhow::anyhow!(
                    "expected a [1, H, W, 3] input, model declares {:?}",
                    backend.input_shape()
                ),
            })?;
        Ok(Self {
            backend,
            width,
            height,
        })
    }

    fn infer(&mut self, rgb: &RgbBuffer, norm: Normalization) -> Result<Tensor, PipelineError> {
        let input = preprocess(rgb, self.width, self.height, norm);
        self.backend
            .run(&input)
            .map_err(|source| PipelineError::Inference {
                backend: self.backend.name(),
                source,
            })
    }
}

/// The detection pipeline with its two networks.
///
/// Holds no per-frame state: every `run` starts from the frame alone. Backends
/// are called from whichever thread owns the pipeline, never concurrently.
pub struct Pipeline {
    detector: Network,
    depth: Option<Network>,
    labels: LabelTable,
    decoder: DetectorDecoder,
    iou_threshold: f32,
    class_aware_nms: bool,
}

impl Pipeline {
    /// Both networks must take an NHWC `[1, H, W, 3]` input; anything else is
    /// a load failure.
    pub fn new(
        detector: Box<dyn InferenceBackend>,
        depth: Option<Box<dyn InferenceBackend>>,
        labels: LabelTable,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        let detector = Network::new(detector)?;
        let depth = depth.map(Network::new).transpose()?;
        let decoder = DetectorDecoder::new(DecoderConfig {
            num_classes: labels.len(),
            confidence_threshold: settings.confidence_threshold,
            box_coordinates: settings.box_coordinates,
        });
        log::info!(
            "pipeline ready: detector {} {}x{}, {} classes, depth {}",
            detector.backend.name(),
            detector.width,
            detector.height,
            labels.len(),
            depth
                .as_ref()
                .map(|net| net.backend.name())
                .unwrap_or("none")
        );
        Ok(Self {
            detector,
            depth,
            labels,
            decoder,
            iou_threshold: settings.iou_threshold,
            class_aware_nms: settings.class_aware_nms,
        })
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Run the whole pipeline on one frame and return ranked detections.
    ///
    /// Unsupported formats, malformed planes and unrecognized output shapes
    /// yield an empty list. Only inference faults are returned as errors.
    pub fn run(
        &mut self,
        frame: &RawFrame,
        depth_enabled: bool,
    ) -> Result<Vec<Detection>, PipelineError> {
        let rgb = match to_rgb(frame) {
            Ok(rgb) => rgb,
            Err(err) if err.is_recoverable() => {
                log::debug!("frame skipped: {}", err);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let output = self.detector.infer(&rgb, Normalization::UnitScale)?;
        let geometry = FrameGeometry {
            input_width: self.detector.width,
            input_height: self.detector.height,
            image_width: frame.width,
            image_height: frame.height,
        };
        let candidates = self.decoder.decode(&output, geometry);
        let survivors = non_max_suppression(candidates, self.iou_threshold, self.class_aware_nms);
        if survivors.is_empty() {
            return Ok(Vec::new());
        }

        let depth_map = match self.depth.as_mut() {
            Some(network) if depth_enabled => {
                let output = network.infer(&rgb, Normalization::imagenet())?;
                match DepthMap::from_tensor(output) {
                    Ok(map) => Some(map),
                    Err(err) => {
                        log::warn!("depth output ignored: {}", err);
                        None
                    }
                }
            }
            _ => None,
        };

        let detections = fuse(
            &survivors,
            depth_map.as_ref(),
            &self.labels,
            frame.width,
            frame.height,
        );
        Ok(rank(detections))
    }
}
