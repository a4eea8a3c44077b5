//! Detector output decoding.
//!
//! YOLO-style detectors emit a `[1, d1, d2]` tensor where one axis enumerates
//! candidate boxes and the other holds `cx, cy, w, h` followed by one score per
//! class. Exporters disagree on which axis is which, so the layout is inferred
//! from the two dimensions and the class count alone.
//!
//! The inference is a heuristic. If a model's box count ever equals
//! `4 + num_classes`, the standard layout wins the tie and the output may be
//! misread. When neither axis matches, the fallback reads transposed even if
//! the boxes sit on the first axis. There is no configuration flag to force a
//! layout.

use serde::Deserialize;

use crate::detect::result::RawDetection;
use crate::error::PipelineError;
use crate::tensor::Tensor;

/// Default minimum class score for a candidate to survive decoding.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;

/// Values up to this bound mark boxes as normalized in `BoxCoordinates::Auto`.
const NORMALIZED_COORDINATE_LIMIT: f32 = 2.0;

/// Which axis of the output carries the per-box attribute vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[1, boxes, attributes]`
    Standard,
    /// `[1, attributes, boxes]`
    Transposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutInfo {
    pub layout: OutputLayout,
    pub num_boxes: usize,
    pub num_attributes: usize,
}

/// Infer the output layout from the two trailing dimensions.
///
/// 1. `d2 == 4 + num_classes`: standard, `d1` boxes.
/// 2. `d1 == 4 + num_classes`: transposed, `d2` boxes.
/// 3. Otherwise the larger dimension is the box count, the smaller one the
///    attribute count, and values are read with transposed indexing whichever
///    axis is larger.
pub fn infer_layout(d1: usize, d2: usize, num_classes: usize) -> LayoutInfo {
    let attributes = 4 + num_classes;
    if d2 == attributes {
        LayoutInfo {
            layout: OutputLayout::Standard,
            num_boxes: d1,
            num_attributes: d2,
        }
    } else if d1 == attributes {
        LayoutInfo {
            layout: OutputLayout::Transposed,
            num_boxes: d2,
            num_attributes: d1,
        }
    } else {
        LayoutInfo {
            layout: OutputLayout::Transposed,
            num_boxes: d1.max(d2),
            num_attributes: d1.min(d2),
        }
    }
}

/// Coordinate space of the decoded `cx, cy, w, h` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxCoordinates {
    /// Pixels of the detector input tensor.
    #[default]
    InputPixels,
    /// Fractions of the image.
    Normalized,
    /// Normalized when every surviving box value is at most 2.0, else input pixels.
    Auto,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecoderConfig {
    pub num_classes: usize,
    pub confidence_threshold: f32,
    pub box_coordinates: BoxCoordinates,
}

impl DecoderConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            box_coordinates: BoxCoordinates::default(),
        }
    }
}

/// Geometry needed to map tensor-space boxes back to the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    pub input_width: usize,
    pub input_height: usize,
    pub image_width: u32,
    pub image_height: u32,
}

/// Center-form candidate that passed the confidence threshold.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    class_index: usize,
    score: f32,
}

#[derive(Clone, Debug)]
pub struct DetectorDecoder {
    config: DecoderConfig,
}

impl DetectorDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode candidates, treating an unrecognized shape as "no candidates".
    pub fn decode(&self, output: &Tensor, geometry: FrameGeometry) -> Vec<RawDetection> {
        match self.try_decode(output, geometry) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("detector output rejected: {}", err);
                Vec::new()
            }
        }
    }

    /// Decode candidates, reporting an unrecognized shape as `ShapeMismatch`.
    pub fn try_decode(
        &self,
        output: &Tensor,
        geometry: FrameGeometry,
    ) -> Result<Vec<RawDetection>, PipelineError> {
        let mismatch = || PipelineError::ShapeMismatch {
            what: "detector output",
            shape: output.shape().to_vec(),
        };
        let (d1, d2) = match output.shape() {
            [1, d1, d2] | [d1, d2] => (*d1, *d2),
            _ => return Err(mismatch()),
        };
        let info = infer_layout(d1, d2, self.config.num_classes);
        // Four box values plus at least one class score.
        if info.num_attributes < 5 || info.num_boxes == 0 {
            return Err(mismatch());
        }
        log::trace!("detector output {:?} decoded as {:?}", output.shape(), info);

        let data = output.data();
        let value = |candidate: usize, attribute: usize| match info.layout {
            OutputLayout::Standard => data[candidate * info.num_attributes + attribute],
            OutputLayout::Transposed => data[attribute * info.num_boxes + candidate],
        };

        let mut candidates = Vec::new();
        for index in 0..info.num_boxes {
            let mut class_index = 0;
            let mut score = f32::NEG_INFINITY;
            for class in 0..info.num_attributes - 4 {
                let class_score = value(index, 4 + class);
                if class_score > score {
                    score = class_score;
                    class_index = class;
                }
            }
            if score.is_nan() || score < self.config.confidence_threshold {
                continue;
            }
            let bounds = [value(index, 0), value(index, 1), value(index, 2), value(index, 3)];
            if bounds.iter().any(|v| !v.is_finite()) {
                continue;
            }
            let [cx, cy, w, h] = bounds;
            candidates.push(Candidate {
                cx,
                cy,
                w,
                h,
                class_index,
                score,
            });
        }

        let (scale_x, scale_y) = self.scale_factors(&candidates, geometry);
        let max_x = geometry.image_width as f32;
        let max_y = geometry.image_height as f32;
        Ok(candidates
            .into_iter()
            .map(|c| RawDetection {
                x1: ((c.cx - c.w / 2.0) * scale_x).clamp(0.0, max_x),
                y1: ((c.cy - c.h / 2.0) * scale_y).clamp(0.0, max_y),
                x2: ((c.cx + c.w / 2.0) * scale_x).clamp(0.0, max_x),
                y2: ((c.cy + c.h / 2.0) * scale_y).clamp(0.0, max_y),
                class_index: c.class_index,
                confidence: c.score,
            })
            .collect())
    }

    fn scale_factors(&self, candidates: &[Candidate], geometry: FrameGeometry) -> (f32, f32) {
        let image_w = geometry.image_width as f32;
        let image_h = geometry.image_height as f32;
        let normalized = match self.config.box_coordinates {
            BoxCoordinates::InputPixels => false,
            BoxCoordinates::Normalized => true,
            BoxCoordinates::Auto => {
                !candidates.is_empty()
                    && candidates.iter().all(|c| {
                        [c.cx, c.cy, c.w, c.h]
                            .iter()
                            .all(|v| *v <= NORMALIZED_COORDINATE_LIMIT)
                    })
            }
        };
        if normalized {
            (image_w, image_h)
        } else {
            (
                image_w / geometry.input_width.max(1) as f32,
                image_h / geometry.input_height.max(1) as f32,
            )
        }
    }
}
