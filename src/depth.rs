//! Depth fusion: attach an approximate distance to every surviving detection.
//!
//! The depth network produces a dense inverse-depth grid. Each detection samples
//! exactly one cell, the one under its box center; values are not averaged over
//! the box.

use crate::detect::{BoundingBox, Detection, LabelTable, RawDetection, FAR_DISTANCE};
use crate::error::PipelineError;
use crate::tensor::Tensor;

/// Fixed square input resolution of the depth network.
pub const DEPTH_INPUT_SIZE: usize = 256;

/// Numerator of the inverse-depth to distance conversion.
pub const DEPTH_SCALE: f32 = 1000.0;

/// Row-major grid of inverse-depth values.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 || values.len() != width * height {
            return Err(PipelineError::ShapeMismatch {
                what: "depth map",
                shape: vec![height, width],
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Interpret a depth network output as a 2-D grid.
    ///
    /// Leading and trailing unit dimensions are dropped, so `[1, H, W]`,
    /// `[1, H, W, 1]` and `[H, W]` are all accepted.
    pub fn from_tensor(tensor: Tensor) -> Result<Self, PipelineError> {
        let mut dims = tensor.shape();
        while dims.len() > 2 && dims[0] == 1 {
            dims = &dims[1..];
        }
        while dims.len() > 2 && dims[dims.len() - 1] == 1 {
            dims = &dims[..dims.len() - 1];
        }
        let (height, width) = match dims {
            [height, width] if *height > 0 && *width > 0 => (*height, *width),
            _ => {
                return Err(PipelineError::ShapeMismatch {
                    what: "depth output",
                    shape: tensor.shape().to_vec(),
                })
            }
        };
        let (_, values) = tensor.into_parts();
        Self::new(width, height, values)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Value at grid cell `(x, y)`, clamped into bounds.
    pub fn sample(&self, x: usize, y: usize) -> f32 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.values[y * self.width + x]
    }

    /// Value under an image-space point, scaling each axis independently.
    pub fn sample_image_point(&self, x: f32, y: f32, image_width: u32, image_height: u32) -> f32 {
        let gx = grid_index(x, image_width, self.width);
        let gy = grid_index(y, image_height, self.height);
        self.sample(gx, gy)
    }
}

fn grid_index(coordinate: f32, image_extent: u32, grid_extent: usize) -> usize {
    if image_extent == 0 || !coordinate.is_finite() {
        return 0;
    }
    let scaled = coordinate.max(0.0) * grid_extent as f32 / image_extent as f32;
    (scaled as usize).min(grid_extent - 1)
}

/// `DEPTH_SCALE / v` for positive inverse depth, `FAR_DISTANCE` otherwise.
pub fn inverse_depth_to_distance(inverse_depth: f32) -> f32 {
    if inverse_depth > 0.0 {
        DEPTH_SCALE / inverse_depth
    } else {
        FAR_DISTANCE
    }
}

/// Turn suppressed candidates into final detections.
///
/// Without a depth map every detection gets `FAR_DISTANCE`. Boxes are
/// normalized to `[0, 1]` by the image size. Output order matches input order.
pub fn fuse(
    detections: &[RawDetection],
    depth: Option<&DepthMap>,
    labels: &LabelTable,
    image_width: u32,
    image_height: u32,
) -> Vec<Detection> {
    let w = image_width.max(1) as f32;
    let h = image_height.max(1) as f32;
    detections
        .iter()
        .map(|raw| {
            let distance = match depth {
                Some(map) => {
                    let (cx, cy) = raw.center();
                    inverse_depth_to_distance(map.sample_image_point(
                        cx,
                        cy,
                        image_width,
                        image_height,
                    ))
                }
                None => FAR_DISTANCE,
            };
            let bbox = BoundingBox {
                x1: (raw.x1 / w).clamp(0.0, 1.0),
                y1: (raw.y1 / h).clamp(0.0, 1.0),
                x2: (raw.x2 / w).clamp(0.0, 1.0),
                y2: (raw.y2 / h).clamp(0.0, 1.0),
            };
            Detection::new(labels.name(raw.class_index), raw.confidence, bbox, distance)
        })
        .collect()
}
