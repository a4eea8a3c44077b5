//! Dense f32 tensors and network input preparation.

use anyhow::{anyhow, Result};

use crate::frame::RgbBuffer;

/// ImageNet channel means used by the depth network.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations used by the depth network.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Row-major f32 tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
            .ok_or_else(|| anyhow!("tensor shape {:?} overflows", shape))?;
        if expected != data.len() {
            return Err(anyhow!(
                "tensor shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn filled(shape: Vec<usize>, value: f32) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_parts(self) -> (Vec<usize>, Vec<f32>) {
        (self.shape, self.data)
    }
}

/// Per-channel normalization applied after resizing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Normalization {
    /// `value / 255` (detector network).
    UnitScale,
    /// `(value / 255 - mean[c]) / std[c]` (depth network).
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
    pub fn imagenet() -> Self {
        Self::MeanStd {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    fn apply(&self, value: u8, channel: usize) -> f32 {
        let scaled = value as f32 / 255.0;
        match self {
            Self::UnitScale => scaled,
            Self::MeanStd { mean, std } => (scaled - mean[channel]) / std[channel],
        }
    }
}

/// Resize `rgb` to `width x height` with nearest-neighbor sampling and pack it
/// as a `(1, height, width, 3)` tensor.
///
/// Destination `(x, y)` reads source `(x * src_w / width, y * src_h / height)`,
/// clamped into bounds. No interpolation.
pub fn preprocess(rgb: &RgbBuffer, width: usize, height: usize, norm: Normalization) -> Tensor {
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let src_y = (y * rgb.height / height).min(rgb.height - 1);
        for x in 0..width {
            let src_x = (x * rgb.width / width).min(rgb.width - 1);
            let pixel = rgb.pixel(src_x, src_y);
            for (channel, value) in pixel.iter().enumerate() {
                data.push(norm.apply(*value, channel));
            }
        }
    }
    Tensor {
        shape: vec![1, height, width, 3],
        data,
    }
}
