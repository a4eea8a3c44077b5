//! Synthetic camera source.
//!
//! `SyntheticSource` stands in for a live camera on `stub://` URLs. It renders
//! YUV 4:2:0 frames into buffers it owns and reuses, and hands them to a
//! callback as a borrowed `FrameView`, the same way a camera callback lends out
//! memory it will recycle for the next frame.

use anyhow::{anyhow, Result};
use rand::Rng;

use crate::frame::{FrameView, PixelFormat, PlaneView};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL. Must use the `stub://` scheme.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Extra bytes appended to every row of every plane.
    pub row_padding: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: 640,
            height: 480,
            row_padding: 16,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    luma: Vec<u8>,
    chroma_u: Vec<u8>,
    chroma_v: Vec<u8>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "only stub:// sources are built in (got {})",
                config.url
            ));
        }
        if config.width < 2 || config.height < 2 {
            return Err(anyhow!(
                "synthetic frames must be at least 2x2 (got {}x{})",
                config.width,
                config.height
            ));
        }
        let luma_len = config.luma_stride() * config.height as usize;
        let chroma_len = config.chroma_stride() * (config.height as usize).div_ceil(2);
        Ok(Self {
            config,
            luma: vec![0; luma_len],
            chroma_u: vec![128; chroma_len],
            chroma_v: vec![128; chroma_len],
            frame_count: 0,
            connected: false,
        })
    }

    /// Synthetic sources are always reachable.
    pub fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {} (synthetic)", self.config.url);
        self.connected = true;
        Ok(())
    }

    /// Render the next frame and lend it to `consume`.
    ///
    /// The view is only valid inside the callback; the buffers are overwritten
    /// on the next capture.
    pub fn capture<R>(&mut self, consume: impl FnOnce(&FrameView<'_>) -> R) -> Result<R> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} is not connected", self.config.url));
        }
        self.frame_count += 1;
        self.render();

        let planes = [
            PlaneView {
                data: &self.luma,
                row_stride: self.config.luma_stride(),
                pixel_stride: 1,
            },
            PlaneView {
                data: &self.chroma_u,
                row_stride: self.config.chroma_stride(),
                pixel_stride: 1,
            },
            PlaneView {
                data: &self.chroma_v,
                row_stride: self.config.chroma_stride(),
                pixel_stride: 1,
            },
        ];
        let view = FrameView {
            width: self.config.width,
            height: self.config.height,
            format: PixelFormat::Yuv420,
            planes: &planes,
        };
        Ok(consume(&view))
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }

    /// Gray noisy background with a bright block sweeping left to right.
    fn render(&mut self) {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let stride = self.config.luma_stride();
        let block = (width / 5).max(1);
        let block_x = (self.frame_count as usize * 8) % width.saturating_sub(block).max(1);
        let block_y = height / 3;

        let mut rng = rand::thread_rng();
        for row in 0..height {
            let line = &mut self.luma[row * stride..row * stride + width];
            for (col, sample) in line.iter_mut().enumerate() {
                let inside = (block_x..block_x + block).contains(&col)
                    && (block_y..block_y + block).contains(&row);
                *sample = if inside {
                    220
                } else {
                    90u8.wrapping_add(rng.gen_range(0..16))
                };
            }
        }

        let chroma_stride = self.config.chroma_stride();
        for row in 0..height.div_ceil(2) {
            for col in 0..width.div_ceil(2) {
                let inside = (block_x / 2..(block_x + block) / 2).contains(&col)
                    && (block_y / 2..(block_y + block) / 2).contains(&row);
                self.chroma_v[row * chroma_stride + col] = if inside { 170 } else { 128 };
            }
        }
    }
}

impl SyntheticConfig {
    fn luma_stride(&self) -> usize {
        self.width as usize + self.row_padding
    }

    fn chroma_stride(&self) -> usize {
        (self.width as usize).div_ceil(2) + self.row_padding
    }
}
