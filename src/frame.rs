//! Camera frame containers.
//!
//! - `FrameView`: borrowed planes that still belong to the camera. Only valid until
//!   control returns to the producer.
//! - `RawFrame`: owned snapshot copied out of a `FrameView` at admission time. The
//!   pipeline run that captured it owns it exclusively.
//! - `RgbBuffer`: interleaved RGB produced by color conversion, discarded after the run.

use std::time::Instant;
use zeroize::Zeroize;

/// Pixel layout tag reported by the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar or semi-planar YUV 4:2:0 (Y plane + U plane + optional V plane).
    Yuv420,
    /// Packed 8-bit BGRA, one plane.
    Bgra8888,
    /// Any other camera format tag. Conversion rejects it.
    Other(u32),
}

// ----------------------------------------------------------------------------
// FrameView: camera-owned planes
// ----------------------------------------------------------------------------

/// One borrowed image plane.
#[derive(Clone, Copy, Debug)]
pub struct PlaneView<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows. May exceed the visible width.
    pub row_stride: usize,
    /// Bytes between horizontally adjacent samples (1 for planar, 2 for interleaved chroma).
    pub pixel_stride: usize,
}

/// Borrowed camera frame as handed over by the producer callback.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: &'a [PlaneView<'a>],
}

// ----------------------------------------------------------------------------
// RawFrame: owned snapshot
// ----------------------------------------------------------------------------

/// Owned image plane.
#[derive(Debug)]
pub struct Plane {
    pub(crate) data: Vec<u8>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Immutable snapshot of one camera frame.
///
/// Not `Clone`: a snapshot belongs to exactly one pipeline run.
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    planes: Vec<Plane>,
    captured_at: Instant,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            captured_at: Instant::now(),
        }
    }

    /// Copy every plane out of camera-owned memory.
    ///
    /// Must be called before control returns to the producer, which may reuse
    /// the backing buffers for the next frame.
    pub fn copy_from(view: &FrameView<'_>) -> Self {
        let planes = view
            .planes
            .iter()
            .map(|plane| Plane::new(plane.data.to_vec(), plane.row_stride, plane.pixel_stride))
            .collect();
        Self::new(view.width, view.height, view.format, planes)
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.planes.iter().map(|plane| plane.data.len()).sum()
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        // Camera pixels do not outlive the run.
        for plane in &mut self.planes {
            plane.data.zeroize();
        }
    }
}

// ----------------------------------------------------------------------------
// RgbBuffer
// ----------------------------------------------------------------------------

/// Interleaved 8-bit RGB image, `width * height * 3` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbBuffer {
    pub width: usize,
    pub height: usize,
    data: Vec<u8>,
}

impl RgbBuffer {
    pub(crate) fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width * height * 3);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let offset = (y * self.width + x) * 3;
        [self.data[offset], self.data[offset + 1], self.data[offset + 2]]
    }
}
