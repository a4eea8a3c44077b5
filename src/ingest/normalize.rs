use crate::error::PipelineError;
use crate::frame::{Plane, PixelFormat, RawFrame, RgbBuffer};

/// Convert a camera frame to interleaved RGB.
///
/// Supports YUV 4:2:0 (with or without a separate V plane) and packed BGRA.
/// Any other format tag fails with `UnsupportedFormat`.
pub fn to_rgb(frame: &RawFrame) -> Result<RgbBuffer, PipelineError> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    if width == 0 || height == 0 {
        return Err(PipelineError::malformed(0, "frame has zero width or height"));
    }
    match frame.format {
        PixelFormat::Yuv420 => yuv420_to_rgb(frame.planes(), width, height),
        PixelFormat::Bgra8888 => bgra_to_rgb(frame.planes(), width, height),
        other => Err(PipelineError::UnsupportedFormat(other)),
    }
}

fn yuv420_to_rgb(planes: &[Plane], width: usize, height: usize) -> Result<RgbBuffer, PipelineError> {
    let (y_plane, u_plane) = match planes {
        [y, u, ..] => (y, u),
        _ => {
            return Err(PipelineError::malformed(
                planes.len(),
                "YUV 4:2:0 needs at least a luma and a chroma plane",
            ))
        }
    };
    let v_plane = planes.get(2);

    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);
    check_plane(0, y_plane, width, height, 0)?;
    // Without a V plane, V is the byte following each U sample.
    let trailing = if v_plane.is_none() { 1 } else { 0 };
    check_plane(1, u_plane, chroma_width, chroma_height, trailing)?;
    if let Some(v_plane) = v_plane {
        check_plane(2, v_plane, chroma_width, chroma_height, 0)?;
    }

    let mut rgb = vec![0u8; width * height * 3];
    for row in 0..height {
        for col in 0..width {
            let y = y_plane.data[row * y_plane.row_stride + col * y_plane.pixel_stride] as f32;

            let u_index = (row / 2) * u_plane.row_stride + (col / 2) * u_plane.pixel_stride;
            let u = u_plane.data[u_index] as f32 - 128.0;
            let v = match v_plane {
                Some(v_plane) => {
                    v_plane.data[(row / 2) * v_plane.row_stride + (col / 2) * v_plane.pixel_stride]
                }
                None => u_plane.data[u_index + 1],
            } as f32
                - 128.0;

            let r = y + 1.370_705 * v;
            let g = y - 0.337_633 * u - 0.698_001 * v;
            let b = y + 1.732_446 * u;

            let offset = (row * width + col) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    Ok(RgbBuffer::from_raw(width, height, rgb))
}

fn bgra_to_rgb(planes: &[Plane], width: usize, height: usize) -> Result<RgbBuffer, PipelineError> {
    let plane = planes
        .first()
        .ok_or_else(|| PipelineError::malformed(0, "BGRA frame has no plane"))?;
    if plane.pixel_stride < 4 {
        return Err(PipelineError::malformed(
            0,
            format!("BGRA pixel stride {} is below 4", plane.pixel_stride),
        ));
    }
    check_plane(0, plane, width, height, 3)?;

    let mut rgb = vec![0u8; width * height * 3];
    for row in 0..height {
        for col in 0..width {
            let src = row * plane.row_stride + col * plane.pixel_stride;
            let offset = (row * width + col) * 3;
            rgb[offset] = plane.data[src + 2];
            rgb[offset + 1] = plane.data[src + 1];
            rgb[offset + 2] = plane.data[src];
        }
    }

    Ok(RgbBuffer::from_raw(width, height, rgb))
}

/// Verify that every sample of a `cols x rows` grid (plus `trailing` bytes after
/// the last sample) lies inside the plane, honoring its strides.
fn check_plane(
    index: usize,
    plane: &Plane,
    cols: usize,
    rows: usize,
    trailing: usize,
) -> Result<(), PipelineError> {
    if plane.pixel_stride == 0 {
        return Err(PipelineError::malformed(index, "pixel stride is zero"));
    }
    let overflow = || PipelineError::malformed(index, "stride overflows");
    let row_span = (cols - 1)
        .checked_mul(plane.pixel_stride)
        .and_then(|span| span.checked_add(1 + trailing))
        .ok_or_else(overflow)?;
    if rows > 1 && plane.row_stride < row_span {
        return Err(PipelineError::malformed(
            index,
            format!(
                "row stride {} is shorter than a {}-sample row",
                plane.row_stride, cols
            ),
        ));
    }
    let required = (rows - 1)
        .checked_mul(plane.row_stride)
        .and_then(|offset| offset.checked_add(row_span))
        .ok_or_else(overflow)?;
    if plane.data.len() < required {
        return Err(PipelineError::malformed(
            index,
            format!("expected at least {} bytes, got {}", required, plane.data.len()),
        ));
    }
    Ok(())
}

// Truncating cast after clamping.
fn clamp_to_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}
