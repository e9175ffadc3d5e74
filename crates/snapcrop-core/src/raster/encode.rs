//! JPEG encoding of the destination surface.
//!
//! Uses the `image` crate's baseline JPEG encoder. Output is either the full
//! byte stream or an error, never a partial buffer.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::RasterError;

/// Encode packed RGB pixels (3 bytes per pixel, row-major) as JPEG.
///
/// Quality is clamped to 1-100.
pub(crate) fn encode_jpeg(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, RasterError> {
    if width == 0 || height == 0 {
        return Err(RasterError::EncodeFailure(format!(
            "cannot create a {}x{} surface",
            width, height
        )));
    }

    let expected = width as usize * height as usize * 3;
    if rgb.len() != expected {
        return Err(RasterError::EncodeFailure(format!(
            "surface holds {} bytes, expected {}",
            rgb.len(),
            expected
        )));
    }

    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .write_image(rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| RasterError::EncodeFailure(e.to_string()))?;

    Ok(buffer.into_inner())
}
