//! Decoding accepted files into source images.
//!
//! EXIF orientation is only honored for JPEG. PNG and WebP sources are used
//! in stored pixel order even if they carry an `eXIf` chunk, so a browser
//! that rotates those formats will show a different orientation than the
//! pixel space regions are computed in.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::metadata::Orientation;
use image::{DynamicImage, ImageError};

use super::{ImageFile, IntakeError, MimeType, SourceImage};
use crate::config::CropperConfig;

/// Decode an accepted file into RGBA pixels.
///
/// The real format is sniffed from the bytes and must match `mime`. JPEG
/// sources are re-oriented from their EXIF tag when the config asks for it,
/// so pixel coordinates line up with what a browser displays.
///
/// # Errors
///
/// Returns `IntakeError::DecodeError` if the bytes are not a valid image of
/// the claimed type.
pub fn decode(
    file: &ImageFile,
    mime: MimeType,
    config: &CropperConfig,
) -> Result<SourceImage, IntakeError> {
    let sniffed = image::guess_format(&file.bytes).map_err(decode_error)?;

    if sniffed != mime.image_format() {
        return Err(IntakeError::DecodeError(format!(
            "content is {:?}, not {}",
            sniffed, mime
        )));
    }

    let decoded = image::load_from_memory_with_format(&file.bytes, sniffed);
    let mut img = decoded.map_err(decode_error)?;

    if config.apply_exif_orientation && mime == MimeType::Jpeg {
        if let Some(orientation) = read_orientation(&file.bytes) {
            img.apply_orientation(orientation);
        }
    }

    let source = flatten_to_rgba(img);
    if source.width == 0 || source.height == 0 {
        return Err(IntakeError::DecodeError("image has no pixels".to_string()));
    }

    log::debug!(
        "decoded {} as {} ({}x{})",
        file.name,
        mime,
        source.width,
        source.height
    );

    Ok(source)
}

fn decode_error(err: ImageError) -> IntakeError {
    IntakeError::DecodeError(err.to_string())
}

fn flatten_to_rgba(img: DynamicImage) -> SourceImage {
    SourceImage::from_rgba_image(img.into_rgba8())
}

/// Read the EXIF orientation tag. `None` when absent or unreadable.
fn read_orientation(bytes: &[u8]) -> Option<Orientation> {
    let mut cursor = Cursor::new(bytes);
    let exif = Reader::new().read_from_container(&mut cursor).ok()?;
    let value = exif
        .get_field(Tag::Orientation, In::PRIMARY)?
        .value
        .get_uint(0)?;

    u8::try_from(value).ok().and_then(Orientation::from_exif)
}
