//! File intake and validation.
//!
//! This module turns a host-supplied file into a [`SourceImage`]:
//! - Pick the single file to use from a drop (the first one wins)
//! - Check the claimed mime type against the allow-list
//! - Check the size against `maxSizeMB`
//! - Decode the bytes (sniffed format must match the claimed type)
//!
//! Validation has no side effects. It runs before anything touches session
//! state, so a rejected file leaves the session exactly as it was.
//!
//! # Examples
//!
//! ```ignore
//! use snapcrop_core::intake::{ingest, ImageFile};
//! use snapcrop_core::CropperConfig;
//!
//! let file = ImageFile::new("photo.jpg", "image/jpeg", std::fs::read("photo.jpg")?);
//! let source = ingest(&file, &CropperConfig::default())?;
//! println!("Decoded {}x{} image", source.width, source.height);
//! ```

mod decode;
mod types;

pub use decode::decode;
pub use types::{ImageFile, IntakeError, MimeType, SourceImage};

use crate::config::CropperConfig;

/// Pick the file to use from a drop. Extra files are ignored.
pub fn select_file(files: &[ImageFile]) -> Result<&ImageFile, IntakeError> {
    let (first, rest) = files.split_first().ok_or(IntakeError::NoFile)?;
    if !rest.is_empty() {
        log::debug!("ignoring {} extra dropped file(s)", rest.len());
    }
    Ok(first)
}

/// Check type and size constraints without decoding.
///
/// Type is checked before size, so an oversized file of the wrong type is
/// reported as `UnsupportedType`.
pub fn validate(file: &ImageFile, config: &CropperConfig) -> Result<MimeType, IntakeError> {
    let mime = MimeType::parse(&file.mime_type)
        .filter(|mime| config.accepts(*mime))
        .ok_or_else(|| IntakeError::UnsupportedType(file.mime_type.clone()))?;

    if file.size() > config.max_size_bytes() {
        return Err(IntakeError::TooLarge {
            size: file.size(),
            limit_mb: config.max_size_mb,
        });
    }

    Ok(mime)
}

/// Validate and decode a file in one step.
pub fn ingest(file: &ImageFile, config: &CropperConfig) -> Result<SourceImage, IntakeError> {
    let mime = validate(file, config)?;
    decode(file, mime, config)
}
