//! Core types for file intake.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for accepting and decoding a dropped file.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntakeError {
    /// The drop contained no files.
    #[error("No file was provided")]
    NoFile,

    /// The file is larger than the configured limit.
    #[error("File size exceeds {limit_mb}MB limit ({size} bytes)")]
    TooLarge { size: u64, limit_mb: f64 },

    /// The claimed mime type is not on the allow-list.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    /// The bytes are not a valid image of the claimed type.
    #[error("Corrupted or unreadable image: {0}")]
    DecodeError(String),
}

/// Image formats the intake can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MimeType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MimeType {
    /// Parse a mime string. Parameters (`; charset=...`) and case are ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(MimeType::Jpeg),
            "image/png" => Some(MimeType::Png),
            "image/webp" => Some(MimeType::Webp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
            MimeType::Webp => "image/webp",
        }
    }

    /// The `image` crate format used to decode this type.
    pub fn image_format(self) -> ImageFormat {
        match self {
            MimeType::Jpeg => ImageFormat::Jpeg,
            MimeType::Png => ImageFormat::Png,
            MimeType::Webp => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file handed over by the host's picker or drop zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    /// User-visible file name.
    pub name: String,
    /// Mime type as claimed by the host. Not trusted until decoded.
    pub mime_type: String,
    /// File contents.
    pub bytes: Bytes,
}

impl ImageFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Build a file from a `data:<mime>;base64,<payload>` URI.
    ///
    /// # Errors
    ///
    /// Returns `IntakeError::DecodeError` if the URI is not a base64 data URI
    /// or the payload is not valid base64.
    pub fn from_data_uri(name: impl Into<String>, uri: &str) -> Result<Self, IntakeError> {
        let malformed = |reason: &str| IntakeError::DecodeError(reason.to_string());

        let Some(rest) = uri.trim().strip_prefix("data:") else {
            return Err(malformed("missing data: prefix"));
        };
        let Some((header, payload)) = rest.split_once(',') else {
            return Err(malformed("missing data URI payload"));
        };
        let Some(mime) = header.strip_suffix(";base64") else {
            return Err(malformed("data URI is not base64 encoded"));
        };

        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| IntakeError::DecodeError(format!("invalid base64 payload: {}", e)))?;

        Ok(Self::new(name, mime, bytes))
    }
}

/// A decoded source image with RGBA pixel data.
///
/// Owned by a single session and shared read-only with the rasterizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGBA pixel data in row-major order (4 bytes per pixel).
    pub pixels: Vec<u8>,
}

impl SourceImage {
    /// Create a source image from raw RGBA pixels.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_rgba_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    /// RGBA value at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Render the source back to a PNG data URI for hosts that preview it.
    pub fn to_data_uri(&self) -> Result<String, IntakeError> {
        let img = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| IntakeError::DecodeError("pixel buffer size mismatch".to_string()))?;

        let mut png = std::io::Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png)
            .map_err(|e| IntakeError::DecodeError(e.to_string()))?;

        Ok(format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(png.into_inner())
        ))
    }
}
