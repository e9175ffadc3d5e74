//! Cropper configuration.
//!
//! All options a host can set on a cropping session live in [`CropperConfig`].
//! The struct deserializes from a camelCase object with every field optional,
//! so a JavaScript host can pass `{ aspectRatio: 16 / 9 }` and get defaults
//! for the rest. The size limit is spelled `maxSizeMB` (`maxSizeMb` is also
//! accepted) and unknown keys are rejected rather than ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intake::MimeType;

/// Errors raised when a configuration cannot be used.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Aspect ratio must be a finite value greater than zero.
    #[error("Invalid aspect ratio: {0}")]
    InvalidAspectRatio(f64),

    /// Size limit must be a finite value greater than zero.
    #[error("Invalid size limit: {0} MB")]
    InvalidSizeLimit(f64),

    /// Zoom range must satisfy `1.0 <= min <= max`.
    #[error("Invalid zoom range: [{min}, {max}]")]
    InvalidZoomRange { min: f64, max: f64 },

    /// Zoom step must be a finite value greater than zero.
    #[error("Invalid zoom step: {0}")]
    InvalidZoomStep(f64),

    /// JPEG quality must be within 1..=100.
    #[error("Invalid JPEG quality: {0} (expected 1-100)")]
    InvalidQuality(u8),

    /// At least one mime type must be accepted.
    #[error("No accepted mime types configured")]
    NoAcceptedTypes,

    /// Display area must have a non-zero size.
    #[error("Invalid display area: {width}x{height}")]
    InvalidDisplayArea { width: f64, height: f64 },
}

/// Shape of the crop overlay.
///
/// The shape only affects how the host draws the selection. The committed
/// region is always the bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropShape {
    #[default]
    Rect,
    Round,
}

/// Allowed zoom factors, inclusive on both ends.
///
/// Serializes as `{ min, max }`. Deserializes from that object or from a
/// `[min, max]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ZoomRangeRepr")]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZoomRangeRepr {
    Pair([f64; 2]),
    Object { min: f64, max: f64 },
}

impl From<ZoomRangeRepr> for ZoomRange {
    fn from(repr: ZoomRangeRepr) -> Self {
        match repr {
            ZoomRangeRepr::Pair([min, max]) | ZoomRangeRepr::Object { min, max } => {
                Self { min, max }
            }
        }
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 1.0, max: 3.0 }
    }
}

impl ZoomRange {
    /// Clamp a zoom factor into the range. NaN maps to `min`.
    #[inline]
    pub fn clamp(&self, zoom: f64) -> f64 {
        if zoom.is_nan() {
            return self.min;
        }
        zoom.clamp(self.min, self.max)
    }
}

/// Size of the on-screen area the cropper is drawn into, in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayArea {
    pub width: f64,
    pub height: f64,
}

impl Default for DisplayArea {
    fn default() -> Self {
        Self {
            width: 600.0,
            height: 400.0,
        }
    }
}

/// Opaque RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

/// Options recognized by a cropping session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CropperConfig {
    /// Target width / height of the crop region.
    pub aspect_ratio: f64,
    /// Overlay shape.
    pub crop_shape: CropShape,
    /// Maximum accepted file size in megabytes (1 MB = 1024 * 1024 bytes).
    #[serde(rename = "maxSizeMB", alias = "maxSizeMb")]
    pub max_size_mb: f64,
    /// Allowed zoom factors.
    pub zoom_range: ZoomRange,
    /// Increment used by slider-style zoom stepping.
    pub zoom_step: f64,
    /// Mime types accepted at intake.
    pub accepted_mime_types: Vec<MimeType>,
    /// Quality passed to the JPEG encoder (1-100).
    pub jpeg_quality: u8,
    /// Color that transparent source pixels are flattened onto.
    pub background: Rgb,
    /// Display area used to map pointer drags into source pixels.
    pub display_area: DisplayArea,
    /// Open the cropper as soon as a file finishes decoding.
    pub open_cropper_on_load: bool,
    /// Rotate/flip JPEG sources according to their EXIF orientation tag.
    pub apply_exif_orientation: bool,
}

impl Default for CropperConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: 1.0,
            crop_shape: CropShape::Rect,
            max_size_mb: 10.0,
            zoom_range: ZoomRange::default(),
            zoom_step: 0.1,
            accepted_mime_types: vec![MimeType::Jpeg, MimeType::Png, MimeType::Webp],
            // Same default the browser canvas uses for image/jpeg
            jpeg_quality: 92,
            background: Rgb([0, 0, 0]),
            display_area: DisplayArea::default(),
            open_cropper_on_load: true,
            apply_exif_orientation: true,
        }
    }
}

impl CropperConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that every option is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.aspect_ratio.is_finite() || self.aspect_ratio <= 0.0 {
            return Err(ConfigError::InvalidAspectRatio(self.aspect_ratio));
        }
        if !self.max_size_mb.is_finite() || self.max_size_mb <= 0.0 {
            return Err(ConfigError::InvalidSizeLimit(self.max_size_mb));
        }
        let ZoomRange { min, max } = self.zoom_range;
        if !min.is_finite() || !max.is_finite() || min < 1.0 || min > max {
            return Err(ConfigError::InvalidZoomRange { min, max });
        }
        if !self.zoom_step.is_finite() || self.zoom_step <= 0.0 {
            return Err(ConfigError::InvalidZoomStep(self.zoom_step));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidQuality(self.jpeg_quality));
        }
        if self.accepted_mime_types.is_empty() {
            return Err(ConfigError::NoAcceptedTypes);
        }
        let DisplayArea { width, height } = self.display_area;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(ConfigError::InvalidDisplayArea { width, height });
        }
        Ok(())
    }

    /// Size limit in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_mb * 1024.0 * 1024.0).floor() as u64
    }

    /// Whether `mime` is on the allow-list.
    pub fn accepts(&self, mime: MimeType) -> bool {
        self.accepted_mime_types.contains(&mime)
    }
}
