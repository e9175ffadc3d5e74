//! Crop-region controller.
//!
//! Tracks pan, zoom and aspect ratio for one source image and maps them to a
//! [`CropRegion`] in source pixels.
//!
//! # Coordinate System
//!
//! - Pan is a pair of fractions in `[0, 1]`. `0.0` puts the region against the
//!   left/top edge, `1.0` against the right/bottom edge, `0.5` centers it.
//! - Zoom is `>= 1.0`. At zoom 1 the region is the largest rectangle of the
//!   active aspect ratio that fits the source, and zoom `z` divides both sides
//!   by `z`.
//! - Display coordinates are pixels of the host's cropper area. They only
//!   matter for [`CropController::drag`] and [`CropController::crop_box`].
//!
//! # Rounding
//!
//! Region sizes and offsets are truncated toward zero. A region that would
//! still cross an image edge after truncation is shrunk by the smallest
//! integer amount that brings it back inside.
//!
//! Out-of-range input (zoom, pan, ratios) is corrected here and never
//! reported as an error.

use serde::{Deserialize, Serialize};

use crate::config::{CropShape, CropperConfig, DisplayArea, ZoomRange};
use crate::region::CropRegion;

/// Absorbs float noise so exact ratios like `800 / (16 / 9)` land on 450
/// instead of 449.
const PIXEL_EPSILON: f64 = 1e-6;

/// Pan, zoom and framing for one cropping session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
    pub aspect_ratio: f64,
    pub shape: CropShape,
}

impl ViewState {
    /// Centered view at minimum zoom.
    pub fn centered(config: &CropperConfig) -> Self {
        Self {
            pan_x: 0.5,
            pan_y: 0.5,
            zoom: config.zoom_range.min,
            aspect_ratio: config.aspect_ratio,
            shape: config.crop_shape,
        }
    }
}

/// Crop box position inside the display area, in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Maps user interaction to a crop region over one source image.
#[derive(Debug, Clone)]
pub struct CropController {
    source_width: u32,
    source_height: u32,
    view: ViewState,
    initial: ViewState,
    zoom_range: ZoomRange,
    zoom_step: f64,
    display: DisplayArea,
}

impl CropController {
    /// Create a controller for a `source_width` x `source_height` image.
    ///
    /// Zero dimensions are treated as 1 so the region stays well defined.
    pub fn new(source_width: u32, source_height: u32, config: &CropperConfig) -> Self {
        let initial = ViewState::centered(config);
        Self {
            source_width: source_width.max(1),
            source_height: source_height.max(1),
            view: initial,
            initial,
            zoom_range: config.zoom_range,
            zoom_step: config.zoom_step,
            display: config.display_area,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn source_size(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    /// Return to the centered, unzoomed view with the configured framing.
    pub fn reset_view(&mut self) {
        self.view = self.initial;
    }

    /// Set the pan fractions. Each is clamped to `[0, 1]`; NaN keeps the
    /// current value.
    pub fn set_pan(&mut self, pan_x: f64, pan_y: f64) {
        self.view.pan_x = clamp_fraction(pan_x, self.view.pan_x);
        self.view.pan_y = clamp_fraction(pan_y, self.view.pan_y);
    }

    /// Move the image by a pointer delta in display pixels.
    ///
    /// The image follows the pointer, so dragging right moves the region
    /// toward the left edge of the source.
    pub fn drag(&mut self, dx: f64, dy: f64) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }

        let region = self.current_region();
        let crop_box = self.crop_box();

        // Source pixels covered by one display pixel inside the crop box
        let scale_x = region.width as f64 / crop_box.width;
        let scale_y = region.height as f64 / crop_box.height;

        let slack_x = (self.source_width - region.width) as f64;
        let slack_y = (self.source_height - region.height) as f64;

        let pan_x = if slack_x > 0.0 {
            self.view.pan_x - dx * scale_x / slack_x
        } else {
            self.view.pan_x
        };
        let pan_y = if slack_y > 0.0 {
            self.view.pan_y - dy * scale_y / slack_y
        } else {
            self.view.pan_y
        };

        self.set_pan(pan_x, pan_y);
    }

    /// Set the zoom factor, clamped into the configured range.
    ///
    /// Pan is stored relative to the remaining slack, so the region stays
    /// inside the image when zoom decreases.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.view.zoom = self.zoom_range.clamp(zoom);
    }

    /// Move zoom by whole slider steps from the nearest step position.
    pub fn step_zoom(&mut self, steps: i32) {
        let min = self.zoom_range.min;
        let index = ((self.view.zoom - min) / self.zoom_step).round() + steps as f64;
        self.set_zoom(min + index * self.zoom_step);
    }

    /// Change the target aspect ratio. Non-finite or non-positive ratios are
    /// ignored.
    pub fn set_aspect_ratio(&mut self, ratio: f64) {
        if !ratio.is_finite() || ratio <= 0.0 {
            log::warn!("ignoring invalid aspect ratio {}", ratio);
            return;
        }
        self.view.aspect_ratio = ratio;
    }

    pub fn set_shape(&mut self, shape: CropShape) {
        self.view.shape = shape;
    }

    /// Current crop region in source pixels.
    ///
    /// Pure function of the view state: unchanged state gives an identical
    /// region on every call.
    pub fn current_region(&self) -> CropRegion {
        let src_w = self.source_width as f64;
        let src_h = self.source_height as f64;
        let ratio = self.view.aspect_ratio;

        // Largest rectangle of the target ratio that fits the source
        let (base_w, base_h) = if src_w / src_h > ratio {
            (src_h * ratio, src_h)
        } else {
            (src_w, src_w / ratio)
        };

        let width = truncate_px(base_w / self.view.zoom).clamp(1, self.source_width);
        let height = truncate_px(base_h / self.view.zoom).clamp(1, self.source_height);

        let x = truncate_px(self.view.pan_x * (self.source_width - width) as f64);
        let y = truncate_px(self.view.pan_y * (self.source_height - height) as f64);

        fit_within(
            CropRegion::new(x, y, width, height),
            self.source_width,
            self.source_height,
        )
    }

    /// Crop box inside the display area: the largest centered rectangle of
    /// the active aspect ratio.
    pub fn crop_box(&self) -> DisplayRect {
        let DisplayArea { width, height } = self.display;
        let ratio = self.view.aspect_ratio;

        let (box_w, box_h) = if width / height > ratio {
            (height * ratio, height)
        } else {
            (width, width / ratio)
        };

        DisplayRect {
            x: (width - box_w) / 2.0,
            y: (height - box_h) / 2.0,
            width: box_w,
            height: box_h,
        }
    }
}

#[inline]
fn clamp_fraction(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Truncate a non-negative pixel measure toward zero.
#[inline]
fn truncate_px(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value + PIXEL_EPSILON).floor().min(u32::MAX as f64) as u32
}

/// Shrink the region by the minimum amount needed to lie inside the image.
fn fit_within(mut region: CropRegion, image_width: u32, image_height: u32) -> CropRegion {
    region.x = region.x.min(image_width - 1);
    region.y = region.y.min(image_height - 1);
    if region.right() > image_width as u64 {
        region.width = image_width - region.x;
    }
    if region.bottom() > image_height as u64 {
        region.height = image_height - region.y;
    }
    region
}


// ============================================================================
// Property-Based Tests
// ============================================================================
