//! Crop rectangles in source-pixel coordinates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A crop region does not fit the image it is applied to.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    #[error(
        "Invalid region {width}x{height} at ({x}, {y}) for {image_width}x{image_height} image"
    )]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
}

/// Rectangle in source-pixel coordinates. Origin is top-left.
///
/// Regions are derived from the view state on demand and never edited in
/// place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering an entire `width` x `height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Check that the region is non-empty and lies inside the image.
    pub fn validate_within(&self, image_width: u32, image_height: u32) -> Result<(), RegionError> {
        let fits = self.width > 0
            && self.height > 0
            && self.right() <= image_width as u64
            && self.bottom() <= image_height as u64;

        if fits {
            Ok(())
        } else {
            Err(RegionError::InvalidRegion {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                image_width,
                image_height,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_region_is_valid() {
        let region = CropRegion::full(800, 600);
        assert!(region.validate_within(800, 600).is_ok());
        assert_eq!(region.area(), 480_000);
    }

    #[test]
    fn test_edges() {
        let region = CropRegion::new(10, 20, 30, 40);
        assert_eq!(region.right(), 40);
        assert_eq!(region.bottom(), 60);
    }

    #[test]
    fn test_region_touching_edges_is_valid() {
        let region = CropRegion::new(700, 500, 100, 100);
        assert!(region.validate_within(800, 600).is_ok());
    }

    #[test]
    fn test_region_past_edge_is_invalid() {
        let region = CropRegion::new(701, 0, 100, 100);
        assert!(matches!(
            region.validate_within(800, 600),
            Err(RegionError::InvalidRegion { x: 701, .. })
        ));
    }

    #[test]
    fn test_zero_area_is_invalid() {
        let flat = CropRegion::new(0, 0, 10, 0);
        let thin = CropRegion::new(0, 0, 0, 10);
        assert!(thin.validate_within(10, 10).is_err());
        assert!(flat.validate_within(10, 10).is_err());
    }

    #[test]
    fn test_edges_do_not_overflow() {
        let region = CropRegion::new(u32::MAX, 0, u32::MAX, 1);
        assert!(region.validate_within(u32::MAX, 1).is_err());
    }

    #[test]
    fn test_aspect_ratio() {
        let region = CropRegion::new(0, 75, 800, 450);
        assert!((region.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);
    }
}
