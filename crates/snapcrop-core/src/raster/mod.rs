//! Rasterizer: source pixels + crop region -> encoded JPEG.
//!
//! The region is copied 1:1 into a destination surface of exactly
//! `region.width x region.height`. Zoom only decides which region is
//! selected; nothing is resampled. Alpha is composited over the configured
//! background during the copy, because JPEG has no alpha channel.
//!
//! Regions are not clamped here. A region that does not fit the source is a
//! caller bug and fails with [`RasterError::InvalidRegion`].

mod encode;

use bytes::Bytes;
use thiserror::Error;

use crate::config::{CropperConfig, Rgb};
use crate::intake::SourceImage;
use crate::region::{CropRegion, RegionError};

/// Error types for rasterization.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RasterError {
    /// The region does not lie inside the source image.
    #[error(transparent)]
    InvalidRegion(#[from] RegionError),

    /// The destination surface could not be created or encoded.
    #[error("Encoding failed: {0}")]
    EncodeFailure(String),
}

/// Encoder settings for one raster operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    /// JPEG quality (1-100).
    pub quality: u8,
    /// Color that transparent pixels are flattened onto.
    pub background: Rgb,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self::from_config(&CropperConfig::default())
    }
}

impl RasterOptions {
    pub fn from_config(config: &CropperConfig) -> Self {
        Self {
            quality: config.jpeg_quality,
            background: config.background,
        }
    }
}

/// A complete JPEG byte stream and its pixel dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

/// Crop `region` out of `source` and encode it as JPEG.
///
/// # Errors
///
/// - `RasterError::InvalidRegion` if the region is empty or crosses an edge
/// - `RasterError::EncodeFailure` if the surface cannot be allocated or the
///   encoder fails
pub fn rasterize(
    source: &SourceImage,
    region: CropRegion,
    options: RasterOptions,
) -> Result<EncodedImage, RasterError> {
    let rgb = copy_region(source, region, options.background)?;
    let jpeg = encode::encode_jpeg(&rgb, region.width, region.height, options.quality)?;

    log::debug!(
        "rasterized {}x{} at ({}, {}) into {} bytes",
        region.width,
        region.height,
        region.x,
        region.y,
        jpeg.len()
    );

    Ok(EncodedImage {
        bytes: Bytes::from(jpeg),
        width: region.width,
        height: region.height,
    })
}

/// Copy `region` into a packed RGB surface, flattening alpha onto
/// `background`.
pub fn copy_region(
    source: &SourceImage,
    region: CropRegion,
    background: Rgb,
) -> Result<Vec<u8>, RasterError> {
    region.validate_within(source.width, source.height)?;

    let src_stride = source.width as usize * 4;
    if source.pixels.len() != src_stride * source.height as usize {
        return Err(RasterError::EncodeFailure(
            "source pixel buffer does not match its dimensions".to_string(),
        ));
    }

    let len = (region.width as usize)
        .checked_mul(region.height as usize)
        .and_then(|px| px.checked_mul(3))
        .ok_or_else(|| RasterError::EncodeFailure("surface size overflows".to_string()))?;

    let mut surface = Vec::new();
    surface
        .try_reserve_exact(len)
        .map_err(|e| RasterError::EncodeFailure(format!("cannot allocate surface: {}", e)))?;

    let Rgb(bg) = background;
    let row_start = region.x as usize * 4;
    let row_end = row_start + region.width as usize * 4;

    for y in region.y..region.y + region.height {
        let offset = y as usize * src_stride;
        let row = &source.pixels[offset + row_start..offset + row_end];
        for px in row.chunks_exact(4) {
            let alpha = px[3];
            surface.push(blend(px[0], bg[0], alpha));
            surface.push(blend(px[1], bg[1], alpha));
            surface.push(blend(px[2], bg[2], alpha));
        }
    }

    Ok(surface)
}

/// Source-over compositing of one channel onto an opaque background.
#[inline]
fn blend(src: u8, bg: u8, alpha: u8) -> u8 {
    match alpha {
        255 => src,
        0 => bg,
        a => {
            let a = a as u32;
            ((src as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8
        }
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Image dimensions plus a region that lies inside them.
    fn image_and_region() -> impl Strategy<Value = (u32, u32, CropRegion)> {
        (1u32..=64, 1u32..=64).prop_flat_map(|(w, h)| {
            (0..w, 0..h).prop_flat_map(move |(x, y)| {
                (1..=w - x, 1..=h - y)
                    .prop_map(move |(rw, rh)| (w, h, CropRegion::new(x, y, rw, rh)))
            })
        })
    }

    /// Opaque image where each pixel encodes its position.
    fn create_test_image(width: u32, height: u32) -> SourceImage {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        SourceImage::new(width, height, pixels)
    }

    proptest! {
        /// Property: The surface holds exactly one RGB pixel per region pixel.
        #[test]
        fn prop_surface_matches_region((w, h, region) in image_and_region()) {
            let source = create_test_image(w, h);
            let surface = copy_region(&source, region, Rgb([0, 0, 0])).unwrap();
            prop_assert_eq!(surface.len() as u64, region.area() * 3);
        }

        /// Property: Corners of the surface are the region's corners in the source.
        #[test]
        fn prop_copy_preserves_corners((w, h, region) in image_and_region()) {
            let source = create_test_image(w, h);
            let surface = copy_region(&source, region, Rgb([0, 0, 0])).unwrap();

            let first = &surface[0..3];
            prop_assert_eq!(first, &[region.x as u8, region.y as u8, 0][..]);

            let last = &surface[surface.len() - 3..];
            let right = region.x + region.width - 1;
            let bottom = region.y + region.height - 1;
            prop_assert_eq!(last, &[right as u8, bottom as u8, 0][..]);
        }

        /// Property: Regions past the right or bottom edge are always rejected.
        #[test]
        fn prop_overflowing_region_rejected(
            (w, h, region) in image_and_region(),
            grow_x in 1u32..=8,
            grow_y in 0u32..=8,
        ) {
            let source = create_test_image(w, h);
            let overflowing = CropRegion::new(
                region.x,
                region.y,
                w - region.x + grow_x,
                region.height + grow_y,
            );
            let result = copy_region(&source, overflowing, Rgb([0, 0, 0]));
            prop_assert!(matches!(result, Err(RasterError::InvalidRegion(_))));
        }
    }
}
