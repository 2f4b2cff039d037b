//! Pixel-buffer operations: preparation and resizing.
//!
//! These functions combine the [`calculations`](super::calculations) with
//! the `image` crate's resampler. None of them touch the filesystem.
//!
//! | Operation | What it does |
//! |---|---|
//! | [`prepare`] | Apply EXIF rotation, normalize color mode |
//! | [`normalize_color`] | RGB/L for opaque images, RGBA/LA for transparent ones |
//! | [`bound_resize`] | Shrink to fit `max_dimension` along the orientation axis |
//! | [`scale`] | Resample the source to a scaled reference size, 100px floor per axis |

use super::backend::ImageMetadata;
use super::calculations::{bound_dimensions, scaled_dimensions};
use super::params::Orientation;
use image::imageops::FilterType;
use image::metadata::Orientation as ExifOrientation;
use image::{ColorType, DynamicImage};

/// Downscaling kernel used for every resize.
const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

/// A decoded image whose pixels match its visual orientation and whose
/// color mode is the minimal one needed for encoding.
///
/// Only [`prepare`] constructs this type, so an already-prepared buffer can
/// never be rotated a second time.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    image: DynamicImage,
}

impl PreparedImage {
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut DynamicImage {
        &mut self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Normalize a freshly decoded image for processing.
///
/// Applies the EXIF rotation recorded in `metadata`, then converts the color
/// mode with [`normalize_color`].
pub fn prepare(decoded: DynamicImage, metadata: &ImageMetadata) -> PreparedImage {
    let mut image = decoded;
    if let Some(orientation) = metadata
        .exif_orientation
        .and_then(ExifOrientation::from_exif)
    {
        image.apply_orientation(orientation);
    }
    PreparedImage {
        image: normalize_color(image, metadata.has_transparency),
    }
}

/// Convert to the minimal color mode for the transparency class.
///
/// Transparent images end up as `RGBA8` or `LA8`, opaque ones as `RGB8` or
/// `L8`. Buffers already in a target mode are returned untouched, so the
/// function is idempotent.
pub fn normalize_color(image: DynamicImage, has_transparency: bool) -> DynamicImage {
    match (has_transparency, image.color()) {
        (true, ColorType::Rgba8 | ColorType::La8) => image,
        (true, _) => DynamicImage::ImageRgba8(image.to_rgba8()),
        (false, ColorType::Rgb8 | ColorType::L8) => image,
        (false, _) => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Shrink `image` to fit `max_dimension` (see [`bound_dimensions`]).
///
/// Returns a clone when no resize is needed.
pub fn bound_resize(
    image: &DynamicImage,
    max_dimension: u32,
    orientation: Orientation,
) -> DynamicImage {
    match bound_dimensions(
        (image.width(), image.height()),
        max_dimension,
        orientation,
    ) {
        Some((w, h)) => image.resize_exact(w, h, RESAMPLE_FILTER),
        None => image.clone(),
    }
}

/// Resample `source` to `reference` scaled by `factor`, never below 100px
/// per axis.
///
/// `reference` is usually the bound-resized size. The pixels always come
/// from `source` in a single resample, so repeated rescales of the same
/// image do not stack resampling loss.
pub fn scale(source: &DynamicImage, reference: (u32, u32), factor: f64) -> DynamicImage {
    let (w, h) = scaled_dimensions(reference, factor);
    if (w, h) == (source.width(), source.height()) {
        return source.clone();
    }
    source.resize_exact(w, h, RESAMPLE_FILTER)
}
