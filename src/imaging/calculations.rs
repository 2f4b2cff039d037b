//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Orientation, WatermarkPosition};

/// Smallest edge, in pixels, that [`scaled_dimensions`] will produce.
pub const MIN_SCALED_EDGE: u32 = 100;

/// Visual dimensions after applying an EXIF orientation tag.
///
/// Codes 5–8 are the transpose/rotate-90 family and swap the axes; codes
/// 1–4 (and an absent tag) keep them.
///
/// # Examples
/// ```
/// # use imagine::imaging::actual_dimensions;
/// assert_eq!(actual_dimensions(4000, 3000, Some(6)), (3000, 4000));
/// assert_eq!(actual_dimensions(4000, 3000, Some(3)), (4000, 3000));
/// ```
pub fn actual_dimensions(width: u32, height: u32, exif_orientation: Option<u8>) -> (u32, u32) {
    match exif_orientation {
        Some(5..=8) => (height, width),
        _ => (width, height),
    }
}

/// Dimensions that fit `max_dimension` along the orientation-relevant axis.
///
/// Landscape images are bounded by width, portrait by height, square by
/// both. Returns `None` when the image already fits. The constrained axis
/// lands exactly on `max_dimension`; the other is `round(original * factor)`.
///
/// # Arguments
/// * `source` - Current dimensions (width, height)
/// * `max_dimension` - Bound for the constrained axis
/// * `orientation` - Orientation class of the image
pub fn bound_dimensions(
    source: (u32, u32),
    max_dimension: u32,
    orientation: Orientation,
) -> Option<(u32, u32)> {
    let (w, h) = source;
    match orientation {
        Orientation::Landscape if w > max_dimension => {
            let factor = max_dimension as f64 / w as f64;
            Some((max_dimension, scale_edge(h, factor)))
        }
        Orientation::Portrait if h > max_dimension => {
            let factor = max_dimension as f64 / h as f64;
            Some((scale_edge(w, factor), max_dimension))
        }
        Orientation::Square if w > max_dimension || h > max_dimension => {
            Some((max_dimension, max_dimension))
        }
        _ => None,
    }
}

/// Multiply both axes by `factor`, flooring each at [`MIN_SCALED_EDGE`].
pub fn scaled_dimensions(source: (u32, u32), factor: f64) -> (u32, u32) {
    let (w, h) = source;
    (
        scale_edge(w, factor).max(MIN_SCALED_EDGE),
        scale_edge(h, factor).max(MIN_SCALED_EDGE),
    )
}

fn scale_edge(edge: u32, factor: f64) -> u32 {
    ((edge as f64 * factor).round() as u32).max(1)
}

/// Auto font size for a watermark: 2% of the image width, at least 12px.
pub fn watermark_font_size(image_width: u32) -> u32 {
    ((image_width as f64 * 0.02).round() as u32).max(12)
}

/// Inset from the image edges for anchored watermarks: 1% of width, at least 10px.
pub fn watermark_padding(image_width: u32) -> u32 {
    ((image_width as f64 * 0.01).round() as u32).max(10)
}

/// Top-left corner of a `text`-sized box anchored at `position`.
///
/// Corner anchors are inset by `padding` from both adjacent edges; center is
/// centered on both axes. Coordinates may be negative when the text is wider
/// than the image.
pub fn watermark_origin(
    image: (u32, u32),
    text: (u32, u32),
    padding: u32,
    position: WatermarkPosition,
) -> (i64, i64) {
    let (iw, ih) = (image.0 as i64, image.1 as i64);
    let (tw, th) = (text.0 as i64, text.1 as i64);
    let pad = padding as i64;

    let left = pad;
    let right = iw - tw - pad;
    let top = pad;
    let bottom = ih - th - pad;

    match position {
        WatermarkPosition::TopLeft => (left, top),
        WatermarkPosition::TopRight => (right, top),
        WatermarkPosition::BottomLeft => (left, bottom),
        WatermarkPosition::BottomRight => (right, bottom),
        WatermarkPosition::Center => ((iw - tw) / 2, (ih - th) / 2),
    }
}
