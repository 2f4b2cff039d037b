//! Image processing: pure Rust, no system libraries beyond libwebp.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_decoder` (header only) |
//! | **EXIF orientation** | `kamadak-exif` |
//! | **Prepare** | `apply_orientation` + color-mode normalization |
//! | **Resize** | `resize_exact` with Lanczos3 |
//! | **Encode** | `webp`, `image` (JPEG, AVIF), `image` + `oxipng` (PNG) |
//! | **Watermark** | `ab_glyph` rasterization + `imageops::overlay` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Value types describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Codec**: one [`Codec`] per [`OutputFormat`]
//! - **Operations**: Pixel-buffer functions combining calculations + the resampler
//! - **Watermark**: text overlay with a translucent backing box

pub mod backend;
mod calculations;
pub mod codec;
pub(crate) mod exif;
pub mod operations;
mod params;
pub mod rust_backend;
pub mod watermark;

pub use backend::{BackendError, ErrorKind, ImageBackend, ImageMetadata};
pub use calculations::{
    MIN_SCALED_EDGE, actual_dimensions, bound_dimensions, scaled_dimensions, watermark_font_size,
    watermark_padding,
};
pub use codec::Codec;
pub use operations::PreparedImage;
pub use params::{Orientation, OutputFormat, Quality, WatermarkPosition};
pub use rust_backend::{RustBackend, is_supported_input, supported_input_extensions};
pub use watermark::{Face, FontSource, WatermarkStyle};
