//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify (header only) | `image::ImageReader::into_decoder` |
//! | EXIF orientation | `kamadak-exif` |
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image` crate |
//! | Encode | [`codec`](super::codec) |

use super::backend::{BackendError, ImageBackend, ImageMetadata};
use super::calculations::actual_dimensions;
use super::codec;
use super::exif;
use super::params::{Orientation, OutputFormat, Quality};
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::path::Path;

/// Input extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("webp", ImageFormat::WebP),
    ("gif", ImageFormat::Gif),
    ("bmp", ImageFormat::Bmp),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
];

/// Returns the image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> Vec<&'static str> {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
}

/// Whether `path` has a decodable image extension (case-insensitive).
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn open_reader(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, BackendError> {
    ImageReader::open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(path.to_path_buf()),
            _ => BackendError::Io(e),
        })?
        .with_guessed_format()
        .map_err(BackendError::Io)
}

/// Short mode name (`RGB`, `LA`, ...) for a decoded color type.
fn color_mode_name(color: ColorType) -> &'static str {
    match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "L16",
        ColorType::La16 => "LA16",
        ColorType::Rgb16 => "RGB16",
        ColorType::Rgba16 => "RGBA16",
        ColorType::Rgb32F => "RGB32F",
        ColorType::Rgba32F => "RGBA32F",
        _ => "UNKNOWN",
    }
}

/// Whether any decoded pixel is less than fully opaque.
fn decoded_has_transparency(path: &Path) -> Result<bool, BackendError> {
    let image = open_reader(path)?
        .decode()
        .map_err(|e| BackendError::decode(path, e))?;
    Ok(image.color().has_alpha() && image.to_rgba8().pixels().any(|p| p[3] < u8::MAX))
}

fn format_name(format: ImageFormat) -> String {
    format!("{format:?}").to_uppercase()
}

impl ImageBackend for RustBackend {
    fn analyze(&self, path: &Path) -> Result<ImageMetadata, BackendError> {
        if !path.exists() {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }
        let size_bytes = std::fs::metadata(path)?.len();

        let reader = open_reader(path)?;
        let format = reader
            .format()
            .ok_or_else(|| BackendError::decode(path, "unrecognized image format"))?;
        let decoder = reader
            .into_decoder()
            .map_err(|e| BackendError::decode(path, e))?;
        let (nominal_w, nominal_h) = decoder.dimensions();
        let color = decoder.color_type();

        // The GIF decoder expands palettes to RGBA whether or not a
        // transparent index is declared, so its alpha has to be inspected.
        let (color_mode, has_transparency) = match format {
            ImageFormat::Gif => ("P", decoded_has_transparency(path)?),
            _ => (color_mode_name(color), color.has_alpha()),
        };

        let exif_orientation = exif::read_orientation(path);
        let (width, height) = actual_dimensions(nominal_w, nominal_h, exif_orientation);

        Ok(ImageMetadata {
            path: path.to_path_buf(),
            width,
            height,
            format: format_name(format),
            color_mode: color_mode.to_string(),
            size_bytes,
            orientation: Orientation::from_dimensions(width, height),
            has_transparency,
            exif_orientation,
        })
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        open_reader(path)?
            .decode()
            .map_err(|e| BackendError::decode(path, e))
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
        has_transparency: bool,
    ) -> Result<Vec<u8>, BackendError> {
        codec::encode(image, format, quality, has_transparency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{jpeg_with_orientation, noisy_rgb, write_jpeg, write_png_rgba};
    use image::{Rgba, RgbaImage};

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"] {
            assert!(
                exts.contains(expected),
                "expected {expected} in supported extensions"
            );
        }
    }

    #[test]
    fn input_filter_is_case_insensitive() {
        assert!(is_supported_input(Path::new("a/Photo.JPG")));
        assert!(is_supported_input(Path::new("b.webp")));
        assert!(!is_supported_input(Path::new("notes.txt")));
        assert!(!is_supported_input(Path::new("no_extension")));
    }

    #[test]
    fn analyze_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        write_jpeg(&path, 200, 150);

        let meta = RustBackend::new().analyze(&path).unwrap();
        assert_eq!((meta.width, meta.height), (200, 150));
        assert_eq!(meta.format, "JPEG");
        assert_eq!(meta.color_mode, "RGB");
        assert_eq!(meta.orientation, Orientation::Landscape);
        assert!(!meta.has_transparency);
        assert_eq!(meta.exif_orientation, None);
        assert_eq!(meta.size_bytes, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn analyze_rgba_png_is_transparent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("alpha.png");
        write_png_rgba(&path, 64, 64);

        let meta = RustBackend::new().analyze(&path).unwrap();
        assert_eq!(meta.format, "PNG");
        assert_eq!(meta.color_mode, "RGBA");
        assert_eq!(meta.orientation, Orientation::Square);
        assert!(meta.has_transparency);
    }

    #[test]
    fn analyze_opaque_gif_is_not_transparent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("opaque.gif");
        noisy_rgb(32, 32).save(&path).unwrap();

        let meta = RustBackend::new().analyze(&path).unwrap();
        assert_eq!(meta.format, "GIF");
        assert_eq!(meta.color_mode, "P");
        assert!(!meta.has_transparency);
    }

    #[test]
    fn analyze_gif_with_transparent_pixels_is_transparent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cutout.gif");
        let img = RgbaImage::from_fn(32, 32, |x, _| {
            if x < 16 {
                Rgba([200, 40, 40, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        DynamicImage::ImageRgba8(img).save(&path).unwrap();

        let meta = RustBackend::new().analyze(&path).unwrap();
        assert_eq!(meta.color_mode, "P");
        assert!(meta.has_transparency);
    }

    #[test]
    fn analyze_swaps_axes_for_rotated_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        std::fs::write(&path, jpeg_with_orientation(300, 200, 6)).unwrap();

        let meta = RustBackend::new().analyze(&path).unwrap();
        assert_eq!(meta.exif_orientation, Some(6));
        assert_eq!((meta.width, meta.height), (200, 300));
        assert_eq!(meta.orientation, Orientation::Portrait);
    }

    #[test]
    fn analyze_keeps_axes_for_upside_down_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("flipped.jpg");
        std::fs::write(&path, jpeg_with_orientation(300, 200, 3)).unwrap();

        let meta = RustBackend::new().analyze(&path).unwrap();
        assert_eq!((meta.width, meta.height), (300, 200));
    }

    #[test]
    fn analyze_nonexistent_file_is_not_found() {
        let result = RustBackend::new().analyze(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }

    #[test]
    fn analyze_garbage_is_decode_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not pixels").unwrap();

        let result = RustBackend::new().analyze(&path);
        assert!(matches!(result, Err(BackendError::Decode { .. })));
    }

    #[test]
    fn decode_returns_stored_pixels() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("rotated.jpg");
        std::fs::write(&path, jpeg_with_orientation(300, 200, 6)).unwrap();

        // decode does not rotate; that is the preparer's job
        let img = RustBackend::new().decode(&path).unwrap();
        assert_eq!((img.width(), img.height()), (300, 200));
    }

    #[test]
    fn decode_nonexistent_file_is_not_found() {
        let result = RustBackend::new().decode(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }
}
