//! Output encoders, one per [`OutputFormat`].
//!
//! | Format | Crate | Quality | Alpha | Effort knob |
//! |---|---|---|---|---|
//! | WebP | `webp` (libwebp, lossy) | 1–100 | kept | `method = 6` |
//! | JPEG | `image::codecs::jpeg` | 1–100 | flattened to RGB/L | - |
//! | PNG | `image::codecs::png` + `oxipng` | ignored | kept | `CompressionType::Best`, oxipng preset 6 |
//! | AVIF | `image::codecs::avif` (rav1e) | 1–100 | kept | speed 1 |
//!
//! Adding a format means adding one [`Codec`] implementation and one arm in
//! [`OutputFormat::codec`]; nothing else dispatches on the format.

use super::backend::BackendError;
use super::params::{OutputFormat, Quality};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{ColorType, DynamicImage};

/// rav1e speed preset; 1 is the slowest and most thorough.
const AVIF_SPEED: u8 = 1;
/// libwebp compression method; 6 is the slowest and most thorough.
const WEBP_METHOD: i32 = 6;
/// oxipng optimization preset; 6 is the most thorough non-zopfli level.
const OXIPNG_PRESET: u8 = 6;

/// A single output encoding.
pub trait Codec: Sync {
    fn format(&self) -> OutputFormat;

    /// Encode a prepared buffer.
    ///
    /// `has_transparency` tells alpha-capable codecs whether the alpha
    /// channel should be carried through.
    fn encode(
        &self,
        image: &DynamicImage,
        quality: Quality,
        has_transparency: bool,
    ) -> Result<Vec<u8>, BackendError>;

    /// Whether `quality` changes the output at all.
    fn uses_quality(&self) -> bool {
        true
    }

    fn supports_alpha(&self) -> bool;

    /// Whether an alpha channel reaches the encoder for this input.
    fn keeps_alpha(&self, has_transparency: bool) -> bool {
        has_transparency && self.supports_alpha()
    }
}

impl OutputFormat {
    pub fn codec(self) -> &'static dyn Codec {
        match self {
            Self::Webp => &WebpCodec,
            Self::Jpeg => &JpegCodec,
            Self::Png => &PngCodec,
            Self::Avif => &AvifCodec,
        }
    }
}

/// Encode `image` as `format`.
pub fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
    has_transparency: bool,
) -> Result<Vec<u8>, BackendError> {
    let codec = format.codec();
    codec.encode(image, quality, codec.keeps_alpha(has_transparency))
}

/// Encode `image` as the format named `format` (e.g. from user input).
///
/// Unknown names fail with [`BackendError::UnsupportedFormat`].
pub fn encode_named(
    image: &DynamicImage,
    format: &str,
    quality: Quality,
    has_transparency: bool,
) -> Result<Vec<u8>, BackendError> {
    encode(image, format.parse()?, quality, has_transparency)
}

/// Lossy WebP through libwebp. The `image` crate only writes lossless WebP.
pub struct WebpCodec;

impl Codec for WebpCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Webp
    }

    fn encode(
        &self,
        image: &DynamicImage,
        quality: Quality,
        has_transparency: bool,
    ) -> Result<Vec<u8>, BackendError> {
        let (w, h) = (image.width(), image.height());
        let mut config = webp::WebPConfig::new()
            .map_err(|_| BackendError::encode(self.format(), "failed to create WebPConfig"))?;
        config.lossless = 0;
        config.quality = quality.value() as f32;
        config.method = WEBP_METHOD;

        let memory = if has_transparency && image.color().has_alpha() {
            let rgba = image.to_rgba8();
            webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode_advanced(&config)
        } else {
            let rgb = image.to_rgb8();
            webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode_advanced(&config)
        }
        .map_err(|e| BackendError::encode(self.format(), format!("{e:?}")))?;

        Ok(memory.to_vec())
    }

    fn supports_alpha(&self) -> bool {
        true
    }
}

/// Baseline JPEG. Alpha is flattened away by mode conversion.
pub struct JpegCodec;

impl Codec for JpegCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Jpeg
    }

    fn encode(
        &self,
        image: &DynamicImage,
        quality: Quality,
        _has_transparency: bool,
    ) -> Result<Vec<u8>, BackendError> {
        let flattened = match image.color() {
            ColorType::Rgb8 | ColorType::L8 => None,
            ColorType::La8 | ColorType::L16 | ColorType::La16 => {
                Some(DynamicImage::ImageLuma8(image.to_luma8()))
            }
            _ => Some(DynamicImage::ImageRgb8(image.to_rgb8())),
        };
        let source = flattened.as_ref().unwrap_or(image);

        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, quality.value() as u8);
        source
            .write_with_encoder(encoder)
            .map_err(|e| BackendError::encode(self.format(), e))?;
        Ok(out)
    }

    fn supports_alpha(&self) -> bool {
        false
    }
}

/// Lossless PNG, re-optimized by oxipng. Output depends only on the pixels.
pub struct PngCodec;

impl Codec for PngCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }

    fn encode(
        &self,
        image: &DynamicImage,
        _quality: Quality,
        _has_transparency: bool,
    ) -> Result<Vec<u8>, BackendError> {
        let mut raw = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut raw, CompressionType::Best, PngFilter::Adaptive);
        image
            .write_with_encoder(encoder)
            .map_err(|e| BackendError::encode(self.format(), e))?;

        let mut options = oxipng::Options::from_preset(OXIPNG_PRESET);
        options.strip = oxipng::StripChunks::Safe;
        oxipng::optimize_from_memory(&raw, &options)
            .map_err(|e| BackendError::encode(self.format(), e))
    }

    fn uses_quality(&self) -> bool {
        false
    }

    fn supports_alpha(&self) -> bool {
        true
    }
}

/// AVIF via rav1e at the slowest speed preset.
pub struct AvifCodec;

impl Codec for AvifCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Avif
    }

    fn encode(
        &self,
        image: &DynamicImage,
        quality: Quality,
        has_transparency: bool,
    ) -> Result<Vec<u8>, BackendError> {
        let converted = if has_transparency {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        let mut out = Vec::new();
        let encoder =
            AvifEncoder::new_with_speed_quality(&mut out, AVIF_SPEED, quality.value() as u8);
        converted
            .write_with_encoder(encoder)
            .map_err(|e| BackendError::encode(self.format(), e))?;
        Ok(out)
    }

    fn supports_alpha(&self) -> bool {
        true
    }
}
