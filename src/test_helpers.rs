//! Shared test utilities for the imagine test suite.
//!
//! Provides deterministic synthetic images and small on-disk fixtures so
//! tests never depend on files checked into the repository.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = tmp.path().join("photo.jpg");
//! write_jpeg(&path, 640, 480);
//!
//! let rotated = jpeg_with_orientation(300, 200, 6);
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

// =========================================================================
// Synthetic pixels
// =========================================================================

/// Deterministic pseudo-random byte stream (64-bit LCG, high byte).
struct Lcg(u64);

impl Lcg {
    fn next_byte(&mut self) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 56) as u8
    }
}

/// Opaque RGB noise. Compresses poorly, so encoded sizes track dimensions
/// and quality closely.
pub fn noisy_rgb(width: u32, height: u32) -> DynamicImage {
    let mut rng = Lcg(0x5eed);
    let img = RgbImage::from_fn(width, height, |_, _| {
        Rgb([rng.next_byte(), rng.next_byte(), rng.next_byte()])
    });
    DynamicImage::ImageRgb8(img)
}

/// RGBA noise with a varying alpha channel.
pub fn noisy_rgba(width: u32, height: u32) -> DynamicImage {
    let mut rng = Lcg(0xa1fa);
    let img = RgbaImage::from_fn(width, height, |_, _| {
        Rgba([
            rng.next_byte(),
            rng.next_byte(),
            rng.next_byte(),
            rng.next_byte(),
        ])
    });
    DynamicImage::ImageRgba8(img)
}

/// Smooth horizontal/vertical gradient. Compresses very well.
pub fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

// =========================================================================
// Encoded fixtures
// =========================================================================

/// A plain gradient JPEG at quality 90.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    gradient_rgb(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 90))
        .unwrap();
    out
}

/// A JPEG carrying an EXIF APP1 block whose only tag is `Orientation = code`.
///
/// The pixels are stored `width x height`; the tag describes how a viewer
/// should rotate them.
pub fn jpeg_with_orientation(width: u32, height: u32, code: u16) -> Vec<u8> {
    let plain = jpeg_bytes(width, height);

    // Big-endian TIFF header, one IFD with one SHORT entry, no next IFD.
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2a");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&code.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut payload = b"Exif\x00\x00".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(plain.len() + payload.len() + 4);
    out.extend_from_slice(&plain[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&plain[2..]);
    out
}

/// Write a gradient JPEG to `path`.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, jpeg_bytes(width, height)).unwrap();
}

/// Write an RGBA noise PNG to `path`.
pub fn write_png_rgba(path: &Path, width: u32, height: u32) {
    noisy_rgba(width, height).save(path).unwrap();
}
