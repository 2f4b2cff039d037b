//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three I/O-bound operations the
//! optimizer needs: analyze (header + EXIF only), decode (full pixel data),
//! and encode (pixels → compressed bytes). Orientation, color normalization,
//! resizing and watermarking are pure functions over pixel buffers
//! in [`operations`](super::operations) and [`watermark`](super::watermark).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! `MockBackend` below, which records every call and returns scripted
//! encode sizes so the search can be driven deterministically.

use super::params::{Orientation, OutputFormat, Quality};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Image not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("{format} encode failed: {reason}")]
    Encode {
        format: &'static str,
        reason: String,
    },
    #[error("Output {} is already claimed by {}", output.display(), claimed_by.display())]
    OutputConflict { output: PathBuf, claimed_by: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn decode(path: &Path, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn encode(format: OutputFormat, reason: impl ToString) -> Self {
        Self::Encode {
            format: format.as_str(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Decode { .. } => ErrorKind::DecodeError,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Encode { .. } => ErrorKind::EncodeError,
            Self::OutputConflict { .. } => ErrorKind::OutputConflict,
            Self::Io(_) => ErrorKind::IoError,
        }
    }
}

/// Failure classes surfaced in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    DecodeError,
    UnsupportedFormat,
    EncodeError,
    IoError,
    InvalidConfig,
    /// Another input in the same batch maps to the same output file.
    OutputConflict,
}

/// Intrinsic properties of a source image, computed without transforming it.
///
/// `width`/`height` are the *visual* dimensions: when the EXIF orientation
/// is one of the 90°-family codes (5–8) the decoded axes are swapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Container format as detected from the bytes, e.g. `JPEG`, `PNG`.
    pub format: String,
    /// Color mode of the decoded pixels, e.g. `RGB`, `RGBA`, `L`, `LA`.
    pub color_mode: String,
    pub size_bytes: u64,
    pub orientation: Orientation,
    pub has_transparency: bool,
    /// EXIF orientation tag (1–8), if present and valid.
    pub exif_orientation: Option<u8>,
}

impl ImageMetadata {
    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Read dimensions, color mode, format, and EXIF orientation.
    fn analyze(&self, path: &Path) -> Result<ImageMetadata, BackendError>;

    /// Decode the full image. Pixels are returned as stored, before any
    /// EXIF rotation is applied.
    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError>;

    /// Encode a prepared buffer.
    fn encode(
        &self,
        image: &DynamicImage,
        format: OutputFormat,
        quality: Quality,
        has_transparency: bool,
    ) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Mock backend that records operations and returns scripted encode sizes.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    pub struct MockBackend {
        pub metadata: ImageMetadata,
        /// Byte lengths handed out by successive `encode` calls. The last
        /// entry repeats once the queue is drained.
        pub encoded_sizes: Mutex<VecDeque<usize>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Analyze(String),
        Decode(String),
        Encode {
            width: u32,
            height: u32,
            quality: u32,
            format: OutputFormat,
        },
    }

    /// Metadata for an opaque RGB JPEG of the given visual size.
    pub fn metadata(width: u32, height: u32) -> ImageMetadata {
        ImageMetadata {
            path: PathBuf::from("/test/image.jpg"),
            width,
            height,
            format: "JPEG".to_string(),
            color_mode: "RGB".to_string(),
            size_bytes: 2_000_000,
            orientation: Orientation::from_dimensions(width, height),
            has_transparency: false,
            exif_orientation: None,
        }
    }

    impl MockBackend {
        pub fn new(metadata: ImageMetadata) -> Self {
            Self::with_encoded_sizes(metadata, vec![1024])
        }

        pub fn with_encoded_sizes(metadata: ImageMetadata, sizes: Vec<usize>) -> Self {
            Self {
                metadata,
                encoded_sizes: Mutex::new(sizes.into()),
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        /// Only the encode calls, as `(width, height, quality)` triples.
        pub fn encodes(&self) -> Vec<(u32, u32, u32)> {
            self.get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Encode {
                        width,
                        height,
                        quality,
                        ..
                    } => Some((width, height, quality)),
                    _ => None,
                })
                .collect()
        }

        fn next_size(&self) -> usize {
            let mut sizes = self.encoded_sizes.lock().unwrap();
            if sizes.len() > 1 {
                sizes.pop_front().unwrap()
            } else {
                sizes.front().copied().unwrap_or(0)
            }
        }
    }

    impl ImageBackend for MockBackend {
        fn analyze(&self, path: &Path) -> Result<ImageMetadata, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Analyze(path.to_string_lossy().to_string()));
            Ok(ImageMetadata {
                path: path.to_path_buf(),
                ..self.metadata.clone()
            })
        }

        fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(path.to_string_lossy().to_string()));

            // Stored pixels are pre-rotation, so undo the axis swap.
            let (w, h) = match self.metadata.exif_orientation {
                Some(5..=8) => (self.metadata.height, self.metadata.width),
                _ => (self.metadata.width, self.metadata.height),
            };
            Ok(if self.metadata.has_transparency {
                DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 128])))
            } else {
                DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])))
            })
        }

        fn encode(
            &self,
            image: &DynamicImage,
            format: OutputFormat,
            quality: Quality,
            _has_transparency: bool,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                width: image.width(),
                height: image.height(),
                quality: quality.value(),
                format,
            });
            Ok(vec![0u8; self.next_size()])
        }
    }

    #[test]
    fn mock_records_analyze() {
        let backend = MockBackend::new(metadata(800, 600));

        let meta = backend.analyze(Path::new("/test/other.jpg")).unwrap();
        assert_eq!(meta.width, 800);
        assert_eq!(meta.path, PathBuf::from("/test/other.jpg"));

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Analyze(p) if p == "/test/other.jpg"));
    }

    #[test]
    fn mock_decode_returns_stored_orientation() {
        let mut meta = metadata(600, 800);
        meta.exif_orientation = Some(6);
        let backend = MockBackend::new(meta);

        let img = backend.decode(Path::new("/x.jpg")).unwrap();
        assert_eq!((img.width(), img.height()), (800, 600));
    }

    #[test]
    fn mock_hands_out_scripted_sizes_then_repeats_last() {
        let backend = MockBackend::with_encoded_sizes(metadata(10, 10), vec![300, 200, 100]);
        let img = backend.decode(Path::new("/x.jpg")).unwrap();

        let lens: Vec<usize> = (0..5)
            .map(|_| {
                backend
                    .encode(&img, OutputFormat::Webp, Quality::new(80), false)
                    .unwrap()
                    .len()
            })
            .collect();
        assert_eq!(lens, vec![300, 200, 100, 100, 100]);
        assert_eq!(backend.encodes()[0], (10, 10, 80));
    }

    #[test]
    fn error_kinds_map_taxonomy() {
        assert_eq!(
            BackendError::NotFound("/a".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BackendError::decode(Path::new("/a"), "bad").kind(),
            ErrorKind::DecodeError
        );
        assert_eq!(
            BackendError::UnsupportedFormat("tga".into()).kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(
            BackendError::encode(OutputFormat::Png, "boom").kind(),
            ErrorKind::EncodeError
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(BackendError::from(io).kind(), ErrorKind::IoError);
    }

    #[test]
    fn metadata_helpers() {
        let mut meta = metadata(1920, 1080);
        meta.size_bytes = 2048;
        assert_eq!(meta.size_kb(), 2.0);
        assert!((meta.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);

        meta.height = 0;
        assert_eq!(meta.aspect_ratio(), 1.0);
    }
}
