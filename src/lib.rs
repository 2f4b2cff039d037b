//! # Imagine
//!
//! Shrinks images to a byte budget. Given a target size in KB, each image is
//! oriented, bounded to a maximum dimension, optionally watermarked, and then
//! encoded repeatedly until the output fits.
//!
//! # Architecture: Analyze, Prepare, Search
//!
//! ```text
//! 1. Analyze   file     →  ImageMetadata     (header + EXIF, no pixel decode)
//! 2. Prepare   pixels   →  PreparedImage     (EXIF rotation, color normalization)
//! 3. Search    prepared →  EncodedCandidate  (quality ladder, then rescaling)
//! ```
//!
//! The search is a pure decision function ([`search::next_step`]) driven by a
//! small loop that owns the encoder calls. Everything that touches pixels goes
//! through the [`imaging::ImageBackend`] trait, so the search and the
//! orchestrator are tested against a mock that returns scripted sizes.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Pure-Rust pixel work: analysis, orientation, resize, codecs, watermark |
//! | [`search`] | The adaptive quality/dimension search and the single-pass fast strategy |
//! | [`optimize`] | Per-image pipeline, parallel batches, progress and cancellation |
//! | [`config`] | `imagine.toml` loading and validation |
//! | [`types`] | Results and batch summaries, serializable to JSON |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Quality First, Then Dimensions
//!
//! Lowering quality costs less visually than losing pixels, so the search
//! walks quality down from `max_quality` to `min_quality` first. Only when
//! the ladder is exhausted does it shrink the image, restarting the ladder
//! at each new scale. Scales are relative to the bounded size, but every
//! rescale resamples the oriented source in one pass, so resampling error
//! never stacks.
//!
//! ## Best Effort Is Success
//!
//! When no combination fits the budget before the dimension floor or the
//! iteration cap, the last candidate is still written and reported as a
//! success. [`types::OptimizationResult::met_target`] tells the two apart.
//!
//! ## Pure-Rust Codecs
//!
//! Decoding, Lanczos3 resampling, JPEG and AVIF use the `image` crate; lossy
//! WebP uses `webp`; PNG output is re-packed by `oxipng`. No system image
//! libraries are needed at runtime.

pub mod config;
pub mod imaging;
pub mod optimize;
pub mod output;
pub mod search;
pub mod types;

pub use config::OptimizationConfig;
pub use optimize::{Optimizer, optimize_batch, optimize_one};
pub use types::OptimizationResult;

#[cfg(test)]
pub(crate) mod test_helpers;
