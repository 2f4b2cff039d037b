//! Result types shared by the optimizer, the CLI output and JSON reports.

use crate::config::ConfigError;
use crate::imaging::{BackendError, ErrorKind, ImageMetadata, OutputFormat};
use crate::search::StopReason;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Why an image could not be optimized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BackendError> for ResultError {
    fn from(err: &BackendError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<&ConfigError> for ResultError {
    fn from(err: &ConfigError) -> Self {
        Self {
            kind: ErrorKind::InvalidConfig,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ResultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of optimizing one image. Created once per input.
///
/// A best-effort result (budget exhausted) is still `success == true`;
/// use [`met_target`](Self::met_target) to tell it apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub input_path: PathBuf,
    /// Where the bytes were written. `None` on failure.
    pub output_path: Option<PathBuf>,
    pub success: bool,
    /// Snapshot of the analyzed input, when analysis got that far.
    pub metadata: Option<ImageMetadata>,
    pub original_width: u32,
    pub original_height: u32,
    pub original_format: String,
    pub original_size: u64,
    pub optimized_width: u32,
    pub optimized_height: u32,
    pub output_format: OutputFormat,
    pub optimized_size: u64,
    /// Quality reported by the search (see [`EncodedCandidate`](crate::search::EncodedCandidate)).
    pub quality: u32,
    /// Encode trials consumed.
    pub iterations: u32,
    pub stop: Option<StopReason>,
    pub error: Option<ResultError>,
}

impl OptimizationResult {
    /// A failed result. Original fields come from `metadata` when present.
    pub fn failure(
        input: &Path,
        metadata: Option<ImageMetadata>,
        output_format: OutputFormat,
        error: ResultError,
    ) -> Self {
        let (width, height, format, size) = metadata
            .as_ref()
            .map(|m| (m.width, m.height, m.format.clone(), m.size_bytes))
            .unwrap_or_default();
        Self {
            input_path: input.to_path_buf(),
            output_path: None,
            success: false,
            metadata,
            original_width: width,
            original_height: height,
            original_format: format,
            original_size: size,
            optimized_width: 0,
            optimized_height: 0,
            output_format,
            optimized_size: 0,
            quality: 0,
            iterations: 0,
            stop: None,
            error: Some(error),
        }
    }

    pub fn original_size_kb(&self) -> f64 {
        self.original_size as f64 / 1024.0
    }

    pub fn optimized_size_kb(&self) -> f64 {
        self.optimized_size as f64 / 1024.0
    }

    /// Percentage of the original size saved. 0 when the original is empty.
    pub fn size_reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.optimized_size as f64 / self.original_size as f64) * 100.0
    }

    /// Linear scale of the output relative to the input (square root of the
    /// pixel-count ratio). 1.0 when the original has no pixels.
    pub fn dimension_scale(&self) -> f64 {
        let original = self.original_width as f64 * self.original_height as f64;
        if original == 0.0 {
            return 1.0;
        }
        let optimized = self.optimized_width as f64 * self.optimized_height as f64;
        (optimized / original).sqrt()
    }

    pub fn met_target(&self, target_bytes: u64) -> bool {
        self.success && self.optimized_size <= target_bytes
    }

    /// Short file name of the input for display.
    pub fn display_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }
}

/// Aggregate numbers over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successful results still above the byte budget.
    pub over_target: usize,
    /// Original bytes of the successful inputs.
    pub original_bytes: u64,
    pub optimized_bytes: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[OptimizationResult], target_bytes: u64) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            if r.success {
                acc.succeeded += 1;
                acc.original_bytes += r.original_size;
                acc.optimized_bytes += r.optimized_size;
                if !r.met_target(target_bytes) {
                    acc.over_target += 1;
                }
            } else {
                acc.failed += 1;
            }
            acc
        })
    }

    pub fn saved_bytes(&self) -> u64 {
        self.original_bytes.saturating_sub(self.optimized_bytes)
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        self.saved_bytes() as f64 / self.original_bytes as f64 * 100.0
    }
}
