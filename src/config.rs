//! Optimization configuration.
//!
//! Handles loading and validating an `imagine.toml` file. Every key is
//! optional; missing keys take the stock defaults and unknown keys are
//! rejected to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! target_size_kb = 100             # Byte budget per output image, in KiB
//! output_format = "webp"           # webp | jpeg | png | avif
//! min_quality = 60                 # Lowest quality the search will try
//! max_quality = 85                 # Quality of the first trial
//! quality_step = 5                 # Quality decrement between trials
//! max_dimension = 1920             # Bound on the orientation-relevant axis
//! min_dimension_scale = 0.5        # Smallest fraction of the bounded size
//! dimension_reduction_step = 0.1   # Scale decrement between resolutions
//! max_iterations = 20              # Hard cap on encode trials
//! strategy = "adaptive"            # adaptive | fast
//! output_dir = "optimized"
//!
//! watermark = false
//! watermark_text = "Imagine"
//! watermark_position = "bottom_right"
//! watermark_background = true
//! # watermark_font = "/path/to/font.ttf"
//!
//! [processing]
//! max_processes = 4                # Max parallel workers (omit for auto = CPU cores)
//! ```

use crate::imaging::{OutputFormat, WatermarkPosition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How the encoder settings are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Quality ladder, then dimension reduction, until the budget is met.
    #[default]
    Adaptive,
    /// One bounded resize and a single encode at a fixed quality.
    Fast,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adaptive => "adaptive",
            Self::Fast => "fast",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adaptive" => Ok(Self::Adaptive),
            "fast" => Ok(Self::Fast),
            other => Err(format!("unknown strategy '{other}' (expected adaptive or fast)")),
        }
    }
}

/// Settings for one optimization run, loaded from `imagine.toml`.
///
/// All fields have defaults. Call [`validate`](Self::validate) before use;
/// [`Optimizer::new`](crate::optimize::Optimizer::new) does so.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizationConfig {
    /// Byte budget per output image, in KiB (1 KiB = 1024 bytes).
    pub target_size_kb: u64,
    pub output_format: OutputFormat,
    pub min_quality: u32,
    pub max_quality: u32,
    pub quality_step: u32,
    /// Bound on the width (landscape), height (portrait) or both (square).
    pub max_dimension: u32,
    /// Smallest dimension scale the search may reach, exclusive range (0, 1).
    pub min_dimension_scale: f64,
    pub dimension_reduction_step: f64,
    /// Hard cap on encode trials per image.
    pub max_iterations: u32,
    pub strategy: Strategy,
    /// Destination directory for outputs named `<stem>.<extension>`.
    pub output_dir: PathBuf,
    pub watermark: bool,
    pub watermark_text: String,
    pub watermark_position: WatermarkPosition,
    /// Draw a translucent dark box behind the watermark text.
    pub watermark_background: bool,
    /// Font file tried before the system fonts.
    pub watermark_font: Option<PathBuf>,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            target_size_kb: 100,
            output_format: OutputFormat::Webp,
            min_quality: 60,
            max_quality: 85,
            quality_step: 5,
            max_dimension: 1920,
            min_dimension_scale: 0.5,
            dimension_reduction_step: 0.1,
            max_iterations: 20,
            strategy: Strategy::Adaptive,
            output_dir: PathBuf::from("optimized"),
            watermark: false,
            watermark_text: "Imagine".to_string(),
            watermark_position: WatermarkPosition::BottomRight,
            watermark_background: true,
            watermark_font: None,
            processing: ProcessingConfig::default(),
        }
    }
}

impl OptimizationConfig {
    /// The byte budget: `target_size_kb * 1024`.
    pub fn target_bytes(&self) -> u64 {
        self.target_size_kb.saturating_mul(1024)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Validation(msg.into()));

        if self.target_size_kb == 0 {
            return fail("target_size_kb must be greater than 0");
        }
        if !(1..=100).contains(&self.min_quality) {
            return fail("min_quality must be 1-100");
        }
        if !(1..=100).contains(&self.max_quality) {
            return fail("max_quality must be 1-100");
        }
        if self.min_quality > self.max_quality {
            return fail("min_quality must not exceed max_quality");
        }
        if self.quality_step == 0 {
            return fail("quality_step must be greater than 0");
        }
        if self.max_dimension == 0 {
            return fail("max_dimension must be greater than 0");
        }
        if !(self.min_dimension_scale > 0.0 && self.min_dimension_scale < 1.0) {
            return fail("min_dimension_scale must be between 0 and 1 (exclusive)");
        }
        if !(self.dimension_reduction_step > 0.0 && self.dimension_reduction_step.is_finite()) {
            return fail("dimension_reduction_step must be greater than 0");
        }
        if self.max_iterations == 0 {
            return fail("max_iterations must be greater than 0");
        }
        if self.watermark && self.watermark_text.trim().is_empty() {
            return fail("watermark_text must not be empty when watermark is enabled");
        }
        Ok(())
    }

    /// Destination for an input: `output_dir/<input stem>.<format extension>`.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.output_dir
            .join(format!("{stem}.{}", self.output_format.extension()))
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Parse and validate a config from TOML text.
pub fn parse_config(content: &str) -> Result<OptimizationConfig, ConfigError> {
    let config: OptimizationConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file.
///
/// Missing keys take defaults, unknown keys are rejected, and the result
/// is validated.
pub fn load_config(path: &Path) -> Result<OptimizationConfig, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}

/// Returns a fully-commented stock `imagine.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Imagine Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Size target
# ---------------------------------------------------------------------------
# Maximum output size per image, in KiB (1 KiB = 1024 bytes).
target_size_kb = 100

# Output encoder: "webp", "jpeg", "png" (lossless) or "avif".
output_format = "webp"

# ---------------------------------------------------------------------------
# Adaptive search
# ---------------------------------------------------------------------------
# Quality ladder: the first trial uses max_quality, each retry lowers it by
# quality_step until min_quality. Ignored for png.
min_quality = 60
max_quality = 85
quality_step = 5

# Longest allowed edge along the orientation axis before the search starts.
max_dimension = 1920

# Once the quality ladder is exhausted, the image is rescaled by
# dimension_reduction_step (1.0 -> 0.9 -> 0.8 ...) down to
# min_dimension_scale, restarting the ladder at each size.
min_dimension_scale = 0.5
dimension_reduction_step = 0.1

# Hard cap on encode trials per image.
max_iterations = 20

# "adaptive" runs the search above; "fast" encodes once at quality 80.
strategy = "adaptive"

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
# Files are written as <output_dir>/<input name>.<format extension>.
output_dir = "optimized"

# ---------------------------------------------------------------------------
# Watermark
# ---------------------------------------------------------------------------
watermark = false
watermark_text = "Imagine"

# "top_left", "top_right", "bottom_left", "bottom_right" or "center".
watermark_position = "bottom_right"

# Draw a translucent dark box behind the text.
watermark_background = true

# TrueType/OpenType font tried before the system fonts.
# watermark_font = "/path/to/font.ttf"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image workers. Omit for auto (= number of CPU cores).
# Values above the core count are clamped down.
# max_processes = 4
"##
}
