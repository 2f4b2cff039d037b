//! Adaptive size-targeting search.
//!
//! Given a prepared image and a byte budget, find encoder settings whose
//! output fits. Quality is always lowered before resolution:
//!
//! ```text
//! bound_resize(source, max_dimension) ─► base
//!
//! scale 1.0:  q85 ─► q80 ─► ... ─► q60   (base)
//! scale 0.9:  q85 ─► q80 ─► ... ─► q60   (source resampled to 0.9 × base size)
//! scale 0.8:  ...
//! scale < min_dimension_scale ─► stop, keep the last bytes
//! ```
//!
//! `base` only fixes the reference size. Every rescale resamples the
//! prepared source once, never `base` or a previous rescale, so resampling
//! loss does not compound across steps. The lossless format
//! ignores quality, so for it the search goes straight to rescaling.
//!
//! The decision after each trial is the pure function [`next_step`] over an
//! immutable [`SearchState`]; [`run`] only performs the encodes and threads
//! the state through. Termination is guaranteed by `max_iterations`.

use crate::config::{OptimizationConfig, Strategy};
use crate::imaging::operations::{PreparedImage, bound_resize, scale};
use crate::imaging::{BackendError, ImageBackend, Orientation, Quality};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Quality used by [`Strategy::Fast`].
pub const FAST_QUALITY: u32 = 80;

/// Slack for comparing accumulated float scales against the floor, so that
/// `1.0 - 5 * 0.1` still counts as `0.5`.
const SCALE_EPSILON: f64 = 1e-9;

/// Search position between trials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchState {
    pub quality: u32,
    pub dimension_scale: f64,
    /// Trials run so far.
    pub trial: u32,
}

impl SearchState {
    pub fn initial(config: &OptimizationConfig) -> Self {
        Self {
            quality: config.max_quality,
            dimension_scale: 1.0,
            trial: 0,
        }
    }
}

/// What to do after a trial's bytes have been measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// The bytes fit the budget.
    Accept,
    /// Same buffer, lower quality.
    RetryQuality { quality: u32 },
    /// Quality ladder exhausted: restart it at a smaller scale.
    Rescale { dimension_scale: f64 },
    /// The next scale would drop below `min_dimension_scale`.
    FloorReached,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetMet,
    DimensionFloor,
    IterationLimit,
    /// [`Strategy::Fast`] always stops after one encode.
    SinglePass,
}

/// Decide the next move from the trial that just ran.
///
/// `lossless` skips the quality ladder entirely.
pub fn next_step(
    config: &OptimizationConfig,
    state: &SearchState,
    encoded_len: usize,
    lossless: bool,
) -> Step {
    if encoded_len as u64 <= config.target_bytes() {
        return Step::Accept;
    }
    if !lossless && state.quality > config.min_quality {
        let quality = state
            .quality
            .saturating_sub(config.quality_step)
            .max(config.min_quality);
        return Step::RetryQuality { quality };
    }
    let next = round_scale(state.dimension_scale - config.dimension_reduction_step);
    if next < config.min_dimension_scale - SCALE_EPSILON {
        Step::FloorReached
    } else {
        Step::Rescale {
            dimension_scale: next,
        }
    }
}

/// Apply a non-terminal step to a state. Terminal steps leave it unchanged.
pub fn advance(config: &OptimizationConfig, state: SearchState, step: Step) -> SearchState {
    match step {
        Step::RetryQuality { quality } => SearchState { quality, ..state },
        Step::Rescale { dimension_scale } => SearchState {
            quality: config.max_quality,
            dimension_scale,
            ..state
        },
        Step::Accept | Step::FloorReached => state,
    }
}

/// Keep accumulated scales readable (0.7, not 0.7000000000000001).
fn round_scale(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Encoded bytes plus the settings that produced them.
///
/// The search keeps only the latest candidate; it is returned when the
/// search stops.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCandidate {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Reported quality. At the dimension floor this is `min_quality`.
    pub quality: u32,
    pub dimension_scale: f64,
    /// Index of the trial that produced `bytes`, which is also the
    /// number of encodes performed.
    pub trial: u32,
    pub stop: StopReason,
}

impl EncodedCandidate {
    pub fn met_target(&self, target_bytes: u64) -> bool {
        self.bytes.len() as u64 <= target_bytes
    }
}

/// Encode `source` with the configured [`Strategy`].
pub fn run(
    backend: &dyn ImageBackend,
    source: &PreparedImage,
    config: &OptimizationConfig,
    has_transparency: bool,
) -> Result<EncodedCandidate, BackendError> {
    let (w, h) = source.dimensions();
    let base = bound_resize(
        source.image(),
        config.max_dimension,
        Orientation::from_dimensions(w, h),
    );
    match config.strategy {
        Strategy::Adaptive => {
            adaptive(backend, source.image(), &base, config, has_transparency)
        }
        Strategy::Fast => fast(backend, base, config, has_transparency),
    }
}

fn adaptive(
    backend: &dyn ImageBackend,
    source: &DynamicImage,
    base: &DynamicImage,
    config: &OptimizationConfig,
    has_transparency: bool,
) -> Result<EncodedCandidate, BackendError> {
    let lossless = !config.output_format.codec().uses_quality();
    let target = config.target_bytes();

    let mut state = SearchState::initial(config);
    let mut rescaled: Option<DynamicImage> = None;
    let mut last: Option<EncodedCandidate> = None;

    while state.trial < config.max_iterations {
        state.trial += 1;
        let working = rescaled.as_ref().unwrap_or(base);
        let bytes = backend.encode(
            working,
            config.output_format,
            Quality::new(state.quality),
            has_transparency,
        )?;
        debug!(
            trial = state.trial,
            quality = state.quality,
            scale = state.dimension_scale,
            width = working.width(),
            height = working.height(),
            bytes = bytes.len(),
            target,
            "search trial"
        );

        let step = next_step(config, &state, bytes.len(), lossless);
        let candidate = EncodedCandidate {
            width: working.width(),
            height: working.height(),
            quality: state.quality,
            dimension_scale: state.dimension_scale,
            trial: state.trial,
            stop: StopReason::IterationLimit,
            bytes,
        };

        match step {
            Step::Accept => {
                return Ok(EncodedCandidate {
                    stop: StopReason::TargetMet,
                    ..candidate
                });
            }
            Step::FloorReached => {
                return Ok(EncodedCandidate {
                    quality: config.min_quality,
                    stop: StopReason::DimensionFloor,
                    ..candidate
                });
            }
            Step::Rescale { dimension_scale } => {
                let reference = (base.width(), base.height());
                rescaled = Some(scale(source, reference, dimension_scale));
            }
            Step::RetryQuality { .. } => {}
        }
        state = advance(config, state, step);
        last = Some(candidate);
    }

    // max_iterations > 0 is validated, so at least one trial ran.
    last.ok_or_else(|| BackendError::encode(config.output_format, "no search trials were run"))
}

fn fast(
    backend: &dyn ImageBackend,
    base: DynamicImage,
    config: &OptimizationConfig,
    has_transparency: bool,
) -> Result<EncodedCandidate, BackendError> {
    let quality = Quality::new(FAST_QUALITY);
    let bytes = backend.encode(&base, config.output_format, quality, has_transparency)?;
    debug!(quality = FAST_QUALITY, bytes = bytes.len(), "single-pass encode");
    Ok(EncodedCandidate {
        width: base.width(),
        height: base.height(),
        quality: quality.value(),
        dimension_scale: 1.0,
        trial: 1,
        stop: StopReason::SinglePass,
        bytes,
    })
}
