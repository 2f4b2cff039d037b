//! The optimization pipeline for one image, and batches of them.
//!
//! ```text
//! analyze ─► decode ─► prepare ─► [watermark] ─► search ─► write
//! ```
//!
//! [`Optimizer::optimize`] never returns an error: every failure along the
//! pipeline becomes an [`OptimizationResult`] with `success == false` and a
//! [`ResultError`] describing it. This is the only place in the crate where
//! errors turn into data.
//!
//! ## Parallel Processing
//!
//! Batches run on the global [rayon](https://docs.rs/rayon) pool. Each item
//! owns its buffers, results come back in input order, and a
//! [`CancelToken`] is checked before each item starts (never mid-image).

use crate::config::{ConfigError, OptimizationConfig};
use crate::imaging::operations::prepare;
use crate::imaging::watermark::{self, Face, WatermarkStyle, font_sources};
use crate::imaging::{BackendError, ImageBackend, ImageMetadata, RustBackend};
use crate::search::{self, EncodedCandidate};
use crate::types::{OptimizationResult, ResultError};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use tracing::{info, info_span, warn};

/// Receives batch progress. Called from worker threads, once per finished item.
pub trait ProgressObserver: Sync {
    /// `current` counts finished items (1-based) in completion order.
    fn on_progress(&self, current: usize, total: usize);

    /// Like [`on_progress`](Self::on_progress), with the finished result.
    fn on_result(&self, current: usize, total: usize, _result: &OptimizationResult) {
        self.on_progress(current, total);
    }
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Sync,
{
    fn on_progress(&self, current: usize, total: usize) {
        self(current, total)
    }
}

/// Progress event sent through a [`ChannelObserver`].
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub result: OptimizationResult,
}

/// Forwards each finished result to a channel, typically drained by a
/// printer thread.
pub struct ChannelObserver {
    tx: Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, _current: usize, _total: usize) {}

    fn on_result(&self, current: usize, total: usize, result: &OptimizationResult) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.tx.send(ProgressEvent {
            current,
            total,
            result: result.clone(),
        });
    }
}

/// Shared flag that stops a batch from starting new items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A validated config bound to a backend.
pub struct Optimizer<B: ImageBackend = RustBackend> {
    config: OptimizationConfig,
    backend: B,
    /// Face loaded from `watermark_font`; `None` uses [`Face::system`].
    face: Option<Face>,
}

impl<B: ImageBackend> Optimizer<B> {
    /// Validates `config` and loads the watermark face if one is configured.
    pub fn new(config: OptimizationConfig, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let face = if config.watermark {
            config
                .watermark_font
                .as_deref()
                .map(|path| Face::load(&font_sources(Some(path))))
        } else {
            None
        };
        Ok(Self {
            config,
            backend,
            face,
        })
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Optimize `input` into `config.output_dir/<stem>.<ext>`.
    pub fn optimize(&self, input: &Path) -> OptimizationResult {
        let output = self.config.output_path_for(input);
        self.optimize_to(input, &output)
    }

    /// Optimize `input` into `output`. Never fails; see the module docs.
    pub fn optimize_to(&self, input: &Path, output: &Path) -> OptimizationResult {
        let span = info_span!("optimize", input = %input.display());
        let _enter = span.enter();

        let mut metadata = None;
        match self.run_pipeline(input, output, &mut metadata) {
            Ok(result) => {
                info!(
                    output = %output.display(),
                    bytes = result.optimized_size,
                    quality = result.quality,
                    iterations = result.iterations,
                    met_target = result.met_target(self.config.target_bytes()),
                    "optimized"
                );
                result
            }
            Err(err) => {
                warn!(error = %err, "optimization failed");
                OptimizationResult::failure(
                    input,
                    metadata,
                    self.config.output_format,
                    ResultError::from(&err),
                )
            }
        }
    }

    fn run_pipeline(
        &self,
        input: &Path,
        output: &Path,
        metadata_out: &mut Option<ImageMetadata>,
    ) -> Result<OptimizationResult, BackendError> {
        let metadata = self.backend.analyze(input)?;
        *metadata_out = Some(metadata.clone());

        let decoded = self.backend.decode(input)?;
        let mut prepared = prepare(decoded, &metadata);

        if self.config.watermark {
            let style = WatermarkStyle {
                position: self.config.watermark_position,
                font_size: None,
                background: self.config.watermark_background,
            };
            let face = self.face.as_ref().unwrap_or_else(|| Face::system());
            let marked =
                watermark::apply_with(prepared.image(), &self.config.watermark_text, &style, face);
            *prepared.image_mut() = marked;
        }

        let candidate = search::run(
            &self.backend,
            &prepared,
            &self.config,
            metadata.has_transparency,
        )?;
        write_output(output, &candidate.bytes)?;

        Ok(self.success(input, output, metadata, candidate))
    }

    fn success(
        &self,
        input: &Path,
        output: &Path,
        metadata: ImageMetadata,
        candidate: EncodedCandidate,
    ) -> OptimizationResult {
        OptimizationResult {
            input_path: input.to_path_buf(),
            output_path: Some(output.to_path_buf()),
            success: true,
            original_width: metadata.width,
            original_height: metadata.height,
            original_format: metadata.format.clone(),
            original_size: metadata.size_bytes,
            metadata: Some(metadata),
            optimized_width: candidate.width,
            optimized_height: candidate.height,
            output_format: self.config.output_format,
            optimized_size: candidate.bytes.len() as u64,
            quality: candidate.quality,
            iterations: candidate.trial,
            stop: Some(candidate.stop),
            error: None,
        }
    }

    /// Optimize every input in parallel. Results are in input order; items
    /// skipped after cancellation have no entry.
    ///
    /// Inputs whose destination was already claimed by an earlier input
    /// (`a.jpg` and `a.png` both map to `a.webp`) fail with
    /// `OutputConflict` and are never encoded.
    pub fn optimize_batch(
        &self,
        inputs: &[PathBuf],
        observer: Option<&dyn ProgressObserver>,
        cancel: Option<&CancelToken>,
    ) -> Vec<OptimizationResult> {
        let total = inputs.len();
        let finished = AtomicUsize::new(0);
        let claims = self.claim_outputs(inputs);

        let results: Vec<Option<OptimizationResult>> = inputs
            .par_iter()
            .zip(claims.par_iter())
            .map(|(input, claim)| {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    return None;
                }
                let result = match claim {
                    Ok(output) => self.optimize_to(input, output),
                    Err(err) => {
                        warn!(input = %input.display(), error = %err, "skipping input");
                        OptimizationResult::failure(
                            input,
                            None,
                            self.config.output_format,
                            ResultError::from(err),
                        )
                    }
                };
                let current = finished.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(observer) = observer {
                    observer.on_result(current, total, &result);
                }
                Some(result)
            })
            .collect();

        results.into_iter().flatten().collect()
    }

    /// Destination per input, first come first served in input order.
    fn claim_outputs(&self, inputs: &[PathBuf]) -> Vec<Result<PathBuf, BackendError>> {
        let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
        inputs
            .iter()
            .map(|input| {
                let output = self.config.output_path_for(input);
                match claimed.get(&output) {
                    Some(first) => Err(BackendError::OutputConflict {
                        output,
                        claimed_by: first.to_path_buf(),
                    }),
                    None => {
                        claimed.insert(output.clone(), input.as_path());
                        Ok(output)
                    }
                }
            })
            .collect()
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Optimize one image with the pure Rust backend.
///
/// An invalid `config` yields a failure result of kind `InvalidConfig`.
pub fn optimize_one(path: &Path, config: &OptimizationConfig) -> OptimizationResult {
    match Optimizer::new(config.clone(), RustBackend::new()) {
        Ok(optimizer) => optimizer.optimize(path),
        Err(err) => {
            OptimizationResult::failure(path, None, config.output_format, ResultError::from(&err))
        }
    }
}

/// Optimize many images with the pure Rust backend, one result per input.
pub fn optimize_batch(
    paths: &[PathBuf],
    config: &OptimizationConfig,
    observer: Option<&dyn ProgressObserver>,
) -> Vec<OptimizationResult> {
    match Optimizer::new(config.clone(), RustBackend::new()) {
        Ok(optimizer) => optimizer.optimize_batch(paths, observer, None),
        Err(err) => {
            let error = ResultError::from(&err);
            paths
                .iter()
                .map(|p| {
                    OptimizationResult::failure(p, None, config.output_format, error.clone())
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, metadata};
    use crate::imaging::{ErrorKind, OutputFormat, WatermarkPosition};
    use crate::search::StopReason;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const KB: usize = 1024;

    fn config_in(tmp: &TempDir) -> OptimizationConfig {
        OptimizationConfig {
            output_dir: tmp.path().join("out"),
            ..Default::default()
        }
    }

    fn mock_optimizer(tmp: &TempDir, sizes: Vec<usize>) -> Optimizer<MockBackend> {
        let backend = MockBackend::with_encoded_sizes(metadata(1920, 1080), sizes);
        Optimizer::new(config_in(tmp), backend).unwrap()
    }

    // =========================================================================
    // Single image
    // =========================================================================

    #[test]
    fn success_writes_output_and_fills_result() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![300 * KB, 90 * KB]);

        let result = optimizer.optimize(Path::new("/photos/sunset.jpg"));

        assert!(result.success, "{:?}", result.error);
        let out = tmp.path().join("out/sunset.webp");
        assert_eq!(result.output_path.as_deref(), Some(out.as_path()));
        assert_eq!(std::fs::metadata(&out).unwrap().len(), 90 * KB as u64);
        assert_eq!((result.original_width, result.original_height), (1920, 1080));
        assert_eq!((result.optimized_width, result.optimized_height), (1920, 1080));
        assert_eq!(result.original_size, 2_000_000);
        assert_eq!(result.optimized_size, 90 * KB as u64);
        assert_eq!(result.quality, 80);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.stop, Some(StopReason::TargetMet));
        assert!(result.met_target(102_400));
        assert!(result.metadata.is_some());
    }

    #[test]
    fn pipeline_runs_analyze_decode_then_encodes() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![KB]);
        optimizer.optimize(Path::new("/photos/a.jpg"));

        let ops = optimizer.backend.get_operations();
        assert!(matches!(&ops[0], RecordedOp::Analyze(p) if p == "/photos/a.jpg"));
        assert!(matches!(&ops[1], RecordedOp::Decode(p) if p == "/photos/a.jpg"));
        assert!(matches!(
            &ops[2],
            RecordedOp::Encode {
                format: OutputFormat::Webp,
                ..
            }
        ));
    }

    #[test]
    fn best_effort_is_success_above_target() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![5000 * KB]);

        let result = optimizer.optimize(Path::new("/photos/noise.png"));
        assert!(result.success);
        assert!(!result.met_target(optimizer.config().target_bytes()));
        assert!(result.optimized_size > 102_400);
    }

    #[test]
    fn missing_input_is_not_found_and_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let optimizer = Optimizer::new(config_in(&tmp), RustBackend::new()).unwrap();

        let result = optimizer.optimize(Path::new("/nonexistent/photo.jpg"));
        assert!(!result.success);
        assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::NotFound);
        assert!(result.output_path.is_none());
        assert!(result.metadata.is_none());
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn unwritable_output_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("out");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();
        let optimizer = mock_optimizer(&tmp, vec![KB]);

        let result = optimizer.optimize(Path::new("/photos/a.jpg"));
        assert!(!result.success);
        assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::IoError);
        // Analysis succeeded, so the original is still described.
        assert_eq!(result.original_width, 1920);
    }

    #[test]
    fn watermark_keeps_encoded_dimensions() {
        let tmp = TempDir::new().unwrap();
        let config = OptimizationConfig {
            watermark: true,
            watermark_text: "© 2026".into(),
            watermark_position: WatermarkPosition::Center,
            ..config_in(&tmp)
        };
        let backend = MockBackend::with_encoded_sizes(metadata(1000, 1000), vec![KB]);
        let optimizer = Optimizer::new(config, backend).unwrap();

        let result = optimizer.optimize(Path::new("/photos/square.jpg"));
        assert!(result.success);
        assert_eq!(optimizer.backend.encodes(), vec![(1000, 1000, 85)]);
    }

    #[test]
    fn rotated_input_is_encoded_upright() {
        let tmp = TempDir::new().unwrap();
        let mut meta = metadata(1080, 1920);
        meta.exif_orientation = Some(6);
        let backend = MockBackend::with_encoded_sizes(meta, vec![KB]);
        let optimizer = Optimizer::new(config_in(&tmp), backend).unwrap();

        let result = optimizer.optimize(Path::new("/photos/portrait.jpg"));
        assert_eq!((result.optimized_width, result.optimized_height), (1080, 1920));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = OptimizationConfig {
            min_quality: 90,
            max_quality: 10,
            ..Default::default()
        };
        assert!(Optimizer::new(config.clone(), RustBackend::new()).is_err());

        let result = optimize_one(Path::new("/photos/a.jpg"), &config);
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::InvalidConfig);
    }

    // =========================================================================
    // Batch
    // =========================================================================

    fn inputs(n: usize) -> Vec<PathBuf> {
        (0..n)
            .map(|i| PathBuf::from(format!("/photos/img{i:02}.jpg")))
            .collect()
    }

    #[test]
    fn batch_preserves_input_order() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![KB]);
        let paths = inputs(12);

        let results = optimizer.optimize_batch(&paths, None, None);
        let got: Vec<&Path> = results.iter().map(|r| r.input_path.as_path()).collect();
        let want: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn batch_reports_progress_once_per_item() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![KB]);
        let calls = Mutex::new(Vec::new());
        let observer = |current: usize, total: usize| calls.lock().unwrap().push((current, total));

        optimizer.optimize_batch(&inputs(5), Some(&observer), None);

        let mut calls = calls.into_inner().unwrap();
        calls.sort();
        assert_eq!(calls, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }

    #[test]
    fn batch_continues_past_failures() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.png");
        crate::test_helpers::write_jpeg(&good, 120, 90);
        let paths = vec![PathBuf::from("/nonexistent/a.jpg"), good];

        let results = optimize_batch(&paths, &config_in(&tmp), None);
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success, "{:?}", results[1].error);
    }

    #[test]
    fn batch_rejects_inputs_sharing_a_destination() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![KB]);
        let paths = vec![
            PathBuf::from("/photos/a.jpg"),
            PathBuf::from("/photos/b.jpg"),
            PathBuf::from("/photos/a.png"),
        ];

        let results = optimizer.optimize_batch(&paths, None, None);

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(results[1].success);
        let conflict = &results[2];
        assert!(!conflict.success);
        assert!(conflict.output_path.is_none());
        let error = conflict.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::OutputConflict);
        assert!(error.message.contains("a.jpg"), "{}", error.message);
        // Only the two unique destinations were encoded.
        assert_eq!(optimizer.backend.encodes().len(), 2);
    }

    #[test]
    fn batch_conflict_keeps_first_writer_bytes() {
        let tmp = TempDir::new().unwrap();
        let jpg = tmp.path().join("a.jpg");
        let png = tmp.path().join("a.png");
        crate::test_helpers::write_jpeg(&jpg, 120, 90);
        crate::test_helpers::write_png_rgba(&png, 300, 300);

        let results = optimize_batch(&[jpg, png], &config_in(&tmp), None);

        assert!(results[0].success);
        assert_eq!(
            results[1].error.as_ref().unwrap().kind,
            ErrorKind::OutputConflict
        );
        let written = results[0].output_path.as_ref().unwrap();
        assert_eq!(
            std::fs::metadata(written).unwrap().len(),
            results[0].optimized_size
        );
    }

    #[test]
    fn cancelled_batch_skips_remaining_items() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![KB]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let results = optimizer.optimize_batch(&inputs(4), None, Some(&cancel));
        assert!(results.is_empty());
    }

    #[test]
    fn channel_observer_forwards_results() {
        let tmp = TempDir::new().unwrap();
        let optimizer = mock_optimizer(&tmp, vec![KB]);
        let (tx, rx) = std::sync::mpsc::channel();
        let observer = ChannelObserver::new(tx);

        optimizer.optimize_batch(&inputs(3), Some(&observer), None);
        drop(observer);

        let events: Vec<ProgressEvent> = rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.total == 3 && e.result.success));
    }

    #[test]
    fn batch_with_invalid_config_fails_every_item() {
        let config = OptimizationConfig {
            target_size_kb: 0,
            ..Default::default()
        };
        let results = optimize_batch(&inputs(3), &config, None);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.success));
    }
}
