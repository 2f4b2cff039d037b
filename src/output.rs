//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Optimize
//!
//! ```text
//! [1/3] ✓ sunset.jpg: 812.4KB → 97.1KB (88.0% reduction) [1920x1080, q=70]
//! [2/3] ⚠ noise.png: 2.4MB → 141.0KB (94.2% reduction) [960x540, q=60] above 100KB target
//! [3/3] ✗ broken.jpg: Failed to decode broken.jpg: ...
//!
//! Optimized 2/3 images
//!     Original:  3.2MB
//!     Optimized: 238.1KB
//!     Saved:     3.0MB (92.8%)
//!     Above target: 1
//!     Failed: 1
//! ```
//!
//! ## Analyze
//!
//! ```text
//! sunset.jpg - 1920x1080 JPEG (812.4KB) [landscape]
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `String` or `Vec<String>`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::config::OptimizationConfig;
use crate::imaging::ImageMetadata;
use crate::optimize::ProgressEvent;
use crate::types::{BatchSummary, OptimizationResult};
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Human-readable byte count: `97.1KB`, `2.4MB`.
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    if kb >= 1024.0 {
        format!("{:.1}MB", kb / 1024.0)
    } else {
        format!("{kb:.1}KB")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Optimize
// ============================================================================

/// One line per result: `✓` met the budget, `⚠` best effort above it,
/// `✗` failed.
pub fn format_result(result: &OptimizationResult, target_bytes: u64) -> String {
    let name = result.display_name();
    if !result.success {
        let message = result
            .error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or("unknown error");
        return format!("✗ {name}: {message}");
    }

    let marker = if result.met_target(target_bytes) {
        "✓"
    } else {
        "⚠"
    };
    let mut line = format!(
        "{marker} {name}: {} → {} ({:.1}% reduction) [{}x{}, q={}]",
        format_size(result.original_size),
        format_size(result.optimized_size),
        result.size_reduction_percent(),
        result.optimized_width,
        result.optimized_height,
        result.quality,
    );
    if marker == "⚠" {
        line.push_str(&format!(" above {} target", format_size(target_bytes)));
    }
    line
}

/// A result line prefixed with batch progress: `[3/10] ✓ ...`.
pub fn format_progress_event(event: &ProgressEvent, target_bytes: u64) -> Vec<String> {
    vec![format!(
        "[{}/{}] {}",
        event.current,
        event.total,
        format_result(&event.result, target_bytes)
    )]
}

/// Totals for a finished batch.
pub fn format_summary(summary: &BatchSummary) -> Vec<String> {
    let mut lines = vec![
        format!("Optimized {}/{} images", summary.succeeded, summary.total),
        format!("    Original:  {}", format_size(summary.original_bytes)),
        format!("    Optimized: {}", format_size(summary.optimized_bytes)),
        format!(
            "    Saved:     {} ({:.1}%)",
            format_size(summary.saved_bytes()),
            summary.reduction_percent()
        ),
    ];
    if summary.over_target > 0 {
        lines.push(format!("    Above target: {}", summary.over_target));
    }
    if summary.failed > 0 {
        lines.push(format!("    Failed: {}", summary.failed));
    }
    lines
}

pub fn print_summary(results: &[OptimizationResult], target_bytes: u64) {
    println!();
    for line in format_summary(&BatchSummary::from_results(results, target_bytes)) {
        println!("{}", line);
    }
}

/// What `--dry-run` would do, one `input → output` line per image.
pub fn format_dry_run(inputs: &[PathBuf], config: &OptimizationConfig) -> Vec<String> {
    let mut lines = vec![format!(
        "Would optimize {} image(s) to {} (target {}, max {}px)",
        inputs.len(),
        config.output_format,
        format_size(config.target_bytes()),
        config.max_dimension,
    )];
    lines.extend(inputs.iter().map(|input| {
        format!(
            "    {} → {}",
            input.display(),
            config.output_path_for(input).display()
        )
    }));
    lines
}

pub fn print_dry_run(inputs: &[PathBuf], config: &OptimizationConfig) {
    for line in format_dry_run(inputs, config) {
        println!("{}", line);
    }
}

// ============================================================================
// Analyze
// ============================================================================

/// `name - 1920x1080 JPEG (812.4KB) [landscape]`, plus color details.
pub fn format_metadata(meta: &ImageMetadata) -> Vec<String> {
    let mut lines = vec![format!(
        "{} - {}x{} {} ({}) [{}]",
        file_name(&meta.path),
        meta.width,
        meta.height,
        meta.format,
        format_size(meta.size_bytes),
        meta.orientation,
    )];
    let mut details = vec![format!("Mode: {}", meta.color_mode)];
    if meta.has_transparency {
        details.push("transparent".to_string());
    }
    if let Some(code) = meta.exif_orientation {
        details.push(format!("EXIF orientation {code}"));
    }
    lines.push(format!("    {}", details.join(", ")));
    lines
}

pub fn print_metadata(meta: &ImageMetadata) {
    for line in format_metadata(meta) {
        println!("{}", line);
    }
}
