use clap::{Parser, Subcommand};
use imagine::config::{self, OptimizationConfig, Strategy};
use imagine::imaging::{
    ImageBackend, OutputFormat, RustBackend, WatermarkPosition, is_supported_input,
    supported_input_extensions,
};
use imagine::optimize::{ChannelObserver, Optimizer};
use imagine::output;
use imagine::types::BatchSummary;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "imagine")]
#[command(about = "Shrink images to a byte budget")]
#[command(long_about = "\
Shrink images to a byte budget

Each image is oriented, bounded to a maximum dimension, optionally
watermarked, then encoded repeatedly: first lowering quality, then
shrinking dimensions, until the output fits the target size.

  imagine optimize photos/ --target-size 150 --format webp
  imagine optimize a.jpg b.png -d out --watermark --watermark-text \"© 2026\"
  imagine analyze photos/

Settings resolve as: stock defaults → --config file → command-line flags.
Run 'imagine gen-config' to generate a documented imagine.toml.")]
#[command(version)]
struct Cli {
    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize images (files or directories) to the target size
    Optimize(OptimizeArgs),
    /// Print dimensions, format, size and orientation of images
    Analyze {
        /// Image files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock imagine.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct OptimizeArgs {
    /// Image files or directories (directories are not recursed)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'd', long)]
    output_dir: Option<PathBuf>,

    /// Target size per image, in KB
    #[arg(long, value_name = "KB")]
    target_size: Option<u64>,

    /// Output format: webp, jpeg, png or avif
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Bound on the longest edge, in pixels
    #[arg(long)]
    max_dimension: Option<u32>,

    #[arg(long)]
    min_quality: Option<u32>,

    #[arg(long)]
    max_quality: Option<u32>,

    /// Search strategy: adaptive or fast
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Stamp a text watermark on every image
    #[arg(long)]
    watermark: bool,

    #[arg(long)]
    watermark_text: Option<String>,

    /// top_left, top_right, bottom_left, bottom_right or center
    #[arg(long)]
    watermark_position: Option<WatermarkPosition>,

    /// Draw the watermark without its backing box
    #[arg(long)]
    no_watermark_background: bool,

    /// Font file for the watermark (TTF/OTF)
    #[arg(long)]
    watermark_font: Option<PathBuf>,

    /// Parallel workers (capped at the number of cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// List what would be written, without encoding anything
    #[arg(long)]
    dry_run: bool,

    /// Print results as JSON instead of progress lines
    #[arg(long)]
    json: bool,
}

impl OptimizeArgs {
    /// Layer the command-line flags over a loaded config.
    fn apply(&self, config: &mut OptimizationConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(kb) = self.target_size {
            config.target_size_kb = kb;
        }
        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(max) = self.max_dimension {
            config.max_dimension = max;
        }
        if let Some(q) = self.min_quality {
            config.min_quality = q;
        }
        if let Some(q) = self.max_quality {
            config.max_quality = q;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if self.watermark {
            config.watermark = true;
        }
        if let Some(text) = &self.watermark_text {
            config.watermark_text = text.clone();
        }
        if let Some(position) = self.watermark_position {
            config.watermark_position = position;
        }
        if self.no_watermark_background {
            config.watermark_background = false;
        }
        if let Some(font) = &self.watermark_font {
            config.watermark_font = Some(font.clone());
        }
        if let Some(jobs) = self.jobs {
            config.processing.max_processes = Some(jobs);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Optimize(args) => run_optimize(&args)?,
        Command::Analyze { inputs, json } => run_analyze(&inputs, json)?,
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn run_optimize(args: &OptimizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => OptimizationConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let inputs = expand_inputs(&args.inputs)?;
    if inputs.is_empty() {
        return Err(format!(
            "no images found (supported: {})",
            supported_input_extensions().join(", ")
        )
        .into());
    }

    if args.dry_run {
        output::print_dry_run(&inputs, &config);
        return Ok(());
    }

    init_thread_pool(&config.processing);
    let target_bytes = config.target_bytes();
    let optimizer = Optimizer::new(config, RustBackend::new())?;

    let results = if args.json {
        optimizer.optimize_batch(&inputs, None, None)
    } else {
        let (tx, rx) = std::sync::mpsc::channel();
        let printer = std::thread::spawn(move || {
            for event in rx {
                for line in output::format_progress_event(&event, target_bytes) {
                    println!("{}", line);
                }
            }
        });
        let observer = ChannelObserver::new(tx);
        let results = optimizer.optimize_batch(&inputs, Some(&observer), None);
        // Dropping the observer closes the channel so the printer can finish.
        drop(observer);
        printer
            .join()
            .map_err(|_| "progress printer thread panicked")?;
        results
    };

    let summary = BatchSummary::from_results(&results, target_bytes);
    if args.json {
        let report = serde_json::json!({ "results": results, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_summary(&results, target_bytes);
    }

    if summary.failed > 0 {
        return Err(format!("{} of {} image(s) failed", summary.failed, summary.total).into());
    }
    Ok(())
}

fn run_analyze(inputs: &[PathBuf], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let backend = RustBackend::new();
    let mut reports = Vec::new();
    let mut failed = 0;

    for path in expand_inputs(inputs)? {
        match backend.analyze(&path) {
            Ok(meta) if json => reports.push(meta),
            Ok(meta) => output::print_metadata(&meta),
            Err(err) => {
                failed += 1;
                eprintln!("✗ {}: {}", path.display(), err);
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    if failed > 0 {
        return Err(format!("{failed} image(s) could not be analyzed").into());
    }
    Ok(())
}

/// Files pass through as given; directories contribute their supported
/// images (one level deep). The result is sorted and de-duplicated.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
                let entry = entry?;
                if entry.file_type().is_file() && is_supported_input(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Logs go to stderr so progress and JSON on stdout stay clean.
fn init_logging(verbose: bool) {
    let default = if verbose { "imagine=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
