//! Difflabel: background-difference box labeling and output auditing.
//!
//! Difflabel turns "before/after" image pairs into detection labels: a
//! background shot of an empty scene and a sample shot of the same scene
//! with objects are compared pixel by pixel, and every changed region
//! becomes a normalized bounding box. A second tool audits a folder of
//! processed outputs against its source folder and quarantines source
//! images whose outputs are missing or incomplete.
//!
//! # Modules
//!
//! - [`geom`]: Normalized boxes and pixel rectangles
//! - [`engine`]: Difference masks, region extraction and box merging
//! - [`batch`]: Directory-level labeling on a worker pool
//! - [`naming`]: Filename patterns for processed outputs
//! - [`verify`]: Completeness verification and its summary
//! - [`config`]: Typed configuration and persistence
//! - [`hooks`]: Log, progress and cancellation collaborators
//! - [`error`]: Error types for difflabel operations

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod geom;
pub mod hooks;
pub mod listing;
pub mod naming;
pub mod verify;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

pub use error::DiffLabelError;

use batch::{BatchDiffProcessor, BatchMode};
use config::{DiffConfig, VerifyConfig};
use engine::{render, DiffEngine, DiffOptions};
use naming::NamingSpec;
use verify::CompletenessVerifier;

/// The difflabel CLI application.
#[derive(Parser)]
#[command(name = "difflabel")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Label every sample image in a directory against its background.
    Batch(BatchArgs),
    /// Compare one background/sample pair and print the detected boxes.
    Pair(PairArgs),
    /// Check that every source image has its complete set of outputs.
    Verify(VerifyArgs),
}

/// Detection tuning shared by `batch` and `pair`.
#[derive(clap::Args)]
struct TuningArgs {
    /// JSON or YAML config file; flags given on the command line win.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Channel difference above which a pixel counts as changed (0-255).
    #[arg(long)]
    threshold: Option<u8>,

    /// Minimum contour area in pixels.
    #[arg(long)]
    min_area: Option<u32>,

    /// Pixels added on every side of each box.
    #[arg(long)]
    padding: Option<u32>,

    /// Merge boxes overlapping above this IoU (0 disables merging).
    #[arg(long)]
    merge_iou: Option<f64>,

    /// Class id written for every box.
    #[arg(long)]
    label: Option<u32>,
}

impl TuningArgs {
    fn load(&self) -> Result<DiffConfig, DiffLabelError> {
        let mut config = match &self.config {
            Some(path) => DiffConfig::load(path)?,
            None => DiffConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config.diff_threshold = threshold;
        }
        if let Some(area) = self.min_area {
            config.min_diff_area = area;
        }
        if let Some(padding) = self.padding {
            config.bbox_padding = padding;
        }
        if let Some(iou) = self.merge_iou {
            config.min_merge_iou = iou;
        }
        if let Some(label) = self.label {
            config.default_label = label;
        }
        Ok(config)
    }
}

/// Arguments for the batch subcommand.
#[derive(clap::Args)]
struct BatchArgs {
    /// Directory holding background images.
    #[arg(long)]
    bg_dir: Option<PathBuf>,

    /// Directory holding sample images.
    #[arg(long)]
    sample_dir: Option<PathBuf>,

    /// Directory receiving one `.txt` label file per sample.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Group samples into sequences sharing one background.
    #[arg(long)]
    sequence: bool,

    /// Worker threads (default: available parallelism).
    #[arg(long)]
    workers: Option<usize>,

    /// Save the effective configuration to this file before running.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Do not draw a progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,

    #[command(flatten)]
    tuning: TuningArgs,
}

/// Arguments for the pair subcommand.
#[derive(clap::Args)]
struct PairArgs {
    /// Background image.
    background: PathBuf,

    /// Sample image.
    sample: PathBuf,

    /// Save the cleaned difference mask here.
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Save the sample with the detected boxes drawn here.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Write the detection lines to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    tuning: TuningArgs,
}

/// Arguments for the verify subcommand.
#[derive(clap::Args)]
struct VerifyArgs {
    /// Folder with the source images.
    #[arg(long)]
    source: Option<PathBuf>,

    /// Folder with the processed outputs.
    #[arg(long)]
    target: Option<PathBuf>,

    /// Quarantine folder for missing or incomplete sources.
    #[arg(long)]
    missing: Option<PathBuf>,

    /// How outputs are named.
    #[arg(long, value_enum, default_value_t = SuffixType::Range)]
    suffix_type: SuffixType,

    /// Inclusive suffix range for `range`, e.g. `1-9`.
    #[arg(long, value_parser = parse_range, default_value = "1-9")]
    range: (u32, u32),

    /// Minimum suffix digits for `numeric`.
    #[arg(long, default_value_t = 1)]
    min_digits: u32,

    /// Maximum suffix digits for `numeric` (unbounded if omitted).
    #[arg(long)]
    max_digits: Option<u32>,

    /// Text between base name and suffix.
    #[arg(long, default_value = "_")]
    delimiter: String,

    /// Extension of processed outputs.
    #[arg(long, default_value = ".png")]
    extension: String,

    /// Regular expression with `base_name` and/or `suffix` groups, for `custom`.
    #[arg(long)]
    pattern: Option<String>,

    /// Expected suffixes, overriding the ones implied by the pattern.
    #[arg(long, value_delimiter = ',')]
    expected: Option<Vec<String>>,

    /// Source image extensions.
    #[arg(long, value_delimiter = ',', default_value = "jpg,jpeg,png")]
    source_ext: Vec<String>,

    /// Only scan and classify; do not check completeness.
    #[arg(long)]
    skip_completeness: bool,

    /// Worker threads (default: available parallelism).
    #[arg(long)]
    workers: Option<usize>,

    /// Config file with named verification presets.
    #[arg(long, requires = "section")]
    config: Option<PathBuf>,

    /// Preset to load from `--config` (e.g. `range_config`).
    #[arg(long, requires = "config")]
    section: Option<String>,

    /// Do not draw a progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Output format for the summary.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SuffixType {
    Range,
    Numeric,
    Custom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
    Csv,
}

fn parse_range(value: &str) -> Result<(u32, u32), String> {
    let (low, high) = value
        .split_once('-')
        .ok_or_else(|| format!("expected LOW-HIGH, got '{value}'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid bound '{s}': {e}"))
    };
    Ok((parse(low)?, parse(high)?))
}

/// Run the difflabel CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), DiffLabelError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Batch(args)) => run_batch(args),
        Some(Commands::Pair(args)) => run_pair(args),
        Some(Commands::Verify(args)) => run_verify(args),
        None => {
            println!("difflabel {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Background-difference labeling and output auditing.");
            println!();
            println!("Run 'difflabel --help' for usage information.");
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

fn progress_bar(len: u64, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Execute the batch subcommand.
fn run_batch(args: BatchArgs) -> Result<(), DiffLabelError> {
    let mut config = args.tuning.load()?;
    if let Some(dir) = args.bg_dir {
        config.bg_dir = dir;
    }
    if let Some(dir) = args.sample_dir {
        config.sample_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.workers.is_some() {
        config.max_workers = args.workers;
    }
    for (flag, path) in [
        ("--bg-dir", &config.bg_dir),
        ("--sample-dir", &config.sample_dir),
        ("--output-dir", &config.output_dir),
    ] {
        if path.as_os_str().is_empty() {
            return Err(DiffLabelError::InvalidConfig(format!(
                "{flag} is required (on the command line or in --config)"
            )));
        }
    }
    config.validate()?;
    if let Some(path) = &args.save_config {
        config.save(path)?;
        log::info!("configuration saved to {}", path.display());
    }

    let mode = if args.sequence {
        BatchMode::Sequence
    } else {
        BatchMode::Standard
    };
    let processor = BatchDiffProcessor::new(config)?;
    let bar = progress_bar(100, args.no_progress || args.output != ReportFormat::Text);
    bar.set_message("percent");
    let report = processor.run(mode, |percent| {
        bar.set_position(u64::from(percent));
        true
    })?;
    bar.finish_and_clear();

    match args.output {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{json}");
        }
        ReportFormat::Csv => {
            let mut csv = csv::Writer::from_writer(std::io::stdout());
            for outcome in &report.outcomes {
                csv.serialize(outcome)?;
            }
            csv.flush()?;
        }
        ReportFormat::Text => {
            println!(
                "Processed {} of {} sample(s): {} succeeded, {} failed in {:.2}s",
                report.processed(),
                report.total,
                report.success_count,
                report.failure_count,
                report.elapsed_seconds()
            );
            for error in &report.errors {
                println!("  - {error}");
            }
        }
    }

    if report.failure_count > 0 {
        Err(DiffLabelError::BatchFailed {
            failed: report.failure_count,
            total: report.total,
        })
    } else {
        Ok(())
    }
}

/// Execute the pair subcommand.
fn run_pair(args: PairArgs) -> Result<(), DiffLabelError> {
    let config = args.tuning.load()?;
    config.validate()?;
    let engine = DiffEngine::new(DiffOptions::from(&config));

    let background = DiffEngine::load_image(&args.background)?;
    let sample = DiffEngine::load_image(&args.sample)?;
    let result = engine.compute(&background, &sample);
    let Some(mask) = &result.mask else {
        return Err(DiffLabelError::BatchFailed {
            failed: 1,
            total: 1,
        });
    };

    if let Some(path) = &args.mask {
        render::save_mask(mask, path)?;
    }
    if let Some(path) = &args.preview {
        let sample = if sample.dimensions() == background.dimensions() {
            sample
        } else {
            let (width, height) = background.dimensions();
            image::imageops::resize(&sample, width, height, image::imageops::FilterType::Nearest)
        };
        render::save_preview(&sample, &result.boxes, path)?;
    }

    match &args.output {
        Some(path) => {
            batch::write_annotations(path, &result.boxes)?;
            println!("{} box(es) written to {}", result.boxes.len(), path.display());
        }
        None => {
            for bbox in &result.boxes {
                println!("{}", bbox.to_detection_string());
            }
        }
    }
    Ok(())
}

/// Execute the verify subcommand.
fn run_verify(args: VerifyArgs) -> Result<(), DiffLabelError> {
    let mut config = match (&args.config, &args.section) {
        (Some(path), Some(section)) => VerifyConfig::load_section(path, section)?,
        _ => {
            let naming = match args.suffix_type {
                SuffixType::Range => NamingSpec::Range {
                    delimiter: args.delimiter.clone(),
                    extension: args.extension.clone(),
                    low: args.range.0,
                    high: args.range.1,
                },
                SuffixType::Numeric => NamingSpec::Numeric {
                    delimiter: args.delimiter.clone(),
                    extension: args.extension.clone(),
                    min_digits: args.min_digits,
                    max_digits: args.max_digits,
                },
                SuffixType::Custom => NamingSpec::Custom {
                    pattern: args.pattern.clone().ok_or_else(|| {
                        DiffLabelError::InvalidConfig(
                            "--suffix-type custom requires --pattern".to_string(),
                        )
                    })?,
                },
            };
            let required = |flag: &str, value: &Option<PathBuf>| {
                value.clone().ok_or_else(|| {
                    DiffLabelError::InvalidConfig(format!("{flag} is required"))
                })
            };
            VerifyConfig::new(
                required("--source", &args.source)?,
                required("--target", &args.target)?,
                required("--missing", &args.missing)?,
                naming,
            )
            .with_source_extensions(&args.source_ext)
        }
    };
    if let Some(dir) = args.source {
        config.source_dir = dir;
    }
    if let Some(dir) = args.target {
        config.target_dir = dir;
    }
    if let Some(dir) = args.missing {
        config.missing_dir = dir;
    }
    if args.workers.is_some() {
        config.max_workers = args.workers;
    }
    if args.skip_completeness {
        config.verify_completeness = false;
    }

    let bar = progress_bar(0, args.no_progress || args.output != ReportFormat::Text);
    let progress_handle = bar.clone();
    let mut verifier = CompletenessVerifier::new(config)?.with_progress(
        move |current: usize, total: usize, _percent: u8| {
            progress_handle.set_length(total as u64);
            progress_handle.set_position(current as u64);
        },
    );
    if let Some(expected) = args.expected {
        verifier = verifier.with_expected_suffixes(expected);
    }
    let summary = verifier.run()?;
    bar.finish_and_clear();

    match args.output {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)?;
            println!("{json}");
        }
        ReportFormat::Csv => summary.write_csv(std::io::stdout())?,
        ReportFormat::Text => println!("{summary}"),
    }

    if summary.is_clean() {
        Ok(())
    } else {
        Err(DiffLabelError::VerificationFailed {
            missing: summary.missing.len(),
            incomplete: summary.incomplete.len(),
            naming: summary.naming_errors.len(),
        })
    }
}
