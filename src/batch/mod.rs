//! Batch labeling of sample directories.
//!
//! [`BatchDiffProcessor`] pairs every sample image with a background,
//! runs the [`DiffEngine`] on a bounded rayon pool and writes one
//! detection file per sample. Two pairing policies exist:
//!
//! - **Standard**: each sample is matched to a background by base name
//!   (see [`find_matching_background`]).
//! - **Sequence**: samples sharing a base name form a sequence with one
//!   background, decoded once and shared by every sample of the sequence.
//!
//! Failures of single pairs are counted in the [`BatchReport`]; only
//! configuration problems abort a run.

mod matching;
mod schedule;

pub use matching::{
    extract_base_name, find_matching_background, group_sequences, sequence_background,
};
pub use schedule::run_windowed;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use image::RgbImage;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use crate::config::DiffConfig;
use crate::engine::{DiffEngine, DiffOptions, DiffResult};
use crate::error::DiffLabelError;
use crate::geom::BoundingBox;
use crate::hooks::{default_sink, percent, CancelFlag, SharedSink};
use crate::listing::{file_name, list_files, IMAGE_EXTENSIONS};

/// How samples are paired with backgrounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchMode {
    #[default]
    Standard,
    Sequence,
}

/// One sample to label: where its background, image and annotation live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessingTask {
    pub background: PathBuf,
    pub sample: PathBuf,
    pub output: PathBuf,
}

/// The result of one unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessingOutcome {
    pub sample: PathBuf,
    pub success: bool,
    pub message: String,
    pub object_count: usize,
}

impl ProcessingOutcome {
    fn succeeded(sample: &Path, object_count: usize) -> Self {
        Self {
            sample: sample.to_path_buf(),
            success: true,
            message: format!(
                "processed {}, {} object(s) detected",
                file_name(sample),
                object_count
            ),
            object_count,
        }
    }

    fn failed(sample: &Path, message: String) -> Self {
        Self {
            sample: sample.to_path_buf(),
            success: false,
            message,
            object_count: 0,
        }
    }
}

/// Aggregated result of a batch run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// Number of samples planned, including those never dispatched.
    pub total: usize,
    pub errors: Vec<String>,
    pub outcomes: Vec<ProcessingOutcome>,
    pub cancelled: bool,
    #[serde(rename = "elapsed_seconds", serialize_with = "as_seconds")]
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn processed(&self) -> usize {
        self.success_count + self.failure_count
    }

    fn fold(&mut self, outcome: ProcessingOutcome) {
        if outcome.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.outcomes.push(outcome);
    }

    fn finish(&mut self, started: Instant) {
        self.outcomes.sort_by(|a, b| a.sample.cmp(&b.sample));
        self.errors.extend(
            self.outcomes
                .iter()
                .filter(|o| !o.success)
                .map(|o| o.message.clone()),
        );
        self.elapsed = started.elapsed();
    }
}

fn as_seconds<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// A sequence background decoded at most once, by whichever sample of the
/// sequence gets there first.
struct SharedBackground {
    path: PathBuf,
    image: OnceLock<Option<RgbImage>>,
}

impl SharedBackground {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            image: OnceLock::new(),
        }
    }

    fn get(&self, sink: &SharedSink) -> Option<&RgbImage> {
        self.image
            .get_or_init(|| match DiffEngine::load_image(&self.path) {
                Ok(img) => Some(img),
                Err(e) => {
                    sink.log(&format!("image read failed: {e}"));
                    None
                }
            })
            .as_ref()
    }
}

enum Background {
    Path(PathBuf),
    Shared(Arc<SharedBackground>),
    Unmatched(String),
}

struct Unit {
    sample: PathBuf,
    output: PathBuf,
    background: Background,
}

/// Runs the diff engine over a whole sample directory.
pub struct BatchDiffProcessor {
    config: DiffConfig,
    engine: DiffEngine,
    sink: SharedSink,
    cancel: CancelFlag,
}

impl BatchDiffProcessor {
    /// Validates the configuration and snapshots the detection options.
    pub fn new(config: DiffConfig) -> Result<Self, DiffLabelError> {
        config.validate()?;
        let sink = default_sink();
        Ok(Self {
            engine: DiffEngine::with_sink(DiffOptions::from(&config), sink.clone()),
            config,
            sink,
            cancel: CancelFlag::new(),
        })
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.engine = DiffEngine::with_sink(self.engine.options().clone(), sink.clone());
        self.sink = sink;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    /// Runs `mode`, calling `progress` with the completed percentage after
    /// every unit. Returning false from `progress` stops submission.
    pub fn run<F>(&self, mode: BatchMode, progress: F) -> Result<BatchReport, DiffLabelError>
    where
        F: FnMut(u8) -> bool,
    {
        match mode {
            BatchMode::Standard => self.process(progress),
            BatchMode::Sequence => self.process_sequences(progress),
        }
    }

    /// Standard mode: every sample gets its best-matching background.
    pub fn process<F>(&self, progress: F) -> Result<BatchReport, DiffLabelError>
    where
        F: FnMut(u8) -> bool,
    {
        let started = Instant::now();
        let Some((backgrounds, samples)) = self.preflight()? else {
            return Ok(empty_report(started));
        };

        let units = samples
            .into_iter()
            .map(|sample| {
                let name = file_name(&sample);
                let background = match find_matching_background(&name, &backgrounds) {
                    Some(bg) => Background::Path(bg.clone()),
                    None => Background::Unmatched(format!("no matching background for {name}")),
                };
                self.unit(sample, background)
            })
            .collect();

        self.execute(units, progress, started)
    }

    /// Sequence mode: samples are grouped by base name and each group is
    /// compared against one shared background.
    pub fn process_sequences<F>(&self, progress: F) -> Result<BatchReport, DiffLabelError>
    where
        F: FnMut(u8) -> bool,
    {
        let started = Instant::now();
        let Some((backgrounds, samples)) = self.preflight()? else {
            return Ok(empty_report(started));
        };

        let mut units = Vec::with_capacity(samples.len());
        for (base_name, members) in group_sequences(&samples) {
            let shared = match sequence_background(&base_name, &backgrounds) {
                Some((bg, fallback)) => {
                    if fallback {
                        self.sink.log(&format!(
                            "warning: no background matches sequence {base_name}, using {}",
                            file_name(bg)
                        ));
                    }
                    log::debug!("sequence {base_name}: {} sample(s)", members.len());
                    Some(Arc::new(SharedBackground::new(bg.clone())))
                }
                None => None,
            };

            for sample in members {
                let background = match &shared {
                    Some(bg) => Background::Shared(Arc::clone(bg)),
                    None => Background::Unmatched(format!(
                        "no background available for sequence {base_name}"
                    )),
                };
                units.push(self.unit(sample, background));
            }
        }

        self.execute(units, progress, started)
    }

    /// Checks directories and lists inputs. `None` means nothing to do.
    fn preflight(&self) -> Result<Option<(Vec<PathBuf>, Vec<PathBuf>)>, DiffLabelError> {
        require_dir("background", &self.config.bg_dir)?;
        require_dir("sample", &self.config.sample_dir)?;
        fs::create_dir_all(&self.config.output_dir).map_err(|source| {
            DiffLabelError::CreateDirectory {
                path: self.config.output_dir.clone(),
                source,
            }
        })?;

        let samples = list_files(&self.config.sample_dir, Some(IMAGE_EXTENSIONS))?;
        if samples.is_empty() {
            self.sink.log(&format!(
                "no sample images found in {}",
                self.config.sample_dir.display()
            ));
            return Ok(None);
        }
        let backgrounds = list_files(&self.config.bg_dir, Some(IMAGE_EXTENSIONS))?;
        Ok(Some((backgrounds, samples)))
    }

    fn unit(&self, sample: PathBuf, background: Background) -> Unit {
        Unit {
            output: self.output_path(&sample),
            sample,
            background,
        }
    }

    /// `<output_dir>/<sample stem>.txt`
    pub fn output_path(&self, sample: &Path) -> PathBuf {
        let stem = sample
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.config.output_dir.join(format!("{stem}.txt"))
    }

    fn execute<F>(
        &self,
        units: Vec<Unit>,
        mut progress: F,
        started: Instant,
    ) -> Result<BatchReport, DiffLabelError>
    where
        F: FnMut(u8) -> bool,
    {
        let workers = worker_count(self.config.max_workers);
        let pool = build_pool(workers)?;
        let total = units.len();
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        let mut stopped = false;

        log::debug!("dispatching {total} unit(s) on {workers} worker(s)");
        run_windowed(
            &pool,
            units,
            workers,
            &self.cancel,
            |unit| self.process_unit(unit),
            |result, completed| {
                let outcome = result.unwrap_or_else(|panic| ProcessingOutcome {
                    sample: PathBuf::new(),
                    success: false,
                    message: format!("worker panicked: {panic}"),
                    object_count: 0,
                });
                if outcome.success {
                    self.sink.log(&outcome.message);
                } else {
                    self.sink.log(&format!("failed: {}", outcome.message));
                }
                report.fold(outcome);

                let keep_going = progress(percent(completed, total));
                if !keep_going {
                    stopped = true;
                }
                keep_going
            },
        );

        report.cancelled = stopped || self.cancel.is_cancelled();
        if report.cancelled && report.processed() < total {
            self.sink.log(&format!(
                "batch cancelled after {} of {} sample(s)",
                report.processed(),
                total
            ));
        }
        report.finish(started);
        Ok(report)
    }

    fn process_unit(&self, unit: Unit) -> ProcessingOutcome {
        let result = match &unit.background {
            Background::Unmatched(message) => {
                return ProcessingOutcome::failed(&unit.sample, message.clone());
            }
            Background::Path(bg) => self.engine.compute_paths(bg, &unit.sample),
            Background::Shared(shared) => match shared.get(&self.sink) {
                Some(image) => self.engine.compute_with_background(image, &unit.sample),
                None => DiffResult::failed(),
            },
        };

        let task = ProcessingTask {
            background: match &unit.background {
                Background::Path(bg) => bg.clone(),
                Background::Shared(shared) => shared.path.clone(),
                Background::Unmatched(_) => PathBuf::new(),
            },
            sample: unit.sample,
            output: unit.output,
        };
        finish_task(&task, &result)
    }
}

/// Turns a diff result into an outcome, writing the annotation file.
fn finish_task(task: &ProcessingTask, result: &DiffResult) -> ProcessingOutcome {
    if result.is_failure() {
        return ProcessingOutcome::failed(
            &task.sample,
            format!(
                "could not compare {} with {}",
                file_name(&task.sample),
                file_name(&task.background)
            ),
        );
    }
    match write_annotations(&task.output, &result.boxes) {
        Ok(()) => ProcessingOutcome::succeeded(&task.sample, result.boxes.len()),
        Err(e) => ProcessingOutcome::failed(
            &task.sample,
            format!("cannot write {}: {e}", task.output.display()),
        ),
    }
}

/// Writes one detection line per box, creating parent directories.
pub fn write_annotations(path: &Path, boxes: &[BoundingBox]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for bbox in boxes {
        writeln!(writer, "{}", bbox.to_detection_string())?;
    }
    writer.flush()
}

fn require_dir(role: &'static str, path: &Path) -> Result<(), DiffLabelError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(DiffLabelError::MissingDirectory {
            role,
            path: path.to_path_buf(),
        })
    }
}

fn empty_report(started: Instant) -> BatchReport {
    BatchReport {
        elapsed: started.elapsed(),
        ..BatchReport::default()
    }
}

/// `max_workers`, or the host's available parallelism.
pub fn worker_count(max_workers: Option<usize>) -> usize {
    max_workers
        .filter(|&n| n > 0)
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
}

pub fn build_pool(workers: usize) -> Result<ThreadPool, DiffLabelError> {
    Ok(ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("difflabel-worker-{i}"))
        .build()?)
}
