//! Completeness verification of processed outputs.
//!
//! Every source image is expected to have a set of outputs in the target
//! folder, named `<source stem><delimiter><suffix><ext>` or whatever the
//! configured [`NamingPattern`] describes. A run walks through fixed stages:
//!
//! ```text
//! Idle -> ScanningSource -> ScanningTarget -> Verifying -> CopyingMissing -> Summarized
//! ```
//!
//! Source items without outputs, or with some expected suffixes missing,
//! are copied to the quarantine folder for re-processing.

mod group;
mod summary;

pub use group::ProcessedGroup;
pub use summary::{CopyFailure, IncompleteItem, SerialCheck, VerificationSummary, LISTED_ENTRIES};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::batch::{build_pool, worker_count};
use crate::config::VerifyConfig;
use crate::error::DiffLabelError;
use crate::hooks::{default_sink, percent, CancelFlag, NoProgress, ProgressSink, SharedSink};
use crate::listing::{file_name, list_files};
use crate::naming::NamingPattern;

/// Stage of a verification run. Stages only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerifierState {
    Idle,
    ScanningSource,
    ScanningTarget,
    Verifying,
    CopyingMissing,
    Summarized,
}

/// A source image, keyed by its file stem.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceItem {
    pub base_name: String,
    pub filename: String,
}

impl SourceItem {
    pub fn from_path(path: &Path) -> Self {
        Self {
            base_name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            filename: file_name(path),
        }
    }
}

/// Per-item result of the verifying stage.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Verdict {
    Complete,
    Missing,
    Incomplete(BTreeSet<String>),
}

/// Expected suffixes and where they came from.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Expectation {
    /// Per-item suffix comparison against this non-empty set.
    Suffixes(BTreeSet<String>),
    /// Suffix-only naming: compare total counts only.
    TotalCount,
    /// Nothing to compare against.
    Unknown,
}

/// Audits a target folder against a source folder. One instance performs
/// one run.
pub struct CompletenessVerifier {
    config: VerifyConfig,
    pattern: NamingPattern,
    expected_override: Option<BTreeSet<String>>,
    sink: SharedSink,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
    state: VerifierState,
}

impl CompletenessVerifier {
    /// Compiles the naming pattern. Directories are checked by [`run`].
    ///
    /// [`run`]: Self::run
    pub fn new(config: VerifyConfig) -> Result<Self, DiffLabelError> {
        if config.max_workers == Some(0) {
            return Err(DiffLabelError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        let pattern = config.naming.compile()?;
        Ok(Self {
            config,
            pattern,
            expected_override: None,
            sink: default_sink(),
            progress: Arc::new(NoProgress),
            cancel: CancelFlag::new(),
            state: VerifierState::Idle,
        })
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_progress<P: ProgressSink + 'static>(mut self, progress: P) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Uses `suffixes` instead of the set implied by the naming pattern.
    pub fn with_expected_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_override = Some(suffixes.into_iter().map(Into::into).collect());
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> VerifierState {
        self.state
    }

    pub fn pattern(&self) -> &NamingPattern {
        &self.pattern
    }

    fn enter(&mut self, next: VerifierState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        log::debug!("verifier: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs every stage and returns the summary.
    ///
    /// Missing directories, an uncreatable quarantine folder or a failing
    /// worker pool are errors; everything else ends up in the summary.
    pub fn run(mut self) -> Result<VerificationSummary, DiffLabelError> {
        let started = Instant::now();
        self.preflight()?;
        let workers = worker_count(self.config.max_workers);
        let pool = build_pool(workers)?;
        self.sink.log(&format!(
            "verifying {} against {} ({} worker(s))",
            self.config.target_dir.display(),
            self.config.source_dir.display(),
            workers
        ));

        let mut summary = VerificationSummary {
            naming_format: self.pattern.description().to_string(),
            missing_dir: self.config.missing_dir.clone(),
            pure_basename: self.pattern.policy().is_pure_basename(),
            ..VerificationSummary::default()
        };

        self.enter(VerifierState::ScanningSource);
        let sources = self.scan_source(&pool)?;
        summary.source_count = sources.len();
        self.sink.log(&format!("found {} source image(s)", sources.len()));

        self.enter(VerifierState::ScanningTarget);
        let group = ProcessedGroup::new();
        summary.naming_errors = self.scan_target(&pool, &group)?;
        summary.processed_count = group.processed_count();
        self.sink.log(&format!(
            "found {} processed output(s) covering {} base name(s), {} misnamed",
            summary.processed_count,
            group.base_count(),
            summary.naming_errors.len()
        ));

        let expectation = self.resolve_expectation(&group, sources.len());
        match &expectation {
            Expectation::Suffixes(set) => {
                summary.expected_count = Some(set.len());
                summary.expected_suffixes = Some(set.clone());
            }
            Expectation::TotalCount => summary.expected_count = Some(sources.len()),
            Expectation::Unknown => {}
        }

        self.enter(VerifierState::Verifying);
        let mut to_copy = Vec::new();
        if self.cancel.is_cancelled() {
            summary.cancelled = true;
        } else if !self.config.verify_completeness {
            self.sink.log("completeness check skipped");
        } else {
            match &expectation {
                Expectation::TotalCount => {
                    let check = SerialCheck {
                        found: summary.processed_count,
                        expected: sources.len(),
                        passed: summary.processed_count >= sources.len(),
                    };
                    self.sink.log(&format!(
                        "count check: {} output(s) for {} source(s): {}",
                        check.found,
                        check.expected,
                        if check.passed { "passed" } else { "failed" }
                    ));
                    summary.serial_check = Some(check);
                    summary.completeness_checked = true;
                }
                Expectation::Suffixes(expected) => {
                    let processed = group.snapshot();
                    for (item, verdict) in self.verify_items(&pool, &sources, &processed, expected)
                    {
                        match verdict {
                            Verdict::Complete => {}
                            Verdict::Missing => {
                                summary.missing.push(item.filename.clone());
                                to_copy.push(item.filename.clone());
                            }
                            Verdict::Incomplete(missing_suffixes) => {
                                summary.incomplete.push(IncompleteItem {
                                    filename: item.filename.clone(),
                                    missing_suffixes,
                                });
                                to_copy.push(item.filename.clone());
                            }
                        }
                    }
                    summary.completeness_checked = true;
                }
                Expectation::Unknown => {
                    self.sink
                        .log("warning: no expected suffixes known, completeness not verified");
                }
            }
        }

        self.enter(VerifierState::CopyingMissing);
        if !to_copy.is_empty() && !self.cancel.is_cancelled() {
            let (copied, failures) = self.copy_to_quarantine(&pool, &to_copy);
            summary.copied = copied;
            summary.copy_errors = failures;
        }
        summary.cancelled |= self.cancel.is_cancelled();

        self.enter(VerifierState::Summarized);
        summary.elapsed = started.elapsed();
        self.sink.log(&format!(
            "verification finished in {:.2}s with {} issue(s)",
            summary.elapsed.as_secs_f64(),
            summary.issue_count()
        ));
        Ok(summary)
    }

    fn preflight(&self) -> Result<(), DiffLabelError> {
        for (role, dir) in [
            ("source", &self.config.source_dir),
            ("target", &self.config.target_dir),
        ] {
            if !dir.is_dir() {
                return Err(DiffLabelError::MissingDirectory {
                    role,
                    path: dir.clone(),
                });
            }
        }
        // copying a file onto itself truncates it
        if let (Ok(missing), Ok(source)) = (
            fs::canonicalize(&self.config.missing_dir),
            fs::canonicalize(&self.config.source_dir),
        ) {
            if missing == source {
                return Err(DiffLabelError::InvalidConfig(format!(
                    "quarantine folder {} is the source folder",
                    self.config.missing_dir.display()
                )));
            }
        }
        fs::create_dir_all(&self.config.missing_dir).map_err(|source| {
            DiffLabelError::CreateDirectory {
                path: self.config.missing_dir.clone(),
                source,
            }
        })
    }

    fn scan_source(&self, pool: &ThreadPool) -> Result<Vec<SourceItem>, DiffLabelError> {
        let files = list_files(
            &self.config.source_dir,
            Some(self.config.source_extensions.as_slice()),
        )?;
        let ticker = Ticker::new(self.progress.as_ref(), files.len());

        Ok(pool.install(|| {
            files
                .par_iter()
                .filter_map(|path| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let item = SourceItem::from_path(path);
                    ticker.tick();
                    Some(item)
                })
                .collect()
        }))
    }

    /// Classifies every target file into `group`. Returns the misnamed
    /// files, sorted.
    fn scan_target(
        &self,
        pool: &ThreadPool,
        group: &ProcessedGroup,
    ) -> Result<Vec<String>, DiffLabelError> {
        let files = list_files::<&str>(&self.config.target_dir, None)?;
        let ticker = Ticker::new(self.progress.as_ref(), files.len());
        let naming_errors = Mutex::new(Vec::new());

        pool.install(|| {
            files.par_iter().for_each(|path| {
                if self.cancel.is_cancelled() {
                    return;
                }
                let name = file_name(path);
                match self.pattern.classify(&name) {
                    Some(found) => match found.base_name {
                        Some(base) => group.record(&base, &found.suffix),
                        None => group.record_unattributed(&found.suffix),
                    },
                    None => {
                        let mut errors = match naming_errors.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        errors.push(name);
                    }
                }
                ticker.tick();
            })
        });

        let mut naming_errors = match naming_errors.into_inner() {
            Ok(errors) => errors,
            Err(poisoned) => poisoned.into_inner(),
        };
        naming_errors.sort();
        Ok(naming_errors)
    }

    fn resolve_expectation(&self, group: &ProcessedGroup, source_count: usize) -> Expectation {
        if self.pattern.policy().is_pure_serial() {
            log::debug!("suffix-only naming, expecting {source_count} output(s) in total");
            return Expectation::TotalCount;
        }
        if let Some(set) = self
            .expected_override
            .clone()
            .or_else(|| self.pattern.expected_suffixes())
        {
            if !set.is_empty() {
                return Expectation::Suffixes(set);
            }
        }

        let observed = group.observed_suffixes();
        if observed.is_empty() {
            self.sink.log("warning: no suffixes observed in the target folder");
            return Expectation::Unknown;
        }
        self.sink.log(&format!(
            "warning: expected suffixes not configured, inferred {} from outputs: {}",
            observed.len(),
            observed.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
        Expectation::Suffixes(observed)
    }

    fn verify_items<'a>(
        &self,
        pool: &ThreadPool,
        sources: &'a [SourceItem],
        processed: &BTreeMap<String, BTreeSet<String>>,
        expected: &BTreeSet<String>,
    ) -> Vec<(&'a SourceItem, Verdict)> {
        let ticker = Ticker::new(self.progress.as_ref(), sources.len());
        let mut verdicts: Vec<(&SourceItem, Verdict)> = pool.install(|| {
            sources
                .par_iter()
                .filter_map(|item| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let verdict = self.judge(item, processed.get(&item.base_name), expected);
                    ticker.tick();
                    Some((item, verdict))
                })
                .collect()
        });
        verdicts.sort_by(|a, b| a.0.filename.cmp(&b.0.filename));
        verdicts
    }

    fn judge(
        &self,
        item: &SourceItem,
        existing: Option<&BTreeSet<String>>,
        expected: &BTreeSet<String>,
    ) -> Verdict {
        let Some(existing) = existing.filter(|set| !set.is_empty()) else {
            return Verdict::Missing;
        };

        let excess: Vec<&str> = existing.difference(expected).map(String::as_str).collect();
        if !excess.is_empty() {
            self.sink.log(&format!(
                "warning: {} has extra suffixes: {}",
                item.filename,
                excess.join(", ")
            ));
        }

        let deficit: BTreeSet<String> = expected.difference(existing).cloned().collect();
        if deficit.is_empty() {
            Verdict::Complete
        } else {
            Verdict::Incomplete(deficit)
        }
    }

    /// Copies source files into the quarantine folder. Returns the number
    /// copied and the failures, sorted by file name.
    fn copy_to_quarantine(
        &self,
        pool: &ThreadPool,
        filenames: &[String],
    ) -> (usize, Vec<CopyFailure>) {
        self.sink.log(&format!(
            "copying {} file(s) to {}",
            filenames.len(),
            self.config.missing_dir.display()
        ));
        let ticker = Ticker::new(self.progress.as_ref(), filenames.len());
        let results: Vec<Result<(), CopyFailure>> = pool.install(|| {
            filenames
                .par_iter()
                .filter_map(|filename| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let result = fs::copy(
                        self.config.source_dir.join(filename),
                        self.config.missing_dir.join(filename),
                    )
                    .map(|_| ())
                    .map_err(|e| CopyFailure {
                        filename: filename.clone(),
                        message: e.to_string(),
                    });
                    ticker.tick();
                    Some(result)
                })
                .collect()
        });

        let mut copied = 0;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(()) => copied += 1,
                Err(failure) => {
                    self.sink.log(&format!(
                        "copy failed for {}: {}",
                        failure.filename, failure.message
                    ));
                    failures.push(failure);
                }
            }
        }
        failures.sort_by(|a, b| a.filename.cmp(&b.filename));
        (copied, failures)
    }
}

/// Shared per-stage progress counter. Reports outside of any lock.
struct Ticker<'a> {
    sink: &'a dyn ProgressSink,
    done: AtomicUsize,
    total: usize,
}

impl<'a> Ticker<'a> {
    fn new(sink: &'a dyn ProgressSink, total: usize) -> Self {
        sink.progress(0, total, 0);
        Self {
            sink,
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.progress(done, self.total, percent(done, self.total));
    }
}
