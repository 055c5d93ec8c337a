//! Verification summary types.
//!
//! The summary is the public result of a verification run. It can be
//! printed, serialized as JSON, or exported as CSV with one row per
//! problem file.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::DiffLabelError;

/// How many entries of each bucket the printed summary lists.
pub const LISTED_ENTRIES: usize = 10;

/// Result of the total-count comparison used by suffix-only patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SerialCheck {
    pub found: usize,
    pub expected: usize,
    pub passed: bool,
}

/// A source file with some, but not all, expected outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IncompleteItem {
    pub filename: String,
    pub missing_suffixes: BTreeSet<String>,
}

/// A source file that could not be copied to the quarantine folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CopyFailure {
    pub filename: String,
    pub message: String,
}

/// The outcome of one verification run.
///
/// All lists are sorted by file name.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VerificationSummary {
    /// Source files without any output.
    pub missing: Vec<String>,
    pub incomplete: Vec<IncompleteItem>,
    /// Target files not matching the naming pattern.
    pub naming_errors: Vec<String>,
    /// Outputs expected per source item (total outputs for suffix-only
    /// patterns). `None` when it could not be determined.
    pub expected_count: Option<usize>,
    pub expected_suffixes: Option<BTreeSet<String>>,
    pub naming_format: String,
    pub source_count: usize,
    pub processed_count: usize,
    pub serial_check: Option<SerialCheck>,
    pub pure_basename: bool,
    /// False when completeness was skipped or nothing could be compared.
    pub completeness_checked: bool,
    pub missing_dir: PathBuf,
    pub copied: usize,
    pub copy_errors: Vec<CopyFailure>,
    pub cancelled: bool,
    #[serde(rename = "elapsed_seconds", serialize_with = "as_seconds")]
    pub elapsed: Duration,
}

impl VerificationSummary {
    /// Missing, incomplete and misnamed files together.
    pub fn issue_count(&self) -> usize {
        self.missing.len() + self.incomplete.len() + self.naming_errors.len()
    }

    /// True when no issue was found and the serial check, if any, passed.
    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0 && self.serial_check.is_none_or(|check| check.passed)
    }

    /// Writes one CSV row per problem file: `kind,filename,detail`.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), DiffLabelError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["kind", "filename", "detail"])?;
        for name in &self.missing {
            csv.write_record(["missing", name.as_str(), ""])?;
        }
        for item in &self.incomplete {
            let detail = join(&item.missing_suffixes);
            csv.write_record(["incomplete", item.filename.as_str(), detail.as_str()])?;
        }
        for name in &self.naming_errors {
            csv.write_record(["naming", name.as_str(), ""])?;
        }
        for failure in &self.copy_errors {
            csv.write_record(["copy_failed", failure.filename.as_str(), failure.message.as_str()])?;
        }
        csv.flush()?;
        Ok(())
    }
}

fn as_seconds<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

fn join(suffixes: &BTreeSet<String>) -> String {
    suffixes
        .iter()
        .map(|s| if s.is_empty() { "\"\"" } else { s.as_str() })
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_overflow(f: &mut fmt::Formatter<'_>, len: usize) -> fmt::Result {
    if len > LISTED_ENTRIES {
        writeln!(f, "  ... and {} more", len - LISTED_ENTRIES)?;
    }
    Ok(())
}

impl fmt::Display for VerificationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "Verification summary")?;
        writeln!(f, "{rule}")?;

        writeln!(f, "1. Source images without any output:")?;
        if self.missing.is_empty() {
            writeln!(f, "  none")?;
        } else {
            for name in self.missing.iter().take(LISTED_ENTRIES) {
                writeln!(f, "  - {name}")?;
            }
            write_overflow(f, self.missing.len())?;
            writeln!(
                f,
                "  {} image(s) missing, copied to '{}'",
                self.missing.len(),
                self.missing_dir.display()
            )?;
        }

        writeln!(f, "2. Incompletely processed images:")?;
        if self.incomplete.is_empty() {
            match self.expected_count {
                Some(n) if self.completeness_checked => {
                    writeln!(f, "  none, every processed image has all {n} output(s)")?
                }
                _ => writeln!(f, "  none")?,
            }
        } else {
            for item in self.incomplete.iter().take(LISTED_ENTRIES) {
                writeln!(
                    f,
                    "  - {} (missing: {})",
                    item.filename,
                    join(&item.missing_suffixes)
                )?;
            }
            write_overflow(f, self.incomplete.len())?;
            writeln!(
                f,
                "  {} image(s) incomplete, copied to '{}'",
                self.incomplete.len(),
                self.missing_dir.display()
            )?;
        }

        writeln!(f, "3. Misnamed outputs:")?;
        if self.naming_errors.is_empty() {
            writeln!(f, "  none, every output follows {}", self.naming_format)?;
        } else {
            for name in self.naming_errors.iter().take(LISTED_ENTRIES) {
                writeln!(f, "  - {name}")?;
            }
            write_overflow(f, self.naming_errors.len())?;
            writeln!(f, "  {} output(s) misnamed", self.naming_errors.len())?;
        }

        if !self.copy_errors.is_empty() {
            writeln!(f, "Copy failures:")?;
            for failure in self.copy_errors.iter().take(LISTED_ENTRIES) {
                writeln!(f, "  - {}: {}", failure.filename, failure.message)?;
            }
            write_overflow(f, self.copy_errors.len())?;
        }

        writeln!(f, "{rule}")?;
        let issues = self.issue_count();
        if issues == 0 {
            writeln!(f, "All images processed and named correctly.")?;
        } else {
            writeln!(f, "Found {issues} issue(s), see above.")?;
        }
        if !self.completeness_checked {
            writeln!(f, "Completeness was not checked.")?;
        }
        if self.cancelled {
            writeln!(f, "Run was cancelled; results are partial.")?;
        }
        writeln!(f, "{rule}")?;

        if let Some(check) = &self.serial_check {
            writeln!(f, "[!] Serial-number naming:")?;
            writeln!(f, " - outputs found: {}", check.found)?;
            writeln!(
                f,
                " - expected at least {}: {}",
                check.expected,
                if check.passed { "passed" } else { "failed" }
            )?;
            writeln!(
                f,
                " - outputs cannot be attributed to sources; the missing list is advisory"
            )?;
        }
        if self.pure_basename && self.completeness_checked {
            writeln!(f, "[ok] One-to-one correspondence checked for every source")?;
        }

        write!(f, "Elapsed: {:.2}s", self.elapsed.as_secs_f64())
    }
}
