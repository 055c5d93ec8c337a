use std::path::PathBuf;
use thiserror::Error;

/// The main error type for difflabel operations.
///
/// Only configuration problems and run-level failures surface as this type.
/// Failures of a single image pair or a single copied file are recorded in
/// the batch report or verification summary instead.
#[derive(Debug, Error)]
pub enum DiffLabelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config from {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Failed to write config to {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{role} directory does not exist: {path}")]
    MissingDirectory { role: &'static str, path: PathBuf },

    #[error("Failed to list directory {path}: {message}")]
    DirectoryScan { path: PathBuf, message: String },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid naming pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to write report: {0}")]
    ReportWrite(#[from] csv::Error),

    #[error("Failed to serialize report: {0}")]
    ReportJson(#[from] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("{failed} of {total} image pair(s) failed")]
    BatchFailed { failed: usize, total: usize },

    #[error("Verification found {missing} missing, {incomplete} incomplete and {naming} misnamed file(s)")]
    VerificationFailed {
        missing: usize,
        incomplete: usize,
        naming: usize,
    },
}
