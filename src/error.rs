use std::path::PathBuf;
use thiserror::Error;

use crate::scan::ScanReport;

/// Result alias used throughout mepkit.
pub type Result<T, E = MepError> = std::result::Result<T, E>;

/// The main error type for mepkit operations.
#[derive(Debug, Error)]
pub enum MepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key: the secret must not be empty")]
    InvalidKey,

    #[error("No key installed and none could be recovered from {channel}")]
    NoKey { channel: String },

    #[error("No label file for image {image}: expected {expected}")]
    MissingLabel { image: PathBuf, expected: PathBuf },

    #[error("Cannot open container {path} without a key")]
    KeyMissingButContainerPath { path: PathBuf },

    #[error("Verification of {path} failed: {message}")]
    VerificationFailed { path: PathBuf, message: String },

    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to re-encode image {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Refusing to overwrite existing output file {path}")]
    OutputExists { path: PathBuf },

    #[error("Invalid dataset layout at {path}: {message}")]
    DatasetLayout { path: PathBuf, message: String },

    #[error("Dataset scan found {error_count} error(s) and {warning_count} warning(s)")]
    ScanFailed {
        error_count: usize,
        warning_count: usize,
        report: ScanReport,
    },

    #[error("Failed to serialize report as JSON: {0}")]
    ReportJson(#[source] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}
