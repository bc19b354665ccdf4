use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::work::Mode;

/// Main error type for gaptune
#[derive(Error, Debug)]
pub enum GtError {
    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Polling error: {0}")]
    Polling(#[from] PollingError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Wait cancelled before all jobs settled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The scheduler refused or garbled a submission.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error("failed to launch {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("submission command exited with {status:?}: {stderr}")]
    CommandFailed { status: Option<i32>, stderr: String },

    #[error("could not read a job id from submission output: {output:?}")]
    UnparsableHandle { output: String },

    #[error("submission rejected: {message}")]
    Rejected { message: String },

    #[error("could not clear previous artifact {path}: {message}")]
    StaleArtifact { path: String, message: String },
}

/// A status query could not be answered. Retried by the poller, never
/// surfaced as an item failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollingError {
    #[error("failed to launch {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("status command exited with {status:?}: {stderr}")]
    CommandFailed { status: Option<i32>, stderr: String },

    #[error("status query timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Why an artifact could not be turned into numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionErrorKind {
    MissingArtifact,
    MissingCompletionMarker,
    PatternNotFound,
    ParseError,
}

/// Extraction failure for one artifact. Carries the mode so the retry path
/// knows which job to resubmit.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{mode} artifact {}: {kind:?} ({detail})", .path.display())]
pub struct ExtractionError {
    pub mode: Mode,
    pub path: PathBuf,
    pub kind: ExtractionErrorKind,
    pub detail: String,
}

impl ExtractionError {
    pub fn missing_artifact(mode: Mode, path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            path: path.into(),
            kind: ExtractionErrorKind::MissingArtifact,
            detail: "file not found".to_string(),
        }
    }

    pub fn missing_marker(mode: Mode, path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            path: path.into(),
            kind: ExtractionErrorKind::MissingCompletionMarker,
            detail: "no completion marker".to_string(),
        }
    }

    pub fn pattern_not_found(mode: Mode, path: impl Into<PathBuf>, field: &str) -> Self {
        Self {
            mode,
            path: path.into(),
            kind: ExtractionErrorKind::PatternNotFound,
            detail: format!("field {field} not found"),
        }
    }

    pub fn parse(mode: Mode, path: impl Into<PathBuf>, field: &str, value: &str) -> Self {
        Self {
            mode,
            path: path.into(),
            kind: ExtractionErrorKind::ParseError,
            detail: format!("field {field} has unparsable value {value:?}"),
        }
    }
}

/// Tabular input/output errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("CSV error in {path}: {message}")]
    Csv { path: String, message: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Missing column {column} in {path}")]
    MissingColumn { path: String, column: String },

    #[error("Invalid value {value:?} for {column} at line {line} of {path}")]
    InvalidValue {
        path: String,
        line: usize,
        column: String,
        value: String,
    },
}

/// Result type alias for gaptune operations
pub type GtResult<T> = Result<T, GtError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::GtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::GtError::Config(format!($($arg)*))
    };
}
