//! Error types for import and session handling.

use std::path::PathBuf;
use thiserror::Error;

use mpcore::MpError;

use crate::session::Stage;

/// Raised by the import collaborator. A failed import never yields a dataset.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing column in {path}: expected one of {expected:?}")]
    MissingColumn { path: PathBuf, expected: Vec<&'static str> },

    #[error("Invalid value '{value}' at row {row}, column '{column}'")]
    InvalidValue { row: usize, column: String, value: String },

    #[error("Invalid dataset: {0}")]
    Dataset(#[from] MpError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] MpError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Stage '{missing}' has not been run yet")]
    NotFitted { missing: Stage },

    #[error("None of the {0} input files could be imported")]
    NothingImported(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
