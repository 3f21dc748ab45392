//! Error types shared by every stage of the analysis pipeline.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MpError {
    /// Caller error, raised before any computation starts.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Input is empty or degenerate; the stage cannot produce a meaningful result.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A summary was requested from a fit that did not converge.
    #[error("Fit did not converge; parameters are not usable for reporting")]
    NotConverged,

    #[error("Numerical error: {0}")]
    Numerical(String),
}

pub type Result<T> = std::result::Result<T, MpError>;
