//! Error types for the training engine

use thiserror::Error;

/// Errors raised by the training engine.
///
/// Numerical edge cases (log of zero, division by zero) are never reported
/// here: they are guarded with epsilon biases at the point of computation.
#[derive(Error, Debug)]
pub enum Error {
    #[error("dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing data: {0}")]
    MissingData(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("thread pool task failed: {0}")]
    TaskFailed(String),

    #[error("thread pool is shut down")]
    PoolShutDown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn mismatch(what: impl Into<String>, expected: usize, got: usize) -> Self {
        Error::DimensionMismatch {
            what: what.into(),
            expected,
            got,
        }
    }
}
