use thiserror::Error as ThisError;

use crate::pipeline::sanity::SanityFailure;

#[derive(ThisError, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {}", .0.join(", "))]
    Config(Vec<String>),

    #[error("Index is not strictly increasing at row {row}: {previous} -> {current}")]
    NonMonotonicIndex {
        row: usize,
        previous: String,
        current: String,
    },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Lost windows during augmentation: {before} windows in, {after} windows out")]
    WindowCountMismatch { before: usize, after: usize },

    #[error("No fitted scaler for column '{0}' (feature set differs from training)")]
    MissingScaler(String),

    #[error("Scaler state must be frozen before it is applied")]
    ScalerNotFrozen,

    #[error("Scaler state is frozen; cannot refit column '{0}'")]
    ScalerFrozen(String),

    #[error("No usable windows: {0}")]
    NoUsableWindows(String),

    #[error("{undefined} of {total} samples have an undefined label at the target row")]
    UndefinedLabels { undefined: usize, total: usize },

    #[error("{0}")]
    Sanity(Box<SanityFailure>),

    #[error("X holds {count} NaN/Inf values (allowed {allowed})")]
    NonFiniteInputs { count: usize, allowed: usize },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(String),
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Csv(err.to_string())
    }
}

impl From<SanityFailure> for PipelineError {
    fn from(failure: SanityFailure) -> Self {
        PipelineError::Sanity(Box::new(failure))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
