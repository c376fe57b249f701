//! Error types for the LSH index

use thiserror::Error;

/// Result type alias for LSH operations
pub type Result<T> = std::result::Result<T, LshError>;

/// A single record that could not be indexed during a train call.
#[derive(Debug)]
pub struct RecordFailure {
    pub id: String,
    pub error: LshError,
}

/// Error types that can occur in LSH operations
#[derive(Error, Debug)]
pub enum LshError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Duplicate record id: {id}")]
    DuplicateId { id: String },

    #[error("Vector not found: {id}")]
    VectorNotFound { id: String },

    #[error("Unsupported distance metric: {name}")]
    UnsupportedMetric { name: String },

    #[error("Distance can't be calculated: {reason}")]
    Distance { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Training failed for {} of {total} records", .failures.len())]
    TrainFailed {
        failures: Vec<RecordFailure>,
        total: usize,
    },
}

impl LshError {
    /// Whether this error came from distance computation (including metric resolution).
    pub fn is_distance_error(&self) -> bool {
        matches!(
            self,
            LshError::UnsupportedMetric { .. } | LshError::Distance { .. }
        )
    }

    /// Whether the caller sent something invalid, as opposed to a backend failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            LshError::Config(_)
                | LshError::DimensionMismatch { .. }
                | LshError::DuplicateId { .. }
                | LshError::UnsupportedMetric { .. }
                | LshError::Distance { .. }
        )
    }
}
