use thiserror::Error;

use crate::Version;

/// Errors raised by a repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed between the guard read and the write.
    #[error(
        "Concurrency conflict for {record_type} {key}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        record_type: &'static str,
        key: String,
        expected: Version,
        actual: Version,
    },

    /// The record does not exist.
    #[error("{record_type} not found: {key}")]
    NotFound {
        record_type: &'static str,
        key: String,
    },

    /// A record with the same key already exists.
    #[error("{record_type} already exists: {key}")]
    Duplicate {
        record_type: &'static str,
        key: String,
    },

    /// The backing store could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;
