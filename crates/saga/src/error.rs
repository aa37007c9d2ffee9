//! Saga error types.

use domain::DomainError;
use rpc::RpcError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while driving a lifecycle transition.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The record's persisted status does not allow the transition.
    #[error("Cannot move {record_type} from {from} to {to}")]
    StateGuardViolation {
        record_type: &'static str,
        from: String,
        to: String,
    },

    /// Request input was rejected before any mutation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The record does not exist, or is not visible to the caller.
    #[error("{record_type} not found: {key}")]
    NotFound {
        record_type: &'static str,
        key: String,
    },

    /// A peer service call failed.
    #[error("Peer call failed: {0}")]
    Rpc(#[from] RpcError),

    /// The local store failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl SagaError {
    pub(crate) fn not_found(record_type: &'static str, key: impl ToString) -> Self {
        SagaError::NotFound {
            record_type,
            key: key.to_string(),
        }
    }
}

impl From<DomainError> for SagaError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition {
                record_type,
                from,
                to,
            } => SagaError::StateGuardViolation {
                record_type,
                from: from.to_string(),
                to: to.to_string(),
            },
            other => SagaError::Validation(other.to_string()),
        }
    }
}

impl From<StoreError> for SagaError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { record_type, key } => SagaError::NotFound { record_type, key },
            other => SagaError::Store(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
