//! Domain error types.

use thiserror::Error;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The record's current status does not allow the requested transition.
    #[error("Cannot move {record_type} from {from} to {to}")]
    InvalidTransition {
        record_type: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A money amount could not be parsed or is out of range.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// An enum value on the wire is not recognized.
    #[error("Unknown {kind}: {value}")]
    UnknownValue { kind: &'static str, value: String },
}

impl DomainError {
    pub(crate) fn transition(record_type: &'static str, from: &'static str, to: &'static str) -> Self {
        DomainError::InvalidTransition {
            record_type,
            from,
            to,
        }
    }
}
