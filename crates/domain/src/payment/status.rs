//! Payment status state machine.

use serde::{Deserialize, Serialize};

use crate::DomainError;
use crate::wire::CodeOrName;

/// The status of a payment.
///
/// ```text
/// Pending ──► Processing ──┬──► Success ──► Refunded
///    │            │        ├──► Failed
///    └────────────┴────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "CodeOrName", into = "&'static str")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Success,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
    ];

    /// Returns true while the payment still awaits an outcome.
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    /// Returns true for statuses a provider callback may report.
    pub fn is_callback_outcome(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Processing
                | PaymentStatus::Success
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
        )
    }

    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Legacy numeric code.
    pub fn code(&self) -> i64 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Processing => 1,
            PaymentStatus::Success => 2,
            PaymentStatus::Failed => 3,
            PaymentStatus::Cancelled => 4,
            PaymentStatus::Refunded => 5,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "payment status",
                value: s.to_string(),
            })
    }
}

impl TryFrom<CodeOrName> for PaymentStatus {
    type Error = DomainError;

    fn try_from(value: CodeOrName) -> Result<Self, Self::Error> {
        match value {
            CodeOrName::Name(name) => name.parse(),
            CodeOrName::Code(code) => PaymentStatus::ALL
                .into_iter()
                .find(|status| status.code() == code)
                .ok_or_else(|| DomainError::UnknownValue {
                    kind: "payment status",
                    value: code.to_string(),
                }),
        }
    }
}

impl From<PaymentStatus> for &'static str {
    fn from(status: PaymentStatus) -> Self {
        status.as_str()
    }
}
