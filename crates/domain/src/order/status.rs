//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::DomainError;
use crate::wire::CodeOrName;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// PendingPayment ──► Paid ──► Completed
///       │              │
///       └──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "CodeOrName", into = "&'static str")]
pub enum OrderStatus {
    /// Created, waiting for a successful payment.
    #[default]
    PendingPayment,

    /// A payment succeeded and the order service was told about it.
    Paid,

    /// Confirmed by the buyer (terminal state).
    Completed,

    /// Cancelled by the buyer, refunded if it had been paid (terminal state).
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Returns true if a payment may be requested or recorded.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Returns true if the order can be completed in this status.
    pub fn can_complete(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment | OrderStatus::Paid)
    }

    /// Returns true if cancelling requires a refund first.
    pub fn requires_refund(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns true if `target` is directly reachable from this status.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        match target {
            OrderStatus::PendingPayment => false,
            OrderStatus::Paid => self.can_pay(),
            OrderStatus::Completed => self.can_complete(),
            OrderStatus::Cancelled => self.can_cancel(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Legacy numeric code.
    pub fn code(&self) -> i64 {
        match self {
            OrderStatus::PendingPayment => 0,
            OrderStatus::Paid => 1,
            OrderStatus::Completed => 2,
            OrderStatus::Cancelled => 3,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

impl TryFrom<CodeOrName> for OrderStatus {
    type Error = DomainError;

    fn try_from(value: CodeOrName) -> Result<Self, Self::Error> {
        match value {
            CodeOrName::Name(name) => name.parse(),
            CodeOrName::Code(code) => OrderStatus::ALL
                .into_iter()
                .find(|status| status.code() == code)
                .ok_or_else(|| DomainError::UnknownValue {
                    kind: "order status",
                    value: code.to_string(),
                }),
        }
    }
}

impl From<OrderStatus> for &'static str {
    fn from(status: OrderStatus) -> Self {
        status.as_str()
    }
}
