use chrono::{DateTime, Utc};
use common::{OrderUuid, PaymentUuid, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{PaymentMethod, PaymentStatus};
use crate::{DomainError, Money};

const DEFAULT_FAILURE_REASON: &str = "Payment failed";
const USER_CANCEL_REASON: &str = "Cancelled by user";
const MAX_SUBJECT_LEN: usize = 255;

/// What a buyer submits to pay for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub order_uuid: OrderUuid,
    pub payment_method: PaymentMethod,
    pub amount: Money,
    pub payment_subject: String,
}

/// A payment attempt as owned by the payment service.
///
/// Linked to its order only through `order_uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: u64,
    pub payment_uuid: PaymentUuid,
    pub order_uuid: OrderUuid,
    pub user_uuid: UserId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_subject: String,
    pub payment_data: Value,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub callback_received: bool,
    pub callback_data: Value,
    pub callback_time: Option<DateTime<Utc>>,
    /// False while a successful payment has not yet been reflected on the order.
    pub order_synced: bool,
}

impl Payment {
    /// Opens a pending payment with simulated provider data.
    pub fn open(
        payment_id: u64,
        user_uuid: UserId,
        draft: PaymentDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !draft.amount.is_positive() {
            return Err(DomainError::Validation(
                "payment amount must be greater than 0".to_string(),
            ));
        }
        let subject = draft.payment_subject.trim();
        if subject.is_empty() || subject.len() > MAX_SUBJECT_LEN {
            return Err(DomainError::Validation(format!(
                "payment subject must be 1 to {MAX_SUBJECT_LEN} characters"
            )));
        }

        let payment_uuid = PaymentUuid::new();
        Ok(Self {
            payment_id,
            payment_uuid,
            order_uuid: draft.order_uuid,
            user_uuid,
            amount: draft.amount,
            payment_method: draft.payment_method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_subject: subject.to_string(),
            payment_data: json!({
                "qr_code": format!("https://payment.example.com/qr/{payment_uuid}"),
                "payment_url": format!("https://payment.example.com/pay/{payment_uuid}"),
            }),
            failure_reason: None,
            created_at: now,
            paid_at: None,
            callback_received: false,
            callback_data: json!({}),
            callback_time: None,
            order_synced: false,
        })
    }

    /// Records the outcome reported by the payment provider.
    ///
    /// A repeated callback with the outcome already recorded is a no-op and
    /// returns false. Outcomes can only be recorded while the payment is
    /// still open.
    pub fn record_callback(
        &mut self,
        outcome: PaymentStatus,
        transaction_id: Option<String>,
        callback_data: Value,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        if !outcome.is_callback_outcome() {
            return Err(DomainError::Validation(format!(
                "{outcome} is not a valid callback outcome"
            )));
        }
        if self.callback_received && self.status == outcome {
            return Ok(false);
        }
        if !self.status.is_open() {
            return Err(DomainError::transition(
                "payment",
                self.status.as_str(),
                outcome.as_str(),
            ));
        }

        self.status = outcome;
        if transaction_id.is_some() {
            self.transaction_id = transaction_id;
        }
        self.callback_received = true;
        self.callback_time = Some(now);

        match outcome {
            PaymentStatus::Success => {
                self.paid_at = Some(now);
                self.order_synced = false;
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled => {
                self.failure_reason = Some(
                    callback_data
                        .get("failure_reason")
                        .and_then(Value::as_str)
                        .unwrap_or(DEFAULT_FAILURE_REASON)
                        .to_string(),
                );
            }
            _ => {}
        }
        self.callback_data = callback_data;
        Ok(true)
    }

    /// Cancels a payment that has not reached an outcome.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        if !self.status.is_open() {
            return Err(DomainError::transition(
                "payment",
                self.status.as_str(),
                PaymentStatus::Cancelled.as_str(),
            ));
        }
        self.status = PaymentStatus::Cancelled;
        self.failure_reason = Some(USER_CANCEL_REASON.to_string());
        Ok(())
    }

    /// Refunds a successful payment. Refunding twice is a no-op returning false.
    pub fn refund(&mut self) -> Result<bool, DomainError> {
        match self.status {
            PaymentStatus::Refunded => Ok(false),
            status if status.can_refund() => {
                self.status = PaymentStatus::Refunded;
                Ok(true)
            }
            status => Err(DomainError::transition(
                "payment",
                status.as_str(),
                PaymentStatus::Refunded.as_str(),
            )),
        }
    }

    /// Returns true if this payment succeeded but its order may still be
    /// waiting for the news.
    pub fn needs_order_sync(&self) -> bool {
        self.status == PaymentStatus::Success && !self.order_synced
    }

    pub fn mark_order_synced(&mut self) {
        self.order_synced = true;
    }
}

impl store::Record for Payment {
    type Key = PaymentUuid;

    fn record_type() -> &'static str {
        "payment"
    }

    fn key(&self) -> Self::Key {
        self.payment_uuid
    }
}
