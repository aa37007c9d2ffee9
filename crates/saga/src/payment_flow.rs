//! The payment side of the lifecycle saga.
//!
//! The payment service owns payment records. It checks the order through the
//! order service before opening a payment, and reports a successful payment
//! back by patching the order to Paid.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderUuid, PaymentUuid, UserId};
use domain::{
    Money, NotificationDraft, NotificationType, OrderStatus, Payment, PaymentDraft, PaymentMethod,
    PaymentStatus,
};
use rpc::RpcError;
use serde::Deserialize;
use serde_json::{Value, json};
use store::{Repository, RepositoryExt, Versioned};

use crate::error::{Result, SagaError};
use crate::peers::{NotificationGateway, OrderGateway};

/// A payment provider's report about one payment.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    pub payment_uuid: PaymentUuid,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub callback_data: Option<Value>,
}

/// Body of the internal refund call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub amount: Option<Money>,
}

pub struct PaymentFlow<R> {
    payments: R,
    orders: Arc<dyn OrderGateway>,
    notifications: Arc<dyn NotificationGateway>,
}

impl<R: Repository<Payment>> PaymentFlow<R> {
    pub fn new(
        payments: R,
        orders: Arc<dyn OrderGateway>,
        notifications: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            payments,
            orders,
            notifications,
        }
    }

    pub fn payments(&self) -> &R {
        &self.payments
    }

    pub(crate) fn order_gateway(&self) -> &dyn OrderGateway {
        self.orders.as_ref()
    }

    /// Opens a payment for a PendingPayment order.
    ///
    /// If the order already has an open payment, that payment is returned
    /// instead of opening a second one.
    #[tracing::instrument(skip(self, draft), fields(user = %user, order_uuid = %draft.order_uuid))]
    pub async fn create_payment(&self, user: UserId, draft: PaymentDraft) -> Result<Payment> {
        let order = match self.orders.fetch_order(draft.order_uuid).await {
            Ok(order) => order,
            Err(e) if e.status() == Some(404) => {
                return Err(SagaError::not_found("order", draft.order_uuid));
            }
            Err(e) => return Err(e.into()),
        };

        if order.buyer_uuid != user {
            return Err(SagaError::not_found("order", draft.order_uuid));
        }
        if !order.status.can_pay() {
            return Err(SagaError::StateGuardViolation {
                record_type: "order",
                from: order.status.to_string(),
                to: OrderStatus::Paid.to_string(),
            });
        }
        if draft.amount != order.total_amount {
            return Err(SagaError::Validation(format!(
                "amount {} does not match order total {}",
                draft.amount, order.total_amount
            )));
        }

        let order_uuid = draft.order_uuid;
        if let Some(existing) = self
            .payments
            .find_one(&move |p: &Payment| p.order_uuid == order_uuid && p.status.is_open())
            .await?
        {
            tracing::info!(payment_uuid = %existing.record.payment_uuid, "returning open payment");
            return Ok(existing.record);
        }

        let payment_id = self.payments.next_sequence().await?;
        let payment = Payment::open(payment_id, user, draft, Utc::now())?;
        let stored = self.payments.insert(payment).await?;
        record_transition(PaymentStatus::Pending);
        tracing::info!(payment_uuid = %stored.record.payment_uuid, "payment opened");
        Ok(stored.record)
    }

    /// Lists the caller's payments, newest first.
    pub async fn list_payments(&self, user: UserId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .find(&move |p: &Payment| p.user_uuid == user)
            .await?
            .into_iter()
            .map(Versioned::into_inner)
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    /// Loads one of the caller's payments.
    pub async fn get_payment(&self, user: UserId, payment_uuid: PaymentUuid) -> Result<Payment> {
        Ok(self.load_owned(user, payment_uuid).await?.record)
    }

    /// Cancels a payment that has not reached an outcome.
    #[tracing::instrument(skip(self), fields(user = %user))]
    pub async fn cancel_payment(&self, user: UserId, payment_uuid: PaymentUuid) -> Result<Payment> {
        let Versioned {
            record: mut payment,
            version,
        } = self.load_owned(user, payment_uuid).await?;

        payment.cancel()?;
        self.payments.update(payment.clone(), version).await?;
        record_transition(payment.status);
        tracing::info!("payment cancelled");
        Ok(payment)
    }

    /// Records a provider callback.
    ///
    /// On success the order is patched to Paid. A failed patch leaves the
    /// payment marked unsynced for the reconciliation sweep; the callback
    /// itself still succeeds.
    #[tracing::instrument(skip(self, callback), fields(payment_uuid = %callback.payment_uuid, outcome = %callback.status))]
    pub async fn handle_callback(
        &self,
        method: PaymentMethod,
        callback: PaymentCallback,
    ) -> Result<Payment> {
        let Versioned {
            record: mut payment,
            mut version,
        } = self.payments.get_required(&callback.payment_uuid).await?;

        if payment.payment_method != method {
            return Err(SagaError::Validation(format!(
                "callback for {method} does not match payment method {}",
                payment.payment_method
            )));
        }

        let changed = payment.record_callback(
            callback.status,
            callback.transaction_id,
            callback.callback_data.unwrap_or_else(|| json!({})),
            Utc::now(),
        )?;
        if changed {
            version = self.payments.update(payment.clone(), version).await?;
            record_transition(payment.status);
            tracing::info!(status = %payment.status, "payment callback recorded");
        } else {
            tracing::info!("duplicate callback ignored");
        }

        match payment.status {
            PaymentStatus::Success if payment.needs_order_sync() => {
                payment = self.sync_order(payment, version).await?;
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled if changed => {
                let reason = payment
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "unknown reason".to_string());
                self.notify(payment_notice(
                    &payment,
                    "Payment failed",
                    format!("Payment {} did not go through: {reason}.", payment.payment_uuid),
                ))
                .await;
            }
            _ => {}
        }
        Ok(payment)
    }

    /// Refunds the successful payment of an order.
    ///
    /// Refunding an already refunded payment succeeds without changes.
    #[tracing::instrument(skip(self, request))]
    pub async fn refund_order(&self, order_uuid: OrderUuid, request: RefundRequest) -> Result<Payment> {
        let Versioned {
            record: mut payment,
            version,
        } = self
            .payments
            .find_one(&move |p: &Payment| {
                p.order_uuid == order_uuid
                    && matches!(p.status, PaymentStatus::Success | PaymentStatus::Refunded)
            })
            .await?
            .ok_or_else(|| SagaError::not_found("payment for order", order_uuid))?;

        if let Some(amount) = request.amount
            && amount != payment.amount
        {
            return Err(SagaError::Validation(format!(
                "refund amount {amount} does not match payment amount {}",
                payment.amount
            )));
        }

        if payment.refund()? {
            self.payments.update(payment.clone(), version).await?;
            record_transition(payment.status);
            tracing::info!(payment_uuid = %payment.payment_uuid, "payment refunded");
        } else {
            tracing::info!("payment already refunded");
        }
        Ok(payment)
    }

    /// Patches the order of a successful payment to Paid and records that it
    /// landed.
    pub(crate) async fn sync_order(
        &self,
        mut payment: Payment,
        version: store::Version,
    ) -> Result<Payment> {
        match self
            .orders
            .patch_status(payment.order_uuid, OrderStatus::Paid, payment.paid_at)
            .await
        {
            Ok(()) => {
                payment.mark_order_synced();
                self.payments.update(payment.clone(), version).await?;
                tracing::info!(order_uuid = %payment.order_uuid, "order marked paid");
            }
            Err(e) => log_sync_failure(&payment, &e),
        }
        Ok(payment)
    }

    /// Records that the order already reflects this payment.
    pub(crate) async fn mark_synced(&self, mut payment: Payment, version: store::Version) -> Result<()> {
        payment.mark_order_synced();
        self.payments.update(payment, version).await?;
        Ok(())
    }

    async fn load_owned(&self, user: UserId, payment_uuid: PaymentUuid) -> Result<Versioned<Payment>> {
        match self.payments.get(&payment_uuid).await? {
            Some(found) if found.record.user_uuid == user => Ok(found),
            _ => Err(SagaError::not_found("payment", payment_uuid)),
        }
    }

    async fn notify(&self, draft: NotificationDraft) {
        crate::notify_best_effort(self.notifications.as_ref(), &draft).await;
    }
}

fn log_sync_failure(payment: &Payment, err: &RpcError) {
    metrics::counter!("payment_order_sync_failures_total").increment(1);
    tracing::error!(
        order_uuid = %payment.order_uuid,
        payment_uuid = %payment.payment_uuid,
        error = %err,
        "payment succeeded but order was not updated; left for reconciliation"
    );
}

fn record_transition(to: PaymentStatus) {
    metrics::counter!("saga_transitions_total", "record" => "payment", "to" => to.as_str())
        .increment(1);
}

fn payment_notice(payment: &Payment, title: &str, content: String) -> NotificationDraft {
    NotificationDraft {
        user_uuid: payment.user_uuid,
        kind: NotificationType::Transaction,
        title: title.to_string(),
        content,
        related_id: Some(payment.payment_uuid.to_string()),
        related_data: Some(json!({
            "order_uuid": payment.order_uuid,
            "status": payment.status,
        })),
    }
}
