//! The order side of the lifecycle saga.
//!
//! The order service owns the saga state (the order status). Every transition
//! reads the persisted order, checks the guard, calls peers where the step
//! needs them and writes back with the version it read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderUuid, ProductUuid, UserId};
use domain::{
    NotificationDraft, NotificationType, Order, OrderDraft, OrderSort, OrderStats, OrderStatus,
    Payment, PaymentDraft, PaymentMethod, ProductSnapshot,
};
use serde::Deserialize;
use serde_json::json;
use store::{Repository, RepositoryExt, Versioned};

use crate::error::{Result, SagaError};
use crate::peers::{NotificationGateway, PaymentGateway, ProductCatalog};
use crate::query::Page;

/// Filters for a buyer's order listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderQuery {
    /// Status name, or `all`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sort: OrderSort,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl OrderQuery {
    fn status_filter(&self) -> Result<Option<OrderStatus>> {
        match self.status.as_deref() {
            None | Some("") | Some("all") => Ok(None),
            Some(name) => Ok(Some(name.parse()?)),
        }
    }
}

/// Optional overrides when asking for a payment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_subject: Option<String>,
}

/// The only fields a peer may change on an order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderPatch {
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_time: Option<DateTime<Utc>>,
}

/// Drives order transitions and the peer calls they need.
pub struct OrderSaga<R> {
    orders: R,
    payments: Arc<dyn PaymentGateway>,
    notifications: Arc<dyn NotificationGateway>,
    products: Arc<dyn ProductCatalog>,
}

impl<R: Repository<Order>> OrderSaga<R> {
    pub fn new(
        orders: R,
        payments: Arc<dyn PaymentGateway>,
        notifications: Arc<dyn NotificationGateway>,
        products: Arc<dyn ProductCatalog>,
    ) -> Self {
        Self {
            orders,
            payments,
            notifications,
            products,
        }
    }

    /// Returns the underlying order store.
    pub fn orders(&self) -> &R {
        &self.orders
    }

    /// Places a new order in PendingPayment.
    ///
    /// Product names and images are looked up best-effort; lines the catalog
    /// cannot describe get a placeholder name.
    #[tracing::instrument(skip(self, draft), fields(buyer = %buyer))]
    pub async fn create_order(&self, buyer: UserId, draft: OrderDraft) -> Result<Order> {
        draft.validate()?;

        let mut snapshots = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            snapshots.push(self.product_snapshot(line.product_uuid).await);
        }

        let order_id = self.orders.next_sequence().await?;
        let order = Order::place(order_id, buyer, draft, snapshots, Utc::now())?;
        let stored = self.orders.insert(order).await?;

        record_transition(OrderStatus::PendingPayment);
        tracing::info!(
            order_id,
            order_uuid = %stored.record.order_uuid,
            total = %stored.record.total_amount,
            "order placed"
        );
        Ok(stored.record)
    }

    /// Lists the caller's orders.
    pub async fn list_orders(&self, buyer: UserId, query: &OrderQuery) -> Result<Page<Order>> {
        let status = query.status_filter()?;
        let mut orders: Vec<Order> = self
            .orders
            .find(&move |o: &Order| {
                o.buyer_uuid == buyer && status.is_none_or(|s| o.status == s)
            })
            .await?
            .into_iter()
            .map(Versioned::into_inner)
            .collect();
        query.sort.apply(&mut orders);
        Ok(Page::paginate(orders, query.page, query.page_size))
    }

    /// Loads one of the caller's orders.
    pub async fn get_order(&self, buyer: UserId, order_id: u64) -> Result<Order> {
        Ok(self.load_owned(buyer, order_id).await?.record)
    }

    /// Loads any order by uuid, for peers.
    pub async fn get_internal(&self, order_uuid: OrderUuid) -> Result<Order> {
        Ok(self.orders.get_required(&order_uuid).await?.record)
    }

    pub async fn stats(&self, buyer: UserId) -> Result<OrderStats> {
        let orders = self
            .orders
            .find(&move |o: &Order| o.buyer_uuid == buyer)
            .await?;
        Ok(OrderStats::from_orders(orders.iter().map(|v| &v.record)))
    }

    /// Asks the payment service to open a payment for a PendingPayment order.
    ///
    /// The order itself is not changed; it moves to Paid only when the
    /// payment service reports success.
    #[tracing::instrument(skip(self, request), fields(buyer = %buyer))]
    pub async fn request_payment(
        &self,
        buyer: UserId,
        order_id: u64,
        request: PaymentRequest,
    ) -> Result<Payment> {
        let order = self.load_owned(buyer, order_id).await?.record;
        if !order.status.can_pay() {
            return Err(guard_violation(order.status, OrderStatus::Paid));
        }

        let payment_method = request
            .payment_method
            .or(order.payment_method)
            .ok_or_else(|| SagaError::Validation("payment method is required".to_string()))?;
        let payment_subject = request
            .payment_subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("Order {}", order.order_id));

        let draft = PaymentDraft {
            order_uuid: order.order_uuid,
            payment_method,
            amount: order.total_amount,
            payment_subject,
        };
        let payment = self.payments.create_payment(buyer, &draft).await?;
        tracing::info!(payment_uuid = %payment.payment_uuid, "payment requested");
        Ok(payment)
    }

    /// Applies a status change requested by a peer.
    ///
    /// Patching to the status the order already has succeeds without writing.
    #[tracing::instrument(skip(self, patch), fields(target = %patch.status))]
    pub async fn apply_patch(&self, order_uuid: OrderUuid, patch: OrderPatch) -> Result<Order> {
        let Versioned {
            record: mut order,
            version,
        } = self.orders.get_required(&order_uuid).await?;

        let changed = order.apply_status(patch.status, patch.payment_time, Utc::now())?;
        if !changed {
            tracing::debug!("order already in requested status");
            return Ok(order);
        }

        self.orders.update(order.clone(), version).await?;
        record_transition(order.status);
        tracing::info!(order_id = order.order_id, status = %order.status, "order patched");

        if order.status == OrderStatus::Paid {
            self.notify(order_notice(
                &order,
                "Payment received",
                format!("Payment for order {} was received.", order.order_id),
            ))
            .await;
        }
        Ok(order)
    }

    /// Completes a Paid order.
    #[tracing::instrument(skip(self), fields(buyer = %buyer))]
    pub async fn complete_order(&self, buyer: UserId, order_id: u64) -> Result<Order> {
        let Versioned {
            record: mut order,
            version,
        } = self.load_owned(buyer, order_id).await?;

        order.complete(Utc::now())?;
        self.orders.update(order.clone(), version).await?;
        record_transition(order.status);
        tracing::info!("order completed");

        self.notify(order_notice(
            &order,
            "Order completed",
            format!("Order {} is complete.", order.order_id),
        ))
        .await;
        Ok(order)
    }

    /// Cancels an order that has not been completed.
    ///
    /// A paid order is refunded first; if the refund fails the order stays
    /// Paid and the error is returned.
    #[tracing::instrument(skip(self, reason), fields(buyer = %buyer))]
    pub async fn cancel_order(
        &self,
        buyer: UserId,
        order_id: u64,
        reason: Option<String>,
    ) -> Result<Order> {
        let Versioned {
            record: mut order,
            version,
        } = self.load_owned(buyer, order_id).await?;

        if !order.status.can_cancel() {
            return Err(guard_violation(order.status, OrderStatus::Cancelled));
        }

        let refunded = order.status.requires_refund();
        if refunded {
            self.payments
                .refund(order.order_uuid, order.total_amount)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "refund failed, order stays paid"))?;
            tracing::info!("payment refunded");
        }

        order.cancel(reason, Utc::now())?;
        self.orders.update(order.clone(), version).await?;
        record_transition(order.status);
        tracing::info!(refunded, "order cancelled");

        let content = if refunded {
            format!(
                "Order {} was cancelled and {} has been refunded.",
                order.order_id, order.total_amount
            )
        } else {
            format!("Order {} was cancelled.", order.order_id)
        };
        self.notify(order_notice(&order, "Order cancelled", content))
            .await;
        Ok(order)
    }

    async fn load_owned(&self, buyer: UserId, order_id: u64) -> Result<Versioned<Order>> {
        self.orders
            .find_one(&move |o: &Order| o.order_id == order_id && o.buyer_uuid == buyer)
            .await?
            .ok_or_else(|| SagaError::not_found("order", order_id))
    }

    async fn product_snapshot(&self, product_uuid: ProductUuid) -> ProductSnapshot {
        match self.products.lookup(product_uuid).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => ProductSnapshot::fallback(),
            Err(e) => {
                tracing::warn!(%product_uuid, error = %e, "product lookup failed, using placeholder");
                ProductSnapshot::fallback()
            }
        }
    }

    async fn notify(&self, draft: NotificationDraft) {
        crate::notify_best_effort(self.notifications.as_ref(), &draft).await;
    }
}

fn guard_violation(from: OrderStatus, to: OrderStatus) -> SagaError {
    SagaError::StateGuardViolation {
        record_type: "order",
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn record_transition(to: OrderStatus) {
    metrics::counter!("saga_transitions_total", "record" => "order", "to" => to.as_str())
        .increment(1);
}

fn order_notice(order: &Order, title: &str, content: String) -> NotificationDraft {
    NotificationDraft {
        user_uuid: order.buyer_uuid,
        kind: NotificationType::Transaction,
        title: title.to_string(),
        content,
        related_id: Some(order.order_uuid.to_string()),
        related_data: Some(json!({
            "order_id": order.order_id,
            "status": order.status,
        })),
    }
}
