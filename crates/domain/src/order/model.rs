use chrono::{DateTime, Utc};
use common::{OrderUuid, ProductUuid, UserId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::{DomainError, Money, PaymentMethod};

/// Name stored when the product service cannot tell us better.
pub const FALLBACK_PRODUCT_NAME: &str = "Product";

/// A requested line of a new order, before product details are looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_uuid: ProductUuid,
    pub quantity: u32,
    pub price: Money,
}

/// Checks that an order has lines and every line has a positive quantity and
/// price.
pub fn validate_lines(lines: &[OrderLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::Validation(
            "order must contain at least one product".to_string(),
        ));
    }
    for line in lines {
        if line.quantity == 0 {
            return Err(DomainError::Validation(format!(
                "quantity for product {} must be greater than 0",
                line.product_uuid
            )));
        }
        if !line.price.is_positive() {
            return Err(DomainError::Validation(format!(
                "price for product {} must be greater than 0",
                line.product_uuid
            )));
        }
    }
    Ok(())
}

/// Product details copied into the order at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub name: String,
    pub image: Option<String>,
}

impl ProductSnapshot {
    pub fn fallback() -> Self {
        Self {
            name: FALLBACK_PRODUCT_NAME.to_string(),
            image: None,
        }
    }
}

/// An item of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_uuid: ProductUuid,
    pub product_name: String,
    #[serde(default)]
    pub product_image: Option<String>,
    /// Listed price at the time of ordering.
    pub product_price: Money,
    /// Price actually charged per unit.
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    fn from_line(line: OrderLine, snapshot: ProductSnapshot) -> Self {
        Self {
            product_uuid: line.product_uuid,
            product_name: snapshot.name,
            product_image: snapshot.image,
            product_price: line.price,
            price: line.price,
            quantity: line.quantity,
        }
    }

    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    #[serde(rename = "shipping_name")]
    pub name: String,
    #[serde(rename = "shipping_phone")]
    pub phone: String,
    #[serde(rename = "shipping_address")]
    pub address: String,
    #[serde(rename = "shipping_postal_code", default)]
    pub postal_code: Option<String>,
}

/// Everything the buyer submits to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    #[serde(rename = "products")]
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub seller_uuid: Option<UserId>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(flatten)]
    pub shipping: ShippingInfo,
}

impl OrderDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_lines(&self.lines)?;
        if self.shipping.name.trim().is_empty()
            || self.shipping.phone.trim().is_empty()
            || self.shipping.address.trim().is_empty()
        {
            return Err(DomainError::Validation(
                "shipping name, phone and address are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// An order as owned by the order service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    pub order_uuid: OrderUuid,
    pub buyer_uuid: UserId,
    pub seller_uuid: Option<UserId>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment_time: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub cancel_reason: Option<String>,
    #[serde(flatten)]
    pub shipping: ShippingInfo,
    #[serde(rename = "products")]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Places a new order awaiting payment.
    ///
    /// `snapshots` holds the product details for each draft line, in order.
    pub fn place(
        order_id: u64,
        buyer_uuid: UserId,
        draft: OrderDraft,
        snapshots: Vec<ProductSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        draft.validate()?;
        if snapshots.len() != draft.lines.len() {
            return Err(DomainError::Validation(
                "product details do not match order lines".to_string(),
            ));
        }

        let items: Vec<OrderItem> = draft
            .lines
            .into_iter()
            .zip(snapshots)
            .map(|(line, snapshot)| OrderItem::from_line(line, snapshot))
            .collect();
        let line_totals = items
            .iter()
            .map(OrderItem::line_total)
            .collect::<Result<Vec<_>, _>>()?;
        let total_amount = Money::checked_sum(line_totals)?;

        Ok(Self {
            order_id,
            order_uuid: OrderUuid::new(),
            buyer_uuid,
            seller_uuid: draft.seller_uuid,
            total_amount,
            status: OrderStatus::PendingPayment,
            payment_method: draft.payment_method,
            created_at: now,
            updated_at: now,
            payment_time: None,
            remark: draft.remark,
            cancel_reason: None,
            shipping: draft.shipping,
            items,
        })
    }

    /// Records a successful payment.
    pub fn mark_paid(
        &mut self,
        payment_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.guard(OrderStatus::Paid)?;
        self.status = OrderStatus::Paid;
        self.payment_time = Some(payment_time);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.guard(OrderStatus::Completed)?;
        self.status = OrderStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.guard(OrderStatus::Cancelled)?;
        self.status = OrderStatus::Cancelled;
        self.cancel_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    /// Moves the order to `target` on behalf of a peer.
    ///
    /// Peers may only mark an order Paid; completion is the buyer's call and
    /// cancellation has to go through the refund path. Asking for the status
    /// the order already has is an idempotent no-op and returns false.
    pub fn apply_status(
        &mut self,
        target: OrderStatus,
        payment_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        if self.status == target {
            return Ok(false);
        }
        if target != OrderStatus::Paid {
            return Err(DomainError::transition(
                "order",
                self.status.as_str(),
                target.as_str(),
            ));
        }
        self.mark_paid(payment_time.unwrap_or(now), now)?;
        Ok(true)
    }

    fn guard(&self, target: OrderStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(DomainError::transition(
                "order",
                self.status.as_str(),
                target.as_str(),
            ))
        }
    }
}

impl store::Record for Order {
    type Key = OrderUuid;

    fn record_type() -> &'static str {
        "order"
    }

    fn key(&self) -> Self::Key {
        self.order_uuid
    }
}

/// Ordering of an order listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    #[default]
    CreatedDesc,
    CreatedAsc,
    AmountDesc,
    AmountAsc,
}

impl OrderSort {
    pub fn apply(&self, orders: &mut [Order]) {
        match self {
            OrderSort::CreatedDesc => orders.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            OrderSort::CreatedAsc => orders.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            OrderSort::AmountDesc => orders.sort_by(|a, b| b.total_amount.cmp(&a.total_amount)),
            OrderSort::AmountAsc => orders.sort_by(|a, b| a.total_amount.cmp(&b.total_amount)),
        }
    }
}

/// Per-buyer order counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub total_orders: usize,
    pub pending_payment: usize,
    pub paid: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub total_amount: Money,
}

impl OrderStats {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        orders.into_iter().fold(Self::default(), |mut stats, order| {
            stats.total_orders += 1;
            stats.total_amount = stats.total_amount.saturating_add(order.total_amount);
            match order.status {
                OrderStatus::PendingPayment => stats.pending_payment += 1,
                OrderStatus::Paid => stats.paid += 1,
                OrderStatus::Completed => stats.completed += 1,
                OrderStatus::Cancelled => stats.cancelled += 1,
            }
            stats
        })
    }
}
