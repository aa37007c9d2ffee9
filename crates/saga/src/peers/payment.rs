//! Payment service gateway, used by the order side.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use common::services::{PAYMENT_SERVICE, USER_ID_HEADER};
use common::{OrderUuid, UserId};
use domain::{Money, Payment, PaymentDraft, PaymentStatus};
use rpc::{Method, RpcError, ServiceClient};
use serde_json::json;

use super::{rejected, unreachable_peer};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens (or returns the already open) payment for an order on behalf of
    /// `caller`.
    async fn create_payment(&self, caller: UserId, draft: &PaymentDraft)
    -> Result<Payment, RpcError>;

    /// Refunds the successful payment of an order.
    async fn refund(&self, order_uuid: OrderUuid, amount: Money) -> Result<(), RpcError>;
}

/// Payment gateway over HTTP.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: ServiceClient,
}

impl HttpPaymentGateway {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment(
        &self,
        caller: UserId,
        draft: &PaymentDraft,
    ) -> Result<Payment, RpcError> {
        let body = serde_json::to_value(draft).map_err(|e| RpcError::DecodeFailure {
            service: PAYMENT_SERVICE.to_string(),
            message: e.to_string(),
        })?;
        let response = self
            .client
            .call_with_headers(
                PAYMENT_SERVICE,
                Method::POST,
                "/payment/create",
                Some(&body),
                &[(USER_ID_HEADER, caller.to_string())],
            )
            .await?;
        rpc::decode_data(PAYMENT_SERVICE, response)
    }

    async fn refund(&self, order_uuid: OrderUuid, amount: Money) -> Result<(), RpcError> {
        let response = self
            .client
            .post(
                PAYMENT_SERVICE,
                &format!("/payment/{order_uuid}/refund"),
                &json!({ "amount": amount }),
            )
            .await?;
        rpc::unwrap_data(PAYMENT_SERVICE, response)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<OrderUuid, Payment>,
    refunds: Vec<OrderUuid>,
    next_id: u64,
    unreachable: bool,
    fail_on_create: bool,
    fail_on_refund: bool,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Marks the payment of an order successful, as a provider callback would.
    pub fn settle(&self, order_uuid: OrderUuid) {
        if let Some(payment) = self.state.write().unwrap().payments.get_mut(&order_uuid) {
            payment.status = PaymentStatus::Success;
        }
    }

    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    pub fn status_of(&self, order_uuid: OrderUuid) -> Option<PaymentStatus> {
        self.state
            .read()
            .unwrap()
            .payments
            .get(&order_uuid)
            .map(|p| p.status)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_payment(
        &self,
        caller: UserId,
        draft: &PaymentDraft,
    ) -> Result<Payment, RpcError> {
        let mut state = self.state.write().unwrap();
        if state.unreachable {
            return Err(unreachable_peer(PAYMENT_SERVICE));
        }
        if state.fail_on_create {
            return Err(rejected(PAYMENT_SERVICE, 400, "payment declined"));
        }
        if let Some(existing) = state.payments.get(&draft.order_uuid)
            && existing.status.is_open()
        {
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let payment = Payment::open(state.next_id, caller, draft.clone(), Utc::now())
            .map_err(|e| rejected(PAYMENT_SERVICE, 400, e.to_string()))?;
        state.payments.insert(draft.order_uuid, payment.clone());
        Ok(payment)
    }

    async fn refund(&self, order_uuid: OrderUuid, _amount: Money) -> Result<(), RpcError> {
        let mut state = self.state.write().unwrap();
        if state.unreachable {
            return Err(unreachable_peer(PAYMENT_SERVICE));
        }
        if state.fail_on_refund {
            return Err(rejected(PAYMENT_SERVICE, 502, "refund rejected by provider"));
        }
        let payment = state
            .payments
            .get_mut(&order_uuid)
            .ok_or_else(|| rejected(PAYMENT_SERVICE, 404, "no payment for order"))?;
        let refunded = payment
            .refund()
            .map_err(|e| rejected(PAYMENT_SERVICE, 409, e.to_string()))?;
        if refunded {
            state.refunds.push(order_uuid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::PaymentMethod;

    use super::*;

    fn draft(order_uuid: OrderUuid) -> PaymentDraft {
        PaymentDraft {
            order_uuid,
            payment_method: PaymentMethod::Alipay,
            amount: Money::from_cents(19998),
            payment_subject: "Order 1".to_string(),
        }
    }

    #[tokio::test]
    async fn create_returns_existing_open_payment() {
        let gateway = InMemoryPaymentGateway::new();
        let order_uuid = OrderUuid::new();

        let first = gateway.create_payment(UserId::new(), &draft(order_uuid)).await.unwrap();
        let second = gateway.create_payment(UserId::new(), &draft(order_uuid)).await.unwrap();

        assert_eq!(first.payment_uuid, second.payment_uuid);
        assert_eq!(gateway.payment_count(), 1);
    }

    #[tokio::test]
    async fn refund_requires_settled_payment() {
        let gateway = InMemoryPaymentGateway::new();
        let order_uuid = OrderUuid::new();
        gateway.create_payment(UserId::new(), &draft(order_uuid)).await.unwrap();

        assert!(gateway.refund(order_uuid, Money::from_cents(19998)).await.is_err());

        gateway.settle(order_uuid);
        gateway.refund(order_uuid, Money::from_cents(19998)).await.unwrap();
        gateway.refund(order_uuid, Money::from_cents(19998)).await.unwrap();

        assert_eq!(gateway.refund_count(), 1);
        assert_eq!(gateway.status_of(order_uuid), Some(PaymentStatus::Refunded));
    }

    #[tokio::test]
    async fn fail_on_refund() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_refund(true);
        let err = gateway
            .refund(OrderUuid::new(), Money::from_cents(100))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
    }
}
