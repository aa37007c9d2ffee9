//! Order service gateway, used by the payment side.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::services::ORDER_SERVICE;
use common::{OrderUuid, UserId};
use domain::{Money, OrderStatus};
use rpc::{RpcError, ServiceClient};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{rejected, unreachable_peer};

/// The fields of an order the payment side relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_uuid: OrderUuid,
    pub buyer_uuid: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Reads an order through the internal lookup endpoint.
    async fn fetch_order(&self, order_uuid: OrderUuid) -> Result<OrderSnapshot, RpcError>;

    /// Asks the order service to move an order to `status`.
    async fn patch_status(
        &self,
        order_uuid: OrderUuid,
        status: OrderStatus,
        payment_time: Option<DateTime<Utc>>,
    ) -> Result<(), RpcError>;
}

/// Order gateway over HTTP.
#[derive(Clone)]
pub struct HttpOrderGateway {
    client: ServiceClient,
}

impl HttpOrderGateway {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn fetch_order(&self, order_uuid: OrderUuid) -> Result<OrderSnapshot, RpcError> {
        let response = self
            .client
            .get(ORDER_SERVICE, &format!("/orders/internal/{order_uuid}"))
            .await?;
        rpc::decode_data(ORDER_SERVICE, response)
    }

    async fn patch_status(
        &self,
        order_uuid: OrderUuid,
        status: OrderStatus,
        payment_time: Option<DateTime<Utc>>,
    ) -> Result<(), RpcError> {
        let body = json!({ "status": status, "payment_time": payment_time });
        let response = self
            .client
            .patch(
                ORDER_SERVICE,
                &format!("/orders/internal/orders/{order_uuid}"),
                &body,
            )
            .await?;
        rpc::unwrap_data(ORDER_SERVICE, response)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderUuid, OrderSnapshot>,
    patch_calls: usize,
    unreachable: bool,
    fail_on_patch: bool,
}

/// In-memory order service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderGateway {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: OrderSnapshot) {
        self.state
            .write()
            .unwrap()
            .orders
            .insert(order.order_uuid, order);
    }

    /// Makes every call fail as if the order service had no instances.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    /// Makes patch calls fail while lookups keep working.
    pub fn set_fail_on_patch(&self, fail: bool) {
        self.state.write().unwrap().fail_on_patch = fail;
    }

    pub fn status_of(&self, order_uuid: OrderUuid) -> Option<OrderStatus> {
        self.state
            .read()
            .unwrap()
            .orders
            .get(&order_uuid)
            .map(|o| o.status)
    }

    pub fn patch_calls(&self) -> usize {
        self.state.read().unwrap().patch_calls
    }
}

#[async_trait]
impl OrderGateway for InMemoryOrderGateway {
    async fn fetch_order(&self, order_uuid: OrderUuid) -> Result<OrderSnapshot, RpcError> {
        let state = self.state.read().unwrap();
        if state.unreachable {
            return Err(unreachable_peer(ORDER_SERVICE));
        }
        state
            .orders
            .get(&order_uuid)
            .cloned()
            .ok_or_else(|| rejected(ORDER_SERVICE, 404, "order not found"))
    }

    async fn patch_status(
        &self,
        order_uuid: OrderUuid,
        status: OrderStatus,
        _payment_time: Option<DateTime<Utc>>,
    ) -> Result<(), RpcError> {
        let mut state = self.state.write().unwrap();
        state.patch_calls += 1;
        if state.unreachable {
            return Err(unreachable_peer(ORDER_SERVICE));
        }
        if state.fail_on_patch {
            return Err(rejected(ORDER_SERVICE, 500, "patch failed"));
        }
        let order = state
            .orders
            .get_mut(&order_uuid)
            .ok_or_else(|| rejected(ORDER_SERVICE, 404, "order not found"))?;
        if order.status == status {
            return Ok(());
        }
        if !order.status.can_transition_to(status) {
            return Err(rejected(
                ORDER_SERVICE,
                409,
                format!("cannot move order from {} to {status}", order.status),
            ));
        }
        order.status = status;
        Ok(())
    }
}
