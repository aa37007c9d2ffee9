//! Gateways to the peer services the saga drives.
//!
//! Each peer is a trait with an HTTP implementation over [`rpc::ServiceClient`]
//! and an in-memory fake for tests.

pub mod notification;
pub mod order;
pub mod payment;
pub mod product;

pub use notification::{HttpNotificationGateway, InMemoryNotificationGateway, NotificationGateway};
pub use order::{HttpOrderGateway, InMemoryOrderGateway, OrderGateway, OrderSnapshot};
pub use payment::{HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway};
pub use product::{HttpProductCatalog, InMemoryProductCatalog, ProductCatalog};

use rpc::RpcError;

fn unreachable_peer(service: &str) -> RpcError {
    RpcError::ServiceUnavailable(service.to_string())
}

fn rejected(service: &str, status: u16, message: impl Into<String>) -> RpcError {
    RpcError::RemoteCall {
        service: service.to_string(),
        status: Some(status),
        body: None,
        message: message.into(),
    }
}
