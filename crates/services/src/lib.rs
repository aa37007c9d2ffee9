//! HTTP surfaces and process lifecycle for the order, payment and
//! notification services.
//!
//! One binary serves any of the three; [`config::ServiceKind`] picks which.
//! Every service exposes `/health` and `/metrics`, registers itself with the
//! directory once it is listening and reaches its peers through
//! [`rpc::ServiceClient`].

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod server;

use std::sync::Arc;

use axum::Router;
use domain::{Notification, Order, Payment};
use metrics_exporter_prometheus::PrometheusHandle;
use rpc::ServiceClient;
use saga::{
    HttpNotificationGateway, HttpOrderGateway, HttpPaymentGateway, HttpProductCatalog,
    NotificationInbox, OrderSaga, PaymentFlow,
};
use store::InMemoryRepository;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::ServiceKind;

pub type OrderStore = InMemoryRepository<Order>;
pub type PaymentStore = InMemoryRepository<Payment>;
pub type NotificationStore = InMemoryRepository<Notification>;

/// The routes of one service, plus the handles its process needs beyond
/// serving them.
pub struct Assembled {
    pub routes: Router,
    /// Set for the payment service; drives the reconciliation sweep.
    pub payments: Option<Arc<PaymentFlow<PaymentStore>>>,
}

/// Wires the stores and peer gateways of a service.
pub fn assemble(kind: ServiceKind, client: ServiceClient) -> Assembled {
    match kind {
        ServiceKind::Order => {
            let saga = OrderSaga::new(
                OrderStore::new(),
                Arc::new(HttpPaymentGateway::new(client.clone())),
                Arc::new(HttpNotificationGateway::new(client.clone())),
                Arc::new(HttpProductCatalog::new(client)),
            );
            Assembled {
                routes: routes::orders::router(Arc::new(saga)),
                payments: None,
            }
        }
        ServiceKind::Payment => {
            let flow = Arc::new(PaymentFlow::new(
                PaymentStore::new(),
                Arc::new(HttpOrderGateway::new(client.clone())),
                Arc::new(HttpNotificationGateway::new(client)),
            ));
            Assembled {
                routes: routes::payments::router(Arc::clone(&flow)),
                payments: Some(flow),
            }
        }
        ServiceKind::Notification => {
            let inbox = NotificationInbox::new(NotificationStore::new());
            Assembled {
                routes: routes::notifications::router(Arc::new(inbox)),
                payments: None,
            }
        }
    }
}

/// Adds the operational endpoints and the HTTP layers to a service's routes.
pub fn create_app(
    service_routes: Router,
    service_name: &str,
    metrics_handle: PrometheusHandle,
) -> Router {
    service_routes
        .merge(routes::ops::router(service_name, metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
