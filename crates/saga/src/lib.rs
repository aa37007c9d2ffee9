//! Order lifecycle saga.
//!
//! An order moves PendingPayment → Paid → Completed, or to Cancelled before
//! completion. The order service and the payment service each own their
//! records; this crate holds the service-side logic that keeps the two in step
//! over RPC:
//!
//! - [`OrderSaga`] runs inside the order service. It opens payments through
//!   the payment service and refunds them when a paid order is cancelled.
//! - [`PaymentFlow`] runs inside the payment service. It checks orders before
//!   opening payments and patches the order to Paid when a provider reports
//!   success.
//! - [`NotificationInbox`] is the notification service's sink.
//!
//! Notifications are best-effort: a failed send is logged and counted but
//! never fails the transition that triggered it.

pub mod error;
pub mod notifications;
pub mod order_lifecycle;
pub mod payment_flow;
pub mod peers;
pub mod query;
pub mod reconcile;

pub use error::{Result, SagaError};
pub use notifications::{NotificationInbox, NotificationQuery};
pub use order_lifecycle::{OrderPatch, OrderQuery, OrderSaga, PaymentRequest};
pub use payment_flow::{PaymentCallback, PaymentFlow, RefundRequest};
pub use peers::{
    HttpNotificationGateway, HttpOrderGateway, HttpPaymentGateway, HttpProductCatalog,
    InMemoryNotificationGateway, InMemoryOrderGateway, InMemoryPaymentGateway,
    InMemoryProductCatalog, NotificationGateway, OrderGateway, OrderSnapshot, PaymentGateway,
    ProductCatalog,
};
pub use query::Page;
pub use reconcile::{ReconcileReport, reconcile_once, spawn_reconciler};

use domain::NotificationDraft;

pub(crate) async fn notify_best_effort(gateway: &dyn NotificationGateway, draft: &NotificationDraft) {
    match gateway.send(draft).await {
        Ok(()) => tracing::debug!(title = %draft.title, user = %draft.user_uuid, "notification sent"),
        Err(e) => {
            metrics::counter!("notification_dispatch_failures_total").increment(1);
            tracing::warn!(
                title = %draft.title,
                user = %draft.user_uuid,
                error = %e,
                "notification not delivered"
            );
        }
    }
}
