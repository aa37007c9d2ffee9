//! End-to-end lifecycle tests with the order, payment and notification sides
//! wired together in-process.
//!
//! The adapters below stand in for the HTTP hop: each maps the callee's
//! errors to the status code its route would answer with.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderUuid, ProductUuid, UserId};
use domain::{
    Money, Notification, NotificationDraft, Order, OrderDraft, OrderLine, OrderStatus, Payment,
    PaymentDraft, PaymentMethod, PaymentStatus, ShippingInfo,
};
use rpc::RpcError;
use saga::{
    InMemoryProductCatalog, NotificationGateway, NotificationInbox, NotificationQuery,
    OrderGateway, OrderPatch, OrderSaga, OrderSnapshot, PaymentCallback, PaymentFlow,
    PaymentGateway, PaymentRequest, RefundRequest, SagaError, reconcile_once,
};
use store::InMemoryRepository;

type Orders = InMemoryRepository<Order>;
type Payments = InMemoryRepository<Payment>;

fn to_rpc(service: &str, err: SagaError) -> RpcError {
    let message = err.to_string();
    let status = match err {
        SagaError::Rpc(inner) => return inner,
        SagaError::NotFound { .. } => 404,
        SagaError::StateGuardViolation { .. } => 409,
        SagaError::Validation(_) => 400,
        SagaError::Store(_) => 500,
    };
    RpcError::RemoteCall {
        service: service.to_string(),
        status: Some(status),
        body: None,
        message,
    }
}

/// The order service as the payment service sees it.
struct OrderSide {
    saga: OrderSaga<Orders>,
}

#[async_trait]
impl OrderGateway for OrderSide {
    async fn fetch_order(&self, order_uuid: OrderUuid) -> Result<OrderSnapshot, RpcError> {
        let order = self
            .saga
            .get_internal(order_uuid)
            .await
            .map_err(|e| to_rpc("OrderService", e))?;
        Ok(OrderSnapshot {
            order_uuid: order.order_uuid,
            buyer_uuid: order.buyer_uuid,
            status: order.status,
            total_amount: order.total_amount,
        })
    }

    async fn patch_status(
        &self,
        order_uuid: OrderUuid,
        status: OrderStatus,
        payment_time: Option<DateTime<Utc>>,
    ) -> Result<(), RpcError> {
        self.saga
            .apply_patch(
                order_uuid,
                OrderPatch {
                    status,
                    payment_time,
                },
            )
            .await
            .map_err(|e| to_rpc("OrderService", e))?;
        Ok(())
    }
}

/// The payment service as the order service sees it.
struct PaymentSide {
    flow: Arc<PaymentFlow<Payments>>,
    down: AtomicBool,
}

#[async_trait]
impl PaymentGateway for PaymentSide {
    async fn create_payment(
        &self,
        caller: UserId,
        draft: &PaymentDraft,
    ) -> Result<Payment, RpcError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RpcError::ServiceUnavailable("PaymentService".to_string()));
        }
        self.flow
            .create_payment(caller, draft.clone())
            .await
            .map_err(|e| to_rpc("PaymentService", e))
    }

    async fn refund(&self, order_uuid: OrderUuid, amount: Money) -> Result<(), RpcError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RpcError::ServiceUnavailable("PaymentService".to_string()));
        }
        self.flow
            .refund_order(
                order_uuid,
                RefundRequest {
                    amount: Some(amount),
                },
            )
            .await
            .map_err(|e| to_rpc("PaymentService", e))?;
        Ok(())
    }
}

struct NotificationSide {
    inbox: Arc<NotificationInbox<InMemoryRepository<Notification>>>,
}

#[async_trait]
impl NotificationGateway for NotificationSide {
    async fn send(&self, draft: &NotificationDraft) -> Result<(), RpcError> {
        self.inbox
            .create(draft.clone())
            .await
            .map_err(|e| to_rpc("NotificationService", e))?;
        Ok(())
    }
}

struct System {
    /// The buyer-facing order service.
    orders: OrderSaga<Orders>,
    order_store: Orders,
    payments: Arc<PaymentFlow<Payments>>,
    payment_store: Payments,
    payment_side: Arc<PaymentSide>,
    inbox: Arc<NotificationInbox<InMemoryRepository<Notification>>>,
}

impl System {
    fn new() -> Self {
        let order_store = Orders::new();
        let payment_store = Payments::new();
        let inbox = Arc::new(NotificationInbox::new(InMemoryRepository::new()));
        let notifications: Arc<dyn NotificationGateway> = Arc::new(NotificationSide {
            inbox: Arc::clone(&inbox),
        });
        let products = Arc::new(InMemoryProductCatalog::new());

        // The payment service reaches the order service through a second
        // instance sharing the same store, as two replicas would.
        let order_replica = OrderSaga::new(
            order_store.clone(),
            Arc::new(saga::InMemoryPaymentGateway::new()),
            Arc::clone(&notifications),
            products.clone(),
        );
        let payments = Arc::new(PaymentFlow::new(
            payment_store.clone(),
            Arc::new(OrderSide {
                saga: order_replica,
            }),
            Arc::clone(&notifications),
        ));
        let payment_side = Arc::new(PaymentSide {
            flow: Arc::clone(&payments),
            down: AtomicBool::new(false),
        });
        let orders = OrderSaga::new(
            order_store.clone(),
            payment_side.clone(),
            notifications,
            products,
        );

        Self {
            orders,
            order_store,
            payments,
            payment_store,
            payment_side,
            inbox,
        }
    }

    async fn place_order(&self, buyer: UserId) -> Order {
        let draft = OrderDraft {
            lines: vec![OrderLine {
                product_uuid: ProductUuid::new(),
                quantity: 2,
                price: Money::from_cents(9999),
            }],
            seller_uuid: None,
            payment_method: Some(PaymentMethod::Alipay),
            remark: None,
            shipping: ShippingInfo {
                name: "Ada".to_string(),
                phone: "555-0100".to_string(),
                address: "1 Main St".to_string(),
                postal_code: Some("10001".to_string()),
            },
        };
        self.orders.create_order(buyer, draft).await.unwrap()
    }

    async fn pay(&self, buyer: UserId, order: &Order) -> Payment {
        let payment = self
            .orders
            .request_payment(buyer, order.order_id, PaymentRequest::default())
            .await
            .unwrap();
        self.payments
            .handle_callback(PaymentMethod::Alipay, success(&payment))
            .await
            .unwrap()
    }

    async fn order_status(&self, buyer: UserId, order: &Order) -> OrderStatus {
        self.orders
            .get_order(buyer, order.order_id)
            .await
            .unwrap()
            .status
    }

    async fn notification_titles(&self, user: UserId) -> Vec<String> {
        let mut titles: Vec<String> = self
            .inbox
            .list(user, &NotificationQuery::default())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        titles.sort();
        titles
    }
}

fn success(payment: &Payment) -> PaymentCallback {
    PaymentCallback {
        payment_uuid: payment.payment_uuid,
        transaction_id: Some("2026101900001".to_string()),
        status: PaymentStatus::Success,
        callback_data: None,
    }
}

#[tokio::test]
async fn test_happy_path_pay_then_complete() {
    let system = System::new();
    let buyer = UserId::new();

    let order = system.place_order(buyer).await;
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert_eq!(order.total_amount.to_string(), "199.98");

    let payment = system
        .orders
        .request_payment(buyer, order.order_id, PaymentRequest::default())
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, order.total_amount);

    let paid = system
        .payments
        .handle_callback(PaymentMethod::Alipay, success(&payment))
        .await
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Success);
    assert!(paid.order_synced);

    let order_after = system.orders.get_order(buyer, order.order_id).await.unwrap();
    assert_eq!(order_after.status, OrderStatus::Paid);
    assert!(order_after.payment_time.is_some());

    let completed = system.orders.complete_order(buyer, order.order_id).await.unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    let err = system
        .orders
        .complete_order(buyer, order.order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::StateGuardViolation { .. }));
    let order_after = system.orders.get_order(buyer, order.order_id).await.unwrap();
    assert_eq!(order_after.status, OrderStatus::Completed);

    assert_eq!(
        system.notification_titles(buyer).await,
        vec!["Order completed", "Payment received"]
    );
}

#[tokio::test]
async fn test_cancel_paid_order_refunds_payment() {
    let system = System::new();
    let buyer = UserId::new();
    let order = system.place_order(buyer).await;
    let payment = system.pay(buyer, &order).await;

    let cancelled = system
        .orders
        .cancel_order(buyer, order.order_id, Some("found it cheaper".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let refunded = system
        .payments
        .get_payment(buyer, payment.payment_uuid)
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert!(
        system
            .notification_titles(buyer)
            .await
            .contains(&"Order cancelled".to_string())
    );
}

#[tokio::test]
async fn test_refund_failure_keeps_order_paid() {
    let system = System::new();
    let buyer = UserId::new();
    let order = system.place_order(buyer).await;
    system.pay(buyer, &order).await;

    system.payment_store.set_fail_writes(true);
    let err = system
        .orders
        .cancel_order(buyer, order.order_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::Rpc(ref e) if e.status() == Some(500)));
    assert_eq!(system.order_status(buyer, &order).await, OrderStatus::Paid);

    system.payment_store.set_fail_writes(false);
    system
        .orders
        .cancel_order(buyer, order.order_id, None)
        .await
        .unwrap();
    assert_eq!(system.order_status(buyer, &order).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_lost_order_patch_is_repaired_by_reconciliation() {
    let system = System::new();
    let buyer = UserId::new();
    let order = system.place_order(buyer).await;
    let payment = system
        .orders
        .request_payment(buyer, order.order_id, PaymentRequest::default())
        .await
        .unwrap();

    system.order_store.set_fail_writes(true);
    let paid = system
        .payments
        .handle_callback(PaymentMethod::Alipay, success(&payment))
        .await
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Success);
    assert!(!paid.order_synced);
    assert_eq!(
        system.order_status(buyer, &order).await,
        OrderStatus::PendingPayment
    );

    system.order_store.set_fail_writes(false);
    let report = reconcile_once(&*system.payments).await.unwrap();
    assert_eq!(report.repaired, 1);
    assert_eq!(system.order_status(buyer, &order).await, OrderStatus::Paid);
}

#[tokio::test]
async fn test_payment_service_outage_leaves_order_pending() {
    let system = System::new();
    let buyer = UserId::new();
    let order = system.place_order(buyer).await;

    system.payment_side.down.store(true, Ordering::SeqCst);
    let err = system
        .orders
        .request_payment(buyer, order.order_id, PaymentRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::Rpc(RpcError::ServiceUnavailable(_))));
    assert_eq!(
        system.order_status(buyer, &order).await,
        OrderStatus::PendingPayment
    );
    assert!(system.payment_store.is_empty().await);
}

#[tokio::test]
async fn test_payment_amount_mismatch_is_rejected_by_peer() {
    let system = System::new();
    let buyer = UserId::new();
    let order = system.place_order(buyer).await;

    let err = system
        .payment_side
        .create_payment(
            buyer,
            &PaymentDraft {
                order_uuid: order.order_uuid,
                payment_method: PaymentMethod::Alipay,
                amount: Money::from_cents(100),
                payment_subject: "Order 1".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_concurrent_callbacks_pay_the_order_once() {
    let system = System::new();
    let buyer = UserId::new();
    let order = system.place_order(buyer).await;
    let payment = system
        .orders
        .request_payment(buyer, order.order_id, PaymentRequest::default())
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        system
            .payments
            .handle_callback(PaymentMethod::Alipay, success(&payment)),
        system
            .payments
            .handle_callback(PaymentMethod::Alipay, success(&payment)),
    );
    assert!(first.is_ok() || second.is_ok());

    assert_eq!(system.order_status(buyer, &order).await, OrderStatus::Paid);
    let received = system
        .notification_titles(buyer)
        .await
        .into_iter()
        .filter(|t| t == "Payment received")
        .count();
    assert_eq!(received, 1);
}

#[tokio::test]
async fn test_paid_order_cannot_be_paid_again() {
    let system = System::new();
    let buyer = UserId::new();
    let order = system.place_order(buyer).await;
    system.pay(buyer, &order).await;

    let err = system
        .orders
        .request_payment(buyer, order.order_id, PaymentRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::StateGuardViolation { .. }));
}
