//! Reconciliation sweep for successful payments whose order patch never
//! landed.
//!
//! The sweep is opt-in. It only ever moves an order from PendingPayment to
//! Paid, so running it repeatedly or concurrently with live callbacks is safe.

use std::sync::Arc;
use std::time::Duration;

use domain::{OrderStatus, Payment};
use store::{Repository, Versioned};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::payment_flow::PaymentFlow;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    /// Orders patched to Paid by this sweep.
    pub repaired: usize,
    /// Orders that already reflected the payment.
    pub already_synced: usize,
    /// Orders cancelled after their payment succeeded; left for an operator.
    pub skipped: usize,
    pub failed: usize,
}

/// Runs one sweep over every unsynced successful payment.
#[tracing::instrument(skip(flow))]
pub async fn reconcile_once<R: Repository<Payment>>(flow: &PaymentFlow<R>) -> Result<ReconcileReport> {
    let stuck = flow
        .payments()
        .find(&|p: &Payment| p.needs_order_sync())
        .await?;

    let mut report = ReconcileReport {
        examined: stuck.len(),
        ..Default::default()
    };

    for Versioned { record, version } in stuck {
        let order = match flow.order_gateway().fetch_order(record.order_uuid).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(order_uuid = %record.order_uuid, error = %e, "could not read order");
                report.failed += 1;
                continue;
            }
        };

        match order.status {
            OrderStatus::PendingPayment => match flow.sync_order(record, version).await {
                Ok(payment) if payment.order_synced => {
                    metrics::counter!("reconcile_repaired_total").increment(1);
                    report.repaired += 1;
                }
                Ok(_) => report.failed += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "could not record repaired payment");
                    report.failed += 1;
                }
            },
            OrderStatus::Paid | OrderStatus::Completed => {
                let order_uuid = record.order_uuid;
                match flow.mark_synced(record, version).await {
                    Ok(()) => report.already_synced += 1,
                    Err(e) => {
                        tracing::warn!(%order_uuid, error = %e, "could not mark payment synced");
                        report.failed += 1;
                    }
                }
            }
            OrderStatus::Cancelled => {
                tracing::warn!(
                    order_uuid = %record.order_uuid,
                    payment_uuid = %record.payment_uuid,
                    "order cancelled after its payment succeeded; needs manual refund"
                );
                report.skipped += 1;
            }
        }
    }

    if report.examined > 0 {
        tracing::info!(?report, "reconciliation sweep finished");
    }
    Ok(report)
}

/// Runs [`reconcile_once`] every `interval` until `stop` flips or its sender
/// is dropped.
pub fn spawn_reconciler<R>(
    flow: Arc<PaymentFlow<R>>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: Repository<Payment> + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => break,
            }
            if let Err(e) = reconcile_once(&flow).await {
                tracing::error!(error = %e, "reconciliation sweep failed");
            }
        }
        tracing::info!("reconciler stopped");
    })
}

#[cfg(test)]
mod tests {
    use common::{OrderUuid, UserId};
    use domain::{Money, PaymentDraft, PaymentMethod, PaymentStatus};
    use store::InMemoryRepository;

    use super::*;
    use crate::payment_flow::PaymentCallback;
    use crate::peers::{
        InMemoryNotificationGateway, InMemoryOrderGateway, OrderGateway, OrderSnapshot,
    };

    fn flow(orders: &InMemoryOrderGateway) -> PaymentFlow<InMemoryRepository<Payment>> {
        PaymentFlow::new(
            InMemoryRepository::new(),
            Arc::new(orders.clone()),
            Arc::new(InMemoryNotificationGateway::new()),
        )
    }

    /// Leaves a successful payment whose order patch failed.
    async fn stuck_payment(
        flow: &PaymentFlow<InMemoryRepository<Payment>>,
        orders: &InMemoryOrderGateway,
    ) -> OrderUuid {
        let buyer = UserId::new();
        let order = OrderSnapshot {
            order_uuid: OrderUuid::new(),
            buyer_uuid: buyer,
            status: OrderStatus::PendingPayment,
            total_amount: Money::from_cents(5000),
        };
        orders.insert_order(order.clone());

        let payment = flow
            .create_payment(
                buyer,
                PaymentDraft {
                    order_uuid: order.order_uuid,
                    payment_method: PaymentMethod::WechatPay,
                    amount: order.total_amount,
                    payment_subject: "Order 7".to_string(),
                },
            )
            .await
            .unwrap();

        orders.set_fail_on_patch(true);
        flow.handle_callback(
            PaymentMethod::WechatPay,
            PaymentCallback {
                payment_uuid: payment.payment_uuid,
                transaction_id: None,
                status: PaymentStatus::Success,
                callback_data: None,
            },
        )
        .await
        .unwrap();
        orders.set_fail_on_patch(false);
        order.order_uuid
    }

    #[tokio::test]
    async fn sweep_repairs_pending_orders() {
        let orders = InMemoryOrderGateway::new();
        let flow = flow(&orders);
        let order_uuid = stuck_payment(&flow, &orders).await;

        let report = reconcile_once(&flow).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.repaired, 1);
        assert_eq!(orders.status_of(order_uuid), Some(OrderStatus::Paid));

        let second = reconcile_once(&flow).await.unwrap();
        assert_eq!(second, ReconcileReport::default());
    }

    #[tokio::test]
    async fn sweep_marks_already_paid_orders_synced() {
        let orders = InMemoryOrderGateway::new();
        let flow = flow(&orders);
        let order_uuid = stuck_payment(&flow, &orders).await;
        orders
            .patch_status(order_uuid, OrderStatus::Paid, None)
            .await
            .unwrap();
        let calls_before = orders.patch_calls();

        let report = reconcile_once(&flow).await.unwrap();
        assert_eq!(report.already_synced, 1);
        assert_eq!(orders.patch_calls(), calls_before);
        assert_eq!(reconcile_once(&flow).await.unwrap().examined, 0);
    }

    #[tokio::test]
    async fn sweep_leaves_cancelled_orders_alone() {
        let orders = InMemoryOrderGateway::new();
        let flow = flow(&orders);
        let order_uuid = stuck_payment(&flow, &orders).await;
        orders
            .patch_status(order_uuid, OrderStatus::Cancelled, None)
            .await
            .unwrap();

        let report = reconcile_once(&flow).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(orders.status_of(order_uuid), Some(OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn sweep_survives_an_unreachable_order_service() {
        let orders = InMemoryOrderGateway::new();
        let flow = flow(&orders);
        stuck_payment(&flow, &orders).await;
        orders.set_unreachable(true);

        let report = reconcile_once(&flow).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.repaired, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconciler_runs_until_stopped() {
        let orders = InMemoryOrderGateway::new();
        let flow = Arc::new(flow(&orders));
        let order_uuid = stuck_payment(&flow, &orders).await;

        let (stop, stop_rx) = watch::channel(false);
        let handle = spawn_reconciler(Arc::clone(&flow), Duration::from_secs(30), stop_rx);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(orders.status_of(order_uuid), Some(OrderStatus::Paid));

        stop.send(true).unwrap();
        handle.await.unwrap();
    }
}
