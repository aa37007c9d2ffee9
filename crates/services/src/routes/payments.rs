//! Payment service endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{Envelope, OrderUuid, PaymentUuid};
use domain::{DomainError, Payment, PaymentDraft, PaymentMethod};
use saga::{PaymentCallback, PaymentFlow, RefundRequest, SagaError};
use store::Repository;

use super::optional_json;
use crate::error::ApiError;
use crate::identity::CallerId;

pub fn router<R: Repository<Payment> + 'static>(flow: Arc<PaymentFlow<R>>) -> Router {
    Router::new()
        .route("/payment/create", post(create::<R>))
        .route("/payment/records", get(records::<R>))
        .route("/payment/callback/{method}", post(callback::<R>))
        .route("/payment/{uuid}", get(detail::<R>))
        .route("/payment/{uuid}/cancel", post(cancel::<R>))
        .route("/payment/{uuid}/refund", post(refund::<R>))
        .with_state(flow)
}

/// POST /payment/create
#[tracing::instrument(skip(flow, payload))]
pub async fn create<R: Repository<Payment> + 'static>(
    State(flow): State<Arc<PaymentFlow<R>>>,
    CallerId(user): CallerId,
    payload: Result<Json<PaymentDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Payment>>), ApiError> {
    let Json(draft) = payload?;
    let payment = flow.create_payment(user, draft).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(payment))))
}

/// GET /payment/records
pub async fn records<R: Repository<Payment> + 'static>(
    State(flow): State<Arc<PaymentFlow<R>>>,
    CallerId(user): CallerId,
) -> Result<Json<Envelope<Vec<Payment>>>, ApiError> {
    Ok(Json(Envelope::ok(flow.list_payments(user).await?)))
}

/// GET /payment/{uuid}
pub async fn detail<R: Repository<Payment> + 'static>(
    State(flow): State<Arc<PaymentFlow<R>>>,
    CallerId(user): CallerId,
    Path(payment_uuid): Path<PaymentUuid>,
) -> Result<Json<Envelope<Payment>>, ApiError> {
    Ok(Json(Envelope::ok(flow.get_payment(user, payment_uuid).await?)))
}

/// POST /payment/{uuid}/cancel
#[tracing::instrument(skip(flow))]
pub async fn cancel<R: Repository<Payment> + 'static>(
    State(flow): State<Arc<PaymentFlow<R>>>,
    CallerId(user): CallerId,
    Path(payment_uuid): Path<PaymentUuid>,
) -> Result<Json<Envelope<Payment>>, ApiError> {
    Ok(Json(Envelope::ok(
        flow.cancel_payment(user, payment_uuid).await?,
    )))
}

/// POST /payment/callback/{method}, sent by the payment provider.
#[tracing::instrument(skip(flow, payload))]
pub async fn callback<R: Repository<Payment> + 'static>(
    State(flow): State<Arc<PaymentFlow<R>>>,
    Path(method): Path<String>,
    payload: Result<Json<PaymentCallback>, JsonRejection>,
) -> Result<Json<Envelope<Payment>>, ApiError> {
    let method: PaymentMethod = method
        .parse()
        .map_err(|e: DomainError| ApiError::Saga(SagaError::from(e)))?;
    let Json(callback) = payload?;
    Ok(Json(Envelope::ok(flow.handle_callback(method, callback).await?)))
}

/// POST /payment/{order_uuid}/refund, called by the order service. The
/// segment is the order's uuid, not a payment's.
#[tracing::instrument(skip(flow, body))]
pub async fn refund<R: Repository<Payment> + 'static>(
    State(flow): State<Arc<PaymentFlow<R>>>,
    Path(order_uuid): Path<OrderUuid>,
    body: Bytes,
) -> Result<Json<Envelope<Payment>>, ApiError> {
    let request: RefundRequest = optional_json(&body)?;
    Ok(Json(Envelope::ok(flow.refund_order(order_uuid, request).await?)))
}
