//! Order service endpoints.
//!
//! Buyer-facing routes are scoped to the caller; `internal/` routes are for
//! peers and carry no caller identity.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use common::{Envelope, OrderUuid};
use domain::{Order, OrderDraft, OrderStats, Payment};
use saga::{OrderPatch, OrderQuery, OrderSaga, Page, PaymentRequest};
use serde::Deserialize;
use store::Repository;

use super::optional_json;
use crate::error::ApiError;
use crate::identity::CallerId;

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default, alias = "cancel_reason")]
    pub reason: Option<String>,
}

pub fn router<R: Repository<Order> + 'static>(saga: Arc<OrderSaga<R>>) -> Router {
    Router::new()
        .route("/orders", post(create::<R>).get(list::<R>))
        .route("/orders/stats", get(stats::<R>))
        .route("/orders/{id}", get(detail::<R>))
        .route("/orders/{id}/pay", post(pay::<R>))
        .route("/orders/{id}/cancel", post(cancel::<R>))
        .route("/orders/{id}/complete", post(complete::<R>))
        .route("/orders/internal/{uuid}", get(internal_detail::<R>))
        .route("/orders/internal/orders/{uuid}", patch(internal_patch::<R>))
        .with_state(saga)
}

/// POST /orders
#[tracing::instrument(skip(saga, payload))]
pub async fn create<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    CallerId(buyer): CallerId,
    payload: Result<Json<OrderDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Order>>), ApiError> {
    let Json(draft) = payload?;
    let order = saga.create_order(buyer, draft).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(order))))
}

/// GET /orders?status=&sort=&page=&page_size=
#[tracing::instrument(skip(saga, query))]
pub async fn list<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    CallerId(buyer): CallerId,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> Result<Json<Envelope<Page<Order>>>, ApiError> {
    let Query(query) = query?;
    Ok(Json(Envelope::ok(saga.list_orders(buyer, &query).await?)))
}

/// GET /orders/stats
pub async fn stats<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    CallerId(buyer): CallerId,
) -> Result<Json<Envelope<OrderStats>>, ApiError> {
    Ok(Json(Envelope::ok(saga.stats(buyer).await?)))
}

/// GET /orders/{id}
pub async fn detail<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    CallerId(buyer): CallerId,
    Path(id): Path<u64>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    Ok(Json(Envelope::ok(saga.get_order(buyer, id).await?)))
}

/// POST /orders/{id}/pay, with an optional method/subject override body.
#[tracing::instrument(skip(saga, body))]
pub async fn pay<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    CallerId(buyer): CallerId,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Json<Envelope<Payment>>, ApiError> {
    let request: PaymentRequest = optional_json(&body)?;
    Ok(Json(Envelope::ok(
        saga.request_payment(buyer, id, request).await?,
    )))
}

/// POST /orders/{id}/cancel, with an optional `{"reason": ...}` body.
#[tracing::instrument(skip(saga, body))]
pub async fn cancel<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    CallerId(buyer): CallerId,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let request: CancelRequest = optional_json(&body)?;
    Ok(Json(Envelope::ok(
        saga.cancel_order(buyer, id, request.reason).await?,
    )))
}

/// POST /orders/{id}/complete
#[tracing::instrument(skip(saga))]
pub async fn complete<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    CallerId(buyer): CallerId,
    Path(id): Path<u64>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    Ok(Json(Envelope::ok(saga.complete_order(buyer, id).await?)))
}

/// GET /orders/internal/{uuid}
pub async fn internal_detail<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    Path(order_uuid): Path<OrderUuid>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    Ok(Json(Envelope::ok(saga.get_internal(order_uuid).await?)))
}

/// PATCH /orders/internal/orders/{uuid}. Only `status` and `payment_time`
/// are accepted.
#[tracing::instrument(skip(saga, payload))]
pub async fn internal_patch<R: Repository<Order> + 'static>(
    State(saga): State<Arc<OrderSaga<R>>>,
    Path(order_uuid): Path<OrderUuid>,
    payload: Result<Json<OrderPatch>, JsonRejection>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let Json(patch) = payload?;
    Ok(Json(Envelope::ok(saga.apply_patch(order_uuid, patch).await?)))
}
