//! Notification service endpoints.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use common::Envelope;
use domain::{Notification, NotificationDraft};
use saga::{NotificationInbox, NotificationQuery};
use serde::Serialize;
use store::Repository;

use crate::error::ApiError;
use crate::identity::CallerId;

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: usize,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: u64,
}

pub fn router<R: Repository<Notification> + 'static>(inbox: Arc<NotificationInbox<R>>) -> Router {
    Router::new()
        .route("/notifications", get(list::<R>))
        .route("/notifications/unread-count", get(unread_count::<R>))
        .route("/notifications/read-all", post(mark_all_read::<R>))
        .route("/notifications/{id}/read", post(mark_read::<R>))
        .route("/notifications/{id}", delete(remove::<R>))
        .route("/notifications/internal/create", post(internal_create::<R>))
        .with_state(inbox)
}

/// GET /notifications?type=&read=
pub async fn list<R: Repository<Notification> + 'static>(
    State(inbox): State<Arc<NotificationInbox<R>>>,
    CallerId(user): CallerId,
    query: Result<Query<NotificationQuery>, QueryRejection>,
) -> Result<Json<Envelope<Vec<Notification>>>, ApiError> {
    let Query(query) = query?;
    Ok(Json(Envelope::ok(inbox.list(user, &query).await?)))
}

/// GET /notifications/unread-count
pub async fn unread_count<R: Repository<Notification> + 'static>(
    State(inbox): State<Arc<NotificationInbox<R>>>,
    CallerId(user): CallerId,
) -> Result<Json<Envelope<UnreadCount>>, ApiError> {
    let unread_count = inbox.unread_count(user).await?;
    Ok(Json(Envelope::ok(UnreadCount { unread_count })))
}

/// POST /notifications/{id}/read
pub async fn mark_read<R: Repository<Notification> + 'static>(
    State(inbox): State<Arc<NotificationInbox<R>>>,
    CallerId(user): CallerId,
    Path(id): Path<u64>,
) -> Result<Json<Envelope<Notification>>, ApiError> {
    Ok(Json(Envelope::ok(inbox.mark_read(user, id).await?)))
}

/// POST /notifications/read-all
pub async fn mark_all_read<R: Repository<Notification> + 'static>(
    State(inbox): State<Arc<NotificationInbox<R>>>,
    CallerId(user): CallerId,
) -> Result<Json<Envelope<MarkedRead>>, ApiError> {
    let updated = inbox.mark_all_read(user).await?;
    Ok(Json(Envelope::ok(MarkedRead { updated })))
}

/// DELETE /notifications/{id}
pub async fn remove<R: Repository<Notification> + 'static>(
    State(inbox): State<Arc<NotificationInbox<R>>>,
    CallerId(user): CallerId,
    Path(id): Path<u64>,
) -> Result<Json<Envelope<Deleted>>, ApiError> {
    inbox.delete(user, id).await?;
    Ok(Json(Envelope::ok(Deleted { id })))
}

/// POST /notifications/internal/create
#[tracing::instrument(skip(inbox, payload))]
pub async fn internal_create<R: Repository<Notification> + 'static>(
    State(inbox): State<Arc<NotificationInbox<R>>>,
    payload: Result<Json<NotificationDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Notification>>), ApiError> {
    let Json(draft) = payload?;
    let notification = inbox.create(draft).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(notification))))
}
