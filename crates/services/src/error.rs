//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::Envelope;
use rpc::RpcError;
use saga::SagaError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The caller identity header is missing or malformed.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Failure of a lifecycle operation.
    Saga(SagaError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Saga(err) => saga_error_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Unauthorized(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::Saga(err) => {
                if status.is_server_error() {
                    metrics::counter!("http_server_errors_total", "status" => status.as_u16().to_string())
                        .increment(1);
                    tracing::error!(error = %err, %status, "request failed");
                } else {
                    tracing::debug!(error = %err, %status, "request rejected");
                }
                err.to_string()
            }
        };

        (status, Json(Envelope::<()>::error(message))).into_response()
    }
}

fn saga_error_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::StateGuardViolation { .. } => StatusCode::CONFLICT,
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::NotFound { .. } => StatusCode::NOT_FOUND,
        SagaError::Store(StoreError::ConcurrencyConflict { .. } | StoreError::Duplicate { .. }) => {
            StatusCode::CONFLICT
        }
        SagaError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SagaError::Rpc(rpc) => rpc_error_status(rpc),
    }
}

/// A peer that refused the request (4xx) is passed through; any other peer
/// failure is a bad gateway.
fn rpc_error_status(err: &RpcError) -> StatusCode {
    match err {
        RpcError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RpcError::RemoteCall {
            status: Some(status),
            ..
        } if err.is_rejection() => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        RpcError::RemoteCall { .. } | RpcError::DecodeFailure { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
