//! Health and Prometheus endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

#[derive(Clone)]
struct OpsState {
    service: String,
    metrics: PrometheusHandle,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

/// Router serving `GET /health` and `GET /metrics`.
pub fn router(service_name: impl Into<String>, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(OpsState {
            service: service_name.into(),
            metrics,
        })
}

/// GET /health
async fn health(State(state): State<OpsState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /metrics
async fn render_metrics(State(state): State<OpsState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
