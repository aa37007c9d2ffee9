//! Route-level tests driven with `oneshot`, one service at a time.
//!
//! Peers are resolved through an empty directory, so every outgoing call
//! fails with "service unavailable".

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use registry::{Discovery, InMemoryDirectory};
use rpc::ServiceClient;
use serde_json::{Value, json};
use services::config::ServiceKind;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup(kind: ServiceKind) -> Router {
    let client = ServiceClient::new(Discovery::new(Arc::new(InMemoryDirectory::new())));
    let assembled = services::assemble(kind, client);
    services::create_app(assembled.routes, kind.service_name(), get_metrics_handle())
}

const BUYER: &str = "6c1d6b0e-3f5a-4c39-9f5e-7d2a9b1c0e11";
const STRANGER: &str = "0b8f6a2e-1c3d-4e5f-8a9b-0c1d2e3f4a5b";

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn order_body() -> Value {
    json!({
        "products": [
            {"product_uuid": "2f6c3c5e-8d0a-4a55-9d5f-0d6f2b8f0a11", "quantity": 1, "price": "99.99"},
            {"product_uuid": "9a1b2c3d-4e5f-4a6b-8c7d-0e1f2a3b4c5d", "quantity": 1, "price": 99.99}
        ],
        "payment_method": "alipay",
        "shipping_name": "Ada",
        "shipping_phone": "555-0100",
        "shipping_address": "1 Main St"
    })
}

async fn place_order(app: &Router) -> Value {
    let (status, json) = send(app, request("POST", "/orders", Some(BUYER), Some(order_body()))).await;
    assert_eq!(status, StatusCode::CREATED);
    json["data"].clone()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup(ServiceKind::Order);
    let (status, json) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "OrderService");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup(ServiceKind::Payment);
    let response = app
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_missing_or_bad_identity_is_401() {
    let app = setup(ServiceKind::Order);
    let (status, json) = send(&app, request("GET", "/orders", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let (status, _) = send(&app, request("GET", "/orders", Some("not-a-uuid"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_order_with_unreachable_catalog() {
    let app = setup(ServiceKind::Order);
    let order = place_order(&app).await;

    assert_eq!(order["status"], "pending_payment");
    assert_eq!(order["total_amount"], "199.98");
    assert_eq!(order["buyer_uuid"], BUYER);
    assert_eq!(order["products"][0]["product_name"], "Product");
}

#[tokio::test]
async fn test_create_order_rejects_bad_lines() {
    let app = setup(ServiceKind::Order);
    let mut body = order_body();
    body["products"][0]["quantity"] = json!(0);

    let (status, json) = send(&app, request("POST", "/orders", Some(BUYER), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, json) = send(&app, request("GET", "/orders", Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["count"], 0);
}

#[tokio::test]
async fn test_create_order_with_overflowing_total_is_400() {
    let app = setup(ServiceKind::Order);
    let mut body = order_body();
    body["products"][0]["price"] = json!("90000000000000000.00");
    body["products"][0]["quantity"] = json!(2);

    let (status, json) = send(&app, request("POST", "/orders", Some(BUYER), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (_, json) = send(&app, request("GET", "/orders", Some(BUYER), None)).await;
    assert_eq!(json["data"]["count"], 0);
}

#[tokio::test]
async fn test_order_detail_is_caller_scoped() {
    let app = setup(ServiceKind::Order);
    let order = place_order(&app).await;
    let uri = format!("/orders/{}", order["order_id"]);

    let (status, json) = send(&app, request("GET", &uri, Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["order_uuid"], order["order_uuid"]);

    let (status, _) = send(&app, request("GET", &uri, Some(STRANGER), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters_and_stats() {
    let app = setup(ServiceKind::Order);
    place_order(&app).await;
    place_order(&app).await;

    let (status, json) = send(
        &app,
        request("GET", "/orders?status=pending_payment&page_size=1", Some(BUYER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["count"], 2);
    assert_eq!(json["data"]["results"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, request("GET", "/orders?status=shipped", Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, request("GET", "/orders/stats", Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_orders"], 2);
    assert_eq!(json["data"]["pending_payment"], 2);
}

#[tokio::test]
async fn test_complete_pending_order_is_409() {
    let app = setup(ServiceKind::Order);
    let order = place_order(&app).await;
    let uri = format!("/orders/{}/complete", order["order_id"]);

    let (status, json) = send(&app, request("POST", &uri, Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_pay_with_payment_service_down_is_503() {
    let app = setup(ServiceKind::Order);
    let order = place_order(&app).await;
    let uri = format!("/orders/{}/pay", order["order_id"]);

    let (status, _) = send(&app, request("POST", &uri, Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let detail = format!("/orders/{}", order["order_id"]);
    let (_, json) = send(&app, request("GET", &detail, Some(BUYER), None)).await;
    assert_eq!(json["data"]["status"], "pending_payment");
}

#[tokio::test]
async fn test_cancel_succeeds_with_notifications_down() {
    let app = setup(ServiceKind::Order);
    let order = place_order(&app).await;
    let uri = format!("/orders/{}/cancel", order["order_id"]);

    let (status, json) = send(
        &app,
        request("POST", &uri, Some(BUYER), Some(json!({"reason": "changed my mind"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "cancelled");
    assert_eq!(json["data"]["cancel_reason"], "changed my mind");

    let (status, _) = send(&app, request("POST", &uri, Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_internal_patch_and_lookup() {
    let app = setup(ServiceKind::Order);
    let order = place_order(&app).await;
    let uuid = order["order_uuid"].as_str().unwrap();

    let (status, json) = send(&app, request("GET", &format!("/orders/internal/{uuid}"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["buyer_uuid"], BUYER);

    let patch_uri = format!("/orders/internal/orders/{uuid}");
    let (status, _) = send(
        &app,
        request("PATCH", &patch_uri, None, Some(json!({"status": "paid", "total_amount": "0.01"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        request(
            "PATCH",
            &patch_uri,
            None,
            Some(json!({"status": "paid", "payment_time": "2026-10-19T08:00:00Z"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "paid");

    // Same status again is a no-op; going back is refused.
    let (status, _) = send(&app, request("PATCH", &patch_uri, None, Some(json!({"status": 1})))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        request("PATCH", &patch_uri, None, Some(json!({"status": "pending_payment"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Cancellation and completion are not for peers to decide.
    for target in ["cancelled", "completed"] {
        let (status, _) = send(&app, request("PATCH", &patch_uri, None, Some(json!({"status": target})))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
    let (_, json) = send(&app, request("GET", &format!("/orders/internal/{uuid}"), None, None)).await;
    assert_eq!(json["data"]["status"], "paid");
}

#[tokio::test]
async fn test_internal_lookup_of_unknown_order_is_404() {
    let app = setup(ServiceKind::Order);
    let (status, json) = send(
        &app,
        request("GET", "/orders/internal/2f6c3c5e-8d0a-4a55-9d5f-0d6f2b8f0a11", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_payment_create_with_order_service_down_is_503() {
    let app = setup(ServiceKind::Payment);
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/payment/create",
            Some(BUYER),
            Some(json!({
                "order_uuid": "2f6c3c5e-8d0a-4a55-9d5f-0d6f2b8f0a11",
                "payment_method": "alipay",
                "amount": "199.98",
                "payment_subject": "Order 1"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_payment_callback_errors() {
    let app = setup(ServiceKind::Payment);
    let callback = json!({
        "payment_uuid": "2f6c3c5e-8d0a-4a55-9d5f-0d6f2b8f0a11",
        "status": "success"
    });

    let (status, _) = send(
        &app,
        request("POST", "/payment/callback/paypal", None, Some(callback.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request("POST", "/payment/callback/alipay", None, Some(callback)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_records_start_empty() {
    let app = setup(ServiceKind::Payment);
    let (status, json) = send(&app, request("GET", "/payment/records", Some(BUYER), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], json!([]));
}

#[tokio::test]
async fn test_notification_inbox_flow() {
    let app = setup(ServiceKind::Notification);
    for title in ["First", "Second"] {
        let (status, json) = send(
            &app,
            request(
                "POST",
                "/notifications/internal/create",
                None,
                Some(json!({
                    "user_uuid": BUYER,
                    "type": "transaction",
                    "title": title,
                    "content": "Something happened."
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["read"], false);
    }

    let (_, json) = send(&app, request("GET", "/notifications/unread-count", Some(BUYER), None)).await;
    assert_eq!(json["data"]["unread_count"], 2);

    let (_, json) = send(&app, request("GET", "/notifications", Some(BUYER), None)).await;
    let newest = json["data"][0]["id"].as_u64().unwrap();

    let (status, _) = send(
        &app,
        request("POST", &format!("/notifications/{newest}/read"), Some(STRANGER), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        request("POST", &format!("/notifications/{newest}/read"), Some(BUYER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["read"], true);

    let (_, json) = send(&app, request("GET", "/notifications?read=false", Some(BUYER), None)).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (_, json) = send(&app, request("POST", "/notifications/read-all", Some(BUYER), None)).await;
    assert_eq!(json["data"]["updated"], 1);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/notifications/{newest}"), Some(BUYER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = send(&app, request("GET", "/notifications", Some(BUYER), None)).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_notification_create_rejects_empty_title() {
    let app = setup(ServiceKind::Notification);
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/notifications/internal/create",
            None,
            Some(json!({
                "user_uuid": BUYER,
                "type": "system",
                "title": "",
                "content": "x"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
