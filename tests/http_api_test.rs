//! HTTP surface checks: routing, actor extraction from headers, response
//! envelopes, and the error body shape.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::TestApp;
use storefront_api::{
    api_v1_routes, auth::OtpService, config::load_config, events::EventSender, health_handler,
    notifications::TracingNotifier, openapi::openapi_json, AppState,
};

fn router(app: &TestApp) -> Router {
    let cfg = Arc::new(load_config().expect("default config"));
    let notifier = Arc::new(TracingNotifier::new());
    let state = AppState {
        config: cfg.clone(),
        orders: app.orders.clone(),
        returns: app.returns.clone(),
        coupons: app.coupons.clone(),
        otp: OtpService::new(notifier, cfg.otp_ttl_minutes),
        events: EventSender::spawn_default(16),
    };
    Router::new()
        .route("/health", get(health_handler))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_and_openapi_respond() {
    let app = TestApp::new();
    let router = router(&app);

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = body_json(response).await;
    assert!(doc["paths"]["/api/v1/orders"].is_object());
}

#[tokio::test]
async fn checkout_over_http_wraps_the_order_in_an_envelope() {
    let app = TestApp::new();
    let product = Uuid::new_v4();
    app.seed_stock(product, "M", 5).await;
    let router = router(&app);

    let payload = json!({
        "customer_name": "Jo Bloggs",
        "customer_email": "jo@example.com",
        "customer_phone": "+15550100",
        "address": "1 Main St",
        "city": "Springfield",
        "postal_code": "12345",
        "country": "US",
        "payment_method": "cod",
        "items": [{
            "product_id": product,
            "name": "Test Tee",
            "size": "M",
            "quantity": 1,
            "unit_price": "40.00"
        }]
    });

    let mut request = json_request(Method::POST, "/api/v1/orders", payload);
    request
        .headers_mut()
        .insert("x-user-id", Uuid::new_v4().to_string().parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["status"], json!("pending"));
    assert_eq!(body["data"]["total_price"], json!("40.00"));
}

#[tokio::test]
async fn admin_routes_reject_plain_customers() {
    let app = TestApp::new();
    let router = router(&app);

    let mut request = Request::get("/api/v1/orders").body(Body::empty()).unwrap();
    request
        .headers_mut()
        .insert("x-user-id", Uuid::new_v4().to_string().parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("Forbidden"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn malformed_user_header_is_unauthorized() {
    let app = TestApp::new();
    let router = router(&app);

    let mut request = Request::get("/api/v1/orders/mine")
        .body(Body::empty())
        .unwrap();
    request
        .headers_mut()
        .insert("x-user-id", "not-a-uuid".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_order_maps_to_404() {
    let app = TestApp::new();
    let router = router(&app);

    let mut request = Request::get(format!("/api/v1/orders/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    request.headers_mut().insert("x-role", "admin".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn next_status_endpoints_expose_the_transition_table() {
    let app = TestApp::new();
    let router = router(&app);

    let response = router
        .clone()
        .oneshot(
            Request::get("/api/v1/order-statuses/pending/next")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let statuses: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["processing", "cancelled"]);

    let response = router
        .oneshot(
            Request::get("/api/v1/return-statuses/requested/next")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    let statuses: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["approved", "rejected"]);
}
