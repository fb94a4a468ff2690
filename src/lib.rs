//! Storefront API Library
//!
//! Order lifecycle, return workflow, and coupon evaluation for the
//! storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod openapi;
pub mod payments;
pub mod services;
pub mod stores;

use axum::{response::Json, routing::get, routing::post, routing::put, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub orders: services::orders::OrderService,
    pub returns: services::returns::ReturnService,
    pub coupons: services::coupons::CouponService,
    pub otp: auth::OtpService,
    pub events: events::EventSender,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub status: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let orders = Router::new()
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/orders/mine", get(handlers::orders::list_my_orders))
        .route(
            "/orders/by-number/:order_number",
            get(handlers::orders::get_order_by_number),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/status", put(handlers::orders::update_order_status))
        .route(
            "/orders/:id/confirm-payment",
            post(handlers::orders::confirm_payment),
        )
        .route("/orders/:id/tracking", put(handlers::orders::set_tracking))
        .route(
            "/orders/:id/returns",
            get(handlers::returns::list_returns_for_order),
        )
        .route(
            "/order-statuses/:status/next",
            get(handlers::orders::next_order_statuses),
        );

    let returns = Router::new()
        .route(
            "/returns",
            post(handlers::returns::create_return).get(handlers::returns::list_returns),
        )
        .route("/returns/:id", get(handlers::returns::get_return))
        .route(
            "/returns/:id/status",
            put(handlers::returns::update_return_status),
        )
        .route(
            "/return-statuses/:status/next",
            get(handlers::returns::next_return_statuses),
        );

    let coupons = Router::new()
        .route(
            "/coupons",
            post(handlers::coupons::create_coupon).get(handlers::coupons::list_coupons),
        )
        .route("/coupons/validate", post(handlers::coupons::validate_coupon))
        .route("/coupons/:code/active", put(handlers::coupons::set_coupon_active));

    let auth_routes = Router::new()
        .route("/auth/otp/request", post(handlers::auth::request_otp))
        .route("/auth/otp/verify", post(handlers::auth::verify_otp));

    Router::new()
        .merge(orders)
        .merge(returns)
        .merge(coupons)
        .merge(auth_routes)
}

pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api-docs/openapi.json",
    }))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn status_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn paginated_response_computes_total_pages() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn success_envelope_carries_data() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, Some("ok"));
        assert!(response.message.is_none());
    }
}
