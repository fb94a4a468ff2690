use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Actor,
    errors::ServiceError,
    models::{Order, OrderStatus},
    services::orders::{ConfirmPaymentRequest, CreateOrderRequest},
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetTrackingRequest {
    pub track: Option<String>,
}

/// Display metadata for one status, as rendered by storefront clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusInfo {
    pub status: String,
    pub label: String,
    pub color: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created", body = Order),
        (status = 400, description = "Validation failed"),
        (status = 422, description = "Insufficient stock")
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    let order = state.orders.create_order(actor, request).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "All orders, newest first")),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<Order>> {
    let (items, total) = state.orders.list_orders(actor, query.page, query.limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page,
        query.limit,
    ))))
}

pub async fn list_my_orders(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<Order>> {
    let (items, total) = state
        .orders
        .list_orders_for_user(actor, query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page,
        query.limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order", body = Order),
        (status = 404, description = "Not found")
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    let order = state.orders.get_order(actor, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn get_order_by_number(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_number): Path<String>,
) -> ApiResult<Order> {
    let order = state.orders.get_order_by_number(actor, &order_number).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Updated order", body = Order),
        (status = 400, description = "Invalid transition"),
        (status = 403, description = "Admin only")
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<Order> {
    let order = state.orders.update_status(actor, id, request.status).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/confirm-payment",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Paid order", body = Order),
        (status = 402, description = "Signature verification failed")
    ),
    tag = "orders"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> ApiResult<Order> {
    let order = state.orders.confirm_payment(id, request).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn set_tracking(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<SetTrackingRequest>,
) -> ApiResult<Order> {
    let order = state.orders.set_tracking(actor, id, request.track).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// The admin console builds its status dropdown from this.
pub async fn next_order_statuses(
    Path(status): Path<String>,
) -> ApiResult<Vec<StatusInfo>> {
    let status = OrderStatus::from_str(&status)
        .map_err(|_| ServiceError::ValidationError(format!("unknown order status: {status}")))?;
    let next = status
        .next_possible()
        .into_iter()
        .map(|s| StatusInfo {
            status: s.to_string(),
            label: s.label().to_string(),
            color: s.color().to_string(),
        })
        .collect();
    Ok(Json(ApiResponse::success(next)))
}
