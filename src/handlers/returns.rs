use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::Actor,
    errors::ServiceError,
    models::{Return, ReturnStatus},
    services::returns::{RequestReturnRequest, ReturnWithWindow, UpdateReturnStatusRequest},
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};

use super::orders::StatusInfo;

#[utoipa::path(
    post,
    path = "/api/v1/returns",
    request_body = RequestReturnRequest,
    responses(
        (status = 200, description = "Return filed", body = Return),
        (status = 400, description = "Not eligible"),
        (status = 409, description = "Concurrent reservation conflict, retry")
    ),
    tag = "returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<RequestReturnRequest>,
) -> ApiResult<Return> {
    let ret = state.returns.request_return(actor, request).await?;
    Ok(Json(ApiResponse::success(ret)))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns",
    responses((status = 200, description = "All returns, newest first")),
    tag = "returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<Return>> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            ReturnStatus::from_str(raw).map_err(|_| {
                ServiceError::ValidationError(format!("unknown return status: {raw}"))
            })
        })
        .transpose()?;
    let (items, total) = state
        .returns
        .list_returns(actor, query.page, query.limit, status)
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
    path = "/api/v1/returns/{id}",
    params(("id" = Uuid, Path, description = "Return id")),
    responses(
        (status = 200, description = "The return with window fields", body = ReturnWithWindow),
        (status = 404, description = "Not found")
    ),
    tag = "returns"
)]
pub async fn get_return(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<ReturnWithWindow> {
    let ret = state.returns.get_return(actor, id).await?;
    Ok(Json(ApiResponse::success(ret)))
}

#[utoipa::path(
    put,
    path = "/api/v1/returns/{id}/status",
    params(("id" = Uuid, Path, description = "Return id")),
    request_body = UpdateReturnStatusRequest,
    responses(
        (status = 200, description = "Updated return", body = Return),
        (status = 400, description = "Invalid transition or refund amount"),
        (status = 403, description = "Admin only (customers may cancel their own)")
    ),
    tag = "returns"
)]
pub async fn update_return_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateReturnStatusRequest>,
) -> ApiResult<Return> {
    let ret = state.returns.update_return_status(actor, id, request).await?;
    Ok(Json(ApiResponse::success(ret)))
}

pub async fn list_returns_for_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Vec<ReturnWithWindow>> {
    let returns = state.returns.list_returns_for_order(actor, order_id).await?;
    Ok(Json(ApiResponse::success(returns)))
}

pub async fn next_return_statuses(
    Path(status): Path<String>,
) -> ApiResult<Vec<StatusInfo>> {
    let status = ReturnStatus::from_str(&status)
        .map_err(|_| ServiceError::ValidationError(format!("unknown return status: {status}")))?;
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
