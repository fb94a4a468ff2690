use axum::{
    extract::{Path, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::Actor,
    errors::ServiceError,
    models::Coupon,
    services::coupons::{CouponValidation, CreateCouponRequest},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "Coupon code is required"))]
    pub code: String,
    pub order_amount: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetCouponActiveRequest {
    pub is_active: bool,
}

fn require_admin(actor: Actor) -> Result<(), ServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only admins may manage coupons".to_string(),
        ))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 200, description = "Coupon created", body = Coupon),
        (status = 403, description = "Admin only")
    ),
    tag = "coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<CreateCouponRequest>,
) -> ApiResult<Coupon> {
    require_admin(actor)?;
    let coupon = state.coupons.create_coupon(request).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

pub async fn list_coupons(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<Vec<Coupon>> {
    require_admin(actor)?;
    let coupons = state.coupons.list_coupons().await?;
    Ok(Json(ApiResponse::success(coupons)))
}

/// Pre-checkout validation for the cart page. The discount returned here is
/// advisory; checkout re-validates against the submitted items.
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon applies", body = CouponValidation),
        (status = 400, description = "Coupon rejected with a specific reason")
    ),
    tag = "coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<ValidateCouponRequest>,
) -> ApiResult<CouponValidation> {
    request.validate()?;
    let is_first_order = state.orders.is_first_order(actor).await?;
    let validation = state
        .coupons
        .validate(&request.code, request.order_amount, is_first_order)
        .await?;
    Ok(Json(ApiResponse::success(validation)))
}

pub async fn set_coupon_active(
    State(state): State<AppState>,
    actor: Actor,
    Path(code): Path<String>,
    Json(request): Json<SetCouponActiveRequest>,
) -> ApiResult<Coupon> {
    require_admin(actor)?;
    let coupon = state.coupons.set_active(&code, request.is_active).await?;
    Ok(Json(ApiResponse::success(coupon)))
}
