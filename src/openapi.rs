//! OpenAPI document for the HTTP surface, served as JSON at
//! `/api-docs/openapi.json`.

use axum::response::Json;
use serde_json::Value;
use utoipa::OpenApi;

use crate::handlers;
use crate::models::{
    Coupon, CouponKind, CustomerInfo, DiscountType, ItemReturnStatus, Order, OrderItem,
    OrderStatus, PaymentDetails, PaymentMethod, RefundMethod, Return, ReturnItem, ReturnMethod,
    ReturnReason, ReturnStatus, ShippingAddress, TimelineEntry,
};
use crate::services::coupons::{CouponValidation, CreateCouponRequest};
use crate::services::orders::{ConfirmPaymentRequest, CreateOrderRequest, OrderItemRequest};
use crate::services::returns::{
    RequestReturnRequest, ReturnItemRequest, ReturnWithWindow, UpdateReturnStatusRequest,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Order lifecycle, return workflow, and coupon evaluation \
            for the storefront backend."
    ),
    paths(
        handlers::orders::create_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::update_order_status,
        handlers::orders::confirm_payment,
        handlers::returns::create_return,
        handlers::returns::list_returns,
        handlers::returns::get_return,
        handlers::returns::update_return_status,
        handlers::coupons::create_coupon,
        handlers::coupons::validate_coupon,
    ),
    components(schemas(
        Order,
        OrderItem,
        OrderStatus,
        PaymentMethod,
        PaymentDetails,
        ItemReturnStatus,
        ShippingAddress,
        CustomerInfo,
        Return,
        ReturnItem,
        ReturnStatus,
        ReturnReason,
        ReturnMethod,
        RefundMethod,
        TimelineEntry,
        ReturnWithWindow,
        Coupon,
        CouponKind,
        DiscountType,
        CouponValidation,
        CreateOrderRequest,
        OrderItemRequest,
        ConfirmPaymentRequest,
        RequestReturnRequest,
        ReturnItemRequest,
        UpdateReturnStatusRequest,
        CreateCouponRequest,
    )),
    tags(
        (name = "orders", description = "Order lifecycle"),
        (name = "returns", description = "Return workflow"),
        (name = "coupons", description = "Coupon evaluation")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<Value> {
    // The document is static; serialization cannot fail.
    Json(serde_json::to_value(ApiDoc::openapi()).unwrap_or_default())
}
