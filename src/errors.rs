use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::stores::StoreError;

/// Standard error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Sub-reason reported with `ReturnNotEligible`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnIneligibility {
    /// Order has not been delivered yet
    NotDelivered,
    /// Order is cancelled or already fully returned
    OrderNotReturnable,
    /// The return window has closed
    WindowExpired,
    /// A requested item id does not exist on the order
    UnknownOrderItem,
    /// Requested quantity exceeds the remaining returnable quantity
    QuantityUnavailable,
    /// No valid items or no reason supplied
    EmptyRequest,
}

impl std::fmt::Display for ReturnIneligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::NotDelivered => "order has not been delivered",
            Self::OrderNotReturnable => "order is not in a returnable state",
            Self::WindowExpired => "return window has expired",
            Self::UnknownOrderItem => "requested item does not belong to the order",
            Self::QuantityUnavailable => "requested quantity exceeds returnable quantity",
            Self::EmptyRequest => "no valid return items or reason supplied",
        };
        f.write_str(msg)
    }
}

/// Reason reported with `CouponInvalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    Expired,
    UsageLimitReached,
    FirstOrderOnly,
    MinimumAmountNotMet,
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::NotFound => "coupon code not found",
            Self::Inactive => "coupon is not active",
            Self::Expired => "coupon has expired",
            Self::UsageLimitReached => "coupon usage limit reached",
            Self::FirstOrderOnly => "coupon is valid on first orders only",
            Self::MinimumAmountNotMet => "order subtotal is below the coupon minimum",
        };
        f.write_str(msg)
    }
}

/// Business and infrastructure error taxonomy for all engine operations.
///
/// Every service method returns `Result<T, ServiceError>`; expected
/// business-rule violations are values here, never panics. `ConcurrencyConflict`
/// is the only variant a caller may retry automatically.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid order status transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid return status transition: {0}")]
    InvalidReturnTransition(String),

    #[error("Return not eligible: {0}")]
    ReturnNotEligible(ReturnIneligibility),

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("Refund amount invalid: {0}")]
    RefundAmountInvalid(String),

    #[error("Coupon invalid: {0}")]
    CouponInvalid(CouponRejection),

    #[error("Concurrent modification, retry with fresh state: {0}")]
    ConcurrencyConflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("record not found".to_string()),
            StoreError::VersionConflict => ServiceError::ConcurrencyConflict(err.to_string()),
            StoreError::InsufficientStock { .. } => ServiceError::InsufficientStock(err.to_string()),
            StoreError::Duplicate(_) | StoreError::Unavailable(_) => {
                ServiceError::StoreError(err.to_string())
            }
        }
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidTransition(_)
            | Self::InvalidReturnTransition(_)
            | Self::ReturnNotEligible(_)
            | Self::RefundAmountInvalid(_)
            | Self::CouponInvalid(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentVerificationFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::StoreError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::StoreError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_map_to_client_status_codes() {
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ReturnNotEligible(ReturnIneligibility::WindowExpired).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::PaymentVerificationFailed("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ServiceError::ConcurrencyConflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ServiceError::StoreError("dashmap exploded".into());
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[test]
    fn version_conflict_converts_to_concurrency_conflict() {
        let err: ServiceError = StoreError::VersionConflict.into();
        assert!(matches!(err, ServiceError::ConcurrencyConflict(_)));
    }
}
