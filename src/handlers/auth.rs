use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RequestOtpRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyOtpResponse {
    pub verified: bool,
}

/// Sends a one-time code to the guest's email. Always returns success to
/// avoid leaking which addresses exist.
pub async fn request_otp(
    State(state): State<AppState>,
    Json(request): Json<RequestOtpRequest>,
) -> ApiResult<()> {
    request.validate()?;
    state.otp.request_code(&request.email).await?;
    Ok(Json(ApiResponse::with_message((), "Code sent")))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> ApiResult<VerifyOtpResponse> {
    request.validate()?;
    let verified = state.otp.verify_code(&request.email, &request.code).await?;
    if !verified {
        return Err(ServiceError::Unauthorized(
            "invalid or expired code".to_string(),
        ));
    }
    Ok(Json(ApiResponse::success(VerifyOtpResponse { verified })))
}
