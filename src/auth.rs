//! Actor identification and guest-checkout OTP flow.
//!
//! Session mechanics live outside this service; requests arrive with the
//! caller's identity already established and expressed as headers
//! (`x-user-id` for customers, `x-role: admin` for back-office callers).
//! Every engine operation takes the resulting [`Actor`] explicitly.

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::notifications::Notifier;

/// Who is performing an engine operation. Never ambient: passed into every
/// service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Customer { id: Uuid },
    Guest,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::Customer { id } => Some(*id),
            _ => None,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(role) = parts.headers.get("x-role") {
            if role.to_str().map(|r| r.eq_ignore_ascii_case("admin")).unwrap_or(false) {
                return Ok(Actor::Admin);
            }
        }
        if let Some(raw) = parts.headers.get("x-user-id") {
            let raw = raw
                .to_str()
                .map_err(|_| ServiceError::Unauthorized("malformed x-user-id header".into()))?;
            let id = Uuid::parse_str(raw)
                .map_err(|_| ServiceError::Unauthorized("x-user-id is not a valid uuid".into()))?;
            return Ok(Actor::Customer { id });
        }
        Ok(Actor::Guest)
    }
}

/// One-time codes for OTP-gated guest checkout. Codes are single-use and
/// expire after the configured TTL; delivery goes through the [`Notifier`].
#[derive(Clone)]
pub struct OtpService {
    notifier: Arc<dyn Notifier>,
    codes: Arc<DashMap<String, (String, DateTime<Utc>)>>,
    ttl_minutes: i64,
}

impl OtpService {
    pub fn new(notifier: Arc<dyn Notifier>, ttl_minutes: i64) -> Self {
        Self {
            notifier,
            codes: Arc::new(DashMap::new()),
            ttl_minutes,
        }
    }

    /// Issues a fresh 6-digit code for the email, replacing any prior one.
    #[instrument(skip(self))]
    pub async fn request_code(&self, email: &str) -> Result<(), ServiceError> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(ServiceError::ValidationError(
                "a valid email is required".to_string(),
            ));
        }
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let expires_at = Utc::now() + Duration::minutes(self.ttl_minutes);
        self.codes
            .insert(email.to_lowercase(), (code.clone(), expires_at));
        self.notifier.send_otp(email, &code).await;
        Ok(())
    }

    /// Consumes the code on success. Wrong or expired codes leave no trace.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<bool, ServiceError> {
        let key = email.to_lowercase();
        let valid = match self.codes.get(&key) {
            Some(entry) => {
                let (stored, expires_at) = entry.value();
                stored == code && Utc::now() <= *expires_at
            }
            None => false,
        };
        if valid {
            self.codes.remove(&key);
        }
        Ok(valid)
    }
}
