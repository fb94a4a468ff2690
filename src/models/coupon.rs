use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CouponKind {
    FirstOrder,
    MinimumAmount,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// A discount code. Codes are stored in canonical uppercase form and
/// matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: CouponKind,
    pub discount_type: DiscountType,
    /// Percent in [0, 100] for percentage coupons, currency amount for fixed.
    pub discount_value: Decimal,
    pub minimum_amount: Option<Decimal>,
    /// Caps the computed discount for percentage coupons.
    pub max_discount: Option<Decimal>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Coupon {
    /// Canonical form used for storage and lookup.
    pub fn canonical_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}
