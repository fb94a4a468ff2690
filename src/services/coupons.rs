use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::{CouponRejection, ServiceError},
    models::{Coupon, CouponKind, DiscountType},
    stores::{CouponStore, StoreError},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 32, message = "Code must be between 1 and 32 characters"))]
    pub code: String,
    pub kind: CouponKind,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_amount: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub expiry_date: Option<chrono::DateTime<chrono::Utc>>,
    pub usage_limit: Option<u32>,
}

/// Successful validation result fed into order total computation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CouponValidation {
    pub coupon_id: Uuid,
    pub code: String,
    pub discount_amount: Decimal,
}

/// Coupon/discount evaluator.
#[derive(Clone)]
pub struct CouponService {
    coupons: Arc<dyn CouponStore>,
}

impl CouponService {
    pub fn new(coupons: Arc<dyn CouponStore>) -> Self {
        Self { coupons }
    }

    /// Validates a code against the order subtotal and computes the discount.
    /// Every rejection carries a specific [`CouponRejection`] reason.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_subtotal: Decimal,
        is_first_order: bool,
    ) -> Result<CouponValidation, ServiceError> {
        let canonical = Coupon::canonical_code(code);
        let coupon = self
            .coupons
            .get_by_code(&canonical)
            .await?
            .ok_or(ServiceError::CouponInvalid(CouponRejection::NotFound))?;

        if !coupon.is_active {
            return Err(ServiceError::CouponInvalid(CouponRejection::Inactive));
        }
        if let Some(expiry) = coupon.expiry_date {
            if Utc::now() > expiry {
                return Err(ServiceError::CouponInvalid(CouponRejection::Expired));
            }
        }
        if let Some(limit) = coupon.usage_limit {
            if coupon.used_count >= limit {
                warn!(code = %canonical, "coupon usage limit reached");
                return Err(ServiceError::CouponInvalid(CouponRejection::UsageLimitReached));
            }
        }
        match coupon.kind {
            CouponKind::FirstOrder => {
                if !is_first_order {
                    return Err(ServiceError::CouponInvalid(CouponRejection::FirstOrderOnly));
                }
            }
            CouponKind::MinimumAmount => {
                let minimum = coupon.minimum_amount.unwrap_or(Decimal::ZERO);
                if order_subtotal < minimum {
                    debug!(%order_subtotal, %minimum, "subtotal below coupon minimum");
                    return Err(ServiceError::CouponInvalid(
                        CouponRejection::MinimumAmountNotMet,
                    ));
                }
            }
        }

        let discount_amount = Self::discount_amount(&coupon, order_subtotal);
        Ok(CouponValidation {
            coupon_id: coupon.id,
            code: coupon.code,
            discount_amount,
        })
    }

    /// Percentage discounts are capped by `max_discount`; fixed discounts
    /// never exceed the subtotal.
    fn discount_amount(coupon: &Coupon, subtotal: Decimal) -> Decimal {
        let raw = match coupon.discount_type {
            DiscountType::Percentage => subtotal * coupon.discount_value / Decimal::from(100),
            DiscountType::Fixed => coupon.discount_value.min(subtotal),
        };
        let capped = match coupon.max_discount {
            Some(max) if coupon.discount_type == DiscountType::Percentage => raw.min(max),
            _ => raw,
        };
        capped.max(Decimal::ZERO)
    }

    /// Version-checked usage increment, called after a successful order.
    /// Retries until the compare-and-swap commits so concurrent checkouts
    /// never lose a count. Usage is not refunded if the order is later
    /// cancelled.
    #[instrument(skip(self))]
    pub async fn increment_usage(&self, code: &str) -> Result<(), ServiceError> {
        let canonical = Coupon::canonical_code(code);
        loop {
            let mut coupon = self
                .coupons
                .get_by_code(&canonical)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("coupon {} not found", canonical)))?;
            coupon.used_count += 1;
            match self.coupons.update(coupon).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict) => {
                    debug!(code = %canonical, "usage increment conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[instrument(skip(self, request))]
    pub async fn create_coupon(&self, request: CreateCouponRequest) -> Result<Coupon, ServiceError> {
        request.validate()?;
        if request.discount_type == DiscountType::Percentage
            && !(Decimal::ZERO..=Decimal::from(100)).contains(&request.discount_value)
        {
            return Err(ServiceError::ValidationError(
                "percentage discount must be between 0 and 100".to_string(),
            ));
        }
        if request.discount_value < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "discount value must not be negative".to_string(),
            ));
        }

        let coupon = Coupon {
            id: Uuid::new_v4(),
            code: Coupon::canonical_code(&request.code),
            kind: request.kind,
            discount_type: request.discount_type,
            discount_value: request.discount_value,
            minimum_amount: request.minimum_amount,
            max_discount: request.max_discount,
            expiry_date: request.expiry_date,
            usage_limit: request.usage_limit,
            used_count: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
            version: 0,
        };
        Ok(self.coupons.insert(coupon).await?)
    }

    pub async fn list_coupons(&self) -> Result<Vec<Coupon>, ServiceError> {
        Ok(self.coupons.list().await?)
    }

    #[instrument(skip(self))]
    pub async fn set_active(&self, code: &str, is_active: bool) -> Result<Coupon, ServiceError> {
        let canonical = Coupon::canonical_code(code);
        let mut coupon = self
            .coupons
            .get_by_code(&canonical)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("coupon {} not found", canonical)))?;
        coupon.is_active = is_active;
        Ok(self.coupons.update(coupon).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryCouponStore;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn service() -> CouponService {
        CouponService::new(Arc::new(InMemoryCouponStore::new()))
    }

    async fn seed(service: &CouponService, request: CreateCouponRequest) -> Coupon {
        service.create_coupon(request).await.unwrap()
    }

    fn min_amount_coupon() -> CreateCouponRequest {
        CreateCouponRequest {
            code: "SAVE10".into(),
            kind: CouponKind::MinimumAmount,
            discount_type: DiscountType::Percentage,
            discount_value: dec!(10),
            minimum_amount: Some(dec!(500)),
            max_discount: Some(dec!(40)),
            expiry_date: None,
            usage_limit: None,
        }
    }

    #[tokio::test]
    async fn minimum_amount_gate_and_cap() {
        let svc = service();
        seed(&svc, min_amount_coupon()).await;

        // 450 subtotal is below the 500 minimum.
        let err = svc.validate("SAVE10", dec!(450), false).await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::CouponInvalid(CouponRejection::MinimumAmountNotMet)
        );

        // 1000 subtotal: 10% = 100, capped to 40.
        let ok = svc.validate("SAVE10", dec!(1000), false).await.unwrap();
        assert_eq!(ok.discount_amount, dec!(40));
    }

    #[tokio::test]
    async fn codes_match_case_insensitively() {
        let svc = service();
        seed(&svc, min_amount_coupon()).await;
        let ok = svc.validate("save10", dec!(600), false).await.unwrap();
        assert_eq!(ok.code, "SAVE10");
        assert_eq!(ok.discount_amount, dec!(40));
    }

    #[tokio::test]
    async fn fixed_discount_never_exceeds_subtotal() {
        let svc = service();
        seed(
            &svc,
            CreateCouponRequest {
                code: "FLAT200".into(),
                kind: CouponKind::MinimumAmount,
                discount_type: DiscountType::Fixed,
                discount_value: dec!(200),
                minimum_amount: Some(dec!(100)),
                max_discount: None,
                expiry_date: None,
                usage_limit: None,
            },
        )
        .await;

        let ok = svc.validate("FLAT200", dec!(150), false).await.unwrap();
        assert_eq!(ok.discount_amount, dec!(150));
    }

    #[tokio::test]
    async fn first_order_coupon_rejects_repeat_customers() {
        let svc = service();
        seed(
            &svc,
            CreateCouponRequest {
                code: "WELCOME".into(),
                kind: CouponKind::FirstOrder,
                discount_type: DiscountType::Fixed,
                discount_value: dec!(50),
                minimum_amount: None,
                max_discount: None,
                expiry_date: None,
                usage_limit: None,
            },
        )
        .await;

        assert_matches!(
            svc.validate("WELCOME", dec!(600), false).await.unwrap_err(),
            ServiceError::CouponInvalid(CouponRejection::FirstOrderOnly)
        );
        assert!(svc.validate("WELCOME", dec!(600), true).await.is_ok());
    }

    #[tokio::test]
    async fn expired_and_inactive_and_unknown() {
        let svc = service();
        seed(
            &svc,
            CreateCouponRequest {
                code: "OLD".into(),
                kind: CouponKind::MinimumAmount,
                discount_type: DiscountType::Fixed,
                discount_value: dec!(10),
                minimum_amount: None,
                max_discount: None,
                expiry_date: Some(Utc::now() - chrono::Duration::days(1)),
                usage_limit: None,
            },
        )
        .await;

        assert_matches!(
            svc.validate("OLD", dec!(600), false).await.unwrap_err(),
            ServiceError::CouponInvalid(CouponRejection::Expired)
        );
        assert_matches!(
            svc.validate("NOPE", dec!(600), false).await.unwrap_err(),
            ServiceError::CouponInvalid(CouponRejection::NotFound)
        );

        seed(&svc, min_amount_coupon()).await;
        svc.set_active("SAVE10", false).await.unwrap();
        assert_matches!(
            svc.validate("SAVE10", dec!(600), false).await.unwrap_err(),
            ServiceError::CouponInvalid(CouponRejection::Inactive)
        );
    }

    #[tokio::test]
    async fn usage_limit_is_enforced() {
        let svc = service();
        seed(
            &svc,
            CreateCouponRequest {
                code: "ONCE".into(),
                kind: CouponKind::MinimumAmount,
                discount_type: DiscountType::Fixed,
                discount_value: dec!(10),
                minimum_amount: None,
                max_discount: None,
                expiry_date: None,
                usage_limit: Some(1),
            },
        )
        .await;

        assert!(svc.validate("ONCE", dec!(100), false).await.is_ok());
        svc.increment_usage("ONCE").await.unwrap();
        assert_matches!(
            svc.validate("ONCE", dec!(100), false).await.unwrap_err(),
            ServiceError::CouponInvalid(CouponRejection::UsageLimitReached)
        );
    }

    #[tokio::test]
    async fn concurrent_usage_increments_are_not_lost() {
        let svc = service();
        seed(&svc, min_amount_coupon()).await;

        let (a, b, c) = tokio::join!(
            svc.increment_usage("SAVE10"),
            svc.increment_usage("SAVE10"),
            svc.increment_usage("SAVE10"),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let coupon = svc.coupons.get_by_code("SAVE10").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 3);
    }

    #[tokio::test]
    async fn percentage_over_100_is_rejected_at_creation() {
        let svc = service();
        let mut request = min_amount_coupon();
        request.discount_value = dec!(120);
        assert_matches!(
            svc.create_coupon(request).await.unwrap_err(),
            ServiceError::ValidationError(_)
        );
    }
}
