//! Payment gateway port. The gateway itself is an external service; the
//! engine only needs intent creation and signature verification.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sha2::Sha256;
use tracing::warn;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers a payment of `amount` with the gateway and returns its
    /// order id, stored on our order as `payment_details.gateway_order_id`.
    async fn create_intent(&self, amount: Decimal, currency: &str)
        -> Result<String, ServiceError>;

    /// Verifies a gateway callback. False means signature or amount mismatch.
    async fn verify(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
        amount: Decimal,
    ) -> Result<bool, ServiceError>;
}

/// HMAC-SHA256 signature scheme over `gateway_order_id|payment_id|amount`,
/// matching the verification contract of razorpay-style gateways.
pub struct HmacPaymentGateway {
    secret: String,
}

impl HmacPaymentGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    fn payload(gateway_order_id: &str, payment_id: &str, amount: Decimal) -> String {
        format!("{}|{}|{}", gateway_order_id, payment_id, amount)
    }

    /// Computes the expected signature. Exposed so tests and local tooling
    /// can forge valid callbacks against a known secret.
    pub fn sign(&self, gateway_order_id: &str, payment_id: &str, amount: Decimal) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(Self::payload(gateway_order_id, payment_id, amount).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl PaymentGateway for HmacPaymentGateway {
    async fn create_intent(
        &self,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<String, ServiceError> {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(14)
            .map(char::from)
            .collect();
        Ok(format!("pay_{}", suffix))
    }

    async fn verify(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
        amount: Decimal,
    ) -> Result<bool, ServiceError> {
        let expected = self.sign(gateway_order_id, payment_id, amount);
        let ok = expected == signature;
        if !ok {
            warn!(gateway_order_id, payment_id, "payment signature mismatch");
        }
        Ok(ok)
    }
}
