//! Notifier port. Delivery (email/SMS) is an external service; sends are
//! fire-and-forget and failures are logged, never propagated to callers.

use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_otp(&self, email: &str, code: &str);
    async fn notify(&self, recipient: &str, subject: &str, body: &str);
}

/// Default notifier: writes the message to the log stream. Stands in for
/// the real delivery service in development and tests.
#[derive(Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_otp(&self, email: &str, code: &str) {
        info!(email, code, "otp dispatched");
    }

    async fn notify(&self, recipient: &str, subject: &str, body: &str) {
        info!(recipient, subject, body, "notification dispatched");
    }
}
