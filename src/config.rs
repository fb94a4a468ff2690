use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
// Development-only gateway secret; production must set APP__PAYMENT_GATEWAY_SECRET.
const DEV_DEFAULT_GATEWAY_SECRET: &str = "dev_payment_gateway_secret_do_not_use_in_production";

#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    #[validate(length(min = 1, message = "log_level must not be empty"))]
    pub log_level: String,
    pub log_json: bool,

    /// Comma-separated allowed CORS origins; permissive in development when unset.
    pub cors_allowed_origins: Option<String>,

    /// Days after delivery during which a customer may file a return.
    #[validate(range(min = 1, message = "return_window_days must be at least 1"))]
    pub return_window_days: i64,
    /// Admins filing on a customer's behalf get a longer window.
    #[validate(range(min = 1, message = "admin_return_window_days must be at least 1"))]
    pub admin_return_window_days: i64,

    /// Policy constant only: how long a pending card order is considered
    /// collectable before operators treat it as stale. Nothing auto-cancels;
    /// there is no background expiry job.
    pub pending_payment_expiry_hours: i64,

    /// Shared secret for payment gateway signature verification.
    #[validate(length(min = 16, message = "payment_gateway_secret must be at least 16 chars"))]
    pub payment_gateway_secret: String,

    /// ISO currency code used for payment intents.
    #[validate(length(min = 3, max = 3, message = "currency must be a 3-letter code"))]
    pub currency: String,

    /// Minutes an issued guest-checkout OTP stays valid.
    #[validate(range(min = 1, message = "otp_ttl_minutes must be at least 1"))]
    pub otp_ttl_minutes: i64,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "config directory '{}' not found; using built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("return_window_days", 7)?
        .set_default("admin_return_window_days", 30)?
        .set_default("pending_payment_expiry_hours", 24)?
        .set_default("payment_gateway_secret", DEV_DEFAULT_GATEWAY_SECRET)?
        .set_default("currency", "USD")?
        .set_default("otp_ttl_minutes", 10)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let cfg: AppConfig = config.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true);

    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_and_validate() {
        let cfg = load_config().expect("defaults should load");
        assert_eq!(cfg.return_window_days, 7);
        assert_eq!(cfg.admin_return_window_days, 30);
        assert!(cfg.admin_return_window_days >= cfg.return_window_days);
        assert_eq!(cfg.currency.len(), 3);
    }
}
