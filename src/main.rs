use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::{
    http::HeaderValue,
    routing::get,
    Router,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use storefront_api::{
    api_v1_routes,
    auth::OtpService,
    config::{init_tracing, load_config},
    events::EventSender,
    health_handler,
    notifications::TracingNotifier,
    openapi::openapi_json,
    payments::HmacPaymentGateway,
    root_handler,
    services::{coupons::CouponService, orders::OrderService, returns::ReturnService},
    status_handler,
    stores::{InMemoryCouponStore, InMemoryOrderStore, InMemoryReturnStore, InMemoryStockStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("loading configuration")?;
    init_tracing(&cfg.log_level, cfg.log_json);
    info!(environment = %cfg.environment, "configuration loaded");

    let cfg = Arc::new(cfg);
    let events = EventSender::spawn_default(256);

    let order_store = Arc::new(InMemoryOrderStore::new());
    let return_store = Arc::new(InMemoryReturnStore::new());
    let coupon_store = Arc::new(InMemoryCouponStore::new());
    let stock_store = Arc::new(InMemoryStockStore::new());
    let notifier = Arc::new(TracingNotifier::new());
    let gateway = Arc::new(HmacPaymentGateway::new(&cfg.payment_gateway_secret));

    let coupons = CouponService::new(coupon_store);
    let orders = OrderService::new(
        order_store.clone(),
        stock_store,
        coupons.clone(),
        gateway,
        notifier.clone(),
        events.clone(),
        cfg.currency.clone(),
    );
    let returns = ReturnService::new(
        return_store,
        order_store,
        notifier.clone(),
        events.clone(),
        cfg.return_window_days,
        cfg.admin_return_window_days,
    );
    let otp = OtpService::new(notifier, cfg.otp_ttl_minutes);

    let state = AppState {
        config: cfg.clone(),
        orders,
        returns,
        coupons,
        otp,
        events,
    };

    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_development() {
        info!("no CORS origins configured, using permissive CORS (development)");
        CorsLayer::permissive()
    } else {
        bail!("missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS");
    };

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer)
        .with_state(state);

    let addr = cfg.bind_addr();
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
