//! Test harness: the full service stack over in-memory stores. No HTTP
//! server; suites drive the service layer directly, which is where every
//! rule lives.
#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use storefront_api::{
    auth::Actor,
    events::EventSender,
    models::{Order, OrderStatus, PaymentMethod, ReturnMethod, ReturnReason},
    notifications::TracingNotifier,
    payments::HmacPaymentGateway,
    services::{
        coupons::CouponService,
        orders::{CreateOrderRequest, OrderItemRequest, OrderService},
        returns::{RequestReturnRequest, ReturnItemRequest, ReturnService},
    },
    stores::{
        InMemoryCouponStore, InMemoryOrderStore, InMemoryReturnStore, InMemoryStockStore,
        OrderStore, StockStore,
    },
};

pub const TEST_SECRET: &str = "integration_test_gateway_secret";

pub struct TestApp {
    pub orders: OrderService,
    pub returns: ReturnService,
    pub coupons: CouponService,
    pub order_store: Arc<InMemoryOrderStore>,
    pub stock: Arc<InMemoryStockStore>,
    pub gateway: Arc<HmacPaymentGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_windows(7, 30)
    }

    pub fn with_windows(customer_days: i64, admin_days: i64) -> Self {
        let order_store = Arc::new(InMemoryOrderStore::new());
        let return_store = Arc::new(InMemoryReturnStore::new());
        let coupon_store = Arc::new(InMemoryCouponStore::new());
        let stock = Arc::new(InMemoryStockStore::new());
        let notifier = Arc::new(TracingNotifier::new());
        let gateway = Arc::new(HmacPaymentGateway::new(TEST_SECRET));
        let events = EventSender::spawn_default(64);

        let coupons = CouponService::new(coupon_store);
        let orders = OrderService::new(
            order_store.clone(),
            stock.clone(),
            coupons.clone(),
            gateway.clone(),
            notifier.clone(),
            events.clone(),
            "USD".to_string(),
        );
        let returns = ReturnService::new(
            return_store,
            order_store.clone(),
            notifier,
            events,
            customer_days,
            admin_days,
        );

        Self {
            orders,
            returns,
            coupons,
            order_store,
            stock,
            gateway,
        }
    }

    pub async fn seed_stock(&self, product_id: Uuid, size: &str, quantity: u32) {
        self.stock
            .set_stock(product_id, size, quantity)
            .await
            .expect("seed stock");
    }

    /// Admin-driven walk to delivered; panics on any rejected edge.
    pub async fn deliver(&self, order_id: Uuid) -> Order {
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            self.orders
                .update_status(Actor::Admin, order_id, status)
                .await
                .expect("lifecycle walk");
        }
        self.order_store
            .get(order_id)
            .await
            .expect("store read")
            .expect("order exists")
    }

    /// Moves the delivery anchor into the past so the return window can be
    /// exercised without a clock abstraction.
    pub async fn backdate_delivery(&self, order_id: Uuid, days_ago: i64) {
        let mut order = self
            .order_store
            .get(order_id)
            .await
            .expect("store read")
            .expect("order exists");
        order.delivered_at = Some(chrono::Utc::now() - chrono::Duration::days(days_ago));
        self.order_store.update(order).await.expect("backdate");
    }
}

pub fn customer() -> Actor {
    Actor::Customer { id: Uuid::new_v4() }
}

pub fn item_request(product_id: Uuid, quantity: u32, unit_price: Decimal) -> OrderItemRequest {
    OrderItemRequest {
        product_id,
        name: "Test Tee".to_string(),
        size: "M".to_string(),
        quantity,
        unit_price,
        image: None,
    }
}

/// Return request against the order's first item, shipped back by the
/// customer (no pickup address needed).
pub fn return_request(order: &Order, quantity: u32) -> RequestReturnRequest {
    RequestReturnRequest {
        order_id: order.id,
        items: vec![ReturnItemRequest {
            order_item_id: order.order_items[0].id,
            quantity,
            reason: ReturnReason::SizeIssue,
            reason_description: None,
        }],
        return_reason: ReturnReason::SizeIssue,
        return_description: None,
        return_method: ReturnMethod::CustomerShip,
        pickup_address: None,
    }
}

pub fn order_request(items: Vec<OrderItemRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_name: "Test Customer".to_string(),
        customer_email: "customer@example.com".to_string(),
        customer_phone: "+15550100".to_string(),
        address: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        postal_code: "12345".to_string(),
        country: "US".to_string(),
        items,
        payment_method: PaymentMethod::Cod,
        coupon_code: None,
    }
}
