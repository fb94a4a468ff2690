use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        CustomerInfo, ItemReturnStatus, Order, OrderItem, OrderStatus, PaymentDetails,
        PaymentMethod, ShippingAddress,
    },
    notifications::Notifier,
    payments::PaymentGateway,
    services::coupons::CouponService,
    stores::{OrderStore, StockLine, StockStore},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Item name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Item size is required"))]
    pub size: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub unit_price: Decimal,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub customer_name: String,
    #[validate(email(message = "A valid email is required"))]
    pub customer_email: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub customer_phone: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    pub items: Vec<OrderItemRequest>,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub payment_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,
}

/// Order lifecycle engine: checkout, payment confirmation, admin-driven
/// status transitions, tracking.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    stock: Arc<dyn StockStore>,
    coupons: CouponService,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    events: EventSender,
    currency: String,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        stock: Arc<dyn StockStore>,
        coupons: CouponService,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        events: EventSender,
        currency: String,
    ) -> Self {
        Self {
            orders,
            stock,
            coupons,
            gateway,
            notifier,
            events,
            currency,
        }
    }

    /// Creates an order from checkout. Validates the coupon, computes totals,
    /// decrements stock atomically across every line (all-or-nothing), and
    /// registers a gateway intent for card payments.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(
        &self,
        actor: Actor,
        request: CreateOrderRequest,
    ) -> Result<Order, ServiceError> {
        request.validate()?;
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".to_string(),
            ));
        }
        for item in &request.items {
            item.validate()?;
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "item price must not be negative".to_string(),
                ));
            }
        }

        let user_id = actor.user_id();
        let original_amount: Decimal = request
            .items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum();

        let (coupon_code, coupon_discount) = match &request.coupon_code {
            Some(code) => {
                let is_first_order = self.is_first_order(actor).await?;
                let validation = self
                    .coupons
                    .validate(code, original_amount, is_first_order)
                    .await?;
                // Never discount below zero.
                let discount = validation.discount_amount.min(original_amount);
                (Some(validation.code), discount)
            }
            None => (None, Decimal::ZERO),
        };
        let total_price = (original_amount - coupon_discount).max(Decimal::ZERO);

        // Register the gateway intent before touching stock so an intent
        // failure cannot strand decremented units.
        let payment_details = match request.payment_method {
            PaymentMethod::Card => {
                let gateway_order_id =
                    self.gateway.create_intent(total_price, &self.currency).await?;
                Some(PaymentDetails {
                    gateway_order_id,
                    payment_id: None,
                    signature: None,
                })
            }
            PaymentMethod::Cod => None,
        };

        // Critical section: every line decrements or none do.
        let lines: Vec<StockLine> = request
            .items
            .iter()
            .map(|i| StockLine {
                product_id: i.product_id,
                size: i.size.clone(),
                quantity: i.quantity,
            })
            .collect();
        self.stock.decrement(&lines).await?;

        let order = Order {
            id: Uuid::new_v4(),
            order_number: generate_order_number(),
            user_id,
            customer: CustomerInfo {
                name: request.customer_name,
                email: request.customer_email,
                phone: request.customer_phone,
            },
            order_items: request
                .items
                .into_iter()
                .map(|i| OrderItem {
                    id: Uuid::new_v4(),
                    product_id: i.product_id,
                    name: i.name,
                    size: i.size,
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    image: i.image,
                    return_status: ItemReturnStatus::None,
                    return_quantity: 0,
                    reserved_return_quantity: 0,
                })
                .collect(),
            status: OrderStatus::Pending,
            original_amount,
            coupon_discount,
            coupon_code: coupon_code.clone(),
            total_price,
            is_paid: false,
            payment_method: request.payment_method,
            payment_details,
            is_delivered: false,
            delivered_at: None,
            track: None,
            shipping_address: ShippingAddress {
                address: request.address,
                city: request.city,
                postal_code: request.postal_code,
                country: request.country,
            },
            has_returns: false,
            total_return_amount: Decimal::ZERO,
            created_at: Utc::now(),
            updated_at: None,
            version: 0,
        };

        let order = match self.orders.insert(order).await {
            Ok(order) => order,
            Err(e) => {
                // No order was recorded; give the units back.
                if let Err(restore_err) = self.stock.restore(&lines).await {
                    warn!(error = %restore_err, "failed to restore stock after insert failure");
                }
                return Err(e.into());
            }
        };
        info!(order_id = %order.id, order_number = %order.order_number, "order created");

        // Coupon usage is consumed on success and never refunded later.
        if let Some(code) = &coupon_code {
            if let Err(e) = self.coupons.increment_usage(code).await {
                warn!(error = %e, code, "failed to increment coupon usage");
            }
        }

        self.events
            .send(Event::OrderCreated {
                order_id: order.id,
                order_number: order.order_number.clone(),
            })
            .await;
        self.notifier
            .notify(
                &order.customer.email,
                "Order placed",
                &format!("Your order {} has been placed.", order.order_number),
            )
            .await;

        Ok(order)
    }

    /// Confirms a card payment from a gateway callback. On signature or
    /// amount mismatch the order stays `pending` so checkout can retry.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        request: ConfirmPaymentRequest,
    ) -> Result<Order, ServiceError> {
        request.validate()?;

        let mut order = self.require_order(order_id).await?;
        if order.payment_method != PaymentMethod::Card {
            return Err(ServiceError::ValidationError(
                "order is not a card payment".to_string(),
            ));
        }
        if order.is_paid {
            // Repeated gateway callback for an already-confirmed payment.
            return Ok(order);
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot confirm payment on a {} order",
                order.status
            )));
        }
        let details = order.payment_details.as_mut().ok_or_else(|| {
            ServiceError::InternalError("card order without payment details".to_string())
        })?;

        let verified = self
            .gateway
            .verify(
                &details.gateway_order_id,
                &request.payment_id,
                &request.signature,
                order.total_price,
            )
            .await?;
        if !verified {
            return Err(ServiceError::PaymentVerificationFailed(
                "gateway signature or amount mismatch".to_string(),
            ));
        }

        details.payment_id = Some(request.payment_id.clone());
        details.signature = Some(request.signature);
        order.is_paid = true;
        order.status = OrderStatus::Processing;

        let order = self.orders.update(order).await?;
        info!(order_id = %order.id, "payment confirmed");
        self.events
            .send(Event::PaymentConfirmed {
                order_id: order.id,
                payment_id: request.payment_id,
            })
            .await;
        Ok(order)
    }

    /// Admin-driven status transition. Setting the current status again is a
    /// no-op success; `delivered_at` is stamped once and never moved.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        actor: Actor,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Order, ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "only admins may update order status".to_string(),
            ));
        }

        let mut order = self.require_order(order_id).await?;
        let old_status = order.status;

        if new_status == old_status {
            return Ok(order);
        }
        if new_status.is_return_derived() {
            return Err(ServiceError::InvalidTransition(format!(
                "{} is derived from returns and cannot be set directly",
                new_status
            )));
        }
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "cannot transition from {} to {}",
                old_status, new_status
            )));
        }

        order.status = new_status;
        if new_status == OrderStatus::Delivered {
            order.is_delivered = true;
            order.delivered_at = Some(order.delivered_at.unwrap_or_else(Utc::now));
        }

        let order = self.orders.update(order).await?;
        info!(order_id = %order.id, %old_status, %new_status, "order status updated");
        self.events
            .send(Event::OrderStatusChanged {
                order_id: order.id,
                old_status,
                new_status,
            })
            .await;
        self.notifier
            .notify(
                &order.customer.email,
                "Order update",
                &format!("Your order {} is now {}.", order.order_number, new_status.label()),
            )
            .await;
        Ok(order)
    }

    /// Free-form tracking URL write; clearing is permitted at any status.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn set_tracking(
        &self,
        actor: Actor,
        order_id: Uuid,
        track: Option<String>,
    ) -> Result<Order, ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "only admins may set tracking".to_string(),
            ));
        }
        let mut order = self.require_order(order_id).await?;
        order.track = track;
        Ok(self.orders.update(order).await?)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, actor: Actor, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.require_order(order_id).await?;
        self.authorize_read(actor, &order)?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        actor: Actor,
        order_number: &str,
    ) -> Result<Order, ServiceError> {
        let order = self
            .orders
            .get_by_number(order_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_number)))?;
        self.authorize_read(actor, &order)?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        actor: Actor,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "only admins may list all orders".to_string(),
            ));
        }
        Ok(self.orders.list(page, limit).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        actor: Actor,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Order>, u64), ServiceError> {
        match actor {
            Actor::Customer { id } => Ok(self.orders.list_for_user(id, page, limit).await?),
            _ => Err(ServiceError::Unauthorized(
                "a customer identity is required".to_string(),
            )),
        }
    }

    /// First-order status drives the first-order coupon gate. Guests and
    /// admins never qualify.
    pub async fn is_first_order(&self, actor: Actor) -> Result<bool, ServiceError> {
        match actor.user_id() {
            Some(id) => Ok(self.orders.count_for_user(id).await? == 0),
            None => Ok(false),
        }
    }

    pub(crate) async fn require_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))
    }

    fn authorize_read(&self, actor: Actor, order: &Order) -> Result<(), ServiceError> {
        match actor {
            Actor::Admin => Ok(()),
            Actor::Customer { id } if order.user_id == Some(id) => Ok(()),
            _ => Err(ServiceError::Forbidden(
                "order belongs to another customer".to_string(),
            )),
        }
    }
}

fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::TracingNotifier;
    use crate::payments::HmacPaymentGateway;
    use crate::stores::{InMemoryCouponStore, InMemoryOrderStore, InMemoryStockStore, StoreError};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn order_numbers_are_prefixed_and_distinct() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert!(a.starts_with("ORD-"));
        assert_ne!(a, b);
    }

    struct RejectingOrderStore;

    #[async_trait::async_trait]
    impl OrderStore for RejectingOrderStore {
        async fn insert(&self, order: Order) -> Result<Order, StoreError> {
            Err(StoreError::Duplicate(order.order_number))
        }
        async fn get(&self, _id: Uuid) -> Result<Option<Order>, StoreError> {
            Ok(None)
        }
        async fn get_by_number(&self, _number: &str) -> Result<Option<Order>, StoreError> {
            Ok(None)
        }
        async fn update(&self, _order: Order) -> Result<Order, StoreError> {
            Err(StoreError::NotFound)
        }
        async fn list(&self, _page: u64, _limit: u64) -> Result<(Vec<Order>, u64), StoreError> {
            Ok((Vec::new(), 0))
        }
        async fn list_for_user(
            &self,
            _user_id: Uuid,
            _page: u64,
            _limit: u64,
        ) -> Result<(Vec<Order>, u64), StoreError> {
            Ok((Vec::new(), 0))
        }
        async fn count_for_user(&self, _user_id: Uuid) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    struct DownGateway;

    #[async_trait::async_trait]
    impl crate::payments::PaymentGateway for DownGateway {
        async fn create_intent(
            &self,
            _amount: Decimal,
            _currency: &str,
        ) -> Result<String, ServiceError> {
            Err(ServiceError::InternalError("gateway unavailable".to_string()))
        }
        async fn verify(
            &self,
            _gateway_order_id: &str,
            _payment_id: &str,
            _signature: &str,
            _amount: Decimal,
        ) -> Result<bool, ServiceError> {
            Ok(false)
        }
    }

    fn service(
        orders: Arc<dyn OrderStore>,
        stock: Arc<InMemoryStockStore>,
        gateway: Arc<dyn crate::payments::PaymentGateway>,
    ) -> OrderService {
        OrderService::new(
            orders,
            stock,
            CouponService::new(Arc::new(InMemoryCouponStore::new())),
            gateway,
            Arc::new(TracingNotifier::new()),
            EventSender::spawn_default(8),
            "USD".to_string(),
        )
    }

    fn checkout_request(product_id: Uuid, payment_method: PaymentMethod) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_name: "Test Customer".into(),
            customer_email: "customer@example.com".into(),
            customer_phone: "5550100".into(),
            address: "1 Main St".into(),
            city: "Springfield".into(),
            postal_code: "12345".into(),
            country: "US".into(),
            items: vec![OrderItemRequest {
                product_id,
                name: "Test Tee".into(),
                size: "M".into(),
                quantity: 2,
                unit_price: dec!(100),
                image: None,
            }],
            payment_method,
            coupon_code: None,
        }
    }

    #[tokio::test]
    async fn insert_failure_restores_the_decrement() {
        let stock = Arc::new(InMemoryStockStore::new());
        let product = Uuid::new_v4();
        stock.set_stock(product, "M", 5).await.unwrap();

        let svc = service(
            Arc::new(RejectingOrderStore),
            stock.clone(),
            Arc::new(HmacPaymentGateway::new("s")),
        );
        let err = svc
            .create_order(Actor::Guest, checkout_request(product, PaymentMethod::Cod))
            .await
            .unwrap_err();

        assert_matches!(err, ServiceError::StoreError(_));
        assert_eq!(stock.available(product, "M").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn intent_failure_leaves_stock_untouched() {
        let stock = Arc::new(InMemoryStockStore::new());
        let product = Uuid::new_v4();
        stock.set_stock(product, "M", 5).await.unwrap();

        let svc = service(
            Arc::new(InMemoryOrderStore::new()),
            stock.clone(),
            Arc::new(DownGateway),
        );
        let err = svc
            .create_order(Actor::Guest, checkout_request(product, PaymentMethod::Card))
            .await
            .unwrap_err();

        assert_matches!(err, ServiceError::InternalError(_));
        assert_eq!(stock.available(product, "M").await.unwrap(), 5);
    }
}
