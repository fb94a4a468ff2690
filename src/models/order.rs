use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order lifecycle states.
///
/// `PartiallyReturned` and `FullyReturned` are derived states written
/// exclusively by the return engine; `update_status` rejects them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    PartiallyReturned,
    FullyReturned,
}

impl OrderStatus {
    /// The single canonical transition table for the order state machine.
    /// Setting an identical status is handled as a no-op by the service and
    /// is not an edge here.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }

    /// Statuses an admin may legally move this order to. Clients render
    /// transition controls from this list; the engine re-validates regardless.
    pub fn next_possible(self) -> Vec<OrderStatus> {
        OrderStatus::iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }

    /// Derived states are owned by the return engine and never settable
    /// through `update_status`.
    pub fn is_return_derived(self) -> bool {
        matches!(self, OrderStatus::PartiallyReturned | OrderStatus::FullyReturned)
    }

    /// Display label; the one place UI strings derive from.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::PartiallyReturned => "Partially Returned",
            OrderStatus::FullyReturned => "Fully Returned",
        }
    }

    /// Badge color hint for admin/storefront clients.
    pub fn color(self) -> &'static str {
        match self {
            OrderStatus::Pending => "amber",
            OrderStatus::Processing => "blue",
            OrderStatus::Shipped => "indigo",
            OrderStatus::Delivered => "green",
            OrderStatus::Cancelled => "red",
            OrderStatus::PartiallyReturned => "orange",
            OrderStatus::FullyReturned => "purple",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Card,
}

/// Per-item return bookkeeping state, advanced only by the return engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemReturnStatus {
    None,
    Requested,
    Approved,
    Returned,
}

/// Gateway references stored when payment method is card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentDetails {
    pub gateway_order_id: String,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
}

/// Shipping destination snapshot captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Customer contact snapshot captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// One order line. Name, size and price are snapshots taken at order time
/// and never follow later product edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub image: Option<String>,
    pub return_status: ItemReturnStatus,
    /// Units returned through completed returns.
    pub return_quantity: u32,
    /// Units held by pending return requests. Invariant:
    /// `return_quantity + reserved_return_quantity <= quantity`.
    pub reserved_return_quantity: u32,
}

impl OrderItem {
    /// Units still available for a new return request.
    pub fn returnable_quantity(&self) -> u32 {
        self.quantity - self.return_quantity - self.reserved_return_quantity
    }
}

/// A customer order. Financial record, never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    /// Human-facing unique order number.
    pub order_number: String,
    /// None for guest checkout.
    pub user_id: Option<Uuid>,
    pub customer: CustomerInfo,
    pub order_items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub original_amount: Decimal,
    pub coupon_discount: Decimal,
    pub coupon_code: Option<String>,
    pub total_price: Decimal,
    pub is_paid: bool,
    pub payment_method: PaymentMethod,
    pub payment_details: Option<PaymentDetails>,
    pub is_delivered: bool,
    /// Anchor for the return-eligibility window. Stamped once, idempotent.
    pub delivered_at: Option<DateTime<Utc>>,
    pub track: Option<String>,
    pub shipping_address: ShippingAddress,
    pub has_returns: bool,
    pub total_return_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version, bumped by the store on every update.
    pub version: i32,
}

impl Order {
    pub fn item(&self, item_id: Uuid) -> Option<&OrderItem> {
        self.order_items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: Uuid) -> Option<&mut OrderItem> {
        self.order_items.iter_mut().find(|i| i.id == item_id)
    }

    /// True when every line is fully covered by completed returns.
    pub fn fully_returned(&self) -> bool {
        self.order_items
            .iter()
            .all(|i| i.return_quantity == i.quantity)
    }

    /// True when at least one unit has been returned.
    pub fn any_returned(&self) -> bool {
        self.order_items.iter().any(|i| i.return_quantity > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn cancellation_only_before_shipping() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn no_skipping_or_rewinding() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn return_derived_statuses_are_not_reachable_edges() {
        for from in OrderStatus::iter() {
            assert!(!from.can_transition_to(OrderStatus::PartiallyReturned));
            assert!(!from.can_transition_to(OrderStatus::FullyReturned));
        }
    }

    #[test]
    fn next_possible_matches_table() {
        assert_eq!(
            OrderStatus::Pending.next_possible(),
            vec![OrderStatus::Processing, OrderStatus::Cancelled]
        );
        assert!(OrderStatus::Delivered.next_possible().is_empty());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PartiallyReturned).unwrap(),
            "\"partially_returned\""
        );
        assert_eq!(OrderStatus::FullyReturned.to_string(), "fully_returned");
    }
}
