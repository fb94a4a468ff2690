use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;
use uuid::Uuid;

/// Return request lifecycle states. Initial state is `Requested`,
/// `Completed` is terminal; `Rejected` and `Cancelled` are re-openable
/// back to `Approved` only (appeal/correction).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnStatus {
    Requested,
    Approved,
    Rejected,
    PickupScheduled,
    ItemsReceived,
    ItemsInspected,
    RefundProcessed,
    Completed,
    Cancelled,
}

impl ReturnStatus {
    /// The single canonical transition graph for the return state machine.
    pub fn can_transition_to(self, next: ReturnStatus) -> bool {
        use ReturnStatus::*;
        matches!(
            (self, next),
            (Requested, Approved)
                | (Requested, Rejected)
                | (Approved, PickupScheduled)
                | (Approved, Cancelled)
                | (PickupScheduled, ItemsReceived)
                | (PickupScheduled, Cancelled)
                | (ItemsReceived, ItemsInspected)
                | (ItemsReceived, Rejected)
                | (ItemsInspected, RefundProcessed)
                | (ItemsInspected, Rejected)
                | (RefundProcessed, Completed)
                | (Rejected, Approved)
                | (Cancelled, Approved)
        )
    }

    pub fn next_possible(self) -> Vec<ReturnStatus> {
        ReturnStatus::iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReturnStatus::Completed)
    }

    pub fn label(self) -> &'static str {
        match self {
            ReturnStatus::Requested => "Requested",
            ReturnStatus::Approved => "Approved",
            ReturnStatus::Rejected => "Rejected",
            ReturnStatus::PickupScheduled => "Pickup Scheduled",
            ReturnStatus::ItemsReceived => "Items Received",
            ReturnStatus::ItemsInspected => "Items Inspected",
            ReturnStatus::RefundProcessed => "Refund Processed",
            ReturnStatus::Completed => "Completed",
            ReturnStatus::Cancelled => "Cancelled",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ReturnStatus::Requested => "amber",
            ReturnStatus::Approved => "blue",
            ReturnStatus::Rejected => "red",
            ReturnStatus::PickupScheduled => "indigo",
            ReturnStatus::ItemsReceived => "cyan",
            ReturnStatus::ItemsInspected => "teal",
            ReturnStatus::RefundProcessed => "green",
            ReturnStatus::Completed => "green",
            ReturnStatus::Cancelled => "gray",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnReason {
    Defective,
    WrongItem,
    NotAsDescribed,
    SizeIssue,
    QualityIssue,
    ChangedMind,
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundMethod {
    OriginalPayment,
    BankTransfer,
    StoreCredit,
    Cash,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnMethod {
    Pickup,
    CustomerShip,
}

/// One returned line, referencing an item on the parent order. Name, size
/// and unit price are snapshots of the order item at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnItem {
    pub order_item_id: Uuid,
    pub name: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub reason: ReturnReason,
    pub reason_description: Option<String>,
}

/// Append-only audit trail entry; one per status transition, newest last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimelineEntry {
    pub status: ReturnStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A return request against a delivered order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Return {
    pub id: Uuid,
    /// Human-facing unique return number.
    pub return_number: String,
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub return_items: Vec<ReturnItem>,
    pub return_reason: ReturnReason,
    pub return_description: Option<String>,
    pub status: ReturnStatus,
    /// Sum of snapshot unit price x requested quantity, fixed at request time.
    pub return_amount: Decimal,
    pub refund_amount: Option<Decimal>,
    pub refund_method: Option<RefundMethod>,
    pub return_method: ReturnMethod,
    pub pickup_address: Option<crate::models::ShippingAddress>,
    /// Latest admin note wins; history lives in the timeline.
    pub admin_notes: Option<String>,
    pub timeline: Vec<TimelineEntry>,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub pickup_scheduled_at: Option<DateTime<Utc>>,
    pub items_received_at: Option<DateTime<Utc>>,
    pub items_inspected_at: Option<DateTime<Utc>>,
    pub refund_processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Return {
    pub fn push_timeline(&mut self, status: ReturnStatus, message: impl Into<String>) {
        self.timeline.push(TimelineEntry {
            status,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}

/// When the return window for an order closes. The anchor is the delivery
/// timestamp, falling back to the order creation time.
pub fn return_window_expires_at(anchor: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    anchor + Duration::days(window_days)
}

/// Inclusive window check: a request filed at exactly the expiry instant
/// is still eligible.
pub fn is_within_return_window(
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
    window_days: i64,
) -> bool {
    now <= return_window_expires_at(anchor, window_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn happy_path_edges() {
        use ReturnStatus::*;
        assert!(Requested.can_transition_to(Approved));
        assert!(Approved.can_transition_to(PickupScheduled));
        assert!(PickupScheduled.can_transition_to(ItemsReceived));
        assert!(ItemsReceived.can_transition_to(ItemsInspected));
        assert!(ItemsInspected.can_transition_to(RefundProcessed));
        assert!(RefundProcessed.can_transition_to(Completed));
    }

    #[test]
    fn rejection_and_cancellation_branches() {
        use ReturnStatus::*;
        assert!(Requested.can_transition_to(Rejected));
        assert!(ItemsReceived.can_transition_to(Rejected));
        assert!(ItemsInspected.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(PickupScheduled.can_transition_to(Cancelled));
        // Re-open paths go back to approved only.
        assert!(Rejected.can_transition_to(Approved));
        assert!(Cancelled.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Requested));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn completed_is_terminal() {
        for next in ReturnStatus::iter() {
            assert!(!ReturnStatus::Completed.can_transition_to(next));
        }
        assert!(ReturnStatus::Completed.next_possible().is_empty());
    }

    #[test]
    fn no_skipping() {
        use ReturnStatus::*;
        assert!(!Requested.can_transition_to(PickupScheduled));
        assert!(!Requested.can_transition_to(Completed));
        assert!(!Approved.can_transition_to(ItemsReceived));
        assert!(!PickupScheduled.can_transition_to(RefundProcessed));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let delivered = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let window = 7;
        let at_boundary = delivered + Duration::days(window);
        let one_second_late = at_boundary + Duration::seconds(1);

        assert!(is_within_return_window(delivered, at_boundary, window));
        assert!(!is_within_return_window(delivered, one_second_late, window));
        assert_eq!(return_window_expires_at(delivered, window), at_boundary);
    }
}
