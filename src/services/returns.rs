use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    errors::{ReturnIneligibility, ServiceError},
    events::{Event, EventSender},
    models::{
        return_request::{is_within_return_window, return_window_expires_at},
        ItemReturnStatus, Order, OrderStatus, RefundMethod, Return, ReturnItem, ReturnMethod,
        ReturnReason, ReturnStatus, ShippingAddress,
    },
    notifications::Notifier,
    stores::{OrderStore, ReturnStore, StoreError},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReturnItemRequest {
    pub order_item_id: Uuid,
    #[validate(range(min = 1, message = "Return quantity must be at least 1"))]
    pub quantity: u32,
    pub reason: ReturnReason,
    pub reason_description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RequestReturnRequest {
    pub order_id: Uuid,
    pub items: Vec<ReturnItemRequest>,
    pub return_reason: ReturnReason,
    pub return_description: Option<String>,
    pub return_method: ReturnMethod,
    pub pickup_address: Option<ShippingAddress>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateReturnStatusRequest {
    pub status: ReturnStatus,
    #[validate(length(max = 1000, message = "Admin notes must be at most 1000 characters"))]
    pub admin_notes: Option<String>,
    pub refund_amount: Option<Decimal>,
    pub refund_method: Option<RefundMethod>,
}

/// A return plus its window fields, which are computed at read time from
/// the parent order's delivery anchor and never stored.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReturnWithWindow {
    #[serde(flatten)]
    pub ret: Return,
    pub is_within_return_window: bool,
    pub return_window_expires_at: DateTime<Utc>,
}

/// Return request engine: eligibility, the return state machine, reservation
/// bookkeeping against the parent order, and completion write-back.
#[derive(Clone)]
pub struct ReturnService {
    returns: Arc<dyn ReturnStore>,
    orders: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    events: EventSender,
    return_window_days: i64,
    admin_return_window_days: i64,
}

impl ReturnService {
    pub fn new(
        returns: Arc<dyn ReturnStore>,
        orders: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
        events: EventSender,
        return_window_days: i64,
        admin_return_window_days: i64,
    ) -> Self {
        Self {
            returns,
            orders,
            notifier,
            events,
            return_window_days,
            admin_return_window_days,
        }
    }

    /// Files a return request. Reserves the requested quantity against the
    /// order at request time, so two concurrent requests can never claim the
    /// same units: the write is a compare-and-swap on the order version and
    /// the loser gets a retryable conflict.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn request_return(
        &self,
        actor: Actor,
        request: RequestReturnRequest,
    ) -> Result<Return, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }
        if request.items.is_empty() {
            return Err(ServiceError::ReturnNotEligible(ReturnIneligibility::EmptyRequest));
        }
        let mut seen = std::collections::HashSet::new();
        for item in &request.items {
            if !seen.insert(item.order_item_id) {
                return Err(ServiceError::ValidationError(
                    "duplicate order item in return request".to_string(),
                ));
            }
        }
        if request.return_method == ReturnMethod::Pickup && request.pickup_address.is_none() {
            return Err(ServiceError::ValidationError(
                "pickup returns require a pickup address".to_string(),
            ));
        }

        let order = self.require_order(request.order_id).await?;
        self.authorize_return_actor(actor, &order)?;
        self.check_eligibility(actor, &order, &request.items)?;

        // Snapshot prices from the order, never from the live catalog.
        let mut return_items = Vec::with_capacity(request.items.len());
        for req in &request.items {
            let item = order.item(req.order_item_id).ok_or(ServiceError::ReturnNotEligible(
                ReturnIneligibility::UnknownOrderItem,
            ))?;
            return_items.push(ReturnItem {
                order_item_id: item.id,
                name: item.name.clone(),
                size: item.size.clone(),
                quantity: req.quantity,
                unit_price: item.unit_price,
                reason: req.reason,
                reason_description: req.reason_description.clone(),
            });
        }
        let return_amount: Decimal = return_items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum();

        // Reserve before the return exists. Single-shot CAS: the losing
        // side of a race gets ConcurrencyConflict and may retry with fresh
        // state, at which point availability is re-checked.
        let mut reserved_order = order.clone();
        reserve_items(&mut reserved_order, &return_items)?;
        self.orders.update(reserved_order).await?;

        let now = Utc::now();
        let mut ret = Return {
            id: Uuid::new_v4(),
            return_number: generate_return_number(),
            order_id: order.id,
            user_id: order.user_id,
            return_items,
            return_reason: request.return_reason,
            return_description: request.return_description,
            status: ReturnStatus::Requested,
            return_amount,
            refund_amount: None,
            refund_method: None,
            return_method: request.return_method,
            pickup_address: request.pickup_address,
            admin_notes: None,
            timeline: Vec::new(),
            requested_at: now,
            approved_at: None,
            pickup_scheduled_at: None,
            items_received_at: None,
            items_inspected_at: None,
            refund_processed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: None,
            version: 0,
        };
        ret.push_timeline(ReturnStatus::Requested, "Return requested");

        let reserved_lines = ret.return_items.clone();
        let ret = match self.returns.insert(ret).await {
            Ok(ret) => ret,
            Err(e) => {
                // The reservation must not outlive a return that was never
                // recorded.
                let released = self
                    .write_back_order(order.id, |o| {
                        release_items(o, &reserved_lines);
                        Ok(())
                    })
                    .await;
                if let Err(release_err) = released {
                    warn!(
                        order_id = %order.id, error = %release_err,
                        "failed to release reservation after insert failure"
                    );
                }
                return Err(e.into());
            }
        };
        info!(return_id = %ret.id, order_id = %order.id, "return requested");
        self.events
            .send(Event::ReturnRequested {
                return_id: ret.id,
                order_id: order.id,
            })
            .await;
        self.notifier
            .notify(
                &order.customer.email,
                "Return requested",
                &format!("Your return {} has been filed.", ret.return_number),
            )
            .await;
        Ok(ret)
    }

    /// Drives the return state machine. Each call is a full validated
    /// transition; setting the current status again is a no-op success.
    #[instrument(skip(self, request), fields(return_id = %return_id, new_status = %request.status))]
    pub async fn update_return_status(
        &self,
        actor: Actor,
        return_id: Uuid,
        request: UpdateReturnStatusRequest,
    ) -> Result<Return, ServiceError> {
        request.validate()?;

        let mut ret = self.require_return(return_id).await?;
        self.authorize_transition(actor, &ret, request.status)?;

        let old_status = ret.status;
        let new_status = request.status;
        if new_status == old_status {
            return Ok(ret);
        }
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidReturnTransition(format!(
                "cannot transition from {} to {}",
                old_status, new_status
            )));
        }

        let now = Utc::now();
        match new_status {
            ReturnStatus::Approved => {
                // From requested the reservation already holds; re-approval
                // after rejection/cancellation must re-acquire it and can
                // fail if the units were claimed in the meantime.
                let reacquire = matches!(
                    old_status,
                    ReturnStatus::Rejected | ReturnStatus::Cancelled
                );
                let items = ret.return_items.clone();
                self.write_back_order(ret.order_id, |order| {
                    if reacquire {
                        reserve_items(order, &items)?;
                    }
                    for item in &items {
                        if let Some(line) = order.item_mut(item.order_item_id) {
                            line.return_status = ItemReturnStatus::Approved;
                        }
                    }
                    Ok(())
                })
                .await?;
                ret.approved_at = Some(now);
            }
            ReturnStatus::PickupScheduled => {
                ret.pickup_scheduled_at = Some(now);
            }
            ReturnStatus::ItemsReceived => {
                ret.items_received_at = Some(now);
            }
            ReturnStatus::ItemsInspected => {
                ret.items_inspected_at = Some(now);
            }
            ReturnStatus::RefundProcessed => {
                let refund_method = request.refund_method.ok_or_else(|| {
                    ServiceError::ValidationError(
                        "refund method is required when processing a refund".to_string(),
                    )
                })?;
                let refund_amount = request.refund_amount.unwrap_or(ret.return_amount);
                if refund_amount > ret.return_amount {
                    return Err(ServiceError::RefundAmountInvalid(format!(
                        "refund {} exceeds return amount {}",
                        refund_amount, ret.return_amount
                    )));
                }
                if refund_amount < Decimal::ZERO {
                    return Err(ServiceError::RefundAmountInvalid(
                        "refund amount must not be negative".to_string(),
                    ));
                }
                ret.refund_amount = Some(refund_amount);
                ret.refund_method = Some(refund_method);
                ret.refund_processed_at = Some(now);
            }
            ReturnStatus::Completed => {
                // The order write-back happens after the return itself
                // commits, below.
                ret.completed_at = Some(now);
            }
            ReturnStatus::Rejected | ReturnStatus::Cancelled => {
                // The held units become returnable again.
                let items = ret.return_items.clone();
                self.write_back_order(ret.order_id, |order| {
                    release_items(order, &items);
                    Ok(())
                })
                .await?;
            }
            ReturnStatus::Requested => {
                // No edge leads back here; unreachable past the graph check.
                return Err(ServiceError::InvalidReturnTransition(
                    "cannot transition back to requested".to_string(),
                ));
            }
        }

        if let Some(notes) = &request.admin_notes {
            ret.admin_notes = Some(notes.clone());
        }
        ret.status = new_status;
        let message = request
            .admin_notes
            .clone()
            .unwrap_or_else(|| format!("Status changed to {}", new_status.label()));
        ret.push_timeline(new_status, message);

        // Committing the return first makes exactly one of two concurrent
        // callers win the version check; the loser conflicts here with the
        // order untouched, so the completion write-back can never be
        // applied twice.
        let ret = self.returns.update(ret).await?;
        if new_status == ReturnStatus::Completed {
            if let Err(e) = self.complete_return(&ret).await {
                // Put the return back so the reservation stays coherent.
                let mut revert = ret.clone();
                revert.status = old_status;
                revert.completed_at = None;
                revert.push_timeline(old_status, "Completion failed, reverted");
                if let Err(revert_err) = self.returns.update(revert).await {
                    warn!(
                        return_id = %ret.id, error = %revert_err,
                        "failed to revert return after completion write-back failure"
                    );
                }
                return Err(e);
            }
        }
        info!(return_id = %ret.id, %old_status, %new_status, "return status updated");
        self.events
            .send(Event::ReturnStatusChanged {
                return_id: ret.id,
                old_status,
                new_status,
            })
            .await;
        if new_status == ReturnStatus::Completed {
            self.events
                .send(Event::ReturnCompleted {
                    return_id: ret.id,
                    order_id: ret.order_id,
                    refund_amount: ret.refund_amount.unwrap_or(ret.return_amount),
                })
                .await;
        }
        Ok(ret)
    }

    #[instrument(skip(self), fields(return_id = %return_id))]
    pub async fn get_return(
        &self,
        actor: Actor,
        return_id: Uuid,
    ) -> Result<ReturnWithWindow, ServiceError> {
        let ret = self.require_return(return_id).await?;
        match actor {
            Actor::Admin => {}
            Actor::Customer { id } if ret.user_id == Some(id) => {}
            _ => {
                return Err(ServiceError::Forbidden(
                    "return belongs to another customer".to_string(),
                ))
            }
        }
        let order = self.require_order(ret.order_id).await?;
        Ok(self.with_window(actor, &order, ret))
    }

    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        actor: Actor,
        page: u64,
        limit: u64,
        status: Option<ReturnStatus>,
    ) -> Result<(Vec<Return>, u64), ServiceError> {
        if !actor.is_admin() {
            return Err(ServiceError::Forbidden(
                "only admins may list all returns".to_string(),
            ));
        }
        Ok(self.returns.list(page, limit, status).await?)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn list_returns_for_order(
        &self,
        actor: Actor,
        order_id: Uuid,
    ) -> Result<Vec<ReturnWithWindow>, ServiceError> {
        let order = self.require_order(order_id).await?;
        match actor {
            Actor::Admin => {}
            Actor::Customer { id } if order.user_id == Some(id) => {}
            _ => {
                return Err(ServiceError::Forbidden(
                    "order belongs to another customer".to_string(),
                ))
            }
        }
        let returns = self.returns.list_for_order(order_id).await?;
        Ok(returns
            .into_iter()
            .map(|r| self.with_window(actor, &order, r))
            .collect())
    }

    // ---- internals ----

    fn window_days(&self, actor: Actor) -> i64 {
        if actor.is_admin() {
            self.admin_return_window_days
        } else {
            self.return_window_days
        }
    }

    fn with_window(&self, actor: Actor, order: &Order, ret: Return) -> ReturnWithWindow {
        let anchor = order.delivered_at.unwrap_or(order.created_at);
        let days = self.window_days(actor);
        ReturnWithWindow {
            is_within_return_window: is_within_return_window(anchor, Utc::now(), days),
            return_window_expires_at: return_window_expires_at(anchor, days),
            ret,
        }
    }

    fn authorize_return_actor(&self, actor: Actor, order: &Order) -> Result<(), ServiceError> {
        match actor {
            Actor::Admin => Ok(()),
            Actor::Customer { id } if order.user_id == Some(id) => Ok(()),
            Actor::Customer { .. } => Err(ServiceError::Forbidden(
                "order belongs to another customer".to_string(),
            )),
            Actor::Guest => Err(ServiceError::Unauthorized(
                "a customer identity is required to request a return".to_string(),
            )),
        }
    }

    /// Customers may only cancel their own returns; every other transition
    /// is an admin action.
    fn authorize_transition(
        &self,
        actor: Actor,
        ret: &Return,
        new_status: ReturnStatus,
    ) -> Result<(), ServiceError> {
        match actor {
            Actor::Admin => Ok(()),
            Actor::Customer { id }
                if ret.user_id == Some(id) && new_status == ReturnStatus::Cancelled =>
            {
                Ok(())
            }
            _ => Err(ServiceError::Forbidden(
                "only admins may drive return status".to_string(),
            )),
        }
    }

    fn check_eligibility(
        &self,
        actor: Actor,
        order: &Order,
        items: &[ReturnItemRequest],
    ) -> Result<(), ServiceError> {
        if !order.is_delivered && order.status != OrderStatus::Delivered {
            return Err(ServiceError::ReturnNotEligible(ReturnIneligibility::NotDelivered));
        }
        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::FullyReturned) {
            return Err(ServiceError::ReturnNotEligible(
                ReturnIneligibility::OrderNotReturnable,
            ));
        }
        let anchor = order.delivered_at.unwrap_or(order.created_at);
        if !is_within_return_window(anchor, Utc::now(), self.window_days(actor)) {
            return Err(ServiceError::ReturnNotEligible(ReturnIneligibility::WindowExpired));
        }
        for req in items {
            let item = order.item(req.order_item_id).ok_or(ServiceError::ReturnNotEligible(
                ReturnIneligibility::UnknownOrderItem,
            ))?;
            if req.quantity > item.returnable_quantity() {
                return Err(ServiceError::ReturnNotEligible(
                    ReturnIneligibility::QuantityUnavailable,
                ));
            }
        }
        Ok(())
    }

    /// Completion write-back: converts the reservation into returned
    /// quantity, recomputes order aggregates, and derives the order status.
    /// Sole writer of `partially_returned` and `fully_returned`.
    async fn complete_return(&self, ret: &Return) -> Result<(), ServiceError> {
        // Sum return amounts across every live return on this order. The
        // current return is already completed in the store, so it counts.
        let sibling_total: Decimal = self
            .returns
            .list_for_order(ret.order_id)
            .await?
            .iter()
            .filter(|r| !matches!(r.status, ReturnStatus::Rejected | ReturnStatus::Cancelled))
            .map(|r| r.return_amount)
            .sum();

        let items = ret.return_items.clone();
        self.write_back_order(ret.order_id, move |order| {
            for item in &items {
                let line = order.item_mut(item.order_item_id).ok_or_else(|| {
                    ServiceError::InternalError("return references missing order item".to_string())
                })?;
                line.reserved_return_quantity =
                    line.reserved_return_quantity.saturating_sub(item.quantity);
                line.return_quantity += item.quantity;
                line.return_status = ItemReturnStatus::Returned;
            }
            order.has_returns = true;
            order.total_return_amount = sibling_total;
            order.status = if order.fully_returned() {
                OrderStatus::FullyReturned
            } else if order.any_returned() {
                OrderStatus::PartiallyReturned
            } else {
                order.status
            };
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Read-modify-write on the parent order under the store's version
    /// check, retrying once with fresh state. Sibling returns completing
    /// concurrently each recompute aggregates without clobbering the other.
    async fn write_back_order<F>(&self, order_id: Uuid, mutate: F) -> Result<Order, ServiceError>
    where
        F: Fn(&mut Order) -> Result<(), ServiceError>,
    {
        let mut order = self.require_order(order_id).await?;
        mutate(&mut order)?;
        match self.orders.update(order).await {
            Ok(order) => Ok(order),
            Err(StoreError::VersionConflict) => {
                warn!(%order_id, "order write-back conflicted, retrying with fresh state");
                let mut fresh = self.require_order(order_id).await?;
                mutate(&mut fresh)?;
                Ok(self.orders.update(fresh).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn require_order(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))
    }

    async fn require_return(&self, return_id: Uuid) -> Result<Return, ServiceError> {
        self.returns
            .get(return_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("return {} not found", return_id)))
    }
}

/// Holds the requested units against the order. Fails when any line would
/// exceed its remaining returnable quantity.
fn reserve_items(order: &mut Order, items: &[ReturnItem]) -> Result<(), ServiceError> {
    for item in items {
        let line = order
            .item(item.order_item_id)
            .ok_or(ServiceError::ReturnNotEligible(ReturnIneligibility::UnknownOrderItem))?;
        if item.quantity > line.returnable_quantity() {
            return Err(ServiceError::ReturnNotEligible(
                ReturnIneligibility::QuantityUnavailable,
            ));
        }
    }
    for item in items {
        if let Some(line) = order.item_mut(item.order_item_id) {
            line.reserved_return_quantity += item.quantity;
            line.return_status = ItemReturnStatus::Requested;
        }
    }
    Ok(())
}

/// Releases a reservation after rejection or cancellation.
fn release_items(order: &mut Order, items: &[ReturnItem]) {
    for item in items {
        if let Some(line) = order.item_mut(item.order_item_id) {
            line.reserved_return_quantity =
                line.reserved_return_quantity.saturating_sub(item.quantity);
            line.return_status = if line.return_quantity > 0 {
                ItemReturnStatus::Returned
            } else if line.reserved_return_quantity > 0 {
                ItemReturnStatus::Requested
            } else {
                ItemReturnStatus::None
            };
        }
    }
}

fn generate_return_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("RET-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerInfo, OrderItem, PaymentMethod};
    use crate::notifications::TracingNotifier;
    use crate::stores::InMemoryOrderStore;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn return_numbers_are_prefixed_and_distinct() {
        let a = generate_return_number();
        let b = generate_return_number();
        assert!(a.starts_with("RET-"));
        assert_ne!(a, b);
    }

    struct FailingReturnStore;

    #[async_trait::async_trait]
    impl ReturnStore for FailingReturnStore {
        async fn insert(&self, _ret: Return) -> Result<Return, StoreError> {
            Err(StoreError::Unavailable("store down".to_string()))
        }
        async fn get(&self, _id: Uuid) -> Result<Option<Return>, StoreError> {
            Ok(None)
        }
        async fn update(&self, _ret: Return) -> Result<Return, StoreError> {
            Err(StoreError::NotFound)
        }
        async fn list(
            &self,
            _page: u64,
            _limit: u64,
            _status: Option<ReturnStatus>,
        ) -> Result<(Vec<Return>, u64), StoreError> {
            Ok((Vec::new(), 0))
        }
        async fn list_for_order(&self, _order_id: Uuid) -> Result<Vec<Return>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn delivered_order(buyer: Uuid) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            order_number: format!("ORD-{}", Uuid::new_v4()),
            user_id: Some(buyer),
            customer: CustomerInfo {
                name: "Test Customer".into(),
                email: "customer@example.com".into(),
                phone: "5550100".into(),
            },
            order_items: vec![OrderItem {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                name: "Test Tee".into(),
                size: "M".into(),
                quantity: 3,
                unit_price: dec!(100),
                image: None,
                return_status: ItemReturnStatus::None,
                return_quantity: 0,
                reserved_return_quantity: 0,
            }],
            status: OrderStatus::Delivered,
            original_amount: dec!(300),
            coupon_discount: dec!(0),
            coupon_code: None,
            total_price: dec!(300),
            is_paid: true,
            payment_method: PaymentMethod::Cod,
            payment_details: None,
            is_delivered: true,
            delivered_at: Some(now),
            track: None,
            shipping_address: ShippingAddress {
                address: "1 Main St".into(),
                city: "Springfield".into(),
                postal_code: "12345".into(),
                country: "US".into(),
            },
            has_returns: false,
            total_return_amount: dec!(0),
            created_at: now,
            updated_at: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn insert_failure_releases_the_reservation() {
        let orders = Arc::new(InMemoryOrderStore::new());
        let buyer = Uuid::new_v4();
        let order = orders.insert(delivered_order(buyer)).await.unwrap();

        let svc = ReturnService::new(
            Arc::new(FailingReturnStore),
            orders.clone(),
            Arc::new(TracingNotifier::new()),
            EventSender::spawn_default(8),
            7,
            30,
        );

        let request = RequestReturnRequest {
            order_id: order.id,
            items: vec![ReturnItemRequest {
                order_item_id: order.order_items[0].id,
                quantity: 2,
                reason: ReturnReason::SizeIssue,
                reason_description: None,
            }],
            return_reason: ReturnReason::SizeIssue,
            return_description: None,
            return_method: ReturnMethod::CustomerShip,
            pickup_address: None,
        };
        let err = svc
            .request_return(Actor::Customer { id: buyer }, request)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::StoreError(_));

        // The held units were given back.
        let fresh = orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(fresh.order_items[0].reserved_return_quantity, 0);
        assert_eq!(fresh.order_items[0].return_status, ItemReturnStatus::None);
    }
}
