//! Domain event channel. Services publish fire-and-forget events; a spawned
//! processor drains and logs them. Send failures are logged, never
//! propagated into the request path.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{OrderStatus, ReturnStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentConfirmed {
        order_id: Uuid,
        payment_id: String,
    },
    ReturnRequested {
        return_id: Uuid,
        order_id: Uuid,
    },
    ReturnStatusChanged {
        return_id: Uuid,
        old_status: ReturnStatus,
        new_status: ReturnStatus,
    },
    ReturnCompleted {
        return_id: Uuid,
        order_id: Uuid,
        refund_amount: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Builds a sender with an already-spawned logging processor; the
    /// default wiring for the binary and tests.
    pub fn spawn_default(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(process_events(rx));
        Self::new(tx)
    }

    /// Best-effort publish.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "failed to publish domain event");
        }
    }
}

/// Drains the event channel, logging each event. The hook point for
/// wiring real webhook/queue fan-out later.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated { order_id, order_number } => {
                info!(%order_id, order_number, "event: order created");
            }
            Event::OrderStatusChanged { order_id, old_status, new_status } => {
                info!(%order_id, %old_status, %new_status, "event: order status changed");
            }
            Event::PaymentConfirmed { order_id, payment_id } => {
                info!(%order_id, payment_id, "event: payment confirmed");
            }
            Event::ReturnRequested { return_id, order_id } => {
                info!(%return_id, %order_id, "event: return requested");
            }
            Event::ReturnStatusChanged { return_id, old_status, new_status } => {
                info!(%return_id, %old_status, %new_status, "event: return status changed");
            }
            Event::ReturnCompleted { return_id, order_id, refund_amount } => {
                info!(%return_id, %order_id, %refund_amount, "event: return completed");
            }
        }
    }
}
