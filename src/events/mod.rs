use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Domain events emitted after a committed write. Consumed off a channel so
/// emitting never blocks or fails the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        food_truck_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    CancellationRequested {
        order_id: Uuid,
        food_truck_id: Uuid,
    },
    RefundIssued {
        order_id: Uuid,
        charge_id: String,
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

    /// Sends an event; a full or closed channel is logged, not surfaced.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            tracing::warn!(error = %e, "Failed to enqueue domain event");
        }
    }
}

/// Background consumer for the domain-event channel.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                food_truck_id,
            } => {
                info!(%order_id, %food_truck_id, "event: order placed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "event: order status changed");
            }
            Event::CancellationRequested {
                order_id,
                food_truck_id,
            } => {
                info!(%order_id, %food_truck_id, "event: cancellation requested");
            }
            Event::RefundIssued {
                order_id,
                charge_id,
            } => {
                info!(%order_id, %charge_id, "event: refund issued");
            }
        }
        debug!(?event, "event processed");
    }
    info!("Event processor stopped");
}
