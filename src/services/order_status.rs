use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db;
use crate::entities::{
    food_truck, order,
    order::{FulfillmentType, OrderStatus},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::notifications::NotificationDispatcher;
use crate::services::payments::PaymentOrchestrator;

/// Operator-driven transition request.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateStatusRequest {
    pub new_status: OrderStatus,
    /// Mandatory when moving to `rejected` or `cancelled`.
    pub reason: Option<String>,
    pub updated_estimated_ready_time: Option<DateTime<Utc>>,
    pub updated_estimated_delivery_time: Option<DateTime<Utc>>,
}

/// The fixed transition table. Everything not listed here is illegal, and
/// `cancellation_requested` is reachable only through the customer path.
pub fn is_valid_transition(
    from: OrderStatus,
    to: OrderStatus,
    fulfillment: FulfillmentType,
) -> bool {
    use OrderStatus::*;

    match (from, to) {
        (PendingConfirmation, Accepted) | (PendingConfirmation, Rejected) => true,

        (Accepted, Preparing) | (Accepted, Cancelled) => true,

        (Preparing, ReadyForPickup) => fulfillment == FulfillmentType::Pickup,
        (Preparing, OutForDelivery) => fulfillment == FulfillmentType::Delivery,
        (Preparing, Cancelled) => true,

        (ReadyForPickup, Completed) | (ReadyForPickup, Cancelled) => true,

        (OutForDelivery, Delivered) | (OutForDelivery, Cancelled) => true,

        (CancellationRequested, Cancelled) | (CancellationRequested, Accepted) => true,

        _ => false,
    }
}

/// Drives an order through its lifecycle. Each transition locks the order
/// row; transitions into `rejected`/`cancelled` refund the captured charge
/// inside the same transaction, so the status change and the refund either
/// both happen or neither does.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    payments: PaymentOrchestrator,
    dispatcher: NotificationDispatcher,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        payments: PaymentOrchestrator,
        dispatcher: NotificationDispatcher,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            payments,
            dispatcher,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(order_id = %order_id, operator_id = %operator_id, new_status = %request.new_status))]
    pub async fn update_status(
        &self,
        operator_id: Uuid,
        order_id: Uuid,
        request: UpdateStatusRequest,
    ) -> Result<order::Model, ServiceError> {
        let new_status = request.new_status;

        let txn = self.db.begin().await?;
        let backend = txn.get_database_backend();

        let order = db::for_update(order::Entity::find_by_id(order_id), backend)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        let truck = food_truck::Entity::find_by_id(order.food_truck_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Food truck {} not found", order.food_truck_id))
            })?;
        if truck.operator_id != operator_id {
            return Err(ServiceError::Forbidden(
                "Order belongs to another operator's truck".to_string(),
            ));
        }

        // Customers ask for cancellation; operators never set it directly.
        if new_status == OrderStatus::CancellationRequested
            || !is_valid_transition(order.status, new_status, order.fulfillment_type)
        {
            return Err(ServiceError::InvalidTransition {
                from: order.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let reason = request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        if new_status.requires_reason() && reason.is_none() {
            return Err(ServiceError::ValidationError(format!(
                "A reason is required when moving an order to {new_status}"
            )));
        }

        let old_status = order.status;
        let charge_ref = order.charge_id.clone();
        let now = Utc::now();

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(now));
        match new_status {
            OrderStatus::Accepted => active.accepted_at = Set(Some(now)),
            OrderStatus::ReadyForPickup | OrderStatus::OutForDelivery => {
                active.ready_at = Set(Some(now))
            }
            s if s.is_terminal() => active.finalized_at = Set(Some(now)),
            _ => {}
        }
        if let Some(reason) = reason {
            active.status_reason = Set(Some(reason.to_string()));
        }
        if let Some(eta) = request.updated_estimated_ready_time {
            active.estimated_ready_time = Set(Some(eta));
        }
        if let Some(eta) = request.updated_estimated_delivery_time {
            active.estimated_delivery_time = Set(Some(eta));
        }

        // Refund before the commit. A refund failure propagates here and the
        // dropped transaction rolls the status change back with it, so the
        // customer is never told "cancelled" without their money coming back.
        let mut refund_issued = None;
        if new_status.requires_refund() {
            let refund = self.payments.refund(charge_ref.as_deref(), None).await?;
            active.refunded = Set(true);
            refund_issued = Some(refund);
        }

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(
            order_id = %updated.id,
            old_status = %old_status,
            new_status = %updated.status,
            refunded = refund_issued.is_some(),
            "order status updated"
        );

        self.dispatcher.status_updated(&updated).await;
        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id: updated.id,
                old_status: old_status.as_str().to_string(),
                new_status: updated.status.as_str().to_string(),
            })
            .await;
        if refund_issued.is_some() {
            if let Some(charge_id) = &updated.charge_id {
                self.event_sender
                    .send(Event::RefundIssued {
                        order_id: updated.id,
                        charge_id: charge_id.clone(),
                    })
                    .await;
            }
        }

        Ok(updated)
    }

    /// Customer-initiated advisory: flags an accepted order for cancellation
    /// and leaves the decision to the operator.
    #[instrument(skip(self), fields(order_id = %order_id, customer_id = %customer_id))]
    pub async fn request_cancellation(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let backend = txn.get_database_backend();

        let order = db::for_update(order::Entity::find_by_id(order_id), backend)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.customer_id != customer_id {
            return Err(ServiceError::Forbidden(
                "Order belongs to a different customer".to_string(),
            ));
        }

        if order.status != OrderStatus::Accepted {
            return Err(ServiceError::InvalidTransition {
                from: order.status.as_str().to_string(),
                to: OrderStatus::CancellationRequested.as_str().to_string(),
            });
        }

        let truck_id = order.food_truck_id;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::CancellationRequested);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        let truck = food_truck::Entity::find_by_id(truck_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Food truck {truck_id} not found")))?;

        info!(order_id = %updated.id, "cancellation requested");

        self.dispatcher
            .cancellation_requested(&updated, truck.operator_id)
            .await;
        self.event_sender
            .send(Event::CancellationRequested {
                order_id: updated.id,
                food_truck_id: truck_id,
            })
            .await;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    fn allowed_pairs(fulfillment: FulfillmentType) -> Vec<(OrderStatus, OrderStatus)> {
        use OrderStatus::*;
        let mut pairs = vec![
            (PendingConfirmation, Accepted),
            (PendingConfirmation, Rejected),
            (Accepted, Preparing),
            (Accepted, Cancelled),
            (Preparing, Cancelled),
            (ReadyForPickup, Completed),
            (ReadyForPickup, Cancelled),
            (OutForDelivery, Delivered),
            (OutForDelivery, Cancelled),
            (CancellationRequested, Cancelled),
            (CancellationRequested, Accepted),
        ];
        match fulfillment {
            FulfillmentType::Pickup => pairs.push((Preparing, ReadyForPickup)),
            FulfillmentType::Delivery => pairs.push((Preparing, OutForDelivery)),
        }
        pairs
    }

    #[test]
    fn transition_table_is_exact_for_pickup() {
        let allowed = allowed_pairs(FulfillmentType::Pickup);
        for from in OrderStatus::iter() {
            for to in OrderStatus::iter() {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    is_valid_transition(from, to, FulfillmentType::Pickup),
                    expected,
                    "pickup transition {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn transition_table_is_exact_for_delivery() {
        let allowed = allowed_pairs(FulfillmentType::Delivery);
        for from in OrderStatus::iter() {
            for to in OrderStatus::iter() {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    is_valid_transition(from, to, FulfillmentType::Delivery),
                    expected,
                    "delivery transition {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_absorb() {
        use OrderStatus::*;
        for terminal in [Completed, Delivered, Rejected, Cancelled] {
            assert!(terminal.is_terminal());
            for to in OrderStatus::iter() {
                assert!(
                    !is_valid_transition(terminal, to, FulfillmentType::Pickup),
                    "{terminal:?} must absorb, but allows {to:?}"
                );
            }
        }
    }

    #[test]
    fn refund_and_reason_requirements_align() {
        use OrderStatus::*;
        for status in OrderStatus::iter() {
            let compensated = matches!(status, Rejected | Cancelled);
            assert_eq!(status.requires_refund(), compensated);
            assert_eq!(status.requires_reason(), compensated);
        }
    }
}
