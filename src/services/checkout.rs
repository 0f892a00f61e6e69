use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::entities::{
    charge_reconciliation, food_truck,
    food_truck::TruckStatus,
    order,
    order::{FulfillmentType, OrderStatus},
    order_item, order_item_option,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::delivery::{DeliveryAddress, DeliveryResolver};
use crate::services::notifications::NotificationDispatcher;
use crate::services::payments::{
    round_money, ChargeOutcome, PaymentMethodRequest, PaymentOrchestrator, ResolvedInstrument,
};
use crate::services::pricing::{CartLine, PricedCart, PricingService};

/// Checkout request body. Money never appears here: every amount is derived
/// server-side from the catalog.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct PlaceOrderRequest {
    pub food_truck_id: Uuid,
    pub fulfillment_type: FulfillmentType,
    /// Required when `fulfillment_type` is `delivery`.
    pub delivery_address: Option<DeliveryAddress>,
    pub payment_method: PaymentMethodRequest,
    /// Client-supplied key forwarded to the payment gateway so a retried
    /// request cannot capture twice.
    pub idempotency_key: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<CartLine>,
}

/// Pricing knobs shared by every checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub tax_rate: Decimal,
    pub delivery_buffer_minutes: i64,
}

impl CheckoutSettings {
    pub fn from_config(cfg: &crate::config::AppConfig) -> Result<Self, ServiceError> {
        let tax_rate = Decimal::try_from(cfg.tax_rate).map_err(|e| {
            ServiceError::InternalError(format!("tax_rate {} is not decimal: {e}", cfg.tax_rate))
        })?;
        Ok(Self {
            currency: cfg.currency.clone(),
            tax_rate,
            delivery_buffer_minutes: cfg.delivery_buffer_minutes,
        })
    }
}

/// The checkout transaction coordinator.
///
/// Validation, delivery resolution and the gateway charge all happen on a
/// plain connection; the truck row lock is taken only afterwards, for the
/// duration of a re-validation and the inserts. A slow gateway therefore
/// never serializes other checkouts against the same truck. The price of
/// that ordering is a capture-then-rollback window, closed by
/// [`CheckoutService::compensate_charge`].
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    delivery: DeliveryResolver,
    payments: PaymentOrchestrator,
    dispatcher: NotificationDispatcher,
    event_sender: EventSender,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        delivery: DeliveryResolver,
        payments: PaymentOrchestrator,
        dispatcher: NotificationDispatcher,
        event_sender: EventSender,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            delivery,
            payments,
            dispatcher,
            event_sender,
            settings,
        }
    }

    #[instrument(skip(self, request), fields(customer_id = %customer_id, food_truck_id = %request.food_truck_id))]
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<order::Model, ServiceError> {
        request.validate()?;

        let truck = food_truck::Entity::find_by_id(request.food_truck_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Food truck {} not found", request.food_truck_id))
            })?;
        ensure_truck_online(&truck)?;

        let priced = PricingService::price_cart(&*self.db, truck.id, &request.items).await?;

        let (address_snapshot, delivery_fee) = match request.fulfillment_type {
            FulfillmentType::Pickup => (truck.pickup_address.clone(), Decimal::ZERO),
            FulfillmentType::Delivery => {
                let destination = request.delivery_address.as_ref().ok_or_else(|| {
                    ServiceError::ValidationError(
                        "delivery_address is required for delivery orders".to_string(),
                    )
                })?;
                let quote = self
                    .delivery
                    .resolve(&*self.db, customer_id, &truck, priced.subtotal, destination)
                    .await?;
                (quote.snapshot, quote.fee)
            }
        };

        let tax_amount = round_money(priced.subtotal * self.settings.tax_rate);
        let total_amount = priced.subtotal + tax_amount + delivery_fee;

        let instrument = self
            .payments
            .resolve_instrument(&*self.db, customer_id, &request.payment_method)
            .await?;

        // Charge before taking the truck lock. A declined card costs nothing
        // but this request; a captured charge is compensated below if the
        // commit falls through.
        let charge = self
            .payments
            .charge_total(
                customer_id,
                total_amount,
                &self.settings.currency,
                &instrument,
                request.idempotency_key.as_deref(),
            )
            .await?;

        let order = match self
            .persist_order(
                customer_id,
                &truck,
                &request,
                &priced,
                address_snapshot,
                tax_amount,
                delivery_fee,
                total_amount,
                &charge,
            )
            .await
        {
            Ok(order) => order,
            Err(e) => {
                self.compensate_charge(customer_id, truck.id, &charge, total_amount, &e)
                    .await;
                return Err(e);
            }
        };

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order placed"
        );

        self.after_commit(&order, &truck, &instrument).await;

        Ok(order)
    }

    /// The transaction boundary: truck lock, re-validation, inserts, commit.
    /// Any error rolls the whole transaction back on drop.
    #[allow(clippy::too_many_arguments)]
    async fn persist_order(
        &self,
        customer_id: Uuid,
        truck: &food_truck::Model,
        request: &PlaceOrderRequest,
        priced: &PricedCart,
        address_snapshot: String,
        tax_amount: Decimal,
        delivery_fee: Decimal,
        total_amount: Decimal,
        charge: &ChargeOutcome,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let backend = txn.get_database_backend();

        // Re-check under the row lock: the truck may have gone offline (or
        // its catalog changed) between the first validation and the charge.
        let locked_truck = db::for_update(food_truck::Entity::find_by_id(truck.id), backend)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Food truck {} not found", truck.id)))?;
        ensure_truck_online(&locked_truck)?;

        let repriced = PricingService::price_cart(&txn, truck.id, &request.items).await?;
        if repriced.subtotal != priced.subtotal {
            return Err(ServiceError::AvailabilityConflict(
                "Menu prices changed while the order was being processed".to_string(),
            ));
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let estimated_ready =
            now + ChronoDuration::minutes(i64::from(locked_truck.default_prep_minutes));
        let estimated_delivery = match request.fulfillment_type {
            FulfillmentType::Delivery => Some(
                estimated_ready + ChronoDuration::minutes(self.settings.delivery_buffer_minutes),
            ),
            FulfillmentType::Pickup => None,
        };

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-{}",
                order_id.to_string()[..8].to_uppercase()
            )),
            customer_id: Set(customer_id),
            food_truck_id: Set(truck.id),
            fulfillment_type: Set(request.fulfillment_type),
            status: Set(OrderStatus::PendingConfirmation),
            currency: Set(self.settings.currency.clone()),
            subtotal: Set(repriced.subtotal),
            tax_amount: Set(tax_amount),
            delivery_fee: Set(delivery_fee),
            total_amount: Set(total_amount),
            address_snapshot: Set(address_snapshot),
            charge_id: Set(Some(charge.charge_id.as_str().to_string())),
            refunded: Set(false),
            status_reason: Set(None),
            order_time: Set(now),
            accepted_at: Set(None),
            ready_at: Set(None),
            finalized_at: Set(None),
            estimated_ready_time: Set(Some(estimated_ready)),
            estimated_delivery_time: Set(estimated_delivery),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let order = order_model.insert(&txn).await?;

        self.insert_line_snapshots(&txn, order_id, &repriced).await?;

        txn.commit().await?;
        Ok(order)
    }

    async fn insert_line_snapshots(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        priced: &PricedCart,
    ) -> Result<(), ServiceError> {
        for line in &priced.lines {
            let item_id = Uuid::new_v4();
            let item = order_item::ActiveModel {
                id: Set(item_id),
                order_id: Set(order_id),
                menu_item_id: Set(line.menu_item_id),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.line_total),
            };
            item.insert(txn).await?;

            for option in &line.options {
                let option_row = order_item_option::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_item_id: Set(item_id),
                    menu_item_option_id: Set(option.option_id),
                    name: Set(option.name.clone()),
                    price_adjustment: Set(option.price_adjustment),
                };
                option_row.insert(txn).await?;
            }
        }
        Ok(())
    }

    /// The order transaction failed after the gateway captured funds. Refund
    /// immediately; if the refund also fails, record the charge for the
    /// reconciliation sweep so it is never silently orphaned.
    async fn compensate_charge(
        &self,
        customer_id: Uuid,
        food_truck_id: Uuid,
        charge: &ChargeOutcome,
        amount: Decimal,
        cause: &ServiceError,
    ) {
        warn!(
            charge_id = %charge.charge_id,
            error = %cause,
            "checkout failed after capture; refunding"
        );

        match self
            .payments
            .refund(Some(charge.charge_id.as_str()), None)
            .await
        {
            Ok(refund) => {
                info!(
                    charge_id = %charge.charge_id,
                    refund_id = %refund.refund_id,
                    "compensating refund issued"
                );
            }
            Err(refund_err) => {
                error!(
                    charge_id = %charge.charge_id,
                    error = %refund_err,
                    "compensating refund failed; flagging charge for reconciliation"
                );
                let row = charge_reconciliation::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    charge_id: Set(charge.charge_id.as_str().to_string()),
                    customer_id: Set(customer_id),
                    food_truck_id: Set(food_truck_id),
                    amount: Set(amount),
                    currency: Set(self.settings.currency.clone()),
                    detail: Set(format!("checkout rollback: {cause}; refund: {refund_err}")),
                    resolved: Set(false),
                    created_at: Set(Utc::now()),
                };
                if let Err(persist_err) = row.insert(&*self.db).await {
                    error!(
                        charge_id = %charge.charge_id,
                        error = %persist_err,
                        "failed to record charge for reconciliation"
                    );
                }
            }
        }
    }

    async fn after_commit(
        &self,
        order: &order::Model,
        truck: &food_truck::Model,
        instrument: &ResolvedInstrument,
    ) {
        if instrument.save_after_charge {
            self.payments
                .save_instrument_best_effort(&*self.db, order.customer_id, &instrument.token)
                .await;
        }

        self.dispatcher.order_placed(order, truck.operator_id).await;
        self.event_sender
            .send(Event::OrderPlaced {
                order_id: order.id,
                food_truck_id: truck.id,
            })
            .await;
    }
}

fn ensure_truck_online(truck: &food_truck::Model) -> Result<(), ServiceError> {
    match truck.current_status {
        TruckStatus::Online => Ok(()),
        TruckStatus::Paused => Err(ServiceError::TruckUnavailable(format!(
            "'{}' has paused taking orders",
            truck.name
        ))),
        TruckStatus::Offline => Err(ServiceError::TruckUnavailable(format!(
            "'{}' is offline",
            truck.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn truck_with_status(status: TruckStatus) -> food_truck::Model {
        food_truck::Model {
            id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            name: "Taco Cart".into(),
            description: None,
            current_status: status,
            pickup_address: "1 Market St, San Francisco, CA 94103, US".into(),
            latitude: 37.79,
            longitude: -122.39,
            delivery_enabled: true,
            delivery_fee: dec!(3.50),
            delivery_minimum: dec!(15.00),
            delivery_radius_km: 5.0,
            default_prep_minutes: 20,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn offline_and_paused_trucks_are_rejected() {
        assert!(ensure_truck_online(&truck_with_status(TruckStatus::Online)).is_ok());

        let offline = ensure_truck_online(&truck_with_status(TruckStatus::Offline));
        assert!(matches!(offline, Err(ServiceError::TruckUnavailable(_))));

        let paused = ensure_truck_online(&truck_with_status(TruckStatus::Paused));
        assert!(matches!(paused, Err(ServiceError::TruckUnavailable(_))));
    }

    #[test]
    fn totals_reconcile_with_tax_and_fee() {
        let subtotal = dec!(24.00);
        let tax = round_money(subtotal * dec!(0.0875));
        let fee = dec!(3.50);
        let total = subtotal + tax + fee;
        assert_eq!(tax, dec!(2.10));
        assert_eq!(total, dec!(29.60));
        assert_eq!(total, subtotal + tax + fee);
    }
}
