use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{food_truck, order, order_item};
use crate::errors::ServiceError;

/// Read-side order queries for the customer and operator surfaces.
#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DatabaseConnection>,
}

impl OrderQueryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::OrderTime)
            .all(&*self.db)
            .await?;
        Ok(orders)
    }

    /// Loads one order with its line snapshots, enforcing ownership.
    #[instrument(skip(self))]
    pub async fn get_for_customer(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.customer_id != customer_id {
            return Err(ServiceError::Forbidden(
                "Order belongs to a different customer".to_string(),
            ));
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok((order, items))
    }

    /// All orders across the operator's trucks, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_operator(
        &self,
        operator_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let truck_ids: Vec<Uuid> = food_truck::Entity::find()
            .filter(food_truck::Column::OperatorId.eq(operator_id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        if truck_ids.is_empty() {
            return Ok(Vec::new());
        }

        let orders = order::Entity::find()
            .filter(order::Column::FoodTruckId.is_in(truck_ids))
            .order_by_desc(order::Column::OrderTime)
            .all(&*self.db)
            .await?;
        Ok(orders)
    }
}
