use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{menu_category, menu_item, menu_item_option};
use crate::errors::ServiceError;

/// One requested line of a cart, exactly as the client sent it. Prices are
/// deliberately absent: the catalog is the only price source.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct CartLine {
    pub menu_item_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be a positive integer"))]
    pub quantity: i32,
    #[serde(default)]
    pub option_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct PricedOption {
    pub option_id: Uuid,
    pub name: String,
    pub price_adjustment: Decimal,
}

/// A fully priced line ready to be persisted as an immutable snapshot.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub options: Vec<PricedOption>,
}

#[derive(Debug, Clone)]
pub struct PricedCart {
    pub subtotal: Decimal,
    pub lines: Vec<PricedLine>,
}

/// Validates availability and computes authoritative prices for a cart.
///
/// Runs against whatever connection it is handed so the checkout coordinator
/// can execute it once up front and once more inside the locked transaction.
pub struct PricingService;

impl PricingService {
    #[instrument(skip(conn, lines), fields(food_truck_id = %food_truck_id, line_count = lines.len()))]
    pub async fn price_cart<C: ConnectionTrait>(
        conn: &C,
        food_truck_id: Uuid,
        lines: &[CartLine],
    ) -> Result<PricedCart, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }

        let mut priced_lines = Vec::with_capacity(lines.len());
        let mut subtotal = Decimal::ZERO;

        for (index, line) in lines.iter().enumerate() {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "items[{index}].quantity must be a positive integer"
                )));
            }

            // Scoped by truck id so an id from another truck's menu cannot be
            // injected into this order.
            let item = menu_item::Entity::find_by_id(line.menu_item_id)
                .filter(menu_item::Column::FoodTruckId.eq(food_truck_id))
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Menu item {} not found on this truck",
                        line.menu_item_id
                    ))
                })?;

            if !item.is_available {
                return Err(ServiceError::AvailabilityConflict(format!(
                    "'{}' is currently unavailable",
                    item.name
                )));
            }

            let category = menu_category::Entity::find_by_id(item.category_id)
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Category for menu item '{}' not found", item.name))
                })?;

            if !category.is_available {
                return Err(ServiceError::AvailabilityConflict(format!(
                    "'{}' is currently unavailable ('{}' is switched off)",
                    item.name, category.name
                )));
            }

            let mut seen_options = Vec::with_capacity(line.option_ids.len());
            let mut priced_options = Vec::with_capacity(line.option_ids.len());
            let mut adjustment_total = Decimal::ZERO;

            for option_id in &line.option_ids {
                if seen_options.contains(option_id) {
                    return Err(ServiceError::ValidationError(format!(
                        "items[{index}] selects option {option_id} more than once"
                    )));
                }
                seen_options.push(*option_id);

                let option = menu_item_option::Entity::find_by_id(*option_id)
                    .one(conn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Menu item option {option_id} not found"))
                    })?;

                // The option must belong to the item on this very line, or a
                // crafted request could attach another item's (cheaper) price
                // adjustment.
                if option.menu_item_id != item.id {
                    return Err(ServiceError::ValidationError(format!(
                        "Option '{}' does not belong to '{}'",
                        option.name, item.name
                    )));
                }

                adjustment_total += option.price_adjustment;
                priced_options.push(PricedOption {
                    option_id: option.id,
                    name: option.name,
                    price_adjustment: option.price_adjustment,
                });
            }

            let unit_price = item.base_price + adjustment_total;
            let line_total = unit_price * Decimal::from(line.quantity);
            subtotal += line_total;

            priced_lines.push(PricedLine {
                menu_item_id: item.id,
                name: item.name,
                quantity: line.quantity,
                unit_price,
                line_total,
                options: priced_options,
            });
        }

        Ok(PricedCart {
            subtotal,
            lines: priced_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_totals_multiply_adjusted_unit_price() {
        let unit_price = dec!(9.50) + dec!(1.25) + dec!(0.75);
        let line_total = unit_price * Decimal::from(3);
        assert_eq!(line_total, dec!(34.50));
    }

    #[test]
    fn cart_line_quantity_validation() {
        let line = CartLine {
            menu_item_id: Uuid::new_v4(),
            quantity: 0,
            option_ids: vec![],
        };
        assert!(line.validate().is_err());

        let line = CartLine {
            menu_item_id: Uuid::new_v4(),
            quantity: 2,
            option_ids: vec![],
        };
        assert!(line.validate().is_ok());
    }
}
