pub use sea_orm_migration::prelude::*;

mod m20250110_000001_create_food_trucks_table;
mod m20250110_000002_create_menu_tables;
mod m20250110_000003_create_customer_tables;
mod m20250110_000004_create_orders_table;
mod m20250110_000005_create_order_item_tables;
mod m20250214_000006_create_charge_reconciliations_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250110_000001_create_food_trucks_table::Migration),
            Box::new(m20250110_000002_create_menu_tables::Migration),
            Box::new(m20250110_000003_create_customer_tables::Migration),
            Box::new(m20250110_000004_create_orders_table::Migration),
            Box::new(m20250110_000005_create_order_item_tables::Migration),
            Box::new(m20250214_000006_create_charge_reconciliations_table::Migration),
        ]
    }
}
