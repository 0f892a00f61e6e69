use sea_orm_migration::prelude::*;

use crate::m20250110_000001_create_food_trucks_table::FoodTrucks;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                    .col(
                        ColumnDef::new(Orders::OrderNumber)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Orders::FoodTruckId).uuid().not_null())
                    .col(ColumnDef::new(Orders::FulfillmentType).string().not_null())
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string()
                            .not_null()
                            .default("pending_confirmation"),
                    )
                    .col(
                        ColumnDef::new(Orders::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Orders::Subtotal)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::TaxAmount)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::DeliveryFee)
                            .decimal_len(10, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalAmount)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::AddressSnapshot).text().not_null())
                    .col(ColumnDef::new(Orders::ChargeId).string().null())
                    .col(
                        ColumnDef::new(Orders::Refunded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Orders::StatusReason).text().null())
                    .col(ColumnDef::new(Orders::OrderTime).timestamp().not_null())
                    .col(ColumnDef::new(Orders::AcceptedAt).timestamp().null())
                    .col(ColumnDef::new(Orders::ReadyAt).timestamp().null())
                    .col(ColumnDef::new(Orders::FinalizedAt).timestamp().null())
                    .col(ColumnDef::new(Orders::EstimatedReadyTime).timestamp().null())
                    .col(
                        ColumnDef::new(Orders::EstimatedDeliveryTime)
                            .timestamp()
                            .null(),
                    )
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_truck")
                            .from(Orders::Table, Orders::FoodTruckId)
                            .to(FoodTrucks::Table, FoodTrucks::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_customer")
                    .table(Orders::Table)
                    .col(Orders::CustomerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_truck_status")
                    .table(Orders::Table)
                    .col(Orders::FoodTruckId)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    OrderNumber,
    CustomerId,
    FoodTruckId,
    FulfillmentType,
    Status,
    Currency,
    Subtotal,
    TaxAmount,
    DeliveryFee,
    TotalAmount,
    AddressSnapshot,
    ChargeId,
    Refunded,
    StatusReason,
    OrderTime,
    AcceptedAt,
    ReadyAt,
    FinalizedAt,
    EstimatedReadyTime,
    EstimatedDeliveryTime,
    CreatedAt,
    UpdatedAt,
}
