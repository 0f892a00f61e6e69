use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FoodTrucks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FoodTrucks::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FoodTrucks::OperatorId).uuid().not_null())
                    .col(ColumnDef::new(FoodTrucks::Name).string().not_null())
                    .col(ColumnDef::new(FoodTrucks::Description).text().null())
                    .col(
                        ColumnDef::new(FoodTrucks::CurrentStatus)
                            .string()
                            .not_null()
                            .default("offline"),
                    )
                    .col(ColumnDef::new(FoodTrucks::PickupAddress).text().not_null())
                    .col(ColumnDef::new(FoodTrucks::Latitude).double().not_null())
                    .col(ColumnDef::new(FoodTrucks::Longitude).double().not_null())
                    .col(
                        ColumnDef::new(FoodTrucks::DeliveryEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FoodTrucks::DeliveryFee)
                            .decimal_len(10, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FoodTrucks::DeliveryMinimum)
                            .decimal_len(10, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FoodTrucks::DeliveryRadiusKm)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(FoodTrucks::DefaultPrepMinutes)
                            .integer()
                            .not_null()
                            .default(20),
                    )
                    .col(ColumnDef::new(FoodTrucks::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(FoodTrucks::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_food_trucks_operator")
                    .table(FoodTrucks::Table)
                    .col(FoodTrucks::OperatorId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FoodTrucks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum FoodTrucks {
    Table,
    Id,
    OperatorId,
    Name,
    Description,
    CurrentStatus,
    PickupAddress,
    Latitude,
    Longitude,
    DeliveryEnabled,
    DeliveryFee,
    DeliveryMinimum,
    DeliveryRadiusKm,
    DefaultPrepMinutes,
    CreatedAt,
    UpdatedAt,
}
