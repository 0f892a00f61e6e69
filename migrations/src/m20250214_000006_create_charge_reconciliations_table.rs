use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChargeReconciliations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChargeReconciliations::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargeReconciliations::ChargeId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargeReconciliations::CustomerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargeReconciliations::FoodTruckId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargeReconciliations::Amount)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargeReconciliations::Currency)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChargeReconciliations::Detail).text().not_null())
                    .col(
                        ColumnDef::new(ChargeReconciliations::Resolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ChargeReconciliations::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChargeReconciliations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ChargeReconciliations {
    Table,
    Id,
    ChargeId,
    CustomerId,
    FoodTruckId,
    Amount,
    Currency,
    Detail,
    Resolved,
    CreatedAt,
}
