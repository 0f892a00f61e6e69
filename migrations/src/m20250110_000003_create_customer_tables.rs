use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomerAddresses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerAddresses::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerAddresses::CustomerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CustomerAddresses::Label).string().null())
                    .col(ColumnDef::new(CustomerAddresses::Street).string().not_null())
                    .col(ColumnDef::new(CustomerAddresses::Unit).string().null())
                    .col(ColumnDef::new(CustomerAddresses::City).string().not_null())
                    .col(ColumnDef::new(CustomerAddresses::State).string().not_null())
                    .col(
                        ColumnDef::new(CustomerAddresses::PostalCode)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerAddresses::Country)
                            .string()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_addresses_customer")
                    .table(CustomerAddresses::Table)
                    .col(CustomerAddresses::CustomerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PaymentInstruments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentInstruments::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentInstruments::CustomerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentInstruments::GatewayToken)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentInstruments::Brand).string().null())
                    .col(ColumnDef::new(PaymentInstruments::LastFour).string().null())
                    .col(
                        ColumnDef::new(PaymentInstruments::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_instruments_customer")
                    .table(PaymentInstruments::Table)
                    .col(PaymentInstruments::CustomerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PaymentInstruments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CustomerAddresses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CustomerAddresses {
    Table,
    Id,
    CustomerId,
    Label,
    Street,
    Unit,
    City,
    State,
    PostalCode,
    Country,
}

#[derive(DeriveIden)]
pub enum PaymentInstruments {
    Table,
    Id,
    CustomerId,
    GatewayToken,
    Brand,
    LastFour,
    CreatedAt,
}
