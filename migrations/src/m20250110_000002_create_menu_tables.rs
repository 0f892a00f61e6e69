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
                    .table(MenuCategories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MenuCategories::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MenuCategories::FoodTruckId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MenuCategories::Name).string().not_null())
                    .col(
                        ColumnDef::new(MenuCategories::IsAvailable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(MenuCategories::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_menu_categories_truck")
                            .from(MenuCategories::Table, MenuCategories::FoodTruckId)
                            .to(FoodTrucks::Table, FoodTrucks::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MenuItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MenuItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MenuItems::FoodTruckId).uuid().not_null())
                    .col(ColumnDef::new(MenuItems::CategoryId).uuid().not_null())
                    .col(ColumnDef::new(MenuItems::Name).string().not_null())
                    .col(ColumnDef::new(MenuItems::Description).text().null())
                    .col(
                        ColumnDef::new(MenuItems::BasePrice)
                            .decimal_len(10, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MenuItems::IsAvailable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_menu_items_truck")
                            .from(MenuItems::Table, MenuItems::FoodTruckId)
                            .to(FoodTrucks::Table, FoodTrucks::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_menu_items_category")
                            .from(MenuItems::Table, MenuItems::CategoryId)
                            .to(MenuCategories::Table, MenuCategories::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_menu_items_truck")
                    .table(MenuItems::Table)
                    .col(MenuItems::FoodTruckId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MenuItemOptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MenuItemOptions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MenuItemOptions::MenuItemId).uuid().not_null())
                    .col(ColumnDef::new(MenuItemOptions::Name).string().not_null())
                    .col(
                        ColumnDef::new(MenuItemOptions::PriceAdjustment)
                            .decimal_len(10, 2)
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_menu_item_options_item")
                            .from(MenuItemOptions::Table, MenuItemOptions::MenuItemId)
                            .to(MenuItems::Table, MenuItems::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MenuItemOptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MenuItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MenuCategories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum MenuCategories {
    Table,
    Id,
    FoodTruckId,
    Name,
    IsAvailable,
    Position,
}

#[derive(DeriveIden)]
pub enum MenuItems {
    Table,
    Id,
    FoodTruckId,
    CategoryId,
    Name,
    Description,
    BasePrice,
    IsAvailable,
}

#[derive(DeriveIden)]
pub enum MenuItemOptions {
    Table,
    Id,
    MenuItemId,
    Name,
    PriceAdjustment,
}
