use sea_orm_migration::prelude::*;

use super::m20250901_000002_create_orders::Orders;

#[derive(DeriveIden)]
enum ShippingAddresses {
    Table,
    Id,
    OrderId,
    Address1,
    Address2,
    City,
    Region,
    PostalCode,
    Country,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ShippingAddresses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShippingAddresses::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ShippingAddresses::OrderId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShippingAddresses::Address1)
                            .string_len(80)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShippingAddresses::Address2)
                            .string_len(80)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ShippingAddresses::City).string_len(50).not_null())
                    .col(
                        ColumnDef::new(ShippingAddresses::Region)
                            .string_len(50)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ShippingAddresses::PostalCode)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShippingAddresses::Country)
                            .string_len(2)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ShippingAddresses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShippingAddresses::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shipping_addresses_order")
                            .from(ShippingAddresses::Table, ShippingAddresses::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_shipping_addresses_order")
                    .table(ShippingAddresses::Table)
                    .col(ShippingAddresses::OrderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(ShippingAddresses::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
