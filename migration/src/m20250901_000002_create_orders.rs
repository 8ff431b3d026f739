use sea_orm_migration::prelude::*;

use super::m20250901_000001_create_discounts::{Discounts, Referrals};

#[derive(DeriveIden)]
pub(crate) enum Orders {
    Table,
    Id,
    UserId,
    Status,
    Subtotal,
    Tax,
    FlatTax,
    Shipping,
    DiscountAmount,
    Total,
    DiscountId,
    DiscountCode,
    ReferralId,
    CustomerId,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum LineItems {
    Table,
    Id,
    OrderId,
    ProductType,
    ProductId,
    Description,
    Attributes,
    SubscriptionPlan,
    Quantity,
    UnitPrice,
    UnitTax,
    Total,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OrderTransactions {
    Table,
    Id,
    OrderId,
    Status,
    PaymentMethod,
    Amount,
    LastFour,
    ReferenceId,
    Details,
    RawResponse,
    BillingFirstName,
    BillingLastName,
    BillingAddress1,
    BillingAddress2,
    BillingCity,
    BillingRegion,
    BillingPostalCode,
    BillingCountry,
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
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Orders::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Orders::UserId).big_integer().null())
                    .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                    // 所有金额字段单位: 美分
                    .col(
                        ColumnDef::new(Orders::Subtotal)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::Tax).big_integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Orders::FlatTax)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::Shipping)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::DiscountAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Orders::Total)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Orders::DiscountId).big_integer().null())
                    .col(ColumnDef::new(Orders::DiscountCode).string_len(20).null())
                    .col(ColumnDef::new(Orders::ReferralId).big_integer().null())
                    .col(ColumnDef::new(Orders::CustomerId).string_len(255).null())
                    .col(ColumnDef::new(Orders::Notes).text().null())
                    .col(
                        ColumnDef::new(Orders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_discount")
                            .from(Orders::Table, Orders::DiscountId)
                            .to(Discounts::Table, Discounts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_referral")
                            .from(Orders::Table, Orders::ReferralId)
                            .to(Referrals::Table, Referrals::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LineItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LineItems::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LineItems::OrderId).big_integer().not_null())
                    .col(ColumnDef::new(LineItems::ProductType).string_len(64).null())
                    .col(ColumnDef::new(LineItems::ProductId).big_integer().null())
                    .col(
                        ColumnDef::new(LineItems::Description)
                            .string_len(250)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(LineItems::Attributes)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(LineItems::SubscriptionPlan)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(LineItems::Quantity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(LineItems::UnitPrice).big_integer().not_null())
                    .col(
                        ColumnDef::new(LineItems::UnitTax)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(LineItems::Total).big_integer().not_null())
                    .col(
                        ColumnDef::new(LineItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LineItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_line_items_order")
                            .from(LineItems::Table, LineItems::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderTransactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::OrderId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::Status)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::PaymentMethod)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::Amount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(OrderTransactions::LastFour).string_len(4).null())
                    .col(
                        ColumnDef::new(OrderTransactions::ReferenceId)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(OrderTransactions::Details).string_len(250).null())
                    .col(ColumnDef::new(OrderTransactions::RawResponse).text().null())
                    .col(
                        ColumnDef::new(OrderTransactions::BillingFirstName)
                            .string_len(50)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::BillingLastName)
                            .string_len(50)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::BillingAddress1)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::BillingAddress2)
                            .string_len(100)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::BillingCity)
                            .string_len(50)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::BillingRegion)
                            .string_len(50)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::BillingPostalCode)
                            .string_len(30)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::BillingCountry)
                            .string_len(2)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderTransactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_transactions_order")
                            .from(OrderTransactions::Table, OrderTransactions::OrderId)
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
                    .name("idx_orders_user")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_orders_status")
                    .table(Orders::Table)
                    .col(Orders::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_line_items_order")
                    .table(LineItems::Table)
                    .col(LineItems::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_order_transactions_order")
                    .table(OrderTransactions::Table)
                    .col(OrderTransactions::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(OrderTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(LineItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Orders::Table).to_owned())
            .await?;
        Ok(())
    }
}
