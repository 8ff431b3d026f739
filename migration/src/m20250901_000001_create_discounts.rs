use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub(crate) enum Discounts {
    Table,
    Id,
    Code,
    Description,
    Active,
    Amount,
    Percentage,
    UsesLimit,
    IndividualUseLimit,
    TimesUsed,
    UserId,
    ActiveDate,
    ExpireDate,
    WaivesTax,
    WaivesShipping,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Referrals {
    Table,
    Id,
    Source,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Discounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Discounts::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Discounts::Code).string_len(20).not_null())
                    .col(ColumnDef::new(Discounts::Description).string_len(100).null())
                    .col(
                        ColumnDef::new(Discounts::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    // 金额单位: 美分
                    .col(ColumnDef::new(Discounts::Amount).big_integer().null())
                    .col(ColumnDef::new(Discounts::Percentage).integer().null())
                    .col(ColumnDef::new(Discounts::UsesLimit).integer().null())
                    .col(
                        ColumnDef::new(Discounts::IndividualUseLimit)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Discounts::TimesUsed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Discounts::UserId).big_integer().null())
                    .col(
                        ColumnDef::new(Discounts::ActiveDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Discounts::ExpireDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Discounts::WaivesTax)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Discounts::WaivesShipping)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Discounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Discounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_discounts_code")
                    .table(Discounts::Table)
                    .col(Discounts::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Referrals::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Referrals::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Referrals::Source).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Referrals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_referrals_source")
                    .table(Referrals::Table)
                    .col(Referrals::Source)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Referrals::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Discounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
