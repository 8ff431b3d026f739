use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[sea_orm(string_value = "INCOMPLETE")]
    Incomplete,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "COMPLETE")]
    Complete,
    #[sea_orm(string_value = "VOIDED")]
    Voided,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "CREDIT")]
    Credit,
    #[sea_orm(string_value = "CHECK")]
    Check,
    /// 折扣审计记录，不产生实际扣款
    #[sea_orm(string_value = "DISCOUNT")]
    Discount,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "order_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: i64,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub amount: i64,
    pub last_four: Option<String>,
    pub reference_id: Option<String>,
    pub details: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_response: Option<String>,
    pub billing_first_name: String,
    pub billing_last_name: String,
    pub billing_address1: String,
    pub billing_address2: String,
    pub billing_city: String,
    pub billing_region: String,
    pub billing_postal_code: String,
    pub billing_country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
