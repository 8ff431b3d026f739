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
pub enum OrderStatus {
    #[sea_orm(string_value = "INCOMPLETE")]
    Incomplete,
    #[sea_orm(string_value = "PENDING_PAYMENT")]
    PendingPayment,
    #[sea_orm(string_value = "COMPLETE")]
    Complete,
    #[sea_orm(string_value = "VOIDED")]
    Voided,
    #[sea_orm(string_value = "REFUNDED")]
    Refunded,
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

impl OrderStatus {
    /// Statuses that count as the owner's single live order.
    pub const LIVE: [OrderStatus; 2] = [OrderStatus::Incomplete, OrderStatus::PendingPayment];

    pub fn is_live(self) -> bool {
        Self::LIVE.contains(&self)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Incomplete => "INCOMPLETE",
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Complete => "COMPLETE",
            OrderStatus::Voided => "VOIDED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: Option<i64>,
    pub status: OrderStatus,
    pub subtotal: i64,
    /// 订单总税额 (逐项税 + flat_tax)
    pub tax: i64,
    pub flat_tax: i64,
    pub shipping: i64,
    pub discount_amount: i64,
    pub total: i64,
    pub discount_id: Option<i64>,
    pub discount_code: Option<String>,
    pub referral_id: Option<i64>,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn can_complete(&self) -> bool {
        self.status == OrderStatus::PendingPayment
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
