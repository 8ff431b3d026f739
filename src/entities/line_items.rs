use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "line_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub order_id: i64,
    pub product_type: Option<String>,
    pub product_id: Option<i64>,
    pub description: String,
    pub attributes: String,
    /// 空字符串表示非订阅商品
    pub subscription_plan: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub unit_tax: i64,
    pub total: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_subscription(&self) -> bool {
        !self.subscription_plan.is_empty()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
