use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "discounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 统一保存为大写，查找时不区分大小写
    #[sea_orm(unique)]
    pub code: String,
    pub description: Option<String>,
    pub active: bool,
    pub amount: Option<i64>,
    pub percentage: Option<i32>,
    pub uses_limit: Option<i32>,
    pub individual_use_limit: i32,
    pub times_used: i32,
    pub user_id: Option<i64>,
    pub active_date: Option<DateTime<Utc>>,
    pub expire_date: Option<DateTime<Utc>>,
    pub waives_tax: bool,
    pub waives_shipping: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Time window, global usage and active flag. Per-user rules need the
    /// order history and live in the discount service.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.active_date.is_some_and(|d| now < d) {
            return false;
        }
        if self.expire_date.is_some_and(|d| now > d) {
            return false;
        }
        if self.is_exhausted() {
            return false;
        }
        self.active
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.uses_limit, Some(limit) if limit > 0 && self.times_used >= limit)
    }

    /// Discount that only removes tax and/or shipping.
    pub fn is_waiver_only(&self) -> bool {
        self.amount.unwrap_or(0) <= 0
            && self.percentage.unwrap_or(0) <= 0
            && (self.waives_tax || self.waives_shipping)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
