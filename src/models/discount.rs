use crate::entities::discount_entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Client-side display of a code. Unknown or invalid codes come back with
/// `valid: false` and zero amounts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountLookupResponse {
    pub code: String,
    pub valid: bool,
    pub amount: i64,
    pub percentage: i32,
    pub waives_tax: bool,
    pub waives_shipping: bool,
}

impl DiscountLookupResponse {
    pub fn none(code: &str) -> Self {
        Self {
            code: code.to_string(),
            valid: false,
            amount: 0,
            percentage: 0,
            waives_tax: false,
            waives_shipping: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_individual_limit() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDiscountRequest {
    /// 为空时自动生成
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub percentage: Option<i32>,
    #[serde(default)]
    pub uses_limit: Option<i32>,
    #[serde(default = "default_individual_limit")]
    pub individual_use_limit: i32,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub active_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expire_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub waives_tax: bool,
    #[serde(default)]
    pub waives_shipping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountResponse {
    pub id: i64,
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
}

impl From<discount_entity::Model> for DiscountResponse {
    fn from(m: discount_entity::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            description: m.description,
            active: m.active,
            amount: m.amount,
            percentage: m.percentage,
            uses_limit: m.uses_limit,
            individual_use_limit: m.individual_use_limit,
            times_used: m.times_used,
            user_id: m.user_id,
            active_date: m.active_date,
            expire_date: m.expire_date,
            waives_tax: m.waives_tax,
            waives_shipping: m.waives_shipping,
            created_at: m.created_at,
        }
    }
}
