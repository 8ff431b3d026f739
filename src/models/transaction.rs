use super::OrderResponse;
use crate::entities::{PaymentMethod, TransactionStatus, order_transaction_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: i64,
    pub order_id: i64,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub amount: i64,
    pub last_four: Option<String>,
    pub reference_id: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// 部分退款金额（美分），为空则全额退款
    pub amount: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SettleRequest {
    pub amount: Option<i64>,
}

/// Result of an administrative payment action.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentActionResponse {
    pub order: OrderResponse,
    pub transaction: TransactionResponse,
}

impl From<order_transaction_entity::Model> for TransactionResponse {
    fn from(m: order_transaction_entity::Model) -> Self {
        Self {
            id: m.id,
            order_id: m.order_id,
            status: m.status,
            payment_method: m.payment_method,
            amount: m.amount,
            last_four: m.last_four,
            reference_id: m.reference_id,
            details: m.details,
            created_at: m.created_at,
        }
    }
}
