use super::{Address, ProductRef, TransactionResponse};
use crate::entities::{OrderStatus, line_item_entity, order_entity, shipping_address_entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: i64,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub tax: i64,
    pub shipping: i64,
    pub discount_amount: i64,
    pub discount_code: Option<String>,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LineItemResponse {
    pub id: i64,
    pub product: Option<ProductRef>,
    pub description: String,
    pub attributes: String,
    pub subscription_plan: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub unit_tax: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<LineItemResponse>,
    pub latest_transaction: Option<TransactionResponse>,
    pub shipping_address: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<OrderStatus>,
}

impl From<order_entity::Model> for OrderResponse {
    fn from(m: order_entity::Model) -> Self {
        Self {
            id: m.id,
            status: m.status,
            subtotal: m.subtotal,
            tax: m.tax,
            shipping: m.shipping,
            discount_amount: m.discount_amount,
            discount_code: m.discount_code,
            total: m.total,
            created_at: m.created_at,
        }
    }
}

impl From<line_item_entity::Model> for LineItemResponse {
    fn from(m: line_item_entity::Model) -> Self {
        let product = match (m.product_type, m.product_id) {
            (Some(kind), Some(id)) => Some(ProductRef { kind, id }),
            _ => None,
        };
        Self {
            id: m.id,
            product,
            description: m.description,
            attributes: m.attributes,
            subscription_plan: (!m.subscription_plan.is_empty()).then_some(m.subscription_plan),
            quantity: m.quantity,
            unit_price: m.unit_price,
            unit_tax: m.unit_tax,
            total: m.total,
        }
    }
}

impl From<shipping_address_entity::Model> for Address {
    fn from(m: shipping_address_entity::Model) -> Self {
        Self {
            address1: m.address1,
            address2: m.address2,
            city: m.city,
            region: m.region,
            postal_code: m.postal_code,
            country: m.country,
        }
    }
}
