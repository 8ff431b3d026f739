use super::{BillingInfo, OrderDetailResponse, OrderResponse, TransactionResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity of a purchasable thing: a product type name plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ProductRef {
    pub kind: String,
    pub id: i64,
}

impl ProductRef {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

/// Anything that can be sold as a line item.
pub trait Priceable {
    fn identity(&self) -> ProductRef;
}

impl Priceable for ProductRef {
    fn identity(&self) -> ProductRef {
        self.clone()
    }
}

fn default_quantity() -> i32 {
    1
}

/// One row read from the upstream cart.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product: ProductRef,
    pub unit_price: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: String,
}

/// Where the order's items come from on checkout submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CheckoutItems {
    Cart {
        lines: Vec<CartLine>,
    },
    Custom {
        description: String,
        #[serde(default)]
        attributes: String,
        amount: i64,
        #[serde(default)]
        taxable: bool,
    },
    Subscription {
        plan: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddItemRequest {
    #[serde(default)]
    pub product: Option<ProductRef>,
    pub unit_price: i64,
    #[serde(default)]
    pub unit_tax: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: String,
    #[serde(default)]
    pub subscription_plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoveItemRequest {
    pub product: ProductRef,
    /// Picks one variant when the product has several lines.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateQuantityRequest {
    pub product: ProductRef,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplyDiscountRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApplyDiscountResponse {
    pub applied: bool,
    pub order: OrderDetailResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Option<CheckoutItems>,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub referral: Option<String>,
    pub billing: BillingInfo,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    /// false when the order was free and has already been completed
    pub requires_payment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmResponse {
    pub order: OrderResponse,
    pub transaction: TransactionResponse,
}
