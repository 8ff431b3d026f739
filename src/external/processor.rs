//! Uniform contract over the payment gateways.
//!
//! Gateway failures are values here: adapters translate declines, transport
//! errors and timeouts into [`GatewayDecline`] and never return `AppError`.

use crate::error::AppError;
use crate::models::BillingInfo;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineKind {
    /// The gateway answered and refused.
    Declined,
    /// Transport failure, timeout or an unreadable answer.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayDecline {
    pub kind: DeclineKind,
    pub message: String,
    pub raw: Option<Value>,
}

impl GatewayDecline {
    pub fn declined(message: impl Into<String>, raw: Option<Value>) -> Self {
        Self {
            kind: DeclineKind::Declined,
            message: message.into(),
            raw,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: DeclineKind::Unavailable,
            message: message.into(),
            raw: None,
        }
    }

    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::unavailable("timeout")
        } else {
            Self::unavailable(format!("gateway unreachable: {err}"))
        }
    }
}

impl From<GatewayDecline> for AppError {
    fn from(d: GatewayDecline) -> Self {
        match d.kind {
            DeclineKind::Declined => AppError::PaymentDeclined(d.message),
            DeclineKind::Unavailable => AppError::ProcessorError(d.message),
        }
    }
}

/// A vaulted customer / payment profile.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultReceipt {
    pub customer_id: String,
    pub last_four: Option<String>,
    pub raw: Value,
}

/// A successful charge, settlement, refund, void or subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReceipt {
    pub reference_id: String,
    pub raw: Value,
}

pub type GatewayResult<T> = Result<T, GatewayDecline>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `create_subscription` can extend an existing active
    /// subscription instead of opening a second one.
    fn can_prerenew(&self) -> bool;

    /// Vault the payment method. A resolvable `customer_id` gets its card
    /// replaced; anything else creates a fresh customer.
    async fn create_customer(
        &self,
        billing: &BillingInfo,
        customer_id: Option<String>,
    ) -> GatewayResult<VaultReceipt>;

    /// Exactly one of `customer_id` / `payment_token` is expected.
    async fn charge(
        &self,
        amount: i64,
        customer_id: Option<String>,
        payment_token: Option<String>,
    ) -> GatewayResult<GatewayReceipt>;

    /// Capture `reference_id` when given, otherwise run a new sale from
    /// `billing`.
    async fn submit_for_settlement(
        &self,
        amount: i64,
        billing: Option<BillingInfo>,
        reference_id: Option<String>,
    ) -> GatewayResult<GatewayReceipt>;

    /// Full refund when `amount` is `None`.
    async fn refund(&self, reference_id: &str, amount: Option<i64>) -> GatewayResult<GatewayReceipt>;

    async fn void(&self, reference_id: &str) -> GatewayResult<GatewayReceipt>;

    async fn create_subscription(
        &self,
        customer_id: &str,
        plan_id: &str,
        price: i64,
        start_date: Option<NaiveDate>,
    ) -> GatewayResult<GatewayReceipt>;

    async fn cancel_subscription(&self, subscription_or_customer_id: &str) -> bool;
}
