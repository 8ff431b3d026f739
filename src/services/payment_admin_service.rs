//! Administrative reversals and settlement of finished orders.

use crate::entities::{
    OrderStatus, PaymentMethod, TransactionStatus, order_entity as order,
    order_transaction_entity as otx,
};
use crate::error::{AppError, AppResult};
use crate::external::PaymentProcessor;
use crate::models::*;
use crate::services::line_item_service::LineItemService;
use crate::services::order_service::{lock, set_status};
use crate::services::transaction_service;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;

const SETTLEMENT: &str = "Settlement";

/// The captured charge of a COMPLETE order.
async fn captured_charge<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
) -> AppResult<(otx::Model, String)> {
    if order.status != OrderStatus::Complete {
        return Err(AppError::InvalidOrderState(format!(
            "Order {} is {}, not COMPLETE",
            order.id, order.status
        )));
    }
    let charge = transaction_service::with_status(
        conn,
        order.id,
        PaymentMethod::Credit,
        TransactionStatus::Complete,
    )
    .await?
    .pop()
    .ok_or_else(|| AppError::InvalidOrderState(format!("Order {} has no captured charge", order.id)))?;
    let reference = charge
        .reference_id
        .clone()
        .ok_or_else(|| AppError::InvalidOrderState("Charge has no gateway reference".into()))?;
    Ok((charge, reference))
}

#[derive(Clone)]
pub struct PaymentAdminService {
    pool: DatabaseConnection,
    processor: Arc<dyn PaymentProcessor>,
}

impl PaymentAdminService {
    pub fn new(pool: DatabaseConnection, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { pool, processor }
    }

    /// Full refund when no amount is given. Partial refunds may be repeated
    /// until the charge is used up; only then is the order REFUNDED.
    pub async fn refund(&self, order_id: i64, req: RefundRequest) -> AppResult<PaymentActionResponse> {
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order_id).await?;
        let (charge, reference) = captured_charge(&txn, &order).await?;

        let refunded: i64 = transaction_service::with_status(
            &txn,
            order.id,
            PaymentMethod::Credit,
            TransactionStatus::Refunded,
        )
        .await?
        .iter()
        .map(|t| t.amount)
        .sum();
        let remaining = charge.amount - refunded;
        let amount = req.amount.unwrap_or(remaining);
        if amount <= 0 || amount > remaining {
            return Err(AppError::ValidationError(format!(
                "Refund amount must be between 1 and {remaining}"
            )));
        }

        let partial = amount < charge.amount;
        let receipt = self
            .processor
            .refund(&reference, partial.then_some(amount))
            .await
            .map_err(|decline| {
                log::warn!("order {order_id}: refund failed: {}", decline.message);
                AppError::from(decline)
            })?;

        let row = transaction_service::record_follow_up(
            &txn,
            &charge,
            TransactionStatus::Refunded,
            amount,
            receipt.reference_id,
            "Refund",
            Some(&receipt.raw),
        )
        .await?;
        let order = if amount == remaining {
            set_status(&txn, order, OrderStatus::Refunded).await?
        } else {
            order
        };
        txn.commit().await?;
        log::info!("order {order_id}: refunded {amount}");

        Ok(PaymentActionResponse {
            order: order.into(),
            transaction: row.into(),
        })
    }

    pub async fn void(&self, order_id: i64) -> AppResult<PaymentActionResponse> {
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order_id).await?;
        let (charge, reference) = captured_charge(&txn, &order).await?;

        let receipt = self.processor.void(&reference).await.map_err(|decline| {
            log::warn!("order {order_id}: void failed: {}", decline.message);
            AppError::from(decline)
        })?;

        let row = transaction_service::record_follow_up(
            &txn,
            &charge,
            TransactionStatus::Voided,
            charge.amount,
            receipt.reference_id,
            "Void",
            Some(&receipt.raw),
        )
        .await?;
        let order = set_status(&txn, order, OrderStatus::Voided).await?;
        txn.commit().await?;

        Ok(PaymentActionResponse {
            order: order.into(),
            transaction: row.into(),
        })
    }

    pub async fn cancel_subscription(&self, order_id: i64) -> AppResult<PaymentActionResponse> {
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order_id).await?;
        if LineItemService::default()
            .subscription_line(&txn, order.id)
            .await?
            .is_none()
        {
            return Err(AppError::ValidationError(format!(
                "Order {order_id} has no subscription"
            )));
        }
        let (charge, reference) = captured_charge(&txn, &order).await?;

        if !self.processor.cancel_subscription(&reference).await {
            return Err(AppError::ProcessorError(
                "Subscription could not be canceled".into(),
            ));
        }

        let row = transaction_service::record_follow_up(
            &txn,
            &charge,
            TransactionStatus::Voided,
            0,
            reference,
            "Subscription canceled",
            None,
        )
        .await?;
        let order = set_status(&txn, order, OrderStatus::Canceled).await?;
        txn.commit().await?;

        Ok(PaymentActionResponse {
            order: order.into(),
            transaction: row.into(),
        })
    }

    /// Capture a previously authorised transaction.
    pub async fn settle(
        &self,
        transaction_id: i64,
        req: SettleRequest,
    ) -> AppResult<PaymentActionResponse> {
        let txn = self.pool.begin().await?;
        let source = transaction_service::find(&txn, transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {transaction_id} not found")))?;
        if source.payment_method != PaymentMethod::Credit
            || source.status != TransactionStatus::Complete
        {
            return Err(AppError::InvalidOrderState(
                "Only completed credit transactions can be settled".into(),
            ));
        }
        let order = lock(&txn, source.order_id).await?;
        // 每笔授权只结算一次
        let settled_later = otx::Entity::find()
            .filter(otx::Column::OrderId.eq(source.order_id))
            .filter(otx::Column::PaymentMethod.eq(PaymentMethod::Credit))
            .filter(otx::Column::Id.gt(source.id))
            .filter(otx::Column::Details.eq(SETTLEMENT))
            .count(&txn)
            .await?;
        if source.details.as_deref() == Some(SETTLEMENT) || settled_later > 0 {
            return Err(AppError::InvalidOrderState(format!(
                "Transaction {transaction_id} is already settled"
            )));
        }
        let reference = source
            .reference_id
            .clone()
            .ok_or_else(|| AppError::InvalidOrderState("Transaction has no gateway reference".into()))?;
        let amount = req.amount.unwrap_or(source.amount);
        if amount <= 0 || amount > source.amount {
            return Err(AppError::ValidationError(format!(
                "Settlement amount must be between 1 and {}",
                source.amount
            )));
        }

        let receipt = self
            .processor
            .submit_for_settlement(amount, None, Some(reference))
            .await?;
        let row = transaction_service::record_follow_up(
            &txn,
            &source,
            TransactionStatus::Complete,
            amount,
            receipt.reference_id,
            SETTLEMENT,
            Some(&receipt.raw),
        )
        .await?;
        txn.commit().await?;
        log::info!("transaction {transaction_id}: settled {amount}");

        Ok(PaymentActionResponse {
            order: order.into(),
            transaction: row.into(),
        })
    }
}
