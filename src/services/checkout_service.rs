//! Checkout orchestration: order resolution, item population, discounts,
//! vaulting and the confirmation charge.
//!
//! Every mutation runs in one database transaction that starts by locking
//! the order row. Submission and confirmation keep that transaction open
//! across the gateway call, so two requests on the same order are
//! serialized.

use crate::config::CheckoutConfig;
use crate::entities::{
    OrderStatus, PaymentMethod, TransactionStatus, line_item_entity as li, order_entity as order,
};
use crate::error::{AppError, AppResult};
use crate::events::{CheckoutEvent, EventBus};
use crate::external::PaymentProcessor;
use crate::models::*;
use crate::services::discount_service::{self, apply_code, claim, release};
use crate::services::line_item_service::{LineItemService, NewLineItem};
use crate::services::order_service::{
    OrderService, clear_order, complete_order, lock, order_detail, purge_siblings, recalculate,
    set_status,
};
use crate::services::{referral_service, transaction_service};
use crate::session::Identity;
use crate::utils::money::tax_for;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, IntoActiveModel, Set,
    TransactionTrait,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct CheckoutService {
    pool: DatabaseConnection,
    processor: Arc<dyn PaymentProcessor>,
    orders: OrderService,
    line_items: LineItemService,
    events: EventBus,
    checkout: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        pool: DatabaseConnection,
        processor: Arc<dyn PaymentProcessor>,
        orders: OrderService,
        events: EventBus,
        checkout: CheckoutConfig,
    ) -> Self {
        Self {
            pool,
            processor,
            orders,
            line_items: LineItemService::new(checkout.strict_subscription_items),
            events,
            checkout,
        }
    }

    /// The session's live order, without creating one.
    pub async fn current_order(&self, identity: &Identity) -> AppResult<Option<OrderDetailResponse>> {
        match self.orders.find_active(identity).await? {
            Some(o) => Ok(Some(self.orders.detail(o).await?)),
            None => Ok(None),
        }
    }

    pub async fn add_item(
        &self,
        identity: &Identity,
        req: AddItemRequest,
    ) -> AppResult<OrderDetailResponse> {
        let order = self.orders.resolve(identity).await?;
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order.id).await?;
        let outcome = self.line_items.add(&txn, order.id, NewLineItem::from(req)).await?;
        log::debug!("order {}: add item -> {outcome:?}", order.id);
        let order = recalculate(&txn, order).await?;
        let detail = order_detail(&txn, order).await?;
        txn.commit().await?;
        Ok(detail)
    }

    pub async fn remove_item(
        &self,
        identity: &Identity,
        req: RemoveItemRequest,
    ) -> AppResult<OrderDetailResponse> {
        let order = self
            .orders
            .find_active(identity)
            .await?
            .ok_or(AppError::LineItemNotFound)?;
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order.id).await?;
        self.line_items
            .remove(&txn, order.id, &req.product, req.description.as_deref())
            .await?;
        let order = recalculate(&txn, order).await?;
        let detail = order_detail(&txn, order).await?;
        txn.commit().await?;
        Ok(detail)
    }

    pub async fn update_item_quantity(
        &self,
        identity: &Identity,
        req: UpdateQuantityRequest,
    ) -> AppResult<OrderDetailResponse> {
        let order = self
            .orders
            .find_active(identity)
            .await?
            .ok_or(AppError::LineItemNotFound)?;
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order.id).await?;
        self.line_items
            .update_quantity(
                &txn,
                order.id,
                &req.product,
                req.description.as_deref(),
                req.quantity,
            )
            .await?;
        let order = recalculate(&txn, order).await?;
        let detail = order_detail(&txn, order).await?;
        txn.commit().await?;
        Ok(detail)
    }

    /// Invalid codes are not an error here; `applied` tells the caller.
    pub async fn apply_discount(
        &self,
        identity: &Identity,
        req: ApplyDiscountRequest,
    ) -> AppResult<ApplyDiscountResponse> {
        let order = self.orders.resolve(identity).await?;
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order.id).await?;
        let (order, applied) = apply_code(&txn, order, &req.code).await?;
        let detail = order_detail(&txn, order).await?;
        txn.commit().await?;
        Ok(ApplyDiscountResponse {
            applied,
            order: detail,
        })
    }

    /// Checkout submission: populate, discount, then either finish a free
    /// order right away or vault the payment method and wait for
    /// confirmation in PENDING_PAYMENT.
    pub async fn submit(
        &self,
        identity: &Identity,
        req: CheckoutRequest,
    ) -> AppResult<CheckoutResponse> {
        if identity.user_id.is_none() && !self.checkout.anonymous_checkout {
            return Err(AppError::AuthError("Sign in to check out".into()));
        }
        req.billing.validate()?;

        let order = self.orders.resolve(identity).await?;
        let txn = self.pool.begin().await?;
        let order = lock(&txn, order.id).await?;
        if !order.is_live() {
            return Err(AppError::InvalidOrderState(format!(
                "Order {} is already {}",
                order.id, order.status
            )));
        }

        let order = self.populate(&txn, order, req.items.as_ref()).await?;
        if self.line_items.list(&txn, order.id).await?.is_empty() {
            return Err(AppError::ValidationError("Order has no items".into()));
        }

        let order = match req.referral.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => {
                let referral = referral_service::get_or_create(&txn, source).await?;
                let mut am = order.into_active_model();
                am.referral_id = Set(Some(referral.id));
                am.update(&txn).await?
            }
            _ => order,
        };

        let order = match req.discount_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => apply_code(&txn, order, code).await?.0,
            _ => recalculate(&txn, order).await?,
        };
        purge_siblings(&txn, &order).await?;

        if order.total == 0 {
            return self.finish_free_order(txn, identity, order).await;
        }

        let vaulted = self
            .processor
            .create_customer(&req.billing, order.customer_id.clone())
            .await;
        let receipt = match vaulted {
            Ok(receipt) => receipt,
            Err(decline) => {
                log::warn!("order {}: vaulting failed: {}", order.id, decline.message);
                // 保留已填充的商品和折扣，方便重试
                txn.commit().await?;
                return Err(decline.into());
            }
        };

        let attempt = transaction_service::record_credit_attempt(
            &txn,
            order.id,
            order.total,
            &req.billing,
            &receipt.customer_id,
            receipt.last_four.clone(),
            Some(&receipt.raw),
        )
        .await?;
        let mut am = order.into_active_model();
        am.customer_id = Set(Some(receipt.customer_id.clone()));
        let order = am.update(&txn).await?;
        let order = set_status(&txn, order, OrderStatus::PendingPayment).await?;
        txn.commit().await?;

        self.events.emit(CheckoutEvent::CustomerVaulted {
            order_id: order.id,
            customer_id: receipt.customer_id,
            shipping_address: req.billing.shipping_address,
        });
        Ok(CheckoutResponse {
            order: order.into(),
            requires_payment: true,
            transaction: Some(attempt.into()),
        })
    }

    async fn finish_free_order(
        &self,
        txn: DatabaseTransaction,
        identity: &Identity,
        order: order::Model,
    ) -> AppResult<CheckoutResponse> {
        let order = set_status(&txn, order, OrderStatus::PendingPayment).await?;
        if let Some(discount_id) = order.discount_id {
            if !claim(&txn, discount_id).await? {
                let code = order.discount_code.clone().unwrap_or_default();
                let order = discount_service::remove_discount(&txn, order).await?;
                set_status(&txn, order, OrderStatus::Incomplete).await?;
                txn.commit().await?;
                return Err(AppError::InvalidDiscountCode(code));
            }
        }
        let order = complete_order(&txn, order).await?;
        txn.commit().await?;

        log::info!("order {} completed without payment", order.id);
        self.orders.clear_session(identity);
        self.events.emit(CheckoutEvent::OrderCompleted {
            order_id: order.id,
            user_id: order.user_id,
            total: order.total,
        });
        Ok(CheckoutResponse {
            order: order.into(),
            requires_payment: false,
            transaction: None,
        })
    }

    /// Charge the vaulted customer (or open the subscription) for the
    /// order total. A decline leaves the order in PENDING_PAYMENT with a
    /// FAILED transaction; the next confirm writes a fresh attempt row.
    pub async fn confirm(&self, identity: &Identity) -> AppResult<ConfirmResponse> {
        let order = self
            .orders
            .find_active(identity)
            .await?
            .ok_or_else(|| AppError::InvalidOrderState("No order awaiting payment".into()))?;

        let txn = self.pool.begin().await?;
        let order = lock(&txn, order.id).await?;
        if !order.can_complete() {
            return Err(AppError::InvalidOrderState(format!(
                "Order {} is {}, not awaiting payment",
                order.id, order.status
            )));
        }
        let customer_id = order
            .customer_id
            .clone()
            .ok_or_else(|| AppError::InvalidOrderState("No payment method on file".into()))?;

        let last = transaction_service::latest(&txn, order.id, Some(PaymentMethod::Credit))
            .await?
            .ok_or_else(|| AppError::InvalidOrderState("No payment method on file".into()))?;
        let attempt = if last.status == TransactionStatus::Incomplete {
            if last.amount == order.total {
                last
            } else {
                let mut am = last.into_active_model();
                am.amount = Set(order.total);
                am.updated_at = Set(Utc::now());
                am.update(&txn).await?
            }
        } else {
            transaction_service::retry_from(&txn, &last, order.total).await?
        };

        let claimed = match order.discount_id {
            Some(discount_id) => {
                if !claim(&txn, discount_id).await? {
                    let code = order.discount_code.clone().unwrap_or_default();
                    log::warn!("order {}: discount {code} exhausted before charge", order.id);
                    discount_service::remove_discount(&txn, order).await?;
                    txn.commit().await?;
                    return Err(AppError::InvalidDiscountCode(code));
                }
                Some(discount_id)
            }
            None => None,
        };

        // 已保存卡片后折扣把金额降到 0：不再调用网关
        if order.total == 0 {
            let attempt = transaction_service::resolve(
                &txn,
                attempt,
                TransactionStatus::Complete,
                None,
                Some("No payment required".to_string()),
                None,
            )
            .await?;
            let order = complete_order(&txn, order).await?;
            txn.commit().await?;

            log::info!("order {} completed without payment", order.id);
            self.orders.clear_session(identity);
            self.events.emit(CheckoutEvent::OrderCompleted {
                order_id: order.id,
                user_id: order.user_id,
                total: order.total,
            });
            return Ok(ConfirmResponse {
                order: order.into(),
                transaction: attempt.into(),
            });
        }

        self.events.emit(CheckoutEvent::CheckoutAttempted {
            order_id: order.id,
            transaction_id: attempt.id,
            amount: order.total,
        });

        let subscription = self.line_items.subscription_line(&txn, order.id).await?;
        let result = match &subscription {
            Some(line) => {
                self.processor
                    .create_subscription(&customer_id, &line.subscription_plan, order.total, None)
                    .await
            }
            None => {
                self.processor
                    .charge(order.total, Some(customer_id.clone()), None)
                    .await
            }
        };

        match result {
            Ok(receipt) => {
                let details = match subscription {
                    Some(_) => "Subscription created",
                    None => "Charge captured",
                };
                let order_id = order.id;
                let saved: AppResult<_> = async {
                    let attempt = transaction_service::resolve(
                        &txn,
                        attempt,
                        TransactionStatus::Complete,
                        Some(receipt.reference_id.clone()),
                        Some(details.to_string()),
                        Some(&receipt.raw),
                    )
                    .await?;
                    let order = complete_order(&txn, order).await?;
                    txn.commit().await?;
                    Ok((attempt, order))
                }
                .await;
                let (attempt, order) = match saved {
                    Ok(saved) => saved,
                    Err(e) => {
                        log::error!(
                            "order {order_id}: gateway accepted {} but completion was not saved: {e}",
                            receipt.reference_id
                        );
                        self.reverse_unrecorded(order_id, subscription.is_some(), &receipt.reference_id)
                            .await;
                        return Err(e);
                    }
                };

                log::info!("order {} paid, reference {}", order.id, receipt.reference_id);
                self.orders.clear_session(identity);
                match subscription {
                    Some(_) => self.events.emit(CheckoutEvent::SubscriptionCreated {
                        order_id: order.id,
                        transaction_id: attempt.id,
                        subscription_id: receipt.reference_id,
                    }),
                    None => self.events.emit(CheckoutEvent::ChargeSubmitted {
                        order_id: order.id,
                        transaction_id: attempt.id,
                        success: true,
                    }),
                }
                self.events.emit(CheckoutEvent::OrderCompleted {
                    order_id: order.id,
                    user_id: order.user_id,
                    total: order.total,
                });
                Ok(ConfirmResponse {
                    order: order.into(),
                    transaction: attempt.into(),
                })
            }
            Err(decline) => {
                log::warn!("order {}: payment failed: {}", order.id, decline.message);
                let attempt = transaction_service::resolve(
                    &txn,
                    attempt,
                    TransactionStatus::Failed,
                    None,
                    Some(decline.message.clone()),
                    decline.raw.as_ref(),
                )
                .await?;
                if let Some(discount_id) = claimed {
                    release(&txn, discount_id).await?;
                }
                txn.commit().await?;
                self.events.emit(CheckoutEvent::ChargeSubmitted {
                    order_id: order.id,
                    transaction_id: attempt.id,
                    success: false,
                });
                Err(decline.into())
            }
        }
    }

    /// The gateway took the money but the completion write was rolled back.
    /// Without a COMPLETE row the next confirm would charge again, so the
    /// charge (or subscription) is reversed at the gateway.
    async fn reverse_unrecorded(&self, order_id: i64, subscription: bool, reference_id: &str) {
        let reversed = if subscription {
            self.processor.cancel_subscription(reference_id).await
        } else {
            match self.processor.void(reference_id).await {
                Ok(_) => true,
                Err(decline) => {
                    log::error!("order {order_id}: void of {reference_id} failed: {}", decline.message);
                    false
                }
            }
        };
        if reversed {
            log::warn!("order {order_id}: reversed {reference_id} after failed save");
        } else {
            log::error!("order {order_id}: {reference_id} could not be reversed, reconcile manually");
        }
    }

    /// Fill the order from the submitted item source. Re-submitting the
    /// same source does not duplicate lines.
    async fn populate<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: order::Model,
        items: Option<&CheckoutItems>,
    ) -> AppResult<order::Model> {
        match items {
            None => Ok(order),
            Some(CheckoutItems::Cart { lines }) => {
                for line in lines {
                    self.line_items
                        .add(conn, order.id, NewLineItem::from(line))
                        .await?;
                }
                Ok(order)
            }
            Some(CheckoutItems::Custom {
                description,
                attributes,
                amount,
                taxable,
            }) => {
                if *amount <= 0 {
                    return Err(AppError::ValidationError("Amount must be positive".into()));
                }
                let order = self
                    .keep_only(conn, order, |l| {
                        l.product_type.is_none() && !l.is_subscription() && l.description == *description
                    })
                    .await?;
                let mut item = NewLineItem::new(*amount);
                item.description = description.clone();
                item.attributes = attributes.clone();
                if *taxable {
                    item.unit_tax = tax_for(*amount, self.checkout.tax_rate_bps);
                }
                self.line_items.add(conn, order.id, item).await?;
                Ok(order)
            }
            Some(CheckoutItems::Subscription { plan }) => {
                let plan = self.checkout.subscriptions.get(plan).ok_or_else(|| {
                    AppError::ValidationError(format!("Unknown subscription plan {plan}"))
                })?;
                // 换套餐时清空订单
                let order = self
                    .keep_only(conn, order, |l| l.subscription_plan == plan.plan_id)
                    .await?;
                let mut item = NewLineItem::new(plan.rate);
                item.description = plan.description.clone();
                item.subscription_plan = plan.plan_id.clone();
                self.line_items.add(conn, order.id, item).await?;
                Ok(order)
            }
        }
    }

    /// Clear the order unless every line on it satisfies `keep`.
    async fn keep_only<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: order::Model,
        keep: impl Fn(&li::Model) -> bool,
    ) -> AppResult<order::Model> {
        let lines = self.line_items.list(conn, order.id).await?;
        if lines.iter().all(keep) {
            Ok(order)
        } else {
            clear_order(conn, order).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubscriptionPlan;
    use crate::entities::{discount_entity as discount, order_transaction_entity as otx};
    use crate::external::{GatewayDecline, GatewayReceipt, MockPaymentProcessor, VaultReceipt};
    use crate::models::billing::tests::billing;
    use crate::services::test_support::*;
    use crate::session::MemorySessionStore;
    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
    use serde_json::json;

    fn config() -> CheckoutConfig {
        let mut c = CheckoutConfig::default();
        c.tax_rate_bps = 800;
        c.subscriptions.insert(
            "monthly".into(),
            SubscriptionPlan {
                plan_id: "plan_monthly".into(),
                description: "Monthly box".into(),
                rate: 2900,
            },
        );
        c.subscriptions.insert(
            "yearly".into(),
            SubscriptionPlan {
                plan_id: "plan_yearly".into(),
                description: "Yearly box".into(),
                rate: 29000,
            },
        );
        c
    }

    fn service(db: &DatabaseConnection, processor: MockPaymentProcessor) -> CheckoutService {
        service_with(db, processor, config())
    }

    fn service_with(
        db: &DatabaseConnection,
        processor: MockPaymentProcessor,
        checkout: CheckoutConfig,
    ) -> CheckoutService {
        let orders = OrderService::new(
            db.clone(),
            Arc::new(MemorySessionStore::new()),
            checkout.shipping,
        );
        CheckoutService::new(
            db.clone(),
            Arc::new(processor),
            orders,
            EventBus::default(),
            checkout,
        )
    }

    fn cart(lines: &[(&str, i64, i64)]) -> CheckoutItems {
        CheckoutItems::Cart {
            lines: lines
                .iter()
                .map(|(kind, id, price)| CartLine {
                    product: ProductRef::new(*kind, *id),
                    unit_price: *price,
                    quantity: 1,
                    description: String::new(),
                    attributes: String::new(),
                })
                .collect(),
        }
    }

    fn request(items: CheckoutItems) -> CheckoutRequest {
        CheckoutRequest {
            items: Some(items),
            discount_code: None,
            referral: None,
            billing: billing(),
        }
    }

    fn vaulting(processor: &mut MockPaymentProcessor) {
        processor.expect_create_customer().returning(|_, _| {
            Ok(VaultReceipt {
                customer_id: "cus_1".into(),
                last_four: Some("4242".into()),
                raw: json!({"id": "cus_1"}),
            })
        });
    }

    fn user(id: i64) -> Identity {
        Identity::new(format!("session-{id}"), Some(id))
    }

    async fn credit_rows(db: &DatabaseConnection, order_id: i64) -> Vec<otx::Model> {
        otx::Entity::find()
            .filter(otx::Column::OrderId.eq(order_id))
            .filter(otx::Column::PaymentMethod.eq(PaymentMethod::Credit))
            .order_by_asc(otx::Column::Id)
            .all(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn anonymous_checkout_is_off_by_default() {
        let db = setup().await;
        let svc = service(&db, MockPaymentProcessor::new());
        let err = svc
            .submit(&Identity::new("anon", None), request(cart(&[("book", 1, 1000)])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[tokio::test]
    async fn submit_vaults_and_waits_for_payment() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        processor
            .expect_create_customer()
            .withf(|b, existing| b.first_name == "Ada" && existing.is_none())
            .times(1)
            .returning(|_, _| {
                Ok(VaultReceipt {
                    customer_id: "cus_1".into(),
                    last_four: Some("4242".into()),
                    raw: json!({"id": "cus_1"}),
                })
            });
        let svc = service(&db, processor);

        let res = svc
            .submit(&user(1), request(cart(&[("book", 1, 1000), ("pen", 2, 500)])))
            .await
            .unwrap();
        assert!(res.requires_payment);
        assert_eq!(res.order.status, OrderStatus::PendingPayment);
        assert_eq!(res.order.subtotal, 1500);
        assert_eq!(res.order.total, 1500);

        let tx = res.transaction.unwrap();
        assert_eq!(tx.status, TransactionStatus::Incomplete);
        assert_eq!(tx.amount, 1500);
        assert_eq!(tx.last_four.as_deref(), Some("4242"));

        let saved = order::Entity::find_by_id(res.order.id).one(&db).await.unwrap().unwrap();
        assert_eq!(saved.customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn resubmitting_updates_the_pending_attempt() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        let svc = service(&db, processor);
        let items = cart(&[("book", 1, 1000)]);

        let first = svc.submit(&user(1), request(items.clone())).await.unwrap();
        let second = svc.submit(&user(1), request(items)).await.unwrap();
        assert_eq!(first.order.id, second.order.id);
        assert_eq!(credit_rows(&db, first.order.id).await.len(), 1);
        assert_eq!(second.order.subtotal, 1000);
    }

    #[tokio::test]
    async fn vault_failure_surfaces_gateway_message() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        processor
            .expect_create_customer()
            .returning(|_, _| Err(GatewayDecline::declined("Invalid card number", None)));
        let svc = service(&db, processor);

        let err = svc
            .submit(&user(1), request(cart(&[("book", 1, 1000)])))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PaymentDeclined(m) if m == "Invalid card number"));

        let current = svc.current_order(&user(1)).await.unwrap().unwrap();
        assert_eq!(current.order.status, OrderStatus::Incomplete);
        assert_eq!(current.items.len(), 1);
        assert!(current.latest_transaction.is_none());
    }

    #[tokio::test]
    async fn declined_charge_keeps_order_pending() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        processor
            .expect_charge()
            .withf(|amount, customer, token| {
                *amount == 1500 && customer.as_deref() == Some("cus_1") && token.is_none()
            })
            .times(1)
            .returning(|_, _, _| Err(GatewayDecline::declined("card_declined", None)));
        let svc = service(&db, processor);

        let submitted = svc
            .submit(&user(1), request(cart(&[("book", 1, 1000), ("pen", 2, 500)])))
            .await
            .unwrap();
        let err = svc.confirm(&user(1)).await.unwrap_err();
        assert!(matches!(err, AppError::PaymentDeclined(m) if m == "card_declined"));

        let saved = order::Entity::find_by_id(submitted.order.id).one(&db).await.unwrap().unwrap();
        assert_eq!(saved.status, OrderStatus::PendingPayment);
        let rows = credit_rows(&db, saved.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Failed);
        assert_eq!(rows[0].details.as_deref(), Some("card_declined"));
    }

    #[tokio::test]
    async fn retry_after_decline_writes_new_attempt() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        let mut seq = mockall::Sequence::new();
        processor
            .expect_charge()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(GatewayDecline::unavailable("timeout")));
        processor
            .expect_charge()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| {
                Ok(GatewayReceipt {
                    reference_id: "ch_1".into(),
                    raw: json!({"id": "ch_1"}),
                })
            });
        let svc = service(&db, processor);

        let submitted = svc
            .submit(&user(1), request(cart(&[("book", 1, 1000)])))
            .await
            .unwrap();
        let err = svc.confirm(&user(1)).await.unwrap_err();
        assert!(matches!(err, AppError::ProcessorError(m) if m == "timeout"));

        let done = svc.confirm(&user(1)).await.unwrap();
        assert_eq!(done.order.status, OrderStatus::Complete);
        assert_eq!(done.transaction.status, TransactionStatus::Complete);
        assert_eq!(done.transaction.reference_id.as_deref(), Some("ch_1"));

        let rows = credit_rows(&db, submitted.order.id).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, TransactionStatus::Failed);
        assert_eq!(rows[1].status, TransactionStatus::Complete);

        // 完成后会话不再指向该订单
        assert!(svc.current_order(&user(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn free_order_completes_without_processor() {
        let db = setup().await;
        let d = insert_discount(&db, "ALLFREE", |d| {
            d.percentage = Set(Some(100));
            d.uses_limit = Set(Some(5));
        })
        .await;
        // 没有设置任何期望：任何网关调用都会失败
        let svc = service(&db, MockPaymentProcessor::new());

        let mut req = request(cart(&[("book", 1, 1000)]));
        req.discount_code = Some("allfree".into());
        let res = svc.submit(&user(1), req).await.unwrap();
        assert!(!res.requires_payment);
        assert_eq!(res.order.total, 0);
        assert_eq!(res.order.status, OrderStatus::Complete);

        let d = discount::Entity::find_by_id(d.id).one(&db).await.unwrap().unwrap();
        assert_eq!(d.times_used, 1);
    }

    #[tokio::test]
    async fn exhausted_code_is_dropped_at_confirmation() {
        let db = setup().await;
        let d = insert_discount(&db, "LAST", |d| {
            d.amount = Set(Some(200));
            d.uses_limit = Set(Some(1));
        })
        .await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        let svc = service(&db, processor);

        let mut req = request(cart(&[("book", 1, 1000)]));
        req.discount_code = Some("LAST".into());
        let res = svc.submit(&user(1), req).await.unwrap();
        assert_eq!(res.order.total, 800);

        // 其他订单抢先用掉了最后一次
        assert!(claim(&db, d.id).await.unwrap());

        let err = svc.confirm(&user(1)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidDiscountCode(c) if c == "LAST"));
        let saved = order::Entity::find_by_id(res.order.id).one(&db).await.unwrap().unwrap();
        assert_eq!(saved.discount_id, None);
        assert_eq!(saved.total, 1000);
        assert_eq!(saved.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn failed_charge_gives_back_the_discount_use() {
        let db = setup().await;
        let d = insert_discount(&db, "SAVE5", |d| {
            d.amount = Set(Some(500));
            d.uses_limit = Set(Some(10));
        })
        .await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        processor
            .expect_charge()
            .withf(|amount, _, _| *amount == 1500)
            .returning(|_, _, _| Err(GatewayDecline::declined("card_declined", None)));
        let svc = service(&db, processor);

        let mut req = request(cart(&[("book", 1, 2000)]));
        req.discount_code = Some("SAVE5".into());
        svc.submit(&user(1), req).await.unwrap();
        assert!(svc.confirm(&user(1)).await.is_err());

        let d = discount::Entity::find_by_id(d.id).one(&db).await.unwrap().unwrap();
        assert_eq!(d.times_used, 0);
    }

    #[tokio::test]
    async fn remove_unknown_product_leaves_totals() {
        let db = setup().await;
        let svc = service(&db, MockPaymentProcessor::new());
        let before = svc
            .add_item(
                &user(1),
                AddItemRequest {
                    product: Some(ProductRef::new("book", 1)),
                    unit_price: 1000,
                    unit_tax: 0,
                    quantity: 2,
                    description: String::new(),
                    attributes: String::new(),
                    subscription_plan: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(before.order.total, 2000);

        let err = svc
            .remove_item(
                &user(1),
                RemoveItemRequest {
                    product: ProductRef::new("hat", 7),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LineItemNotFound));

        let after = svc.current_order(&user(1)).await.unwrap().unwrap();
        assert_eq!(after.order.total, 2000);
        assert_eq!(after.items.len(), 1);
    }

    #[tokio::test]
    async fn quantity_change_and_discount_recompute_totals() {
        let db = setup().await;
        insert_discount(&db, "TENOFF", |d| d.percentage = Set(Some(10))).await;
        let svc = service(&db, MockPaymentProcessor::new());
        let book = ProductRef::new("book", 1);
        svc.add_item(
            &user(1),
            AddItemRequest {
                product: Some(book.clone()),
                unit_price: 1000,
                unit_tax: 0,
                quantity: 1,
                description: String::new(),
                attributes: String::new(),
                subscription_plan: String::new(),
            },
        )
        .await
        .unwrap();

        let updated = svc
            .update_item_quantity(
                &user(1),
                UpdateQuantityRequest {
                    product: book,
                    description: None,
                    quantity: 3,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.order.total, 3000);

        let res = svc
            .apply_discount(&user(1), ApplyDiscountRequest { code: "tenoff".into() })
            .await
            .unwrap();
        assert!(res.applied);
        assert_eq!(res.order.order.total, 2700);

        let miss = svc
            .apply_discount(&user(1), ApplyDiscountRequest { code: "BOGUS".into() })
            .await
            .unwrap();
        assert!(!miss.applied);
        assert_eq!(miss.order.order.total, 2700);
    }

    #[tokio::test]
    async fn subscription_checkout_opens_subscription() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        processor
            .expect_create_subscription()
            .withf(|customer, plan, price, start| {
                customer == "cus_1" && plan == "plan_yearly" && *price == 29000 && start.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(GatewayReceipt {
                    reference_id: "sub_1".into(),
                    raw: json!({"id": "sub_1"}),
                })
            });
        let svc = service(&db, processor);

        let monthly = svc
            .submit(
                &user(1),
                request(CheckoutItems::Subscription {
                    plan: "monthly".into(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(monthly.order.total, 2900);

        // 换成年付套餐：订单被清空后只剩一个商品
        let yearly = svc
            .submit(
                &user(1),
                request(CheckoutItems::Subscription {
                    plan: "yearly".into(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(yearly.order.id, monthly.order.id);
        assert_eq!(yearly.order.total, 29000);

        let done = svc.confirm(&user(1)).await.unwrap();
        assert_eq!(done.order.status, OrderStatus::Complete);
        assert_eq!(done.transaction.reference_id.as_deref(), Some("sub_1"));
        assert_eq!(done.transaction.details.as_deref(), Some("Subscription created"));
        let items = li::Entity::find()
            .filter(li::Column::OrderId.eq(done.order.id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(items, 1);
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let db = setup().await;
        let svc = service(&db, MockPaymentProcessor::new());
        let err = svc
            .submit(
                &user(1),
                request(CheckoutItems::Subscription {
                    plan: "weekly".into(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn taxable_custom_item() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        let svc = service(&db, processor);

        let res = svc
            .submit(
                &user(1),
                request(CheckoutItems::Custom {
                    description: "Consulting".into(),
                    attributes: String::new(),
                    amount: 10_000,
                    taxable: true,
                }),
            )
            .await
            .unwrap();
        assert_eq!(res.order.subtotal, 10_000);
        assert_eq!(res.order.tax, 800);
        assert_eq!(res.order.total, 10_800);
    }

    #[tokio::test]
    async fn anonymous_checkout_when_enabled() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        let mut checkout = config();
        checkout.anonymous_checkout = true;
        let svc = service_with(&db, processor, checkout);

        let res = svc
            .submit(&Identity::new("anon", None), request(cart(&[("book", 1, 1000)])))
            .await
            .unwrap();
        assert!(res.requires_payment);
        let saved = order::Entity::find_by_id(res.order.id).one(&db).await.unwrap().unwrap();
        assert_eq!(saved.user_id, None);
    }

    #[tokio::test]
    async fn referral_is_attached() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        let svc = service(&db, processor);

        let mut req = request(cart(&[("book", 1, 1000)]));
        req.referral = Some("newsletter".into());
        let res = svc.submit(&user(1), req).await.unwrap();
        let saved = order::Entity::find_by_id(res.order.id).one(&db).await.unwrap().unwrap();
        assert!(saved.referral_id.is_some());
    }

    #[tokio::test]
    async fn confirm_without_pending_order_fails() {
        let db = setup().await;
        let svc = service(&db, MockPaymentProcessor::new());
        assert!(matches!(
            svc.confirm(&user(1)).await,
            Err(AppError::InvalidOrderState(_))
        ));

        svc.add_item(
            &user(1),
            AddItemRequest {
                product: None,
                unit_price: 500,
                unit_tax: 0,
                quantity: 1,
                description: "Gift wrap".into(),
                attributes: String::new(),
                subscription_plan: String::new(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            svc.confirm(&user(1)).await,
            Err(AppError::InvalidOrderState(_))
        ));
    }

    #[tokio::test]
    async fn order_discounted_to_zero_after_vaulting_confirms_without_charge() {
        let db = setup().await;
        let d = insert_discount(&db, "ALLFREE", |d| d.percentage = Set(Some(100))).await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        // 没有 charge 期望：调用网关即失败
        let svc = service(&db, processor);

        let submitted = svc
            .submit(&user(1), request(cart(&[("book", 1, 1000)])))
            .await
            .unwrap();
        assert_eq!(submitted.order.status, OrderStatus::PendingPayment);

        let res = svc
            .apply_discount(&user(1), ApplyDiscountRequest { code: "ALLFREE".into() })
            .await
            .unwrap();
        assert_eq!(res.order.order.total, 0);

        let done = svc.confirm(&user(1)).await.unwrap();
        assert_eq!(done.order.status, OrderStatus::Complete);
        assert_eq!(done.transaction.status, TransactionStatus::Complete);
        assert_eq!(done.transaction.amount, 0);
        assert_eq!(done.transaction.reference_id, None);

        let d = discount::Entity::find_by_id(d.id).one(&db).await.unwrap().unwrap();
        assert_eq!(d.times_used, 1);
    }

    const REFUSE_COMPLETION: &str = "CREATE TRIGGER refuse_completion BEFORE UPDATE ON orders \
        WHEN NEW.status = 'COMPLETE' BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;";

    #[tokio::test]
    async fn charge_is_voided_when_completion_cannot_be_saved() {
        let db = setup().await;
        let d = insert_discount(&db, "SAVE2", |d| {
            d.amount = Set(Some(200));
            d.uses_limit = Set(Some(3));
        })
        .await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        processor.expect_charge().times(1).returning(|_, _, _| {
            Ok(GatewayReceipt {
                reference_id: "ch_9".into(),
                raw: json!({"id": "ch_9"}),
            })
        });
        processor
            .expect_void()
            .withf(|reference| reference == "ch_9")
            .times(1)
            .returning(|_| {
                Ok(GatewayReceipt {
                    reference_id: "ch_9".into(),
                    raw: json!({"status": "canceled"}),
                })
            });
        let svc = service(&db, processor);

        let mut req = request(cart(&[("book", 1, 1000)]));
        req.discount_code = Some("SAVE2".into());
        let submitted = svc.submit(&user(1), req).await.unwrap();
        db.execute_unprepared(REFUSE_COMPLETION).await.unwrap();

        let err = svc.confirm(&user(1)).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));

        let saved = order::Entity::find_by_id(submitted.order.id).one(&db).await.unwrap().unwrap();
        assert_eq!(saved.status, OrderStatus::PendingPayment);
        let rows = credit_rows(&db, saved.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TransactionStatus::Incomplete);
        // 回滚后折扣次数也一并退回
        let d = discount::Entity::find_by_id(d.id).one(&db).await.unwrap().unwrap();
        assert_eq!(d.times_used, 0);
    }

    #[tokio::test]
    async fn subscription_is_canceled_when_completion_cannot_be_saved() {
        let db = setup().await;
        let mut processor = MockPaymentProcessor::new();
        vaulting(&mut processor);
        processor.expect_create_subscription().times(1).returning(|_, _, _, _| {
            Ok(GatewayReceipt {
                reference_id: "sub_9".into(),
                raw: json!({"id": "sub_9"}),
            })
        });
        processor
            .expect_cancel_subscription()
            .withf(|id| id == "sub_9")
            .times(1)
            .returning(|_| true);
        let svc = service(&db, processor);

        svc.submit(
            &user(1),
            request(CheckoutItems::Subscription {
                plan: "monthly".into(),
            }),
        )
        .await
        .unwrap();
        db.execute_unprepared(REFUSE_COMPLETION).await.unwrap();

        assert!(svc.confirm(&user(1)).await.is_err());
        let current = svc.current_order(&user(1)).await.unwrap().unwrap();
        assert_eq!(current.order.status, OrderStatus::PendingPayment);
    }
}
