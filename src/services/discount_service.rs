use crate::entities::{OrderStatus, discount_entity as discount, order_entity as order};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::order_service::recalculate;
use crate::utils::generate_discount_code;
use crate::utils::money::percentage_of;
use chrono::{DateTime, Utc};
use regex::Regex;
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, Set,
};

const CODE_PATTERN: &str = r"^[A-Z0-9_-]{1,20}$";
const GENERATED_CODE_LEN: usize = 10;

/// 优惠码统一大写，不区分大小写
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_well_formed_code(code: &str) -> bool {
    Regex::new(CODE_PATTERN)
        .map(|re| re.is_match(code))
        .unwrap_or(false)
}

pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> AppResult<Option<discount::Model>> {
    Ok(discount::Entity::find()
        .filter(discount::Column::Code.eq(normalize_code(code)))
        .one(conn)
        .await?)
}

/// Full validity check, including the per-user rules when a user is given.
pub async fn is_valid_for<C: ConnectionTrait>(
    conn: &C,
    d: &discount::Model,
    user_id: Option<i64>,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    if !d.is_valid_at(now) {
        return Ok(false);
    }
    let Some(user_id) = user_id else {
        return Ok(true);
    };
    if d.user_id.is_some_and(|owner| owner != user_id) {
        return Ok(false);
    }
    let used = order::Entity::find()
        .filter(order::Column::UserId.eq(user_id))
        .filter(order::Column::DiscountId.eq(d.id))
        .filter(order::Column::Status.is_not_in(OrderStatus::LIVE))
        .count(conn)
        .await?;
    Ok(used < d.individual_use_limit.max(0) as u64)
}

/// Monetary effect of `d` on an order. The percentage base is the sum of
/// line totals. A waiver-only discount reports the tax when it waives only
/// tax, otherwise the shipping.
pub fn discount_amount_for(d: &discount::Model, items_total: i64, tax: i64, shipping: i64) -> i64 {
    if let Some(amount) = d.amount.filter(|a| *a > 0) {
        amount
    } else if let Some(pct) = d.percentage.filter(|p| *p > 0) {
        percentage_of(items_total, pct)
    } else if d.waives_tax && !d.waives_shipping {
        tax
    } else if d.waives_shipping {
        shipping
    } else {
        0
    }
}

/// Attach `code` to the order when it is valid for the order's owner.
/// Unknown or invalid codes leave the discount untouched; either way the
/// totals are recomputed. Returns whether the code was applied.
pub async fn apply_code<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    code: &str,
) -> AppResult<(order::Model, bool)> {
    let found = find_by_code(conn, code).await?;
    let valid = match &found {
        Some(d) => is_valid_for(conn, d, order.user_id, Utc::now()).await?,
        None => false,
    };
    let Some(d) = found.filter(|_| valid) else {
        log::info!("order {}: discount code {code:?} not applied", order.id);
        return Ok((recalculate(conn, order).await?, false));
    };

    let mut am = order.into_active_model();
    am.discount_id = Set(Some(d.id));
    am.discount_code = Set(Some(d.code.clone()));
    let order = am.update(conn).await?;
    log::info!("order {}: discount {} applied", order.id, d.code);
    Ok((recalculate(conn, order).await?, true))
}

/// Administrative override: a fixed amount with no discount record behind it.
pub async fn apply_flat_amount<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    amount: i64,
) -> AppResult<order::Model> {
    if amount < 0 {
        return Err(AppError::ValidationError("Discount amount cannot be negative".into()));
    }
    let order_id = order.id;
    let mut am = order.into_active_model();
    am.discount_id = Set(None);
    am.discount_code = Set(None);
    am.discount_amount = Set(amount);
    let order = am.update(conn).await?;
    crate::services::transaction_service::delete_discount_audit(conn, order_id).await?;
    recalculate(conn, order).await
}

pub async fn remove_discount<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> AppResult<order::Model> {
    let order_id = order.id;
    let mut am = order.into_active_model();
    am.discount_id = Set(None);
    am.discount_code = Set(None);
    am.discount_amount = Set(0);
    let order = am.update(conn).await?;
    crate::services::transaction_service::delete_discount_audit(conn, order_id).await?;
    recalculate(conn, order).await
}

/// Take one use of the discount if any is left. Single conditional UPDATE,
/// so concurrent checkouts cannot both pass the limit.
pub async fn claim<C: ConnectionTrait>(conn: &C, discount_id: i64) -> AppResult<bool> {
    let result = discount::Entity::update_many()
        .col_expr(
            discount::Column::TimesUsed,
            Expr::col(discount::Column::TimesUsed).add(1),
        )
        .col_expr(discount::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(discount::Column::Id.eq(discount_id))
        .filter(discount::Column::Active.eq(true))
        .filter(
            Condition::any()
                .add(discount::Column::UsesLimit.is_null())
                .add(discount::Column::UsesLimit.lte(0))
                .add(Expr::col(discount::Column::TimesUsed).lt(Expr::col(discount::Column::UsesLimit))),
        )
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Give back a use taken by `claim` after the charge failed.
pub async fn release<C: ConnectionTrait>(conn: &C, discount_id: i64) -> AppResult<()> {
    discount::Entity::update_many()
        .col_expr(
            discount::Column::TimesUsed,
            Expr::col(discount::Column::TimesUsed).sub(1),
        )
        .filter(discount::Column::Id.eq(discount_id))
        .filter(discount::Column::TimesUsed.gt(0))
        .exec(conn)
        .await?;
    Ok(())
}

/// After an order completes: user-scoped codes and codes that just became
/// invalid are switched off.
pub async fn finalize_usage<C: ConnectionTrait>(conn: &C, discount_id: i64) -> AppResult<()> {
    let Some(d) = discount::Entity::find_by_id(discount_id).one(conn).await? else {
        return Ok(());
    };
    if d.active && (d.user_id.is_some() || !d.is_valid_at(Utc::now())) {
        let code = d.code.clone();
        let mut am = d.into_active_model();
        am.active = Set(false);
        am.updated_at = Set(Utc::now());
        am.update(conn).await?;
        log::info!("discount {code} deactivated");
    }
    Ok(())
}

#[derive(Clone)]
pub struct DiscountService {
    pool: DatabaseConnection,
}

impl DiscountService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// Display lookup. Never fails: problems come back as a zero discount.
    pub async fn lookup(&self, code: &str, user_id: Option<i64>) -> DiscountLookupResponse {
        let code = normalize_code(code);
        let found = match find_by_code(&self.pool, &code).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("discount lookup for {code} failed: {e}");
                None
            }
        };
        let Some(d) = found else {
            return DiscountLookupResponse::none(&code);
        };
        match is_valid_for(&self.pool, &d, user_id, Utc::now()).await {
            Ok(true) => DiscountLookupResponse {
                code: d.code,
                valid: true,
                amount: d.amount.unwrap_or(0).max(0),
                percentage: d.percentage.unwrap_or(0).clamp(0, 100),
                waives_tax: d.waives_tax,
                waives_shipping: d.waives_shipping,
            },
            Ok(false) => DiscountLookupResponse::none(&code),
            Err(e) => {
                log::warn!("discount validation for {code} failed: {e}");
                DiscountLookupResponse::none(&code)
            }
        }
    }

    pub async fn create_discount(&self, req: CreateDiscountRequest) -> AppResult<DiscountResponse> {
        if req.amount.is_some_and(|a| a < 0) {
            return Err(AppError::ValidationError("Amount cannot be negative".into()));
        }
        if req.percentage.is_some_and(|p| !(0..=100).contains(&p)) {
            return Err(AppError::ValidationError("Percentage must be between 0 and 100".into()));
        }
        let has_effect = req.amount.unwrap_or(0) > 0
            || req.percentage.unwrap_or(0) > 0
            || req.waives_tax
            || req.waives_shipping;
        if !has_effect {
            return Err(AppError::ValidationError(
                "Discount needs an amount, a percentage or a waiver".into(),
            ));
        }
        if req.uses_limit.is_some_and(|l| l < 0) || req.individual_use_limit < 1 {
            return Err(AppError::ValidationError("Invalid usage limits".into()));
        }
        if let (Some(start), Some(end)) = (req.active_date, req.expire_date) {
            if end < start {
                return Err(AppError::ValidationError(
                    "Expire date is before active date".into(),
                ));
            }
        }

        let code = match req.code.as_deref().map(normalize_code) {
            Some(code) => {
                if !is_well_formed_code(&code) {
                    return Err(AppError::ValidationError(
                        "Code must be 1-20 characters of A-Z, 0-9, '_' or '-'".into(),
                    ));
                }
                if find_by_code(&self.pool, &code).await?.is_some() {
                    return Err(AppError::ValidationError("Discount code already exists".into()));
                }
                code
            }
            None => self.unused_code().await?,
        };

        let now = Utc::now();
        let model = discount::ActiveModel {
            code: Set(code),
            description: Set(req.description),
            active: Set(req.active),
            amount: Set(req.amount),
            percentage: Set(req.percentage),
            uses_limit: Set(req.uses_limit),
            individual_use_limit: Set(req.individual_use_limit),
            times_used: Set(0),
            user_id: Set(req.user_id),
            active_date: Set(req.active_date),
            expire_date: Set(req.expire_date),
            waives_tax: Set(req.waives_tax),
            waives_shipping: Set(req.waives_shipping),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;
        log::info!("discount {} created", model.code);
        Ok(DiscountResponse::from(model))
    }

    async fn unused_code(&self) -> AppResult<String> {
        for _ in 0..5 {
            let code = generate_discount_code(GENERATED_CODE_LEN);
            if find_by_code(&self.pool, &code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(AppError::InternalError("could not generate a unique discount code".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::line_item_service::{LineItemService, NewLineItem};
    use crate::services::test_support::*;
    use chrono::Duration;

    fn request() -> CreateDiscountRequest {
        CreateDiscountRequest {
            code: None,
            description: None,
            active: true,
            amount: Some(500),
            percentage: None,
            uses_limit: None,
            individual_use_limit: 1,
            user_id: None,
            active_date: None,
            expire_date: None,
            waives_tax: false,
            waives_shipping: false,
        }
    }

    #[test]
    fn code_format() {
        assert!(is_well_formed_code("SAVE5"));
        assert!(is_well_formed_code("SPRING_2025-A"));
        assert!(!is_well_formed_code("save5"));
        assert!(!is_well_formed_code("TOO-LONG-FOR-A-DISCOUNT"));
        assert!(!is_well_formed_code(""));
        assert_eq!(normalize_code("  save5 "), "SAVE5");
    }

    #[tokio::test]
    async fn fixed_amount_code_scenario() {
        let db = setup().await;
        insert_discount(&db, "SAVE5", |d| {
            d.amount = Set(Some(500));
            d.uses_limit = Set(Some(10));
            d.expire_date = Set(Some(Utc::now() + Duration::days(1)));
        })
        .await;
        let order = insert_order(&db, None).await;
        LineItemService::default()
            .add(&db, order.id, NewLineItem::new(2000))
            .await
            .unwrap();

        let (order, applied) = apply_code(&db, order, "save5").await.unwrap();
        assert!(applied);
        assert_eq!(order.subtotal, 2000);
        assert_eq!(order.discount_amount, 500);
        assert_eq!(order.total, 1500);
        assert_eq!(order.discount_code.as_deref(), Some("SAVE5"));

        let audit = crate::services::transaction_service::latest(
            &db,
            order.id,
            Some(crate::entities::PaymentMethod::Discount),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(audit.amount, 500);

        // 重复应用只更新审计记录
        let (order, _) = apply_code(&db, order, "SAVE5").await.unwrap();
        assert_eq!(order.total, 1500);
        let audits = crate::entities::order_transaction_entity::Entity::find()
            .count(&db)
            .await
            .unwrap();
        assert_eq!(audits, 1);
    }

    #[tokio::test]
    async fn unknown_or_expired_code_is_a_silent_no_op() {
        let db = setup().await;
        insert_discount(&db, "OLD", |d| {
            d.amount = Set(Some(500));
            d.expire_date = Set(Some(Utc::now() - Duration::days(1)));
        })
        .await;
        let order = insert_order(&db, None).await;
        LineItemService::default()
            .add(&db, order.id, NewLineItem::new(2000))
            .await
            .unwrap();

        let (order, applied) = apply_code(&db, order, "NOPE").await.unwrap();
        assert!(!applied);
        assert_eq!(order.total, 2000);
        let (order, applied) = apply_code(&db, order, "old").await.unwrap();
        assert!(!applied);
        assert_eq!(order.discount_id, None);
        assert_eq!(order.total, 2000);
    }

    #[tokio::test]
    async fn percentage_uses_line_totals() {
        let db = setup().await;
        insert_discount(&db, "HALF", |d| d.percentage = Set(Some(50))).await;
        let order = insert_order(&db, None).await;
        let mut item = NewLineItem::new(999);
        item.unit_tax = 0;
        LineItemService::default().add(&db, order.id, item).await.unwrap();

        let (order, applied) = apply_code(&db, order, "HALF").await.unwrap();
        assert!(applied);
        assert_eq!(order.discount_amount, 500);
        assert_eq!(order.total, 499);
    }

    #[tokio::test]
    async fn user_scoped_code_rejects_other_users() {
        let db = setup().await;
        let d = insert_discount(&db, "MINE", |d| {
            d.amount = Set(Some(100));
            d.user_id = Set(Some(1));
        })
        .await;
        assert!(is_valid_for(&db, &d, Some(1), Utc::now()).await.unwrap());
        assert!(!is_valid_for(&db, &d, Some(2), Utc::now()).await.unwrap());
        assert!(is_valid_for(&db, &d, None, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn individual_limit_counts_finished_orders() {
        let db = setup().await;
        let d = insert_discount(&db, "ONCE", |d| d.amount = Set(Some(100))).await;
        let done = insert_order_with_status(&db, Some(7), OrderStatus::Complete).await;
        assert!(is_valid_for(&db, &d, Some(7), Utc::now()).await.unwrap());

        let mut am = done.into_active_model();
        am.discount_id = Set(Some(d.id));
        am.update(&db).await.unwrap();
        assert!(!is_valid_for(&db, &d, Some(7), Utc::now()).await.unwrap());
        assert!(is_valid_for(&db, &d, Some(8), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn claim_respects_uses_limit() {
        let db = setup().await;
        let d = insert_discount(&db, "TWICE", |d| {
            d.amount = Set(Some(100));
            d.uses_limit = Set(Some(2));
        })
        .await;

        assert!(claim(&db, d.id).await.unwrap());
        assert!(claim(&db, d.id).await.unwrap());
        assert!(!claim(&db, d.id).await.unwrap());

        release(&db, d.id).await.unwrap();
        assert!(claim(&db, d.id).await.unwrap());

        let d = discount::Entity::find_by_id(d.id).one(&db).await.unwrap().unwrap();
        assert_eq!(d.times_used, 2);
        assert!(!d.is_valid_at(Utc::now()));
    }

    #[tokio::test]
    async fn unlimited_codes_always_claim() {
        let db = setup().await;
        let d = insert_discount(&db, "FREE4ALL", |d| d.amount = Set(Some(100))).await;
        for _ in 0..5 {
            assert!(claim(&db, d.id).await.unwrap());
        }
    }

    #[tokio::test]
    async fn finalize_deactivates_user_scoped_and_exhausted() {
        let db = setup().await;
        let scoped = insert_discount(&db, "GIFT", |d| {
            d.amount = Set(Some(100));
            d.user_id = Set(Some(3));
        })
        .await;
        let open = insert_discount(&db, "OPEN", |d| d.amount = Set(Some(100))).await;

        finalize_usage(&db, scoped.id).await.unwrap();
        finalize_usage(&db, open.id).await.unwrap();

        let scoped = discount::Entity::find_by_id(scoped.id).one(&db).await.unwrap().unwrap();
        let open = discount::Entity::find_by_id(open.id).one(&db).await.unwrap().unwrap();
        assert!(!scoped.active);
        assert!(open.active);
    }

    #[tokio::test]
    async fn lookup_never_errors() {
        let db = setup().await;
        insert_discount(&db, "SAVE5", |d| d.amount = Set(Some(500))).await;
        let service = DiscountService::new(db);

        let hit = service.lookup("save5", None).await;
        assert!(hit.valid);
        assert_eq!(hit.amount, 500);

        let miss = service.lookup("missing", None).await;
        assert!(!miss.valid);
        assert_eq!(miss.amount, 0);
    }

    #[tokio::test]
    async fn create_discount_generates_and_validates_codes() {
        let db = setup().await;
        let service = DiscountService::new(db);

        let generated = service.create_discount(request()).await.unwrap();
        assert_eq!(generated.code.len(), GENERATED_CODE_LEN);
        assert!(is_well_formed_code(&generated.code));

        let mut named = request();
        named.code = Some("spring-sale".into());
        assert_eq!(service.create_discount(named.clone()).await.unwrap().code, "SPRING-SALE");
        assert!(matches!(
            service.create_discount(named).await,
            Err(AppError::ValidationError(_))
        ));

        let mut bad = request();
        bad.code = Some("no spaces".into());
        assert!(service.create_discount(bad).await.is_err());

        let mut pointless = request();
        pointless.amount = None;
        assert!(service.create_discount(pointless).await.is_err());

        let mut too_much = request();
        too_much.percentage = Some(150);
        assert!(service.create_discount(too_much).await.is_err());
    }

    #[tokio::test]
    async fn waiver_amount_follows_tax_then_shipping() {
        let db = setup().await;
        let tax_only = insert_discount(&db, "NOTAX", |d| d.waives_tax = Set(true)).await;
        let both = insert_discount(&db, "NOTAXSHIP", |d| {
            d.waives_tax = Set(true);
            d.waives_shipping = Set(true);
        })
        .await;
        let ship_only = insert_discount(&db, "FREESHIP", |d| d.waives_shipping = Set(true)).await;

        assert_eq!(discount_amount_for(&tax_only, 2000, 160, 700), 160);
        assert_eq!(discount_amount_for(&both, 2000, 160, 700), 700);
        assert_eq!(discount_amount_for(&ship_only, 2000, 160, 700), 700);
    }

    #[tokio::test]
    async fn waiver_only_records_waived_amount_without_deducting_twice() {
        let db = setup().await;
        insert_discount(&db, "FREESHIP", |d| d.waives_shipping = Set(true)).await;
        let order = insert_order(&db, None).await;
        let mut am = order.into_active_model();
        am.shipping = Set(700);
        let order = am.update(&db).await.unwrap();
        LineItemService::default()
            .add(&db, order.id, NewLineItem::new(2000))
            .await
            .unwrap();

        let (order, applied) = apply_code(&db, order, "FREESHIP").await.unwrap();
        assert!(applied);
        assert_eq!(order.discount_amount, 700);
        assert_eq!(order.total, 2000);
    }
}
