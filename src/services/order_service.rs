use crate::entities::{
    OrderStatus, discount_entity as discount, line_item_entity as li, order_entity as order,
    shipping_address_entity as shipping,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::discount_service::{discount_amount_for, finalize_usage};
use crate::services::transaction_service;
use crate::session::{Identity, SessionStore};
use crate::utils::money::{LineAmount, compute_totals, items_total, itemized_tax};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use std::sync::Arc;

/// Re-read the order row for update. Callers hold a transaction.
pub async fn lock<C: ConnectionTrait>(conn: &C, order_id: i64) -> AppResult<order::Model> {
    order::Entity::find_by_id(order_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))
}

/// Recompute and persist subtotal, tax, discount and total from the
/// current line items and the attached discount.
pub async fn recalculate<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> AppResult<order::Model> {
    let items = li::Entity::find()
        .filter(li::Column::OrderId.eq(order.id))
        .all(conn)
        .await?;
    let lines: Vec<LineAmount> = items.iter().map(LineAmount::from).collect();
    let tax = itemized_tax(&lines) + order.flat_tax;

    let mut discount_id = order.discount_id;
    let mut discount_code = order.discount_code.clone();
    let mut discount_amount = order.discount_amount;
    let mut deductible = discount_amount;
    let mut waive_tax = false;
    let mut waive_shipping = false;

    if let Some(id) = order.discount_id {
        match discount::Entity::find_by_id(id).one(conn).await? {
            Some(d) => {
                discount_amount = discount_amount_for(&d, items_total(&lines), tax, order.shipping);
                // 仅免税/免运费的折扣不再从小计中扣减
                deductible = if d.is_waiver_only() { 0 } else { discount_amount };
                waive_tax = d.waives_tax;
                waive_shipping = d.waives_shipping;
                transaction_service::upsert_discount_audit(conn, order.id, discount_amount, &d.code)
                    .await?;
            }
            None => {
                log::warn!("order {}: discount {id} no longer exists, dropping it", order.id);
                discount_id = None;
                discount_code = None;
                discount_amount = 0;
                deductible = 0;
                transaction_service::delete_discount_audit(conn, order.id).await?;
            }
        }
    }

    let (subtotal, total) = compute_totals(
        &lines,
        deductible,
        tax,
        order.shipping,
        waive_tax,
        waive_shipping,
    );

    let mut am = order.into_active_model();
    am.subtotal = Set(subtotal);
    am.tax = Set(tax);
    am.discount_id = Set(discount_id);
    am.discount_code = Set(discount_code);
    am.discount_amount = Set(discount_amount);
    am.total = Set(total);
    am.updated_at = Set(Utc::now());
    Ok(am.update(conn).await?)
}

pub async fn set_status<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
    status: OrderStatus,
) -> AppResult<order::Model> {
    if order.status == status {
        return Ok(order);
    }
    log::info!("order {}: {} -> {}", order.id, order.status, status);
    let mut am = order.into_active_model();
    am.status = Set(status);
    am.updated_at = Set(Utc::now());
    Ok(am.update(conn).await?)
}

/// PENDING_PAYMENT -> COMPLETE. The discount use must already have been
/// claimed; here the discount is only switched off when it is spent.
pub async fn complete_order<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> AppResult<order::Model> {
    if !order.can_complete() {
        return Err(AppError::InvalidOrderState(format!(
            "Order {} is {} and cannot be completed",
            order.id, order.status
        )));
    }
    let discount_id = order.discount_id;
    let order = set_status(conn, order, OrderStatus::Complete).await?;
    if let Some(id) = discount_id {
        finalize_usage(conn, id).await?;
    }
    Ok(order)
}

/// Hard reset: no items, no transactions, no discount, back to INCOMPLETE.
pub async fn clear_order<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> AppResult<order::Model> {
    li::Entity::delete_many()
        .filter(li::Column::OrderId.eq(order.id))
        .exec(conn)
        .await?;
    transaction_service::delete_for_order(conn, order.id).await?;

    let mut am = order.into_active_model();
    am.discount_id = Set(None);
    am.discount_code = Set(None);
    am.discount_amount = Set(0);
    am.status = Set(OrderStatus::Incomplete);
    let order = am.update(conn).await?;
    log::info!("order {} cleared", order.id);
    recalculate(conn, order).await
}

async fn delete_order_rows<C: ConnectionTrait>(conn: &C, order_id: i64) -> AppResult<()> {
    li::Entity::delete_many()
        .filter(li::Column::OrderId.eq(order_id))
        .exec(conn)
        .await?;
    transaction_service::delete_for_order(conn, order_id).await?;
    shipping::Entity::delete_many()
        .filter(shipping::Column::OrderId.eq(order_id))
        .exec(conn)
        .await?;
    order::Entity::delete_by_id(order_id).exec(conn).await?;
    Ok(())
}

/// Delete every other live order of `keep`'s owner. Returns how many went.
pub async fn purge_siblings<C: ConnectionTrait>(conn: &C, keep: &order::Model) -> AppResult<u64> {
    let Some(user_id) = keep.user_id else {
        return Ok(0);
    };
    let stale = order::Entity::find()
        .filter(order::Column::UserId.eq(user_id))
        .filter(order::Column::Id.ne(keep.id))
        .filter(order::Column::Status.is_in(OrderStatus::LIVE))
        .all(conn)
        .await?;
    for o in &stale {
        log::warn!("user {user_id}: purging stale live order {}", o.id);
        delete_order_rows(conn, o.id).await?;
    }
    Ok(stale.len() as u64)
}

pub async fn order_detail<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> AppResult<OrderDetailResponse> {
    let items = li::Entity::find()
        .filter(li::Column::OrderId.eq(order.id))
        .order_by_asc(li::Column::Id)
        .all(conn)
        .await?;
    let latest = transaction_service::latest_payment(conn, order.id).await?;
    let address = shipping::Entity::find()
        .filter(shipping::Column::OrderId.eq(order.id))
        .one(conn)
        .await?;
    Ok(OrderDetailResponse {
        order: OrderResponse::from(order),
        items: items.into_iter().map(LineItemResponse::from).collect(),
        latest_transaction: latest.map(TransactionResponse::from),
        shipping_address: address.map(Address::from),
    })
}

/// Which order a request is working on, and creation of new ones.
#[derive(Clone)]
pub struct OrderService {
    pool: DatabaseConnection,
    sessions: Arc<dyn SessionStore>,
    default_shipping: i64,
}

impl OrderService {
    pub fn new(
        pool: DatabaseConnection,
        sessions: Arc<dyn SessionStore>,
        default_shipping: i64,
    ) -> Self {
        Self {
            pool,
            sessions,
            default_shipping,
        }
    }

    /// Live order for the request, if there is one.
    ///
    /// The session's order wins unless another user owns it. Without a
    /// session order an authenticated user resumes their latest live order.
    /// An anonymous order is adopted by the first user that touches it.
    pub async fn find_active(&self, identity: &Identity) -> AppResult<Option<order::Model>> {
        let from_session = match self.sessions.get_active_order_id(&identity.session_key) {
            Some(id) => order::Entity::find_by_id(id)
                .filter(order::Column::Status.is_in(OrderStatus::LIVE))
                .one(&self.pool)
                .await?,
            None => None,
        };

        let from_session = match (from_session, identity.user_id) {
            (Some(o), Some(user_id)) if o.user_id.is_some_and(|owner| owner != user_id) => {
                log::info!("order {} belongs to another user, ignoring", o.id);
                self.sessions.clear_active_order_id(&identity.session_key);
                None
            }
            (o, _) => o,
        };

        let found = match (from_session, identity.user_id) {
            (Some(o), _) => Some(o),
            (None, Some(user_id)) => {
                order::Entity::find()
                    .filter(order::Column::UserId.eq(user_id))
                    .filter(order::Column::Status.is_in(OrderStatus::LIVE))
                    .order_by_desc(order::Column::Id)
                    .one(&self.pool)
                    .await?
            }
            (None, None) => None,
        };

        let Some(found) = found else {
            return Ok(None);
        };
        let found = match (found.user_id, identity.user_id) {
            (None, Some(user_id)) => self.adopt(found, user_id).await?,
            _ => found,
        };
        self.sessions
            .set_active_order_id(&identity.session_key, found.id);
        Ok(Some(found))
    }

    /// Live order for the request, created when there is none.
    pub async fn resolve(&self, identity: &Identity) -> AppResult<order::Model> {
        match self.find_active(identity).await? {
            Some(o) => Ok(o),
            None => self.create(identity).await,
        }
    }

    pub fn clear_session(&self, identity: &Identity) {
        self.sessions.clear_active_order_id(&identity.session_key);
    }

    async fn create(&self, identity: &Identity) -> AppResult<order::Model> {
        let txn = self.pool.begin().await?;
        let now = Utc::now();
        let created = order::ActiveModel {
            user_id: Set(identity.user_id),
            status: Set(OrderStatus::Incomplete),
            subtotal: Set(0),
            tax: Set(0),
            flat_tax: Set(0),
            shipping: Set(self.default_shipping),
            discount_amount: Set(0),
            total: Set(self.default_shipping),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        purge_siblings(&txn, &created).await?;
        txn.commit().await?;

        log::info!("order {} created for {:?}", created.id, identity.user_id);
        self.sessions
            .set_active_order_id(&identity.session_key, created.id);
        Ok(created)
    }

    async fn adopt(&self, found: order::Model, user_id: i64) -> AppResult<order::Model> {
        let txn = self.pool.begin().await?;
        let current = lock(&txn, found.id).await?;
        // 只认领一次
        if current.user_id.is_some() {
            txn.commit().await?;
            return Ok(current);
        }
        let mut am = current.into_active_model();
        am.user_id = Set(Some(user_id));
        am.updated_at = Set(Utc::now());
        let adopted = am.update(&txn).await?;
        purge_siblings(&txn, &adopted).await?;
        txn.commit().await?;
        log::info!("order {} adopted by user {user_id}", adopted.id);
        Ok(adopted)
    }

    pub async fn detail(&self, order: order::Model) -> AppResult<OrderDetailResponse> {
        order_detail(&self.pool, order).await
    }

    pub async fn list_user_orders(
        &self,
        user_id: i64,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<OrderResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut select = order::Entity::find().filter(order::Column::UserId.eq(user_id));
        if let Some(status) = query.status {
            select = select.filter(order::Column::Status.eq(status));
        }

        let total = select.clone().count(&self.pool).await?;
        let orders = select
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .offset(params.get_offset() as u64)
            .limit(params.get_limit() as u64)
            .all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(
            orders.into_iter().map(OrderResponse::from).collect(),
            params.get_page(),
            params.get_limit(),
            total as i64,
        ))
    }

    pub async fn get_order_for_user(
        &self,
        user_id: i64,
        order_id: i64,
        is_admin: bool,
    ) -> AppResult<OrderDetailResponse> {
        let found = order::Entity::find_by_id(order_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;
        if !is_admin && found.user_id != Some(user_id) {
            return Err(AppError::Forbidden);
        }
        self.detail(found).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::line_item_service::{LineItemService, NewLineItem};
    use crate::services::test_support::*;
    use crate::session::MemorySessionStore;

    fn service(db: &DatabaseConnection) -> OrderService {
        OrderService::new(db.clone(), Arc::new(MemorySessionStore::new()), 0)
    }

    async fn live_count(db: &DatabaseConnection, user_id: i64) -> u64 {
        order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.is_in(OrderStatus::LIVE))
            .count(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn two_items_with_flat_tax() {
        let db = setup().await;
        let o = insert_order(&db, None).await;
        let mut am = o.into_active_model();
        am.flat_tax = Set(80);
        let o = am.update(&db).await.unwrap();

        let store = LineItemService::default();
        store
            .add(&db, o.id, NewLineItem::for_product(&ProductRef::new("book", 1), 1000))
            .await
            .unwrap();
        store
            .add(&db, o.id, NewLineItem::for_product(&ProductRef::new("pen", 2), 500))
            .await
            .unwrap();

        let o = recalculate(&db, o).await.unwrap();
        assert_eq!(o.subtotal, 1500);
        assert_eq!(o.tax, 80);
        assert_eq!(o.total, 1580);
    }

    #[tokio::test]
    async fn resume_returns_same_order() {
        let db = setup().await;
        let svc = service(&db);
        let who = Identity::new("s1", None);

        let first = svc.resolve(&who).await.unwrap();
        let again = svc.resolve(&who).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.status, OrderStatus::Incomplete);
    }

    #[tokio::test]
    async fn anonymous_order_is_adopted_once() {
        let db = setup().await;
        let svc = service(&db);

        let anon = svc.resolve(&Identity::new("s1", None)).await.unwrap();
        assert_eq!(anon.user_id, None);

        let adopted = svc.resolve(&Identity::new("s1", Some(5))).await.unwrap();
        assert_eq!(adopted.id, anon.id);
        assert_eq!(adopted.user_id, Some(5));

        // 另一个用户使用同一会话时得到新订单
        let other = svc.resolve(&Identity::new("s1", Some(6))).await.unwrap();
        assert_ne!(other.id, anon.id);
        assert_eq!(other.user_id, Some(6));

        let still = order::Entity::find_by_id(anon.id).one(&db).await.unwrap().unwrap();
        assert_eq!(still.user_id, Some(5));
    }

    #[tokio::test]
    async fn user_resumes_across_sessions() {
        let db = setup().await;
        let svc = service(&db);
        let first = svc.resolve(&Identity::new("phone", Some(9))).await.unwrap();
        let second = svc.resolve(&Identity::new("laptop", Some(9))).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn at_most_one_live_order_per_user() {
        let db = setup().await;
        let svc = service(&db);
        insert_order(&db, Some(3)).await;
        insert_order(&db, Some(3)).await;
        insert_order_with_status(&db, Some(3), OrderStatus::Complete).await;
        assert_eq!(live_count(&db, 3).await, 2);

        // 匿名订单被认领时清理旧订单
        svc.resolve(&Identity::new("s9", None)).await.unwrap();
        let adopted = svc.resolve(&Identity::new("s9", Some(3))).await.unwrap();
        assert_eq!(live_count(&db, 3).await, 1);
        assert_eq!(adopted.user_id, Some(3));

        let completed = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Complete))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn new_orders_pick_up_default_shipping() {
        let db = setup().await;
        let svc = OrderService::new(db.clone(), Arc::new(MemorySessionStore::new()), 700);
        let o = svc.resolve(&Identity::new("s1", None)).await.unwrap();
        assert_eq!(o.shipping, 700);
        assert_eq!(o.total, 700);
    }

    #[tokio::test]
    async fn complete_requires_pending_payment() {
        let db = setup().await;
        let o = insert_order(&db, None).await;
        let err = complete_order(&db, o.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidOrderState(_)));

        let o = set_status(&db, o, OrderStatus::PendingPayment).await.unwrap();
        let o = complete_order(&db, o).await.unwrap();
        assert_eq!(o.status, OrderStatus::Complete);
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let db = setup().await;
        let d = insert_discount(&db, "SAVE5", |d| d.amount = Set(Some(500))).await;
        let o = insert_order(&db, None).await;
        LineItemService::default()
            .add(&db, o.id, NewLineItem::new(2000))
            .await
            .unwrap();
        let (o, applied) = crate::services::discount_service::apply_code(&db, o, "SAVE5")
            .await
            .unwrap();
        assert!(applied);
        let o = set_status(&db, o, OrderStatus::PendingPayment).await.unwrap();

        let o = clear_order(&db, o).await.unwrap();
        assert_eq!(o.status, OrderStatus::Incomplete);
        assert_eq!(o.discount_id, None);
        assert_eq!(o.discount_amount, 0);
        assert_eq!(o.total, 0);
        assert!(transaction_service::latest(&db, o.id, None).await.unwrap().is_none());
        assert!(discount::Entity::find_by_id(d.id).one(&db).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn vanished_discount_is_dropped_on_recalculate() {
        let db = setup().await;
        let d = insert_discount(&db, "GONE", |d| d.amount = Set(Some(300))).await;
        let o = insert_order(&db, None).await;
        LineItemService::default()
            .add(&db, o.id, NewLineItem::new(1000))
            .await
            .unwrap();
        let (o, _) = crate::services::discount_service::apply_code(&db, o, "GONE")
            .await
            .unwrap();
        assert_eq!(o.total, 700);

        discount::Entity::delete_by_id(d.id).exec(&db).await.unwrap();
        let o = recalculate(&db, o).await.unwrap();
        assert_eq!(o.discount_id, None);
        assert_eq!(o.total, 1000);
    }

    #[tokio::test]
    async fn order_history_is_paginated_and_scoped() {
        let db = setup().await;
        let svc = service(&db);
        for _ in 0..3 {
            insert_order_with_status(&db, Some(1), OrderStatus::Complete).await;
        }
        insert_order(&db, Some(2)).await;

        let query = OrderQuery {
            page: Some(1),
            per_page: Some(2),
            status: None,
        };
        let page = svc.list_user_orders(1, &query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.total_pages, 2);
        assert!(page.data[0].id > page.data[1].id);

        let other = svc.list_user_orders(2, &query).await.unwrap();
        assert_eq!(other.total, 1);
    }

    #[tokio::test]
    async fn order_detail_is_owner_only() {
        let db = setup().await;
        let svc = service(&db);
        let o = insert_order(&db, Some(1)).await;

        assert_eq!(svc.get_order_for_user(1, o.id, false).await.unwrap().order.id, o.id);
        assert!(matches!(
            svc.get_order_for_user(2, o.id, false).await,
            Err(AppError::Forbidden)
        ));
        assert!(svc.get_order_for_user(2, o.id, true).await.is_ok());
        assert!(matches!(
            svc.get_order_for_user(1, 999, false).await,
            Err(AppError::NotFound(_))
        ));
    }
}
