//! Fixtures for service tests: in-memory SQLite plus row builders.

use crate::database::{DbPool, test_pool};
use crate::entities::{OrderStatus, discount_entity as discount, order_entity as order};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};

pub async fn setup() -> DbPool {
    test_pool().await
}

pub async fn insert_order(db: &DbPool, user_id: Option<i64>) -> order::Model {
    insert_order_with_status(db, user_id, OrderStatus::Incomplete).await
}

pub async fn insert_order_with_status(
    db: &DbPool,
    user_id: Option<i64>,
    status: OrderStatus,
) -> order::Model {
    let now = Utc::now();
    order::ActiveModel {
        user_id: Set(user_id),
        status: Set(status),
        subtotal: Set(0),
        tax: Set(0),
        flat_tax: Set(0),
        shipping: Set(0),
        discount_amount: Set(0),
        total: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert order")
}

/// Active, unlimited, fixed-amount discount; tweak the returned model
/// through `edit` before insert.
pub async fn insert_discount(
    db: &DbPool,
    code: &str,
    edit: impl FnOnce(&mut discount::ActiveModel),
) -> discount::Model {
    let now = Utc::now();
    let mut am = discount::ActiveModel {
        code: Set(code.to_uppercase()),
        description: Set(None),
        active: Set(true),
        amount: Set(None),
        percentage: Set(None),
        uses_limit: Set(None),
        individual_use_limit: Set(1),
        times_used: Set(0),
        user_id: Set(None),
        active_date: Set(None),
        expire_date: Set(None),
        waives_tax: Set(false),
        waives_shipping: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    edit(&mut am);
    am.insert(db).await.expect("insert discount")
}
