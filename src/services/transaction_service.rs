//! OrderTransaction bookkeeping shared by checkout and the admin flows.

use crate::entities::{PaymentMethod, TransactionStatus, order_transaction_entity as otx};
use crate::error::AppResult;
use crate::models::BillingInfo;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value;

/// Newest row for the order, optionally restricted to one payment method.
pub async fn latest<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    method: Option<PaymentMethod>,
) -> AppResult<Option<otx::Model>> {
    let mut query = otx::Entity::find().filter(otx::Column::OrderId.eq(order_id));
    if let Some(method) = method {
        query = query.filter(otx::Column::PaymentMethod.eq(method));
    }
    Ok(query.order_by_desc(otx::Column::Id).one(conn).await?)
}

/// Newest non-discount row; this is the order's payment state.
pub async fn latest_payment<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> AppResult<Option<otx::Model>> {
    Ok(otx::Entity::find()
        .filter(otx::Column::OrderId.eq(order_id))
        .filter(otx::Column::PaymentMethod.ne(PaymentMethod::Discount))
        .order_by_desc(otx::Column::Id)
        .one(conn)
        .await?)
}

/// Every row of one method and status, oldest first.
pub async fn with_status<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    method: PaymentMethod,
    status: TransactionStatus,
) -> AppResult<Vec<otx::Model>> {
    Ok(otx::Entity::find()
        .filter(otx::Column::OrderId.eq(order_id))
        .filter(otx::Column::PaymentMethod.eq(method))
        .filter(otx::Column::Status.eq(status))
        .order_by_asc(otx::Column::Id)
        .all(conn)
        .await?)
}

pub async fn find<C: ConnectionTrait>(conn: &C, id: i64) -> AppResult<Option<otx::Model>> {
    Ok(otx::Entity::find_by_id(id).one(conn).await?)
}

fn raw_text(raw: Option<&Value>) -> Option<String> {
    raw.map(Value::to_string)
}

/// Get-or-create the DISCOUNT audit row, updated in place when the amount
/// or code changes.
pub async fn upsert_discount_audit<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    amount: i64,
    code: &str,
) -> AppResult<otx::Model> {
    let now = Utc::now();
    match latest(conn, order_id, Some(PaymentMethod::Discount)).await? {
        Some(row) if row.amount == amount && row.reference_id.as_deref() == Some(code) => Ok(row),
        Some(row) => {
            let mut am = row.into_active_model();
            am.amount = Set(amount);
            am.reference_id = Set(Some(code.to_string()));
            am.updated_at = Set(now);
            Ok(am.update(conn).await?)
        }
        None => Ok(otx::ActiveModel {
            order_id: Set(order_id),
            status: Set(TransactionStatus::Complete),
            payment_method: Set(PaymentMethod::Discount),
            amount: Set(amount),
            reference_id: Set(Some(code.to_string())),
            details: Set(Some("Discount applied".to_string())),
            billing_first_name: Set(String::new()),
            billing_last_name: Set(String::new()),
            billing_address1: Set(String::new()),
            billing_address2: Set(String::new()),
            billing_city: Set(String::new()),
            billing_region: Set(String::new()),
            billing_postal_code: Set(String::new()),
            billing_country: Set(String::new()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?),
    }
}

pub async fn delete_discount_audit<C: ConnectionTrait>(conn: &C, order_id: i64) -> AppResult<()> {
    otx::Entity::delete_many()
        .filter(otx::Column::OrderId.eq(order_id))
        .filter(otx::Column::PaymentMethod.eq(PaymentMethod::Discount))
        .exec(conn)
        .await?;
    Ok(())
}

fn apply_billing(am: &mut otx::ActiveModel, billing: &BillingInfo) {
    let a = &billing.address;
    am.billing_first_name = Set(billing.first_name.clone());
    am.billing_last_name = Set(billing.last_name.clone());
    am.billing_address1 = Set(a.address1.clone());
    am.billing_address2 = Set(a.address2.clone());
    am.billing_city = Set(a.city.clone());
    am.billing_region = Set(a.region.clone());
    am.billing_postal_code = Set(a.postal_code.clone());
    am.billing_country = Set(a.country.clone());
}

/// Record collected billing info as an INCOMPLETE credit row. A still
/// INCOMPLETE row is updated so resubmitting does not pile up rows; after a
/// FAILED or finished attempt a new row is written.
pub async fn record_credit_attempt<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    amount: i64,
    billing: &BillingInfo,
    customer_id: &str,
    last_four: Option<String>,
    raw: Option<&Value>,
) -> AppResult<otx::Model> {
    let now = Utc::now();
    let existing = latest(conn, order_id, Some(PaymentMethod::Credit))
        .await?
        .filter(|t| t.status == TransactionStatus::Incomplete);

    let is_new = existing.is_none();
    let mut am = match existing {
        Some(row) => row.into_active_model(),
        None => otx::ActiveModel {
            order_id: Set(order_id),
            status: Set(TransactionStatus::Incomplete),
            payment_method: Set(PaymentMethod::Credit),
            created_at: Set(now),
            ..Default::default()
        },
    };
    am.amount = Set(amount);
    am.last_four = Set(last_four.or_else(|| billing.last_four()));
    am.reference_id = Set(Some(customer_id.to_string()));
    am.details = Set(Some("Payment method vaulted".to_string()));
    am.raw_response = Set(raw_text(raw));
    am.updated_at = Set(now);
    apply_billing(&mut am, billing);

    let row = if is_new {
        am.insert(conn).await?
    } else {
        am.update(conn).await?
    };
    Ok(row)
}

/// Copy of `source` as a new INCOMPLETE row, used when retrying after a
/// failed charge.
pub async fn retry_from<C: ConnectionTrait>(
    conn: &C,
    source: &otx::Model,
    amount: i64,
) -> AppResult<otx::Model> {
    let now = Utc::now();
    Ok(otx::ActiveModel {
        order_id: Set(source.order_id),
        status: Set(TransactionStatus::Incomplete),
        payment_method: Set(source.payment_method),
        amount: Set(amount),
        last_four: Set(source.last_four.clone()),
        reference_id: Set(source.reference_id.clone()),
        details: Set(Some("Payment retry".to_string())),
        raw_response: Set(None),
        billing_first_name: Set(source.billing_first_name.clone()),
        billing_last_name: Set(source.billing_last_name.clone()),
        billing_address1: Set(source.billing_address1.clone()),
        billing_address2: Set(source.billing_address2.clone()),
        billing_city: Set(source.billing_city.clone()),
        billing_region: Set(source.billing_region.clone()),
        billing_postal_code: Set(source.billing_postal_code.clone()),
        billing_country: Set(source.billing_country.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?)
}

/// Status change together with the gateway's answer, in one write.
pub async fn resolve<C: ConnectionTrait>(
    conn: &C,
    row: otx::Model,
    status: TransactionStatus,
    reference_id: Option<String>,
    details: Option<String>,
    raw: Option<&Value>,
) -> AppResult<otx::Model> {
    let mut am = row.into_active_model();
    am.status = Set(status);
    if let Some(reference_id) = reference_id {
        am.reference_id = Set(Some(reference_id));
    }
    if details.is_some() {
        am.details = Set(details);
    }
    if raw.is_some() {
        am.raw_response = Set(raw_text(raw));
    }
    am.updated_at = Set(Utc::now());
    Ok(am.update(conn).await?)
}

/// New history row for refunds, voids and settlements, billed like `source`.
pub async fn record_follow_up<C: ConnectionTrait>(
    conn: &C,
    source: &otx::Model,
    status: TransactionStatus,
    amount: i64,
    reference_id: String,
    details: &str,
    raw: Option<&Value>,
) -> AppResult<otx::Model> {
    let now = Utc::now();
    Ok(otx::ActiveModel {
        order_id: Set(source.order_id),
        status: Set(status),
        payment_method: Set(source.payment_method),
        amount: Set(amount),
        last_four: Set(source.last_four.clone()),
        reference_id: Set(Some(reference_id)),
        details: Set(Some(details.to_string())),
        raw_response: Set(raw_text(raw)),
        billing_first_name: Set(source.billing_first_name.clone()),
        billing_last_name: Set(source.billing_last_name.clone()),
        billing_address1: Set(source.billing_address1.clone()),
        billing_address2: Set(source.billing_address2.clone()),
        billing_city: Set(source.billing_city.clone()),
        billing_region: Set(source.billing_region.clone()),
        billing_postal_code: Set(source.billing_postal_code.clone()),
        billing_country: Set(source.billing_country.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?)
}

pub async fn delete_for_order<C: ConnectionTrait>(conn: &C, order_id: i64) -> AppResult<()> {
    otx::Entity::delete_many()
        .filter(otx::Column::OrderId.eq(order_id))
        .exec(conn)
        .await?;
    Ok(())
}
