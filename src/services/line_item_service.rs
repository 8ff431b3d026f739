use crate::entities::line_item_entity as li;
use crate::error::{AppError, AppResult};
use crate::models::{AddItemRequest, CartLine, Priceable, ProductRef};
use crate::utils::money::line_total;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Select, Set,
};
use serde::Serialize;

/// A line to add. `subscription_plan` empty means a one-off purchase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewLineItem {
    pub unit_price: i64,
    pub unit_tax: i64,
    pub quantity: i32,
    pub product: Option<ProductRef>,
    pub description: String,
    pub attributes: String,
    pub subscription_plan: String,
}

impl NewLineItem {
    pub fn new(unit_price: i64) -> Self {
        Self {
            unit_price,
            quantity: 1,
            ..Default::default()
        }
    }

    pub fn for_product(product: &impl Priceable, unit_price: i64) -> Self {
        Self {
            product: Some(product.identity()),
            ..Self::new(unit_price)
        }
    }

    pub fn total(&self) -> i64 {
        line_total(self.quantity, self.unit_price, self.unit_tax)
    }
}

impl From<AddItemRequest> for NewLineItem {
    fn from(r: AddItemRequest) -> Self {
        Self {
            unit_price: r.unit_price,
            unit_tax: r.unit_tax,
            quantity: r.quantity,
            product: r.product,
            description: r.description,
            attributes: r.attributes,
            subscription_plan: r.subscription_plan,
        }
    }
}

impl From<&CartLine> for NewLineItem {
    fn from(l: &CartLine) -> Self {
        Self {
            unit_price: l.unit_price,
            unit_tax: 0,
            quantity: l.quantity,
            product: Some(l.product.identity()),
            description: l.description.clone(),
            attributes: l.attributes.clone(),
            subscription_plan: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Inserted,
    Updated,
    Unchanged,
    /// Second item offered to a subscription order.
    Ignored,
}

fn for_product(query: Select<li::Entity>, product: Option<&ProductRef>) -> Select<li::Entity> {
    match product {
        Some(p) => query
            .filter(li::Column::ProductType.eq(p.kind.clone()))
            .filter(li::Column::ProductId.eq(p.id)),
        None => query
            .filter(li::Column::ProductType.is_null())
            .filter(li::Column::ProductId.is_null()),
    }
}

/// The mutable set of items on one order.
#[derive(Clone, Default)]
pub struct LineItemService {
    strict_subscription_items: bool,
}

impl LineItemService {
    pub fn new(strict_subscription_items: bool) -> Self {
        Self {
            strict_subscription_items,
        }
    }

    pub async fn list<C: ConnectionTrait>(&self, conn: &C, order_id: i64) -> AppResult<Vec<li::Model>> {
        Ok(li::Entity::find()
            .filter(li::Column::OrderId.eq(order_id))
            .order_by_asc(li::Column::Id)
            .all(conn)
            .await?)
    }

    pub async fn subscription_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
    ) -> AppResult<Option<li::Model>> {
        Ok(li::Entity::find()
            .filter(li::Column::OrderId.eq(order_id))
            .filter(li::Column::SubscriptionPlan.ne(""))
            .one(conn)
            .await?)
    }

    /// Idempotent add keyed on (order, product, description, plan).
    pub async fn add<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
        item: NewLineItem,
    ) -> AppResult<AddOutcome> {
        if item.quantity < 1 {
            return Err(AppError::ValidationError("Quantity must be at least 1".into()));
        }
        if item.unit_price < 0 || item.unit_tax < 0 {
            return Err(AppError::ValidationError("Prices cannot be negative".into()));
        }

        let total = item.total();
        let existing = for_product(
            li::Entity::find().filter(li::Column::OrderId.eq(order_id)),
            item.product.as_ref(),
        )
        .filter(li::Column::Description.eq(item.description.clone()))
        .filter(li::Column::SubscriptionPlan.eq(item.subscription_plan.clone()))
        .one(conn)
        .await?;

        if let Some(line) = existing {
            if line.total == total && line.quantity == item.quantity {
                return Ok(AddOutcome::Unchanged);
            }
            let mut am = line.into_active_model();
            am.unit_price = Set(item.unit_price);
            am.unit_tax = Set(item.unit_tax);
            am.quantity = Set(item.quantity);
            am.total = Set(total);
            am.attributes = Set(item.attributes);
            am.updated_at = Set(Utc::now());
            am.update(conn).await?;
            return Ok(AddOutcome::Updated);
        }

        // 订阅订单只能有一个商品
        let has_subscription = self.subscription_line(conn, order_id).await?.is_some();
        let joins_non_empty = !item.subscription_plan.is_empty()
            && li::Entity::find()
                .filter(li::Column::OrderId.eq(order_id))
                .count(conn)
                .await?
                > 0;
        if has_subscription || joins_non_empty {
            if self.strict_subscription_items {
                return Err(AppError::SubscriptionConflict);
            }
            log::debug!("order {order_id}: ignoring extra item on subscription order");
            return Ok(AddOutcome::Ignored);
        }

        let now = Utc::now();
        let (product_type, product_id) = match item.product {
            Some(p) => (Some(p.kind), Some(p.id)),
            None => (None, None),
        };
        li::ActiveModel {
            order_id: Set(order_id),
            product_type: Set(product_type),
            product_id: Set(product_id),
            description: Set(item.description),
            attributes: Set(item.attributes),
            subscription_plan: Set(item.subscription_plan),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            unit_tax: Set(item.unit_tax),
            total: Set(total),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        Ok(AddOutcome::Inserted)
    }

    /// The one line a remove or quantity change applies to. Without a
    /// description the product's oldest line is used.
    async fn find_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
        product: &ProductRef,
        description: Option<&str>,
    ) -> AppResult<li::Model> {
        let mut query = for_product(
            li::Entity::find().filter(li::Column::OrderId.eq(order_id)),
            Some(product),
        );
        if let Some(description) = description {
            query = query.filter(li::Column::Description.eq(description));
        }
        query
            .order_by_asc(li::Column::Id)
            .one(conn)
            .await?
            .ok_or(AppError::LineItemNotFound)
    }

    pub async fn remove<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
        product: &ProductRef,
        description: Option<&str>,
    ) -> AppResult<()> {
        let line = self.find_line(conn, order_id, product, description).await?;
        li::Entity::delete_by_id(line.id).exec(conn).await?;
        Ok(())
    }

    pub async fn update_quantity<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: i64,
        product: &ProductRef,
        description: Option<&str>,
        quantity: i32,
    ) -> AppResult<li::Model> {
        if quantity < 1 {
            return Err(AppError::ValidationError("Quantity must be at least 1".into()));
        }
        let line = self.find_line(conn, order_id, product, description).await?;

        let total = line_total(quantity, line.unit_price, line.unit_tax);
        let mut am = line.into_active_model();
        am.quantity = Set(quantity);
        am.total = Set(total);
        am.updated_at = Set(Utc::now());
        Ok(am.update(conn).await?)
    }

    pub async fn clear<C: ConnectionTrait>(&self, conn: &C, order_id: i64) -> AppResult<u64> {
        let result = li::Entity::delete_many()
            .filter(li::Column::OrderId.eq(order_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
