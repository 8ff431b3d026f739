use crate::entities::shipping_address_entity as shipping;
use crate::error::AppResult;
use crate::events::{CheckoutEvent, EventHandler};
use crate::models::Address;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, Set,
};

pub async fn find_for_order<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> AppResult<Option<shipping::Model>> {
    Ok(shipping::Entity::find()
        .filter(shipping::Column::OrderId.eq(order_id))
        .one(conn)
        .await?)
}

/// One address per order; a later submission overwrites the earlier one.
pub async fn save_for_order<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    address: &Address,
) -> AppResult<shipping::Model> {
    let now = Utc::now();
    let existing = find_for_order(conn, order_id).await?;
    let is_new = existing.is_none();
    let mut am = match existing {
        Some(row) => row.into_active_model(),
        None => shipping::ActiveModel {
            order_id: Set(order_id),
            created_at: Set(now),
            ..Default::default()
        },
    };
    am.address1 = Set(address.address1.clone());
    am.address2 = Set(address.address2.clone());
    am.city = Set(address.city.clone());
    am.region = Set(address.region.clone());
    am.postal_code = Set(address.postal_code.clone());
    am.country = Set(address.country.clone());
    am.updated_at = Set(now);

    let row = if is_new {
        am.insert(conn).await?
    } else {
        am.update(conn).await?
    };
    Ok(row)
}

/// Captures the shipping address sent along with billing info.
pub struct ShippingAddressRecorder {
    pool: DatabaseConnection,
}

impl ShippingAddressRecorder {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventHandler for ShippingAddressRecorder {
    async fn handle(&self, event: &CheckoutEvent) -> AppResult<()> {
        if let CheckoutEvent::CustomerVaulted {
            order_id,
            shipping_address: Some(address),
            ..
        } = event
        {
            save_for_order(&self.pool, *order_id, address).await?;
            log::info!("order {order_id}: shipping address saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{insert_order, setup};

    fn address(city: &str) -> Address {
        Address {
            address1: "1 Main St".into(),
            address2: String::new(),
            city: city.into(),
            region: "OR".into(),
            postal_code: "97201".into(),
            country: "US".into(),
        }
    }

    #[tokio::test]
    async fn vaulted_event_records_address_once() {
        let db = setup().await;
        let order = insert_order(&db, None).await;
        let recorder = ShippingAddressRecorder::new(db.clone());

        for city in ["Portland", "Salem"] {
            recorder
                .handle(&CheckoutEvent::CustomerVaulted {
                    order_id: order.id,
                    customer_id: "cus_1".into(),
                    shipping_address: Some(address(city)),
                })
                .await
                .unwrap();
        }

        let saved = find_for_order(&db, order.id).await.unwrap().unwrap();
        assert_eq!(saved.city, "Salem");
    }

    #[tokio::test]
    async fn other_events_are_ignored() {
        let db = setup().await;
        let order = insert_order(&db, None).await;
        let recorder = ShippingAddressRecorder::new(db.clone());
        recorder
            .handle(&CheckoutEvent::OrderCompleted {
                order_id: order.id,
                user_id: None,
                total: 0,
            })
            .await
            .unwrap();
        assert!(find_for_order(&db, order.id).await.unwrap().is_none());
    }
}
