pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_discounts;
mod m20250901_000002_create_orders;
mod m20250905_000001_add_shipping_addresses;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_discounts::Migration),
            Box::new(m20250901_000002_create_orders::Migration),
            Box::new(m20250905_000001_add_shipping_addresses::Migration),
        ]
    }
}
