pub mod discounts;
pub mod line_items;
pub mod order_transactions;
pub mod orders;
pub mod referrals;
pub mod shipping_addresses;

pub use discounts as discount_entity;
pub use line_items as line_item_entity;
pub use order_transactions as order_transaction_entity;
pub use order_transactions::{PaymentMethod, TransactionStatus};
pub use orders as order_entity;
pub use orders::OrderStatus;
pub use referrals as referral_entity;
pub use shipping_addresses as shipping_address_entity;
