pub mod checkout_service;
pub mod discount_service;
pub mod line_item_service;
pub mod order_service;
pub mod payment_admin_service;
pub mod referral_service;
pub mod shipping_service;
pub mod transaction_service;

#[cfg(test)]
pub mod test_support;

pub use checkout_service::CheckoutService;
pub use discount_service::DiscountService;
pub use line_item_service::{AddOutcome, LineItemService, NewLineItem};
pub use order_service::OrderService;
pub use payment_admin_service::PaymentAdminService;
pub use shipping_service::ShippingAddressRecorder;
