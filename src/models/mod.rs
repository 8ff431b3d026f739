pub mod billing;
pub mod checkout;
pub mod discount;
pub mod order;
pub mod pagination;
pub mod transaction;

pub use billing::*;
pub use checkout::*;
pub use discount::*;
pub use order::*;
pub use pagination::*;
pub use transaction::*;
