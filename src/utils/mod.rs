pub mod code_generator;
pub mod jwt;
pub mod money;

pub use code_generator::generate_discount_code;
pub use jwt::*;
