pub mod authorize_net;
pub mod processor;
pub mod stripe;

pub use authorize_net::AuthorizeNetProcessor;
pub use processor::*;
pub use stripe::StripeProcessor;

use crate::config::{Config, ProcessorKind};
use std::sync::Arc;

/// Builds the configured gateway adapter once at start-up.
pub fn build_processor(config: &Config) -> Arc<dyn PaymentProcessor> {
    match config.payment.processor {
        ProcessorKind::Stripe => Arc::new(StripeProcessor::new(
            config.stripe.clone(),
            &config.payment,
        )),
        ProcessorKind::AuthorizeNet => Arc::new(AuthorizeNetProcessor::new(
            config.authorize_net.clone(),
            &config.payment,
            config.checkout.allow_prerenewal,
        )),
    }
}
