use crate::error::AppResult;
use crate::models::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle notifications emitted by checkout. Nothing in the checkout
/// path waits on a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckoutEvent {
    CustomerVaulted {
        order_id: i64,
        customer_id: String,
        shipping_address: Option<Address>,
    },
    CheckoutAttempted {
        order_id: i64,
        transaction_id: i64,
        amount: i64,
    },
    ChargeSubmitted {
        order_id: i64,
        transaction_id: i64,
        success: bool,
    },
    SubscriptionCreated {
        order_id: i64,
        transaction_id: i64,
        subscription_id: String,
    },
    OrderCompleted {
        order_id: i64,
        user_id: Option<i64>,
        total: i64,
    },
}

impl CheckoutEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutEvent::CustomerVaulted { .. } => "customer_vaulted",
            CheckoutEvent::CheckoutAttempted { .. } => "checkout_attempted",
            CheckoutEvent::ChargeSubmitted { .. } => "charge_submitted",
            CheckoutEvent::SubscriptionCreated { .. } => "subscription_created",
            CheckoutEvent::OrderCompleted { .. } => "order_completed",
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            CheckoutEvent::CustomerVaulted { order_id, .. }
            | CheckoutEvent::CheckoutAttempted { order_id, .. }
            | CheckoutEvent::ChargeSubmitted { order_id, .. }
            | CheckoutEvent::SubscriptionCreated { order_id, .. }
            | CheckoutEvent::OrderCompleted { order_id, .. } => *order_id,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &CheckoutEvent) -> AppResult<()>;
}

/// Handlers registered once at start-up.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    /// Dispatch on detached tasks; handler failures are only logged.
    pub fn emit(&self, event: CheckoutEvent) {
        log::debug!("event {} for order {}", event.name(), event.order_id());
        for handler in self.handlers.iter() {
            let handler = Arc::clone(handler);
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle(&event).await {
                    log::error!(
                        "handler failed for {} (order {}): {e}",
                        event.name(),
                        event.order_id()
                    );
                }
            });
        }
    }
}

pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, event: &CheckoutEvent) -> AppResult<()> {
        log::info!("checkout event {}: {:?}", event.name(), event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<CheckoutEvent>);

    #[async_trait]
    impl EventHandler for Forward {
        async fn handle(&self, event: &CheckoutEvent) -> AppResult<()> {
            let _ = self.0.send(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn every_handler_receives_the_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bus = EventBus::new(vec![
            Arc::new(Forward(tx.clone())),
            Arc::new(Forward(tx)),
            Arc::new(LogEventHandler),
        ]);
        let event = CheckoutEvent::OrderCompleted {
            order_id: 7,
            user_id: None,
            total: 0,
        };
        bus.emit(event.clone());

        assert_eq!(rx.recv().await, Some(event.clone()));
        assert_eq!(rx.recv().await, Some(event));
    }

    #[test]
    fn empty_bus_is_fine() {
        EventBus::default().emit(CheckoutEvent::ChargeSubmitted {
            order_id: 1,
            transaction_id: 1,
            success: false,
        });
    }
}
