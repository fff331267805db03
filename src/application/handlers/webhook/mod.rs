//! Webhook handlers.
//!
//! Each handler reacts to a family of Stripe event types and reports
//! `Ignored` for events it recognises but has nothing to do for.

mod charge;
mod customer;
mod handle_webhook;
mod payment_intent;
mod registry;
mod subscription;

use std::sync::Arc;

pub use charge::ChargeHandler;
pub use customer::CustomerHandler;
pub use handle_webhook::{HandleWebhookCommand, HandleWebhookHandler};
pub use payment_intent::PaymentIntentHandler;
pub use registry::HandlerRegistry;
pub use subscription::SubscriptionHandler;

use crate::application::handlers::enrollment::AccessLedger;
use crate::ports::{
    CatalogReader, CustomerRepository, DisputeRepository, Notifier, PaymentRepository,
    RefundRepository, SubscriptionRepository,
};

/// Ports the webhook handlers write through.
#[derive(Clone)]
pub struct WebhookPorts {
    pub payments: Arc<dyn PaymentRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub refunds: Arc<dyn RefundRepository>,
    pub disputes: Arc<dyn DisputeRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub catalog: Arc<dyn CatalogReader>,
    pub notifier: Arc<dyn Notifier>,
}

/// Registry with every billing handler wired in.
pub fn billing_registry(ports: WebhookPorts, ledger: Arc<AccessLedger>) -> HandlerRegistry {
    HandlerRegistry::new()
        .register(Arc::new(PaymentIntentHandler::new(
            ports.payments.clone(),
            ports.catalog,
            ledger.clone(),
            ports.notifier.clone(),
        )))
        .register(Arc::new(SubscriptionHandler::new(
            ports.subscriptions,
            ledger.clone(),
            ports.notifier.clone(),
        )))
        .register(Arc::new(ChargeHandler::new(
            ports.payments,
            ports.refunds,
            ports.disputes,
            ledger,
            ports.notifier,
        )))
        .register(Arc::new(CustomerHandler::new(ports.customers)))
}
