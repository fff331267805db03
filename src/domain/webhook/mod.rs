//! Webhook module - verification, envelope parsing and idempotent dispatch
//! of Stripe events.

mod errors;
mod event;
pub mod payloads;
mod processor;
mod verifier;

pub use errors::WebhookError;
#[cfg(test)]
pub use event::StripeEventBuilder;
pub use event::{StripeEvent, StripeEventData, StripeEventType};
pub use processor::{IdempotentWebhookProcessor, WebhookDispatcher, WebhookEventHandler};
pub use verifier::{sign_payload, SignatureHeader, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};
