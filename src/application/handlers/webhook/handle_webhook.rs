//! HandleWebhookHandler - verifies, parses and processes one delivery.

use std::sync::Arc;

use crate::domain::webhook::{IdempotentWebhookProcessor, StripeWebhookVerifier, WebhookError};
use crate::ports::WebhookResult;

/// Raw webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleWebhookCommand {
    /// Body exactly as received; the signature covers these bytes.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header.
    pub signature: String,
}

pub struct HandleWebhookHandler {
    verifier: StripeWebhookVerifier,
    processor: Arc<IdempotentWebhookProcessor>,
    expected_livemode: Option<bool>,
}

impl HandleWebhookHandler {
    pub fn new(verifier: StripeWebhookVerifier, processor: Arc<IdempotentWebhookProcessor>) -> Self {
        Self {
            verifier,
            processor,
            expected_livemode: None,
        }
    }

    /// Acknowledges, without processing, events whose `livemode` flag
    /// differs from `livemode`.
    pub fn with_expected_livemode(mut self, livemode: bool) -> Self {
        self.expected_livemode = Some(livemode);
        self
    }

    pub async fn handle(&self, cmd: HandleWebhookCommand) -> Result<WebhookResult, WebhookError> {
        let event = self
            .verifier
            .verify_and_parse(&cmd.payload, &cmd.signature)
            .map_err(|err| {
                tracing::warn!(error = %err, "webhook verification failed");
                err
            })?;

        if let Some(expected) = self.expected_livemode {
            if event.livemode != expected {
                tracing::warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    livemode = event.livemode,
                    expected,
                    "webhook from the other mode; acknowledged without processing"
                );
                return Ok(WebhookResult::Ignored);
            }
        }

        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "webhook verified");
        self.processor.process(&event).await
    }
}
