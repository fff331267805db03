//! Webhook processor - idempotent dispatch of verified events.
//!
//! 1. Look the event id up in the ledger; if it is processed, stop.
//! 2. Dispatch to the handler registered for the event type.
//! 3. Success (or "no handler") marks the event processed. Failure bumps
//!    the attempt count, keeps it unprocessed and returns the error so the
//!    HTTP layer answers 5xx and the processor redelivers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::ports::{WebhookEventRepository, WebhookOutcome, WebhookResult};

use super::{StripeEvent, StripeEventType, WebhookError};

/// Handler for one or more Stripe event types.
///
/// Handlers must be idempotent at the data layer: upsert by external id.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    fn handles(&self) -> Vec<StripeEventType>;

    /// Returns `Err(WebhookError::Ignored(_))` to acknowledge without effect.
    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError>;
}

/// Routes events to handlers by type.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    fn get_handler(&self, event_type: &StripeEventType) -> Option<&dyn WebhookEventHandler>;

    /// Returns `Err(WebhookError::Ignored)` if no handler is registered.
    async fn dispatch(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let event_type = event.parsed_type();
        match self.get_handler(&event_type) {
            Some(handler) => handler.handle(event).await,
            None => Err(WebhookError::Ignored(format!(
                "no handler for event type {}",
                event.event_type
            ))),
        }
    }
}

/// Processes webhook events at most once each.
pub struct IdempotentWebhookProcessor {
    repository: Arc<dyn WebhookEventRepository>,
    dispatcher: Arc<dyn WebhookDispatcher>,
}

impl IdempotentWebhookProcessor {
    pub fn new(
        repository: Arc<dyn WebhookEventRepository>,
        dispatcher: Arc<dyn WebhookDispatcher>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
        }
    }

    pub async fn process(&self, event: &StripeEvent) -> Result<WebhookResult, WebhookError> {
        if let Some(record) = self.repository.find_by_event_id(&event.id).await? {
            if record.processed {
                tracing::debug!(event_id = %event.id, "webhook event already processed");
                return Ok(WebhookResult::AlreadyProcessed);
            }
            tracing::info!(
                event_id = %event.id,
                previous_attempts = record.attempt_count,
                "retrying webhook event"
            );
        }

        match self.dispatcher.dispatch(event).await {
            Ok(()) => {
                self.repository
                    .mark_processed(event, WebhookOutcome::Handled, Timestamp::now())
                    .await?;
                Ok(WebhookResult::Processed)
            }
            Err(WebhookError::Ignored(reason)) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    %reason,
                    "webhook event ignored"
                );
                self.repository
                    .mark_processed(event, WebhookOutcome::Ignored, Timestamp::now())
                    .await?;
                Ok(WebhookResult::Ignored)
            }
            Err(err) => {
                let message = err.to_string();
                match self
                    .repository
                    .record_failure(event, &message, Timestamp::now())
                    .await
                {
                    Ok(attempts) => tracing::error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        attempts,
                        retryable = err.is_retryable(),
                        error = %message,
                        "webhook handler failed"
                    ),
                    Err(record_err) => tracing::error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %message,
                        record_error = %record_err,
                        "webhook handler failed and the failure could not be recorded"
                    ),
                }
                Err(err)
            }
        }
    }
}
