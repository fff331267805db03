//! WebhookEventRepository port - ledger of received Stripe events.
//!
//! The `processed` flag is the only thing that stops an event from being
//! applied again. Failed attempts stay unprocessed so redelivery retries
//! them, with the attempt count and last error kept for diagnosis.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::webhook::StripeEvent;

/// How a processed event was disposed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A handler applied it.
    Handled,
    /// No handler applies; acknowledged as success.
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Handled => "handled",
            WebhookOutcome::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "handled" => Some(WebhookOutcome::Handled),
            "ignored" => Some(WebhookOutcome::Ignored),
            _ => None,
        }
    }
}

/// Ledger entry for one external event id.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    /// Stripe event id (`evt_...`).
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<Timestamp>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub outcome: Option<WebhookOutcome>,
    pub first_seen_at: Timestamp,
}

/// Result of webhook processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookResult {
    /// A handler ran successfully.
    Processed,
    /// No handler for this type; recorded and acknowledged.
    Ignored,
    /// Seen and processed before; nothing was done.
    AlreadyProcessed,
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Upserts the record with `processed = true`.
    ///
    /// The last writer wins; concurrent deliveries both end up processed.
    async fn mark_processed(
        &self,
        event: &StripeEvent,
        outcome: WebhookOutcome,
        at: Timestamp,
    ) -> Result<(), DomainError>;

    /// Upserts the record, increments its attempt count and stores `error`.
    ///
    /// Never clears `processed` on a record that already has it. Returns
    /// the new attempt count.
    async fn record_failure(
        &self,
        event: &StripeEvent,
        error: &str,
        at: Timestamp,
    ) -> Result<u32, DomainError>;

    /// Deletes processed records first seen before `cutoff`.
    ///
    /// Unprocessed records are kept so failures stay visible.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_event_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn WebhookEventRepository) {}
    }

    #[test]
    fn outcome_round_trips_through_storage_string() {
        for outcome in [WebhookOutcome::Handled, WebhookOutcome::Ignored] {
            assert_eq!(WebhookOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(WebhookOutcome::parse("failed"), None);
    }
}
