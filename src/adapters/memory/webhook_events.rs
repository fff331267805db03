//! In-memory webhook event ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::webhook::StripeEvent;
use crate::ports::{WebhookEventRecord, WebhookEventRepository, WebhookOutcome};

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<String, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_record(event: &StripeEvent, at: Timestamp) -> WebhookEventRecord {
        WebhookEventRecord {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            payload: event.raw_payload().unwrap_or(serde_json::Value::Null),
            processed: false,
            processed_at: None,
            attempt_count: 0,
            last_error: None,
            outcome: None,
            first_seen_at: at,
        }
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.records.read().await.get(event_id).cloned())
    }

    async fn mark_processed(
        &self,
        event: &StripeEvent,
        outcome: WebhookOutcome,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .entry(event.id.clone())
            .or_insert_with(|| Self::fresh_record(event, at));
        record.processed = true;
        record.processed_at = Some(at);
        record.attempt_count += 1;
        record.outcome = Some(outcome);
        Ok(())
    }

    async fn record_failure(
        &self,
        event: &StripeEvent,
        error: &str,
        at: Timestamp,
    ) -> Result<u32, DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .entry(event.id.clone())
            .or_insert_with(|| Self::fresh_record(event, at));
        record.attempt_count += 1;
        record.last_error = Some(error.to_string());
        Ok(record.attempt_count)
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !(r.processed && r.first_seen_at.is_before(&cutoff)));
        Ok((before - records.len()) as u64)
    }
}
