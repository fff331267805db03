//! PostgreSQL webhook event ledger.
//!
//! Both writes are single upserts on `event_id`, so a concurrent delivery of
//! the same event cannot create a second row. `processed` only ever moves
//! from false to true.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{corrupt, db_error};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::webhook::StripeEvent;
use crate::ports::{WebhookEventRecord, WebhookEventRepository, WebhookOutcome};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    event_id: String,
    event_type: String,
    payload: serde_json::Value,
    processed: bool,
    processed_at: Option<DateTime<Utc>>,
    attempt_count: i32,
    last_error: Option<String>,
    outcome: Option<String>,
    first_seen_at: DateTime<Utc>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let outcome = match row.outcome.as_deref() {
            None => None,
            Some(s) => Some(WebhookOutcome::parse(s).ok_or_else(|| corrupt("outcome", s))?),
        };

        Ok(WebhookEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            processed: row.processed,
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            attempt_count: u32::try_from(row.attempt_count)
                .map_err(|e| corrupt("attempt_count", e))?,
            last_error: row.last_error,
            outcome,
            first_seen_at: Timestamp::from_datetime(row.first_seen_at),
        })
    }
}

fn payload_of(event: &StripeEvent) -> Result<serde_json::Value, DomainError> {
    event.raw_payload().map_err(|e| {
        DomainError::new(
            ErrorCode::InternalError,
            format!("Failed to serialize event {}: {}", event.id, e),
        )
    })
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, payload, processed, processed_at,
                   attempt_count, last_error, outcome, first_seen_at
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find webhook event", e))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn mark_processed(
        &self,
        event: &StripeEvent,
        outcome: WebhookOutcome,
        at: Timestamp,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (
                event_id, event_type, payload, processed, processed_at,
                attempt_count, outcome, first_seen_at
            ) VALUES ($1, $2, $3, TRUE, $4, 1, $5, $4)
            ON CONFLICT (event_id) DO UPDATE SET
                processed = TRUE,
                processed_at = EXCLUDED.processed_at,
                attempt_count = webhook_events.attempt_count + 1,
                outcome = EXCLUDED.outcome
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(payload_of(event)?)
        .bind(at.as_datetime())
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark webhook event processed", e))?;

        Ok(())
    }

    async fn record_failure(
        &self,
        event: &StripeEvent,
        error: &str,
        at: Timestamp,
    ) -> Result<u32, DomainError> {
        let attempts: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO webhook_events (
                event_id, event_type, payload, processed, attempt_count, last_error, first_seen_at
            ) VALUES ($1, $2, $3, FALSE, 1, $4, $5)
            ON CONFLICT (event_id) DO UPDATE SET
                attempt_count = webhook_events.attempt_count + 1,
                last_error = EXCLUDED.last_error
            RETURNING attempt_count
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(payload_of(event)?)
        .bind(error)
        .bind(at.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("record webhook failure", e))?;

        u32::try_from(attempts).map_err(|e| corrupt("attempt_count", e))
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result =
            sqlx::query("DELETE FROM webhook_events WHERE processed AND first_seen_at < $1")
                .bind(cutoff.as_datetime())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("purge webhook events", e))?;

        Ok(result.rows_affected())
    }
}
