//! Expiration reminders queued in PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, db_error};
use crate::domain::enrollment::ProductRef;
use crate::domain::foundation::{DomainError, EnrollmentId, Timestamp, UserId};
use crate::ports::{ReminderScheduler, ScheduledReminder};

pub struct PostgresReminderScheduler {
    pool: PgPool,
}

impl PostgresReminderScheduler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReminderRow {
    enrollment_id: Uuid,
    days_before: i32,
    user_id: String,
    product_kind: String,
    product_key: String,
    send_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<ReminderRow> for ScheduledReminder {
    type Error = DomainError;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        Ok(ScheduledReminder {
            enrollment_id: EnrollmentId::from_uuid(row.enrollment_id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            product: ProductRef::from_parts(&row.product_kind, &row.product_key)
                .map_err(|e| corrupt("product", e))?,
            days_before: i64::from(row.days_before),
            send_at: Timestamp::from_datetime(row.send_at),
            expires_at: Timestamp::from_datetime(row.expires_at),
        })
    }
}

#[async_trait]
impl ReminderScheduler for PostgresReminderScheduler {
    async fn replace_for_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
        reminders: Vec<ScheduledReminder>,
    ) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        sqlx::query("DELETE FROM expiration_reminders WHERE enrollment_id = $1")
            .bind(enrollment_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("clear reminders", e))?;

        for reminder in &reminders {
            let days_before = i32::try_from(reminder.days_before).map_err(|_| {
                DomainError::validation("days_before", "reminder offset out of range")
            })?;
            sqlx::query(
                r#"
                INSERT INTO expiration_reminders (
                    enrollment_id, days_before, user_id, product_kind, product_key,
                    send_at, expires_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(reminder.enrollment_id.as_uuid())
            .bind(days_before)
            .bind(reminder.user_id.as_str())
            .bind(reminder.product.kind())
            .bind(reminder.product.key())
            .bind(reminder.send_at.as_datetime())
            .bind(reminder.expires_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("schedule reminder", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit reminders", e))?;

        Ok(())
    }

    async fn cancel_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM expiration_reminders WHERE enrollment_id = $1")
            .bind(enrollment_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("cancel reminders", e))?;

        Ok(())
    }

    async fn take_due(&self, now: Timestamp) -> Result<Vec<ScheduledReminder>, DomainError> {
        // Deleting and returning in one statement keeps two sweepers from
        // sending the same reminder.
        let rows: Vec<ReminderRow> = sqlx::query_as(
            r#"
            DELETE FROM expiration_reminders
            WHERE send_at <= $1
            RETURNING enrollment_id, days_before, user_id, product_kind, product_key,
                      send_at, expires_at
            "#,
        )
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("take due reminders", e))?;

        let mut due = rows
            .into_iter()
            .map(ScheduledReminder::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        due.sort_by_key(|r| r.send_at);
        Ok(due)
    }
}
