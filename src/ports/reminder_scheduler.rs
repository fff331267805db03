//! Reminder scheduler port - durable queue of expiration warnings.
//!
//! The ledger replaces an enrollment's reminders whenever its expiry moves
//! and cancels them when access is revoked. A periodic sweep drains the due
//! ones and hands them to the notifier.

use async_trait::async_trait;

use crate::domain::enrollment::ProductRef;
use crate::domain::foundation::{DomainError, EnrollmentId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReminder {
    pub enrollment_id: EnrollmentId,
    pub user_id: UserId,
    pub product: ProductRef,
    pub days_before: i64,
    pub send_at: Timestamp,
    pub expires_at: Timestamp,
}

#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    /// Drops any pending reminders of the enrollment and stores `reminders`.
    async fn replace_for_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
        reminders: Vec<ScheduledReminder>,
    ) -> Result<(), DomainError>;

    async fn cancel_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<(), DomainError>;

    /// Removes and returns reminders with `send_at <= now`.
    async fn take_due(&self, now: Timestamp) -> Result<Vec<ScheduledReminder>, DomainError>;
}
