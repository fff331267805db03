//! Notifier port - best-effort user and operator notifications.
//!
//! Callers never fail because a notification could not be delivered. Wrap
//! an implementation in `adapters::notifications::SpawningNotifier` to take
//! delivery off the request path entirely.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::enrollment::ProductRef;
use crate::domain::foundation::{DomainError, EnrollmentId, PaymentId, Timestamp, UserId};

/// A notification trigger and its template data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", rename_all = "camelCase")]
pub enum Notification {
    EnrollmentConfirmation {
        user_id: UserId,
        /// Product display key (`course:rust-101`) or gift summary.
        product: String,
        enrollment_id: Option<EnrollmentId>,
    },
    SubscriptionCancellation {
        user_id: UserId,
        subscription_ref: String,
    },
    RefundConfirmation {
        user_id: UserId,
        payment_id: PaymentId,
        amount_refunded: i64,
        currency: String,
        full: bool,
    },
    /// Sent to the operations mailbox, not to a user.
    DisputeNotification {
        dispute_ref: String,
        charge_ref: String,
        amount: i64,
        currency: String,
        reason: String,
    },
    PaymentFailure {
        user_id: UserId,
        payment_id: PaymentId,
        reason: String,
    },
    ExpirationWarning {
        user_id: UserId,
        enrollment_id: EnrollmentId,
        product: ProductRef,
        days_before: i64,
        expires_at: Timestamp,
    },
}

impl Notification {
    /// Trigger name used by templates and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::EnrollmentConfirmation { .. } => "enrollmentConfirmation",
            Notification::SubscriptionCancellation { .. } => "subscriptionCancellation",
            Notification::RefundConfirmation { .. } => "refundConfirmation",
            Notification::DisputeNotification { .. } => "disputeNotification",
            Notification::PaymentFailure { .. } => "paymentFailure",
            Notification::ExpirationWarning { .. } => "expirationWarning",
        }
    }

    /// The user the notification is about, if it targets one.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Notification::EnrollmentConfirmation { user_id, .. }
            | Notification::SubscriptionCancellation { user_id, .. }
            | Notification::RefundConfirmation { user_id, .. }
            | Notification::PaymentFailure { user_id, .. }
            | Notification::ExpirationWarning { user_id, .. } => Some(user_id),
            Notification::DisputeNotification { .. } => None,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), DomainError>;
}
