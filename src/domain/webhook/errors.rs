//! Webhook error types.
//!
//! The HTTP status chosen here drives the processor's redelivery: 2xx stops
//! it, 4xx tells it the request itself is bad, 5xx asks it to try again.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::enrollment::EnrollmentError;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Errors that occur during webhook verification and processing.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed more than the tolerance ago; likely a replay.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed in the future beyond clock-skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Stored purchase metadata could not be decoded.
    #[error("Invalid purchase metadata: {0}")]
    InvalidMetadata(String),

    /// The payment row may not be committed yet; worth retrying.
    #[error("Payment not found for intent {0}")]
    PaymentNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Acknowledged without doing anything. Not a failure.
    #[error("Event ignored: {0}")]
    Ignored(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl WebhookError {
    /// Returns true if a redelivery of the same event could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_)
                | WebhookError::Processing(_)
                | WebhookError::PaymentNotFound(_)
                | WebhookError::SubscriptionNotFound(_)
        )
    }

    /// Whether this error happened before any handler ran.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }

            WebhookError::InvalidTimestamp | WebhookError::ParseError(_) => {
                StatusCode::BAD_REQUEST
            }

            WebhookError::Ignored(_) => StatusCode::OK,

            // Anything raised by a handler is reported as a server error,
            // even when redelivery is unlikely to help.
            WebhookError::MissingField(_)
            | WebhookError::InvalidMetadata(_)
            | WebhookError::PaymentNotFound(_)
            | WebhookError::SubscriptionNotFound(_)
            | WebhookError::InvalidTransition(_)
            | WebhookError::Database(_)
            | WebhookError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::InvalidStateTransition => WebhookError::InvalidTransition(err.message),
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::InvalidFormat
            | ErrorCode::OutOfRange => WebhookError::InvalidMetadata(err.message),
            ErrorCode::DatabaseError => WebhookError::Database(err.message),
            _ => WebhookError::Processing(err.to_string()),
        }
    }
}

impl From<EnrollmentError> for WebhookError {
    fn from(err: EnrollmentError) -> Self {
        match err {
            EnrollmentError::Storage(inner) => inner.into(),
            EnrollmentError::InvalidTransition { .. } | EnrollmentError::Revoked(_) => {
                WebhookError::InvalidTransition(err.to_string())
            }
            other => WebhookError::Processing(other.to_string()),
        }
    }
}
