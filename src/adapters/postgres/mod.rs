//! PostgreSQL adapters - sqlx implementations of the persistence ports.
//!
//! - `PostgresEnrollmentRepository` - enrollments, one active row per product
//! - `PostgresPaymentRepository` / `PostgresSubscriptionRepository`
//! - `PostgresRefundRepository` / `PostgresDisputeRepository`
//! - `PostgresCustomerRepository` / `PostgresPromoCodeRepository`
//! - `PostgresWebhookEventRepository` - webhook idempotency ledger
//! - `PostgresReminderScheduler` - pending expiration warnings
//! - `PostgresCatalogReader` - course and program prices

mod billing;
mod catalog;
mod enrollment_repository;
mod reminder_scheduler;
mod webhook_event_repository;

pub use billing::{
    PostgresCustomerRepository, PostgresDisputeRepository, PostgresPaymentRepository,
    PostgresPromoCodeRepository, PostgresRefundRepository, PostgresSubscriptionRepository,
};
pub use catalog::PostgresCatalogReader;
pub use enrollment_repository::PostgresEnrollmentRepository;
pub use reminder_scheduler::PostgresReminderScheduler;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Wraps a sqlx failure as a retryable database error.
pub(crate) fn db_error(action: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, err))
}

/// A stored value that no longer decodes.
pub(crate) fn corrupt(column: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, err),
    )
}

/// Whether `err` is a violation of the named unique constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}
