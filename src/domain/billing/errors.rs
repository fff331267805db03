//! Purchase-side error taxonomy.
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | AlreadyEnrolled / AlreadySubscribed | 409 |
//! | CourseNotFound / ProductNotFound / EnrollmentNotFound | 404 |
//! | InvalidRequest | 400 |
//! | PaymentCreationFailed / SubscriptionCreationFailed | 502 |
//! | Storage | 500 |
//!
//! Promo code problems are never errors; see `PromoValidation`.

use thiserror::Error;

use crate::domain::enrollment::EnrollmentError;
use crate::domain::foundation::{DomainError, EnrollmentId, ErrorCode, ValidationError};

#[derive(Debug, Clone, Error)]
pub enum BillingError {
    #[error("You already have access to {0}")]
    AlreadyEnrolled(String),

    #[error("You already have an active {0} membership")]
    AlreadySubscribed(String),

    #[error("Course {0} not found")]
    CourseNotFound(String),

    #[error("Product {0} not found")]
    ProductNotFound(String),

    #[error("Enrollment {0} not found")]
    EnrollmentNotFound(EnrollmentId),

    #[error("Invalid purchase request: {0}")]
    InvalidRequest(String),

    #[error("Payment could not be created: {0}")]
    PaymentCreationFailed(String),

    #[error("Subscription could not be created: {0}")]
    SubscriptionCreationFailed(String),

    #[error(transparent)]
    Storage(#[from] DomainError),
}

impl BillingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::AlreadyEnrolled(_) => ErrorCode::AlreadyEnrolled,
            BillingError::AlreadySubscribed(_) => ErrorCode::AlreadySubscribed,
            BillingError::CourseNotFound(_) => ErrorCode::CourseNotFound,
            BillingError::ProductNotFound(_) => ErrorCode::ProductNotFound,
            BillingError::EnrollmentNotFound(_) => ErrorCode::EnrollmentNotFound,
            BillingError::InvalidRequest(_) => ErrorCode::ValidationFailed,
            BillingError::PaymentCreationFailed(_) | BillingError::SubscriptionCreationFailed(_) => {
                ErrorCode::PaymentProviderError
            }
            BillingError::Storage(err) => err.code,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        BillingError::InvalidRequest(err.to_string())
    }
}

impl From<EnrollmentError> for BillingError {
    fn from(err: EnrollmentError) -> Self {
        match err {
            EnrollmentError::NotFound(id) => BillingError::EnrollmentNotFound(id),
            other => BillingError::Storage(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_failures_are_retryable() {
        assert!(BillingError::PaymentCreationFailed("timeout".into()).is_retryable());
        assert!(!BillingError::AlreadyEnrolled("course:rust-101".into()).is_retryable());
    }

    #[test]
    fn validation_errors_become_invalid_request() {
        let err: BillingError = ValidationError::empty_field("course_id").into();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(err.to_string().contains("course_id"));
    }
}
