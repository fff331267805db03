//! Enrollment-specific error types.
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | Revoked | 409 |
//! | InvalidTransition | 409 |
//! | InvalidExtension | 400 |
//! | Storage | 500 |

use thiserror::Error;

use crate::domain::foundation::{DomainError, EnrollmentId, ErrorCode};

use super::EnrollmentStatus;

/// Errors raised by the access ledger.
#[derive(Debug, Clone, Error)]
pub enum EnrollmentError {
    #[error("Enrollment {0} not found")]
    NotFound(EnrollmentId),

    #[error("Enrollment {0} has been revoked and cannot be changed")]
    Revoked(EnrollmentId),

    #[error("Enrollment cannot move from {from} to {to}")]
    InvalidTransition {
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },

    #[error("Extension must be at least one day, got {0}")]
    InvalidExtension(i64),

    #[error(transparent)]
    Storage(#[from] DomainError),
}

impl EnrollmentError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EnrollmentError::NotFound(_) => ErrorCode::EnrollmentNotFound,
            EnrollmentError::Revoked(_) => ErrorCode::EnrollmentRevoked,
            EnrollmentError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            EnrollmentError::InvalidExtension(_) => ErrorCode::OutOfRange,
            EnrollmentError::Storage(err) => err.code,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

impl From<EnrollmentError> for DomainError {
    fn from(err: EnrollmentError) -> Self {
        match err {
            EnrollmentError::Storage(inner) => inner,
            other => DomainError::new(other.code(), other.to_string()),
        }
    }
}
