//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, state machines and the error vocabulary used by
//! the billing, enrollment and webhook modules.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{CourseId, DisputeId, EnrollmentId, PaymentId, RefundId, SubscriptionId, UserId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
