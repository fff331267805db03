//! In-memory adapters for tests and local development.
//!
//! State lives in `tokio::sync::RwLock`-guarded collections and is lost on
//! restart.

mod billing;
mod catalog;
mod enrollments;
mod webhook_events;

pub use billing::{
    InMemoryCustomerRepository, InMemoryDisputeRepository, InMemoryPaymentRepository,
    InMemoryPromoCodeRepository, InMemoryRefundRepository, InMemorySubscriptionRepository,
};
pub use catalog::{InMemoryReminderScheduler, StaticCatalog};
pub use enrollments::InMemoryEnrollmentRepository;
pub use webhook_events::InMemoryWebhookEventRepository;
