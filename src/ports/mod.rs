//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `EnrollmentRepository` - Access grants
//! - `PaymentRepository` / `SubscriptionRepository` - Processor mirrors
//! - `RefundRepository` / `DisputeRepository` / `CustomerRepository`
//! - `PromoCodeRepository` - Promo code lookup and redemption counting
//! - `WebhookEventRepository` - Stripe webhook idempotency ledger
//! - `ReminderScheduler` - Pending expiration warnings
//!
//! ## External Service Ports
//!
//! - `PaymentGateway` - Payment intents and subscriptions
//! - `CatalogReader` - Product prices
//! - `Notifier` - Best-effort notifications

mod catalog_reader;
mod customer_repository;
mod enrollment_repository;
mod notifier;
mod payment_gateway;
mod payment_repository;
mod promo_code_repository;
mod refund_repository;
mod reminder_scheduler;
mod subscription_repository;
mod webhook_event_repository;

pub use catalog_reader::{CatalogPrice, CatalogReader, MembershipPlan};
pub use customer_repository::CustomerRepository;
pub use enrollment_repository::EnrollmentRepository;
pub use notifier::{Notification, Notifier};
pub use payment_gateway::{
    PaymentError, PaymentErrorCode, PaymentGateway, PaymentIntentHandle, PaymentIntentRequest,
    SubscriptionHandle, SubscriptionRequest,
};
pub use payment_repository::PaymentRepository;
pub use promo_code_repository::PromoCodeRepository;
pub use refund_repository::{DisputeRepository, RefundRepository};
pub use reminder_scheduler::{ReminderScheduler, ScheduledReminder};
pub use subscription_repository::SubscriptionRepository;
pub use webhook_event_repository::{
    WebhookEventRecord, WebhookEventRepository, WebhookOutcome, WebhookResult,
};
