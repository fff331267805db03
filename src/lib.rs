//! Coursepay - course payment and enrollment reconciliation
//!
//! Takes purchases of courses, programs and memberships through Stripe,
//! reconciles the processor's webhooks into local payment, subscription and
//! refund records, and keeps the enrollment ledger that answers "does this
//! user have access to this product right now".
//!
//! The crate follows a ports-and-adapters layout:
//!
//! - [`domain`] - value types, aggregates and the webhook verifier/processor
//! - [`ports`] - traits for persistence, the payment gateway and notifications
//! - [`application`] - purchase orchestration, webhook handlers, access ledger
//! - [`adapters`] - PostgreSQL, Stripe, Resend, HTTP and in-memory adapters
//! - [`config`] - environment-driven configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
