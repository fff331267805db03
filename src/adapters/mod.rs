//! Adapters - Implementations of port interfaces.
//!
//! - `http` - Axum routes for purchases, access checks and webhooks
//! - `memory` - In-memory repositories for tests and local runs
//! - `notifications` - Resend email notifier and the detaching wrapper
//! - `postgres` - sqlx repositories
//! - `stripe` - Stripe payment gateway

pub mod http;
pub mod memory;
pub mod notifications;
pub mod postgres;
pub mod stripe;
