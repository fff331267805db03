//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, errors, state machine)
//! - `enrollment` - Access grants, expiry and grace periods
//! - `billing` - Payments, subscriptions, refunds, promo codes and pricing
//! - `webhook` - Stripe event verification and idempotent processing

pub mod billing;
pub mod enrollment;
pub mod foundation;
pub mod webhook;
