//! HTTP adapter for billing endpoints.
//!
//! - `POST /purchases` - Start a payment or subscription
//! - `POST /purchases/quote` - Price a purchase
//! - `GET /access/:product_kind/:product_id` - Access check for the caller
//! - `GET /enrollments` - The caller's enrollments
//! - `POST /webhooks/stripe` - Handle Stripe webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState, WebhookApiError};
pub use routes::{access_routes, billing_router, purchase_routes, webhook_routes};
