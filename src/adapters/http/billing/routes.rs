//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    check_access, create_purchase, handle_stripe_webhook, list_enrollments, quote_purchase,
    BillingAppState,
};

/// Purchase routes (require `X-User-Id`).
///
/// - `POST /purchases` - Start a payment or subscription
/// - `POST /purchases/quote` - Price a purchase without charging
pub fn purchase_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/purchases", post(create_purchase))
        .route("/purchases/quote", post(quote_purchase))
}

/// Access routes (require `X-User-Id`).
///
/// - `GET /access/:product_kind/:product_id` - Access check for the caller
/// - `GET /enrollments` - The caller's enrollment history
pub fn access_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/access/:product_kind/:product_id", get(check_access))
        .route("/enrollments", get(list_enrollments))
}

/// Stripe webhook routes. No user auth; the signature is verified instead.
///
/// - `POST /webhooks/stripe` - Handle Stripe webhooks
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/webhooks/stripe", post(handle_stripe_webhook))
}

/// Every billing route, ready to be given state.
///
/// # Example
///
/// ```ignore
/// let app = billing_router().with_state(state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .merge(purchase_routes())
        .merge(access_routes())
        .merge(webhook_routes())
}
