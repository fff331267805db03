//! Stripe adapters.
//!
//! - `StripeGateway` - live payment gateway over the REST API
//! - `MockPaymentGateway` - in-process gateway for tests and local runs

mod gateway;
mod mock_gateway;

pub use mock_gateway::MockPaymentGateway;
pub use gateway::{StripeGateway, StripeGatewayConfig};
