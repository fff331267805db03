//! Stripe payment gateway adapter.
//!
//! Implements `PaymentGateway` over Stripe's form-encoded REST API.
//!
//! # Security
//!
//! - The secret key is held as `secrecy::SecretString` and only exposed
//!   when building the basic-auth header
//! - Every create call accepts an idempotency key so a retried request
//!   cannot create a second intent
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeGatewayConfig::new(api_key);
//! let gateway = StripeGateway::new(config);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::UserId;
use crate::ports::{
    PaymentError, PaymentErrorCode, PaymentGateway, PaymentIntentHandle, PaymentIntentRequest,
    SubscriptionHandle, SubscriptionRequest,
};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeGatewayConfig {
    /// Secret API key (`sk_live_...` or `sk_test_...`).
    api_key: SecretString,

    /// Base URL for the API (default: https://api.stripe.com).
    api_base_url: String,

    timeout: Duration,
}

impl StripeGatewayConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Points the adapter at a different host (stripe-mock, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Stripe implementation of `PaymentGateway`.
pub struct StripeGateway {
    config: StripeGatewayConfig,
    http_client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeGatewayConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http_client,
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let mut request = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::network(format!("Stripe request timed out: {}", e))
            } else {
                PaymentError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = error_from_response(status.as_u16(), &body);
            tracing::error!(
                path,
                status = status.as_u16(),
                code = %err.code,
                provider_code = err.provider_code.as_deref().unwrap_or(""),
                "Stripe request failed"
            );
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeObjectId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    #[serde(default)]
    latest_invoice: Option<StripeInvoice>,
}

#[derive(Debug, Deserialize)]
struct StripeInvoice {
    #[serde(default)]
    payment_intent: Option<StripeInvoiceIntent>,
}

#[derive(Debug, Deserialize)]
struct StripeInvoiceIntent {
    #[serde(default)]
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Flattens metadata into Stripe's `metadata[key]` form fields, sorted so
/// the request body is deterministic.
fn metadata_params(metadata: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = metadata
        .iter()
        .map(|(k, v)| (format!("metadata[{}]", k), v.clone()))
        .collect();
    params.sort();
    params
}

fn error_from_response(status: u16, body: &str) -> PaymentError {
    let parsed = serde_json::from_str::<StripeErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .unwrap_or_else(|| format!("Stripe API error (HTTP {})", status));

    let code = match status {
        400 | 404 => PaymentErrorCode::InvalidRequest,
        401 | 403 => PaymentErrorCode::AuthenticationError,
        402 => PaymentErrorCode::CardDeclined,
        429 => PaymentErrorCode::RateLimitExceeded,
        _ => PaymentErrorCode::ProviderError,
    };

    let mut err = PaymentError::new(code, message);
    if let Some(provider_code) = parsed.and_then(|e| e.error.code) {
        err = err.with_provider_code(provider_code);
    }
    err
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        user_id: &UserId,
        email: &str,
    ) -> Result<String, PaymentError> {
        let params = vec![
            ("email".to_string(), email.to_string()),
            ("metadata[user_id]".to_string(), user_id.to_string()),
        ];
        let customer: StripeObjectId = self
            .post("/v1/customers", &params, Some(&format!("customer-{}", user_id)))
            .await?;
        tracing::info!(user_id = %user_id, customer_ref = %customer.id, "Stripe customer created");
        Ok(customer.id)
    }

    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, PaymentError> {
        let mut params = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(customer) = &request.customer_ref {
            params.push(("customer".to_string(), customer.clone()));
        }
        params.extend(metadata_params(&request.metadata));

        let intent: StripePaymentIntent = self
            .post(
                "/v1/payment_intents",
                &params,
                request.idempotency_key.as_deref(),
            )
            .await?;
        Ok(PaymentIntentHandle {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionHandle, PaymentError> {
        let mut params = vec![
            ("customer".to_string(), request.customer_ref.clone()),
            ("items[0][price]".to_string(), request.price_ref.clone()),
            (
                "payment_behavior".to_string(),
                "default_incomplete".to_string(),
            ),
            (
                "expand[]".to_string(),
                "latest_invoice.payment_intent".to_string(),
            ),
        ];
        params.extend(metadata_params(&request.metadata));

        let subscription: StripeSubscription = self
            .post(
                "/v1/subscriptions",
                &params,
                request.idempotency_key.as_deref(),
            )
            .await?;
        let client_secret = subscription
            .latest_invoice
            .and_then(|inv| inv.payment_intent)
            .and_then(|pi| pi.client_secret);
        Ok(SubscriptionHandle {
            id: subscription.id,
            client_secret,
        })
    }
}
