//! Email notifier backed by the Resend HTTP API.
//!
//! Recipients are looked up in the customer mirror by user id. Dispute
//! alerts go to the configured operations mailbox. Templates are plain text;
//! presentation lives with the marketing site.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{CustomerRepository, Notification, Notifier};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct ResendConfig {
    pub api_key: SecretString,
    /// Formatted `Name <address>` sender.
    pub from: String,
    pub operations_address: String,
    pub api_url: String,
}

impl ResendConfig {
    pub fn new(api_key: SecretString, from: impl Into<String>, ops: impl Into<String>) -> Self {
        Self {
            api_key,
            from: from.into(),
            operations_address: ops.into(),
            api_url: RESEND_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: Vec<String>,
    subject: String,
    text: String,
}

pub struct ResendNotifier {
    config: ResendConfig,
    customers: Arc<dyn CustomerRepository>,
    http_client: reqwest::Client,
}

impl ResendNotifier {
    pub fn new(config: ResendConfig, customers: Arc<dyn CustomerRepository>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            customers,
            http_client,
        }
    }

    async fn recipient(&self, notification: &Notification) -> Result<Option<String>, DomainError> {
        match notification.user_id() {
            None => Ok(Some(self.config.operations_address.clone())),
            Some(user_id) => Ok(self
                .customers
                .find_by_user(user_id)
                .await?
                .and_then(|profile| profile.email)),
        }
    }
}

/// Subject and body for a notification.
fn render(notification: &Notification) -> (String, String) {
    match notification {
        Notification::EnrollmentConfirmation { product, .. } => (
            "You're enrolled".to_string(),
            format!("Your purchase of {} is confirmed. Enjoy!", product),
        ),
        Notification::SubscriptionCancellation { .. } => (
            "Your membership has been canceled".to_string(),
            "Your membership has ended. You can resubscribe at any time.".to_string(),
        ),
        Notification::RefundConfirmation {
            amount_refunded,
            currency,
            full,
            ..
        } => (
            "Your refund is on its way".to_string(),
            format!(
                "We refunded {} {}{}.",
                format_amount(*amount_refunded),
                currency.to_uppercase(),
                if *full { " in full" } else { "" }
            ),
        ),
        Notification::DisputeNotification {
            dispute_ref,
            charge_ref,
            amount,
            currency,
            reason,
        } => (
            format!("Dispute {} opened", dispute_ref),
            format!(
                "Charge {} is disputed for {} {} (reason: {}).",
                charge_ref,
                format_amount(*amount),
                currency.to_uppercase(),
                reason
            ),
        ),
        Notification::PaymentFailure { reason, .. } => (
            "Your payment didn't go through".to_string(),
            format!("We couldn't process your payment: {}.", reason),
        ),
        Notification::ExpirationWarning {
            product,
            days_before,
            ..
        } => (
            format!("Your access expires in {} day(s)", days_before),
            format!(
                "Your access to {} expires in {} day(s). Extend it to keep learning.",
                product, days_before
            ),
        ),
    }
}

fn format_amount(minor: i64) -> String {
    format!("{}.{:02}", minor / 100, (minor % 100).abs())
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, notification: Notification) -> Result<(), DomainError> {
        let Some(to) = self.recipient(&notification).await? else {
            tracing::debug!(
                trigger = notification.name(),
                "no email on file; notification skipped"
            );
            return Ok(());
        };

        let (subject, text) = render(&notification);
        let email = OutgoingEmail {
            from: &self.config.from,
            to: vec![to],
            subject,
            text,
        };

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&email)
            .send()
            .await
            .map_err(|e| DomainError::new(ErrorCode::NotificationFailed, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::new(
                ErrorCode::NotificationFailed,
                format!("Resend returned {}: {}", status, body),
            ));
        }

        tracing::info!(trigger = notification.name(), "notification email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PaymentId, UserId};

    #[test]
    fn amounts_render_in_major_units() {
        assert_eq!(format_amount(9999), "99.99");
        assert_eq!(format_amount(5000), "50.00");
        assert_eq!(format_amount(7), "0.07");
    }

    #[test]
    fn refund_email_mentions_full_refund() {
        let (subject, body) = render(&Notification::RefundConfirmation {
            user_id: UserId::new("user-1").unwrap(),
            payment_id: PaymentId::new(),
            amount_refunded: 9999,
            currency: "usd".to_string(),
            full: true,
        });
        assert!(subject.contains("refund"));
        assert_eq!(body, "We refunded 99.99 USD in full.");
    }

    #[tokio::test]
    async fn dispute_alerts_go_to_operations() {
        let notifier = ResendNotifier::new(
            ResendConfig::new(
                SecretString::new("re_test".to_string()),
                "Courses <noreply@example.com>",
                "ops@example.com",
            ),
            Arc::new(crate::adapters::memory::InMemoryCustomerRepository::new()),
        );
        let to = notifier
            .recipient(&Notification::DisputeNotification {
                dispute_ref: "dp_1".to_string(),
                charge_ref: "ch_1".to_string(),
                amount: 100,
                currency: "usd".to_string(),
                reason: "fraudulent".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(to.as_deref(), Some("ops@example.com"));
    }
}
