//! Mock payment gateway for testing.
//!
//! Supports:
//! - Deterministic intent and subscription ids
//! - Error injection for the next call
//! - Call tracking

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::ports::{
    PaymentError, PaymentGateway, PaymentIntentHandle, PaymentIntentRequest, SubscriptionHandle,
    SubscriptionRequest,
};

/// Mock payment gateway for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentGateway::new();
/// mock.fail_next(PaymentError::card_declined("Test decline"));
/// let result = mock.create_payment_intent(request).await;
/// assert!(result.is_err());
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    counter: u32,
    next_error: Option<PaymentError>,
    intents: Vec<PaymentIntentRequest>,
    subscriptions: Vec<SubscriptionRequest>,
    customers: Vec<(UserId, String)>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next gateway call fail with `error`.
    pub fn fail_next(&self, error: PaymentError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    pub fn intent_requests(&self) -> Vec<PaymentIntentRequest> {
        self.inner.lock().unwrap().intents.clone()
    }

    pub fn subscription_requests(&self) -> Vec<SubscriptionRequest> {
        self.inner.lock().unwrap().subscriptions.clone()
    }

    pub fn customers_created(&self) -> usize {
        self.inner.lock().unwrap().customers.len()
    }

    fn next_id(&self, prefix: &str) -> Result<String, PaymentError> {
        let mut state = self.inner.lock().unwrap();
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }
        state.counter += 1;
        Ok(format!("{}_mock_{}", prefix, state.counter))
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(
        &self,
        user_id: &UserId,
        email: &str,
    ) -> Result<String, PaymentError> {
        let id = self.next_id("cus")?;
        self.inner
            .lock()
            .unwrap()
            .customers
            .push((user_id.clone(), email.to_string()));
        Ok(id)
    }

    async fn create_payment_intent(
        &self,
        request: PaymentIntentRequest,
    ) -> Result<PaymentIntentHandle, PaymentError> {
        let id = self.next_id("pi")?;
        self.inner.lock().unwrap().intents.push(request);
        Ok(PaymentIntentHandle {
            client_secret: format!("{}_secret", id),
            id,
        })
    }

    async fn create_subscription(
        &self,
        request: SubscriptionRequest,
    ) -> Result<SubscriptionHandle, PaymentError> {
        let id = self.next_id("sub")?;
        self.inner.lock().unwrap().subscriptions.push(request);
        Ok(SubscriptionHandle {
            client_secret: Some(format!("{}_secret", id)),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn intent_request() -> PaymentIntentRequest {
        PaymentIntentRequest {
            amount: 9999,
            currency: "usd".to_string(),
            customer_ref: None,
            metadata: HashMap::new(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn issues_sequential_ids_and_records_requests() {
        let mock = MockPaymentGateway::new();
        let first = mock.create_payment_intent(intent_request()).await.unwrap();
        let second = mock.create_payment_intent(intent_request()).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.client_secret.starts_with(&first.id));
        assert_eq!(mock.intent_requests().len(), 2);
    }

    #[tokio::test]
    async fn injected_error_fails_only_the_next_call() {
        let mock = MockPaymentGateway::new();
        mock.fail_next(PaymentError::card_declined("declined"));

        assert!(mock.create_payment_intent(intent_request()).await.is_err());
        assert!(mock.create_payment_intent(intent_request()).await.is_ok());
        assert_eq!(mock.intent_requests().len(), 1);
    }
}
