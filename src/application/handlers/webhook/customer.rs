//! Customer mirror handlers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{CustomerProfile, USER_ID_KEY};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::webhook::payloads::{CustomerObject, PaymentMethodObject};
use crate::domain::webhook::{StripeEvent, StripeEventType, WebhookError, WebhookEventHandler};
use crate::ports::CustomerRepository;

pub struct CustomerHandler {
    customers: Arc<dyn CustomerRepository>,
}

impl CustomerHandler {
    pub fn new(customers: Arc<dyn CustomerRepository>) -> Self {
        Self { customers }
    }

    async fn profile(&self, customer_ref: &str, now: Timestamp) -> Result<CustomerProfile, WebhookError> {
        Ok(self
            .customers
            .find_by_ref(customer_ref)
            .await?
            .unwrap_or_else(|| CustomerProfile::new(customer_ref, now)))
    }

    async fn customer_changed(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let object: CustomerObject = event.object()?;
        let now = Timestamp::now();
        let mut profile = self.profile(&object.id, now).await?;

        profile.email = object.email.or(profile.email);
        profile.name = object.name.or(profile.name);
        if let Some(user_id) = object
            .metadata
            .get(USER_ID_KEY)
            .and_then(|raw| UserId::new(raw.as_str()).ok())
        {
            profile.user_id = Some(user_id);
        }
        if let Some(method) = object
            .invoice_settings
            .and_then(|settings| settings.default_payment_method)
        {
            profile.default_payment_method = Some(method);
        }
        profile.updated_at = now;

        self.customers.upsert(&profile).await?;
        tracing::debug!(customer_ref = %profile.customer_ref, "customer mirrored");
        Ok(())
    }

    async fn payment_method_attached(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let method: PaymentMethodObject = event.object()?;
        let Some(customer_ref) = method.customer.as_deref() else {
            return Err(WebhookError::Ignored(format!(
                "payment method {} has no customer",
                method.id
            )));
        };
        let now = Timestamp::now();
        let mut profile = self.profile(customer_ref, now).await?;

        profile.default_payment_method = Some(method.id.clone());
        if let Some(card) = method.card {
            profile.card_brand = Some(card.brand);
            profile.card_last4 = Some(card.last4);
        }
        profile.updated_at = now;

        self.customers.upsert(&profile).await?;
        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for CustomerHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::CustomerCreated,
            StripeEventType::CustomerUpdated,
            StripeEventType::PaymentMethodAttached,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        match event.parsed_type() {
            StripeEventType::CustomerCreated | StripeEventType::CustomerUpdated => {
                self.customer_changed(event).await
            }
            StripeEventType::PaymentMethodAttached => self.payment_method_attached(event).await,
            _ => Err(WebhookError::Ignored(event.event_type.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCustomerRepository;
    use crate::domain::webhook::StripeEventBuilder;
    use serde_json::json;

    fn handler() -> (CustomerHandler, Arc<InMemoryCustomerRepository>) {
        let customers = Arc::new(InMemoryCustomerRepository::new());
        (CustomerHandler::new(customers.clone()), customers)
    }

    #[tokio::test]
    async fn customer_created_links_user_from_metadata() {
        let (handler, customers) = handler();
        let event = StripeEventBuilder::new("customer.created")
            .object(json!({
                "id": "cus_1",
                "email": "ada@example.com",
                "name": "Ada",
                "metadata": {"user_id": "user-1"}
            }))
            .build();

        handler.handle(&event).await.unwrap();

        let user = UserId::new("user-1").unwrap();
        let profile = customers.find_by_user(&user).await.unwrap().unwrap();
        assert_eq!(profile.customer_ref, "cus_1");
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn update_keeps_fields_the_event_omits() {
        let (handler, customers) = handler();
        handler
            .handle(
                &StripeEventBuilder::new("customer.created")
                    .object(json!({"id": "cus_1", "email": "ada@example.com"}))
                    .build(),
            )
            .await
            .unwrap();
        handler
            .handle(
                &StripeEventBuilder::new("customer.updated")
                    .object(json!({"id": "cus_1", "name": "Ada L."}))
                    .build(),
            )
            .await
            .unwrap();

        let profile = customers.find_by_ref("cus_1").await.unwrap().unwrap();
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
        assert_eq!(profile.name.as_deref(), Some("Ada L."));
    }

    #[tokio::test]
    async fn attached_card_is_mirrored() {
        let (handler, customers) = handler();
        let event = StripeEventBuilder::new("payment_method.attached")
            .object(json!({
                "id": "pm_1",
                "customer": "cus_1",
                "card": {"brand": "visa", "last4": "4242"}
            }))
            .build();

        handler.handle(&event).await.unwrap();

        let profile = customers.find_by_ref("cus_1").await.unwrap().unwrap();
        assert_eq!(profile.default_payment_method.as_deref(), Some("pm_1"));
        assert_eq!(profile.card_last4.as_deref(), Some("4242"));
    }

    #[tokio::test]
    async fn detached_payment_method_is_ignored() {
        let (handler, _) = handler();
        let event = StripeEventBuilder::new("payment_method.attached")
            .object(json!({"id": "pm_2"}))
            .build();
        let err = handler.handle(&event).await.unwrap_err();
        assert!(matches!(err, WebhookError::Ignored(_)));
    }
}
