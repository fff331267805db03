//! `customer.subscription.*` handlers.

use std::sync::Arc;

use async_trait::async_trait;

use super::payment_intent::notify;
use crate::application::handlers::enrollment::{AccessLedger, GrantAccess};
use crate::domain::billing::{
    PurchaseContext, Subscription, SubscriptionSnapshot, SubscriptionStatus,
};
use crate::domain::enrollment::{AccessOrigin, ProductRef};
use crate::domain::foundation::{Timestamp, ValidationError};
use crate::domain::webhook::payloads::SubscriptionObject;
use crate::domain::webhook::{StripeEvent, StripeEventType, WebhookError, WebhookEventHandler};
use crate::ports::{Notification, Notifier, SubscriptionRepository};

pub struct SubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<AccessLedger>,
    notifier: Arc<dyn Notifier>,
}

impl SubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        ledger: Arc<AccessLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            subscriptions,
            ledger,
            notifier,
        }
    }

    /// Loads the mirror for `object`, or builds one from its metadata when
    /// this is the first event seen for it.
    async fn resolve(
        &self,
        event: &StripeEvent,
        object: &SubscriptionObject,
        now: Timestamp,
    ) -> Result<Subscription, WebhookError> {
        let snapshot = snapshot_from(event, object)?;
        match self.subscriptions.find_by_ref(&object.id).await? {
            Some(mut existing) => {
                existing.apply_snapshot(snapshot, now);
                Ok(existing)
            }
            None => {
                let context = PurchaseContext::from_metadata(&object.metadata)
                    .map_err(|e| WebhookError::InvalidMetadata(e.to_string()))?;
                let kind = context.purchase_type();
                let PurchaseContext::Membership { user_id, tier } = context else {
                    return Err(WebhookError::InvalidMetadata(format!(
                        "subscription {} carries a {} purchase",
                        object.id, kind
                    )));
                };
                Ok(Subscription::from_snapshot(user_id, tier, snapshot, now))
            }
        }
    }

    /// Grants membership access; `true` when this call created the enrollment.
    async fn grant(&self, subscription: &Subscription) -> Result<bool, WebhookError> {
        let granted = self
            .ledger
            .grant(GrantAccess {
                user_id: subscription.user_id.clone(),
                product: ProductRef::Membership(subscription.tier),
                expires_at: None,
                grace_period_days: None,
                origin: Some(AccessOrigin::Subscription(subscription.id)),
            })
            .await?;
        Ok(granted.created)
    }

    async fn created(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let object: SubscriptionObject = event.object()?;
        let now = Timestamp::now();
        let subscription = self.resolve(event, &object, now).await?;
        self.subscriptions.upsert(&subscription).await?;

        if subscription.status.grants_access() && self.grant(&subscription).await? {
            notify(
                self.notifier.as_ref(),
                Notification::EnrollmentConfirmation {
                    user_id: subscription.user_id.clone(),
                    product: ProductRef::Membership(subscription.tier).to_string(),
                    enrollment_id: None,
                },
            )
            .await;
        }
        tracing::info!(
            subscription_ref = %subscription.subscription_ref,
            status = %subscription.status,
            "subscription recorded"
        );
        Ok(())
    }

    async fn updated(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let object: SubscriptionObject = event.object()?;
        let now = Timestamp::now();
        let subscription = self.resolve(event, &object, now).await?;
        self.subscriptions.upsert(&subscription).await?;

        if subscription.status.grants_access() {
            self.grant(&subscription).await?;
        } else if let Some(reason) = subscription.status.revocation_reason() {
            let revoked = self
                .ledger
                .revoke_for_origin(&AccessOrigin::Subscription(subscription.id), reason)
                .await?;
            if !revoked.is_empty() {
                tracing::info!(
                    subscription_ref = %subscription.subscription_ref,
                    status = %subscription.status,
                    count = revoked.len(),
                    "membership access withdrawn"
                );
            }
        }
        Ok(())
    }

    async fn deleted(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let object: SubscriptionObject = event.object()?;
        let now = Timestamp::now();
        let was_canceled = self
            .subscriptions
            .find_by_ref(&object.id)
            .await?
            .map(|s| s.status == SubscriptionStatus::Canceled)
            .unwrap_or(false);
        let mut subscription = self.resolve(event, &object, now).await?;
        subscription.mark_canceled(now);
        self.subscriptions.upsert(&subscription).await?;

        self.ledger
            .revoke_for_origin(
                &AccessOrigin::Subscription(subscription.id),
                "subscription_canceled",
            )
            .await?;

        if !was_canceled {
            notify(
                self.notifier.as_ref(),
                Notification::SubscriptionCancellation {
                    user_id: subscription.user_id.clone(),
                    subscription_ref: subscription.subscription_ref.clone(),
                },
            )
            .await;
        }
        Ok(())
    }
}

fn snapshot_from(
    event: &StripeEvent,
    object: &SubscriptionObject,
) -> Result<SubscriptionSnapshot, WebhookError> {
    let status: SubscriptionStatus = object
        .status
        .parse()
        .map_err(|e: ValidationError| WebhookError::ParseError(e.to_string()))?;
    let created = Timestamp::from_unix_secs(event.created).unwrap_or_else(Timestamp::now);
    let start = object
        .current_period_start
        .and_then(Timestamp::from_unix_secs)
        .unwrap_or(created);
    let end = object
        .current_period_end
        .and_then(Timestamp::from_unix_secs)
        .unwrap_or(start);
    Ok(SubscriptionSnapshot {
        subscription_ref: object.id.clone(),
        customer_ref: object.customer.clone(),
        status,
        current_period_start: start,
        current_period_end: end,
        cancel_at_period_end: object.cancel_at_period_end,
        canceled_at: object.canceled_at.and_then(Timestamp::from_unix_secs),
    })
}

#[async_trait]
impl WebhookEventHandler for SubscriptionHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::CustomerSubscriptionCreated,
            StripeEventType::CustomerSubscriptionUpdated,
            StripeEventType::CustomerSubscriptionDeleted,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        match event.parsed_type() {
            StripeEventType::CustomerSubscriptionCreated => self.created(event).await,
            StripeEventType::CustomerSubscriptionUpdated => self.updated(event).await,
            StripeEventType::CustomerSubscriptionDeleted => self.deleted(event).await,
            _ => Err(WebhookError::Ignored(event.event_type.clone())),
        }
    }
}
