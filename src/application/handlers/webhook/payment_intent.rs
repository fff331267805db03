//! `payment_intent.*` handlers.
//!
//! The purchase context is read from the stored payment, never from the
//! event, so a tampered or stale event payload cannot grant anything the
//! orchestrator did not price.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::handlers::enrollment::{AccessLedger, GrantAccess, Granted};
use crate::domain::billing::{Payment, PaymentStatus, PurchaseContext};
use crate::domain::enrollment::{AccessOrigin, ProductRef};
use crate::domain::foundation::{EnrollmentId, Timestamp};
use crate::domain::webhook::payloads::PaymentIntentObject;
use crate::domain::webhook::{StripeEvent, StripeEventType, WebhookError, WebhookEventHandler};
use crate::ports::{CatalogReader, Notification, Notifier, PaymentRepository};

pub struct PaymentIntentHandler {
    payments: Arc<dyn PaymentRepository>,
    catalog: Arc<dyn CatalogReader>,
    ledger: Arc<AccessLedger>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentIntentHandler {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        catalog: Arc<dyn CatalogReader>,
        ledger: Arc<AccessLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            payments,
            catalog,
            ledger,
            notifier,
        }
    }

    async fn load(&self, intent: &PaymentIntentObject) -> Result<Payment, WebhookError> {
        self.payments
            .find_by_intent_ref(&intent.id)
            .await?
            .ok_or_else(|| WebhookError::PaymentNotFound(intent.id.clone()))
    }

    async fn succeeded(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let intent: PaymentIntentObject = event.object()?;
        let mut payment = self.load(&intent).await?;

        if matches!(
            payment.status,
            PaymentStatus::Refunded | PaymentStatus::Canceled
        ) {
            tracing::warn!(
                event_id = %event.id,
                payment_id = %payment.id,
                status = %payment.status,
                "success arrived after a terminal state; skipping"
            );
            return Ok(());
        }

        let context = payment
            .context()
            .map_err(|e| WebhookError::InvalidMetadata(e.to_string()))?;

        let now = Timestamp::now();
        let settled_now = payment.apply_status(PaymentStatus::Succeeded, now)?;
        if settled_now {
            self.payments.update(&payment).await?;
        }

        // Only the run that changed something confirms.
        let origin = AccessOrigin::Payment(payment.id);
        let confirmation = match &context {
            PurchaseContext::Course { user_id, course_id } => {
                let access_days = self
                    .catalog
                    .course_price(course_id)
                    .await?
                    .and_then(|price| price.access_days);
                let granted = self
                    .ledger
                    .grant(GrantAccess {
                        user_id: user_id.clone(),
                        product: ProductRef::Course(course_id.clone()),
                        expires_at: access_days.map(|d| now.add_days(i64::from(d))),
                        grace_period_days: None,
                        origin: Some(origin),
                    })
                    .await?;
                confirmation_for(granted)
            }
            PurchaseContext::Program {
                user_id,
                program,
                installment,
            } => {
                let first = installment.map(|i| i.number <= 1).unwrap_or(true);
                if first {
                    let access_days = self
                        .catalog
                        .program_price(program)
                        .await?
                        .and_then(|price| price.access_days);
                    let granted = self
                        .ledger
                        .grant(GrantAccess {
                            user_id: user_id.clone(),
                            product: ProductRef::Program(program.clone()),
                            expires_at: access_days.map(|d| now.add_days(i64::from(d))),
                            grace_period_days: None,
                            origin: Some(origin),
                        })
                        .await?;
                    confirmation_for(granted)
                } else {
                    tracing::info!(
                        payment_id = %payment.id,
                        installment = ?installment,
                        "later installment settled"
                    );
                    None
                }
            }
            PurchaseContext::Membership { user_id, tier } => {
                let granted = self
                    .ledger
                    .grant(GrantAccess {
                        user_id: user_id.clone(),
                        product: ProductRef::Membership(*tier),
                        expires_at: None,
                        grace_period_days: None,
                        origin: Some(origin),
                    })
                    .await?;
                confirmation_for(granted)
            }
            PurchaseContext::Extension {
                enrollment_id,
                days,
                ..
            } => {
                // Redelivery after a partial failure must not extend twice.
                let already = self
                    .ledger
                    .list_for_user(context.user_id())
                    .await?
                    .into_iter()
                    .any(|e| e.extended_by.contains(&payment.id));
                if already {
                    None
                } else {
                    let enrollment = self
                        .ledger
                        .extend(enrollment_id, *days, Some(payment.id), Some("purchase"))
                        .await?;
                    Some((enrollment.product.to_string(), Some(enrollment.id)))
                }
            }
            PurchaseContext::Gift {
                recipient_email,
                item,
                ..
            } => {
                tracing::info!(
                    payment_id = %payment.id,
                    gift = ?item,
                    "gift purchase settled"
                );
                settled_now.then(|| (format!("a gift for {}", recipient_email), None))
            }
        };

        if let Some((product, enrollment_id)) = confirmation {
            notify(
                self.notifier.as_ref(),
                Notification::EnrollmentConfirmation {
                    user_id: context.user_id().clone(),
                    product,
                    enrollment_id,
                },
            )
            .await;
        }
        Ok(())
    }

    async fn failed(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let intent: PaymentIntentObject = event.object()?;
        let mut payment = self.load(&intent).await?;

        if matches!(
            payment.status,
            PaymentStatus::Succeeded | PaymentStatus::Refunded | PaymentStatus::Canceled
        ) {
            tracing::warn!(
                event_id = %event.id,
                payment_id = %payment.id,
                status = %payment.status,
                "failure arrived after a final state; ignoring"
            );
            return Ok(());
        }

        let reason = intent.failure_reason();
        payment.mark_failed(reason.clone(), Timestamp::now())?;
        self.payments.update(&payment).await?;
        tracing::info!(payment_id = %payment.id, %reason, "payment failed");

        notify(
            self.notifier.as_ref(),
            Notification::PaymentFailure {
                user_id: payment.user_id.clone(),
                payment_id: payment.id,
                reason,
            },
        )
        .await;
        Ok(())
    }

    async fn canceled(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let intent: PaymentIntentObject = event.object()?;
        let mut payment = self.load(&intent).await?;

        if matches!(
            payment.status,
            PaymentStatus::Succeeded | PaymentStatus::Refunded
        ) {
            tracing::warn!(
                event_id = %event.id,
                payment_id = %payment.id,
                "cancel arrived after settlement; ignoring"
            );
            return Ok(());
        }

        if payment.apply_status(PaymentStatus::Canceled, Timestamp::now())? {
            self.payments.update(&payment).await?;
        }
        Ok(())
    }
}

/// Product and enrollment to confirm, when the grant created the enrollment.
fn confirmation_for(granted: Granted) -> Option<(String, Option<EnrollmentId>)> {
    granted
        .created
        .then(|| (granted.enrollment.product.to_string(), Some(granted.enrollment.id)))
}

/// Sends a notification, logging instead of failing.
pub(super) async fn notify(notifier: &dyn Notifier, notification: Notification) {
    let trigger = notification.name();
    if let Err(err) = notifier.send(notification).await {
        tracing::warn!(trigger, error = %err, "notification not sent");
    }
}

#[async_trait]
impl WebhookEventHandler for PaymentIntentHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::PaymentIntentSucceeded,
            StripeEventType::PaymentIntentPaymentFailed,
            StripeEventType::PaymentIntentCanceled,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        match event.parsed_type() {
            StripeEventType::PaymentIntentSucceeded => self.succeeded(event).await,
            StripeEventType::PaymentIntentPaymentFailed => self.failed(event).await,
            StripeEventType::PaymentIntentCanceled => self.canceled(event).await,
            _ => Err(WebhookError::Ignored(event.event_type.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryEnrollmentRepository, InMemoryPaymentRepository, InMemoryReminderScheduler,
        StaticCatalog,
    };
    use crate::adapters::notifications::RecordingNotifier;
    use crate::domain::billing::{GiftItem, Installment};
    use crate::domain::foundation::{CourseId, PaymentId, UserId};
    use crate::domain::webhook::StripeEventBuilder;
    use serde_json::json;

    struct Fixture {
        handler: PaymentIntentHandler,
        payments: Arc<InMemoryPaymentRepository>,
        ledger: Arc<AccessLedger>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let ledger = Arc::new(AccessLedger::new(
            Arc::new(InMemoryEnrollmentRepository::new()),
            Arc::new(InMemoryReminderScheduler::new()),
        ));
        let notifier = Arc::new(RecordingNotifier::new());
        let catalog = StaticCatalog::new()
            .with_course("rust-101", 9999, Some(365))
            .with_program("bootcamp", 49900, None);
        let handler = PaymentIntentHandler::new(
            payments.clone(),
            Arc::new(catalog),
            ledger.clone(),
            notifier.clone(),
        );
        Fixture {
            handler,
            payments,
            ledger,
            notifier,
        }
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn seed(f: &Fixture, intent: &str, ctx: PurchaseContext) -> Payment {
        let payment = Payment::pending(intent, &ctx, 9999, "usd", ctx.to_metadata(), Timestamp::now());
        f.payments.insert(&payment).await.unwrap();
        payment
    }

    fn event(event_type: &str, intent: &str) -> StripeEvent {
        StripeEventBuilder::new(event_type)
            .object(json!({"id": intent, "amount": 9999, "currency": "usd"}))
            .build()
    }

    fn course_ctx() -> PurchaseContext {
        PurchaseContext::Course {
            user_id: user(),
            course_id: CourseId::new("rust-101").unwrap(),
        }
    }

    #[tokio::test]
    async fn success_marks_payment_and_grants_course_with_catalog_expiry() {
        let f = fixture();
        let payment = seed(&f, "pi_1", course_ctx()).await;

        f.handler
            .handle(&event("payment_intent.succeeded", "pi_1"))
            .await
            .unwrap();

        let stored = f.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Succeeded);
        let product = ProductRef::Course(CourseId::new("rust-101").unwrap());
        let enrollment = f.ledger.find_active(&user(), &product).await.unwrap().unwrap();
        assert!(enrollment.expires_at.is_some());
        assert_eq!(enrollment.origin, Some(AccessOrigin::Payment(payment.id)));
        assert_eq!(f.notifier.triggers().await, vec!["enrollmentConfirmation"]);
    }

    #[tokio::test]
    async fn unknown_intent_is_a_retryable_error() {
        let f = fixture();
        let err = f
            .handler
            .handle(&event("payment_intent.succeeded", "pi_missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::PaymentNotFound(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn later_installment_does_not_grant() {
        let f = fixture();
        seed(
            &f,
            "pi_2",
            PurchaseContext::Program {
                user_id: user(),
                program: "bootcamp".to_string(),
                installment: Some(Installment::later(PaymentId::new(), 2, 3)),
            },
        )
        .await;

        f.handler
            .handle(&event("payment_intent.succeeded", "pi_2"))
            .await
            .unwrap();
        assert!(!f
            .ledger
            .has_access(&user(), &ProductRef::Program("bootcamp".to_string()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn gift_settles_without_granting_the_buyer() {
        let f = fixture();
        seed(
            &f,
            "pi_gift",
            PurchaseContext::Gift {
                purchaser_id: user(),
                recipient_email: "friend@example.com".to_string(),
                item: GiftItem::Course(CourseId::new("rust-101").unwrap()),
            },
        )
        .await;

        f.handler
            .handle(&event("payment_intent.succeeded", "pi_gift"))
            .await
            .unwrap();
        assert!(f.ledger.list_for_user(&user()).await.unwrap().is_empty());
        assert_eq!(f.notifier.triggers().await, vec!["enrollmentConfirmation"]);
    }

    #[tokio::test]
    async fn failure_records_reason_and_notifies() {
        let f = fixture();
        let payment = seed(&f, "pi_3", course_ctx()).await;
        let failed = StripeEventBuilder::new("payment_intent.payment_failed")
            .object(json!({
                "id": "pi_3", "amount": 9999, "currency": "usd",
                "last_payment_error": {"code": "card_declined", "message": "Your card was declined."}
            }))
            .build();

        f.handler.handle(&failed).await.unwrap();

        let stored = f.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("Your card was declined."));
        assert_eq!(f.notifier.triggers().await, vec!["paymentFailure"]);
    }

    #[tokio::test]
    async fn failure_after_success_is_ignored() {
        let f = fixture();
        let payment = seed(&f, "pi_4", course_ctx()).await;
        f.handler
            .handle(&event("payment_intent.succeeded", "pi_4"))
            .await
            .unwrap();
        f.handler
            .handle(&event("payment_intent.payment_failed", "pi_4"))
            .await
            .unwrap();

        let stored = f.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn cancel_leaves_access_untouched() {
        let f = fixture();
        let payment = seed(&f, "pi_5", course_ctx()).await;
        f.handler
            .handle(&event("payment_intent.canceled", "pi_5"))
            .await
            .unwrap();

        let stored = f.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Canceled);
        assert!(f.ledger.list_for_user(&user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_success_confirms_once() {
        let f = fixture();
        seed(&f, "pi_6", course_ctx()).await;

        // Same intent under two event ids, as after a processor resend.
        f.handler
            .handle(&event("payment_intent.succeeded", "pi_6"))
            .await
            .unwrap();
        f.handler
            .handle(&event("payment_intent.succeeded", "pi_6"))
            .await
            .unwrap();

        assert_eq!(f.notifier.triggers().await, vec!["enrollmentConfirmation"]);
        assert_eq!(f.ledger.list_for_user(&user()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn paid_extension_applies_once_and_keeps_the_grant_origin() {
        let f = fixture();
        let course = seed(&f, "pi_7", course_ctx()).await;
        f.handler
            .handle(&event("payment_intent.succeeded", "pi_7"))
            .await
            .unwrap();
        let product = ProductRef::Course(CourseId::new("rust-101").unwrap());
        let before = f.ledger.find_active(&user(), &product).await.unwrap().unwrap();

        let extension = seed(
            &f,
            "pi_8",
            PurchaseContext::Extension {
                user_id: user(),
                enrollment_id: before.id,
                days: 30,
            },
        )
        .await;
        for _ in 0..2 {
            f.handler
                .handle(&event("payment_intent.succeeded", "pi_8"))
                .await
                .unwrap();
        }

        let after = f.ledger.find_active(&user(), &product).await.unwrap().unwrap();
        assert_eq!(after.origin, Some(AccessOrigin::Payment(course.id)));
        assert_eq!(after.extended_by, vec![extension.id]);
        assert_eq!(
            after.expires_at,
            before.expires_at.map(|exp| exp.add_days(30))
        );
        assert_eq!(
            f.notifier.triggers().await,
            vec!["enrollmentConfirmation", "enrollmentConfirmation"]
        );
    }
}
