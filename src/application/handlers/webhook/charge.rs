//! `charge.refunded` and `charge.dispute.*` handlers.

use std::sync::Arc;

use async_trait::async_trait;

use super::payment_intent::notify;
use crate::application::handlers::enrollment::AccessLedger;
use crate::domain::billing::{Dispute, DisputeStatus, PaymentStatus, Refund};
use crate::domain::enrollment::AccessOrigin;
use crate::domain::foundation::{DisputeId, RefundId, Timestamp};
use crate::domain::webhook::payloads::{ChargeObject, DisputeObject};
use crate::domain::webhook::{StripeEvent, StripeEventType, WebhookError, WebhookEventHandler};
use crate::ports::{
    DisputeRepository, Notification, Notifier, PaymentRepository, RefundRepository,
};

pub struct ChargeHandler {
    payments: Arc<dyn PaymentRepository>,
    refunds: Arc<dyn RefundRepository>,
    disputes: Arc<dyn DisputeRepository>,
    ledger: Arc<AccessLedger>,
    notifier: Arc<dyn Notifier>,
}

impl ChargeHandler {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        refunds: Arc<dyn RefundRepository>,
        disputes: Arc<dyn DisputeRepository>,
        ledger: Arc<AccessLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            payments,
            refunds,
            disputes,
            ledger,
            notifier,
        }
    }

    async fn refunded(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let charge: ChargeObject = event.object()?;
        let intent_ref = charge
            .payment_intent
            .clone()
            .ok_or(WebhookError::MissingField("payment_intent"))?;
        let mut payment = self
            .payments
            .find_by_intent_ref(&intent_ref)
            .await?
            .ok_or_else(|| WebhookError::PaymentNotFound(intent_ref.clone()))?;

        let now = Timestamp::now();
        let latest = charge.latest_refund();
        let refund = Refund {
            id: RefundId::new(),
            payment_id: payment.id,
            charge_ref: charge.id.clone(),
            refund_ref: latest.map(|r| r.id.clone()),
            amount_refunded: charge.amount_refunded,
            charge_amount: charge.amount,
            currency: charge.currency.clone(),
            reason: latest.and_then(|r| r.reason.clone()),
            created_at: now,
        };

        // The refund row goes in last; it marks the refund as fully applied.
        if payment.status == PaymentStatus::Succeeded {
            payment.apply_status(PaymentStatus::Refunded, now)?;
            self.payments.update(&payment).await?;
        }

        let full = refund.is_full();
        if full {
            self.ledger
                .revoke_for_origin(&AccessOrigin::Payment(payment.id), "refund")
                .await?;
        }

        if !self.refunds.insert_if_absent(&refund).await? {
            tracing::debug!(
                charge_ref = %charge.id,
                amount_refunded = charge.amount_refunded,
                "refund already recorded"
            );
            return Ok(());
        }
        tracing::info!(
            payment_id = %payment.id,
            charge_ref = %charge.id,
            amount_refunded = refund.amount_refunded,
            full,
            "refund recorded"
        );

        notify(
            self.notifier.as_ref(),
            Notification::RefundConfirmation {
                user_id: payment.user_id.clone(),
                payment_id: payment.id,
                amount_refunded: refund.amount_refunded,
                currency: refund.currency.clone(),
                full,
            },
        )
        .await;
        Ok(())
    }

    async fn dispute(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        let object: DisputeObject = event.object()?;
        let now = Timestamp::now();

        let payment_id = match &object.payment_intent {
            Some(intent_ref) => self
                .payments
                .find_by_intent_ref(intent_ref)
                .await?
                .map(|p| p.id),
            None => None,
        };

        let dispute = match self.disputes.find_by_ref(&object.id).await? {
            Some(mut existing) => {
                existing.status = DisputeStatus(object.status.clone());
                existing.amount = object.amount;
                existing.reason = object.reason.clone();
                existing.payment_id = existing.payment_id.or(payment_id);
                existing.updated_at = now;
                existing
            }
            None => Dispute {
                id: DisputeId::new(),
                dispute_ref: object.id.clone(),
                charge_ref: object.charge.clone(),
                payment_id,
                amount: object.amount,
                currency: object.currency.clone(),
                reason: object.reason.clone(),
                status: DisputeStatus(object.status.clone()),
                created_at: now,
                updated_at: now,
            },
        };

        let created = self.disputes.upsert(&dispute).await?;
        tracing::warn!(
            dispute_ref = %dispute.dispute_ref,
            charge_ref = %dispute.charge_ref,
            status = %dispute.status.0,
            closed = dispute.status.is_closed(),
            "dispute recorded"
        );

        if created && event.parsed_type() == StripeEventType::ChargeDisputeCreated {
            notify(
                self.notifier.as_ref(),
                Notification::DisputeNotification {
                    dispute_ref: dispute.dispute_ref.clone(),
                    charge_ref: dispute.charge_ref.clone(),
                    amount: dispute.amount,
                    currency: dispute.currency.clone(),
                    reason: dispute.reason.clone(),
                },
            )
            .await;
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookEventHandler for ChargeHandler {
    fn handles(&self) -> Vec<StripeEventType> {
        vec![
            StripeEventType::ChargeRefunded,
            StripeEventType::ChargeDisputeCreated,
            StripeEventType::ChargeDisputeUpdated,
            StripeEventType::ChargeDisputeClosed,
        ]
    }

    async fn handle(&self, event: &StripeEvent) -> Result<(), WebhookError> {
        match event.parsed_type() {
            StripeEventType::ChargeRefunded => self.refunded(event).await,
            StripeEventType::ChargeDisputeCreated
            | StripeEventType::ChargeDisputeUpdated
            | StripeEventType::ChargeDisputeClosed => self.dispute(event).await,
            _ => Err(WebhookError::Ignored(event.event_type.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryDisputeRepository, InMemoryEnrollmentRepository, InMemoryPaymentRepository,
        InMemoryRefundRepository, InMemoryReminderScheduler,
    };
    use crate::adapters::notifications::RecordingNotifier;
    use crate::application::handlers::enrollment::GrantAccess;
    use crate::domain::billing::{Payment, PurchaseContext};
    use crate::domain::enrollment::{Enrollment, ProductRef};
    use crate::domain::foundation::{
        CourseId, DomainError, EnrollmentId, ErrorCode, PaymentId, UserId,
    };
    use crate::domain::webhook::StripeEventBuilder;
    use crate::ports::EnrollmentRepository;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Enrollment storage whose origin lookup fails a set number of times.
    struct FlakyEnrollments {
        inner: InMemoryEnrollmentRepository,
        origin_failures: AtomicU32,
    }

    impl FlakyEnrollments {
        fn failing_times(times: u32) -> Self {
            Self {
                inner: InMemoryEnrollmentRepository::new(),
                origin_failures: AtomicU32::new(times),
            }
        }
    }

    #[async_trait]
    impl EnrollmentRepository for FlakyEnrollments {
        async fn insert(&self, enrollment: &Enrollment) -> Result<(), DomainError> {
            self.inner.insert(enrollment).await
        }

        async fn update(&self, enrollment: &Enrollment) -> Result<(), DomainError> {
            self.inner.update(enrollment).await
        }

        async fn find_by_id(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, DomainError> {
            self.inner.find_by_id(id).await
        }

        async fn find_active(
            &self,
            user_id: &UserId,
            product: &ProductRef,
        ) -> Result<Option<Enrollment>, DomainError> {
            self.inner.find_active(user_id, product).await
        }

        async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>, DomainError> {
            self.inner.list_for_user(user_id).await
        }

        async fn list_active_by_origin(
            &self,
            origin: &AccessOrigin,
        ) -> Result<Vec<Enrollment>, DomainError> {
            let remaining = self.origin_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.origin_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(DomainError::new(ErrorCode::DatabaseError, "connection reset"));
            }
            self.inner.list_active_by_origin(origin).await
        }

        async fn list_lapsed(&self, now: Timestamp) -> Result<Vec<Enrollment>, DomainError> {
            self.inner.list_lapsed(now).await
        }
    }

    struct Fixture {
        handler: ChargeHandler,
        payments: Arc<InMemoryPaymentRepository>,
        refunds: Arc<InMemoryRefundRepository>,
        disputes: Arc<InMemoryDisputeRepository>,
        ledger: Arc<AccessLedger>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryEnrollmentRepository::new()))
    }

    fn fixture_with(enrollments: Arc<dyn EnrollmentRepository>) -> Fixture {
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let refunds = Arc::new(InMemoryRefundRepository::new());
        let disputes = Arc::new(InMemoryDisputeRepository::new());
        let ledger = Arc::new(AccessLedger::new(
            enrollments,
            Arc::new(InMemoryReminderScheduler::new()),
        ));
        let notifier = Arc::new(RecordingNotifier::new());
        Fixture {
            handler: ChargeHandler::new(
                payments.clone(),
                refunds.clone(),
                disputes.clone(),
                ledger.clone(),
                notifier.clone(),
            ),
            payments,
            refunds,
            disputes,
            ledger,
            notifier,
        }
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn course() -> ProductRef {
        ProductRef::Course(CourseId::new("rust-101").unwrap())
    }

    /// A settled course purchase with access granted.
    async fn settled(f: &Fixture) -> Payment {
        let ctx = PurchaseContext::Course {
            user_id: user(),
            course_id: CourseId::new("rust-101").unwrap(),
        };
        let now = Timestamp::now();
        let mut payment = Payment::pending("pi_1", &ctx, 9999, "usd", ctx.to_metadata(), now);
        payment.apply_status(PaymentStatus::Succeeded, now).unwrap();
        f.payments.insert(&payment).await.unwrap();
        f.ledger
            .grant(GrantAccess {
                user_id: user(),
                product: course(),
                expires_at: None,
                grace_period_days: None,
                origin: Some(AccessOrigin::Payment(payment.id)),
            })
            .await
            .unwrap();
        payment
    }

    fn refund_event(amount_refunded: i64) -> StripeEvent {
        StripeEventBuilder::new("charge.refunded")
            .object(json!({
                "id": "ch_1",
                "amount": 9999,
                "amount_refunded": amount_refunded,
                "currency": "usd",
                "payment_intent": "pi_1",
                "refunds": {"data": [{"id": "re_1", "reason": "requested_by_customer"}]}
            }))
            .build()
    }

    #[tokio::test]
    async fn full_refund_revokes_access() {
        let f = fixture();
        let payment = settled(&f).await;

        f.handler.handle(&refund_event(9999)).await.unwrap();

        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());
        let stored = f.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
        assert_eq!(f.notifier.triggers().await, vec!["refundConfirmation"]);
    }

    #[tokio::test]
    async fn partial_refund_keeps_access() {
        let f = fixture();
        let payment = settled(&f).await;

        f.handler.handle(&refund_event(5000)).await.unwrap();

        assert!(f.ledger.has_access(&user(), &course()).await.unwrap());
        let recorded = f.refunds.list_for_payment(&payment.id).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(!recorded[0].is_full());
        match &f.notifier.sent().await[0] {
            Notification::RefundConfirmation { full, .. } => assert!(!full),
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[tokio::test]
    async fn partial_then_full_refund_revokes_on_the_second() {
        let f = fixture();
        let payment = settled(&f).await;

        f.handler.handle(&refund_event(5000)).await.unwrap();
        f.handler.handle(&refund_event(9999)).await.unwrap();

        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());
        assert_eq!(f.refunds.list_for_payment(&payment.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_refund_is_recorded_once() {
        let f = fixture();
        let payment = settled(&f).await;

        f.handler.handle(&refund_event(5000)).await.unwrap();
        f.handler.handle(&refund_event(5000)).await.unwrap();

        assert_eq!(f.refunds.list_for_payment(&payment.id).await.unwrap().len(), 1);
        assert_eq!(f.notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn full_refund_retried_after_storage_failure_still_revokes() {
        let f = fixture_with(Arc::new(FlakyEnrollments::failing_times(1)));
        let payment = settled(&f).await;

        assert!(f.handler.handle(&refund_event(9999)).await.is_err());
        assert!(f.refunds.list_for_payment(&payment.id).await.unwrap().is_empty());

        f.handler.handle(&refund_event(9999)).await.unwrap();

        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());
        let stored = f.payments.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
        assert_eq!(f.refunds.list_for_payment(&payment.id).await.unwrap().len(), 1);
        assert_eq!(f.notifier.triggers().await, vec!["refundConfirmation"]);
    }

    #[tokio::test]
    async fn full_refund_of_an_extended_course_revokes_it() {
        let f = fixture();
        let payment = settled(&f).await;
        let enrollment = f.ledger.find_active(&user(), &course()).await.unwrap().unwrap();
        f.ledger
            .extend(&enrollment.id, 30, Some(PaymentId::new()), Some("purchase"))
            .await
            .unwrap();

        f.handler.handle(&refund_event(9999)).await.unwrap();

        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());
        let revoked = f.ledger.list_for_user(&user()).await.unwrap();
        assert_eq!(revoked[0].origin, Some(AccessOrigin::Payment(payment.id)));
    }

    #[tokio::test]
    async fn refund_without_payment_intent_is_rejected() {
        let f = fixture();
        let event = StripeEventBuilder::new("charge.refunded")
            .object(json!({"id": "ch_9", "amount": 100, "amount_refunded": 100, "currency": "usd"}))
            .build();
        let err = f.handler.handle(&event).await.unwrap_err();
        assert!(matches!(err, WebhookError::MissingField("payment_intent")));
    }

    fn dispute_event(event_type: &str, status: &str) -> StripeEvent {
        StripeEventBuilder::new(event_type)
            .object(json!({
                "id": "dp_1",
                "charge": "ch_1",
                "amount": 9999,
                "currency": "usd",
                "reason": "fraudulent",
                "status": status,
                "payment_intent": "pi_1"
            }))
            .build()
    }

    #[tokio::test]
    async fn new_dispute_alerts_operations_once() {
        let f = fixture();
        let payment = settled(&f).await;

        f.handler
            .handle(&dispute_event("charge.dispute.created", "needs_response"))
            .await
            .unwrap();
        f.handler
            .handle(&dispute_event("charge.dispute.updated", "under_review"))
            .await
            .unwrap();

        let stored = f.disputes.find_by_ref("dp_1").await.unwrap().unwrap();
        assert_eq!(stored.status, DisputeStatus("under_review".to_string()));
        assert_eq!(stored.payment_id, Some(payment.id));
        assert_eq!(f.notifier.triggers().await, vec!["disputeNotification"]);
        // Disputes alone never touch access.
        assert!(f.ledger.has_access(&user(), &course()).await.unwrap());
    }

    #[tokio::test]
    async fn closed_dispute_is_recorded() {
        let f = fixture();
        f.handler
            .handle(&dispute_event("charge.dispute.closed", "won"))
            .await
            .unwrap();
        let stored = f.disputes.find_by_ref("dp_1").await.unwrap().unwrap();
        assert!(stored.status.is_closed());
        assert!(f.notifier.sent().await.is_empty());
    }
}
