//! AccessLedger - grant, revoke, extend and expire enrollments.
//!
//! Every write goes through here so reminder scheduling stays in step with
//! the enrollment's expiry. Access checks read storage each time; nothing is
//! cached.

use std::sync::Arc;

use crate::domain::enrollment::{
    AccessOrigin, Enrollment, EnrollmentError, EnrollmentStatus, ProductRef,
};
use crate::domain::foundation::{EnrollmentId, ErrorCode, PaymentId, Timestamp, UserId};
use crate::ports::{EnrollmentRepository, Notification, Notifier, ReminderScheduler, ScheduledReminder};

/// Request to grant access.
#[derive(Debug, Clone)]
pub struct GrantAccess {
    pub user_id: UserId,
    pub product: ProductRef,
    pub expires_at: Option<Timestamp>,
    /// Falls back to the ledger default when `None`.
    pub grace_period_days: Option<u32>,
    pub origin: Option<AccessOrigin>,
}

/// Outcome of a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Granted {
    pub enrollment: Enrollment,
    /// `false` when an existing active enrollment was returned instead.
    pub created: bool,
}

impl Granted {
    fn existing(enrollment: Enrollment) -> Self {
        Self {
            enrollment,
            created: false,
        }
    }
}

pub struct AccessLedger {
    enrollments: Arc<dyn EnrollmentRepository>,
    reminders: Arc<dyn ReminderScheduler>,
    default_grace_days: u32,
}

impl AccessLedger {
    pub fn new(
        enrollments: Arc<dyn EnrollmentRepository>,
        reminders: Arc<dyn ReminderScheduler>,
    ) -> Self {
        Self {
            enrollments,
            reminders,
            default_grace_days: 0,
        }
    }

    pub fn with_default_grace_days(mut self, days: u32) -> Self {
        self.default_grace_days = days;
        self
    }

    /// Grants access, or returns the existing active enrollment unchanged.
    ///
    /// Only one of any number of grants for the same slot, concurrent or
    /// not, reports `created`.
    pub async fn grant(&self, request: GrantAccess) -> Result<Granted, EnrollmentError> {
        self.grant_at(request, Timestamp::now()).await
    }

    pub async fn grant_at(
        &self,
        request: GrantAccess,
        now: Timestamp,
    ) -> Result<Granted, EnrollmentError> {
        if let Some(mut existing) = self
            .enrollments
            .find_active(&request.user_id, &request.product)
            .await?
        {
            if !existing.is_past_grace(now) {
                tracing::debug!(
                    enrollment_id = %existing.id,
                    user_id = %request.user_id,
                    product = %request.product,
                    "access already granted"
                );
                return Ok(Granted::existing(existing));
            }
            // Lapsed but not yet swept; retire it so the new grant takes the slot.
            existing.expire(now)?;
            self.enrollments.update(&existing).await?;
        }

        let enrollment = Enrollment::grant(
            request.user_id.clone(),
            request.product.clone(),
            request.expires_at,
            request.grace_period_days.unwrap_or(self.default_grace_days),
            request.origin,
            now,
        );

        match self.enrollments.insert(&enrollment).await {
            Ok(()) => {}
            // A concurrent grant won the unique slot; its row is the answer.
            Err(err) if err.code == ErrorCode::Conflict => {
                if let Some(winner) = self
                    .enrollments
                    .find_active(&request.user_id, &request.product)
                    .await?
                {
                    return Ok(Granted::existing(winner));
                }
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            enrollment_id = %enrollment.id,
            user_id = %enrollment.user_id,
            product = %enrollment.product,
            expires_at = ?enrollment.expires_at,
            "access granted"
        );
        self.schedule_warnings(&enrollment, now).await?;
        Ok(Granted {
            enrollment,
            created: true,
        })
    }

    /// Revokes an enrollment. Revoking twice is a no-op.
    pub async fn revoke(
        &self,
        id: &EnrollmentId,
        reason: &str,
    ) -> Result<Enrollment, EnrollmentError> {
        let mut enrollment = self.load(id).await?;
        if enrollment.revoke(reason, Timestamp::now())? {
            self.enrollments.update(&enrollment).await?;
            self.reminders.cancel_for_enrollment(id).await?;
            tracing::info!(
                enrollment_id = %id,
                user_id = %enrollment.user_id,
                reason,
                "access revoked"
            );
        }
        Ok(enrollment)
    }

    /// Revokes every active enrollment paid for by `origin`, whether it paid
    /// for the grant or for an extension.
    pub async fn revoke_for_origin(
        &self,
        origin: &AccessOrigin,
        reason: &str,
    ) -> Result<Vec<Enrollment>, EnrollmentError> {
        let now = Timestamp::now();
        let mut revoked = Vec::new();
        for mut enrollment in self.enrollments.list_active_by_origin(origin).await? {
            if enrollment.revoke(reason, now)? {
                self.enrollments.update(&enrollment).await?;
                self.reminders.cancel_for_enrollment(&enrollment.id).await?;
                tracing::info!(
                    enrollment_id = %enrollment.id,
                    origin = origin.kind(),
                    reason,
                    "access revoked"
                );
                revoked.push(enrollment);
            }
        }
        Ok(revoked)
    }

    /// Pushes the expiry out by `days`, reviving an expired enrollment.
    ///
    /// When the target has expired and a newer enrollment for the same
    /// product is active, the active one is extended instead so a paid
    /// extension is never lost.
    pub async fn extend(
        &self,
        id: &EnrollmentId,
        days: i64,
        paid_by: Option<PaymentId>,
        reason: Option<&str>,
    ) -> Result<Enrollment, EnrollmentError> {
        let now = Timestamp::now();
        let mut enrollment = self.load(id).await?;
        if enrollment.status == EnrollmentStatus::Expired {
            if let Some(active) = self
                .enrollments
                .find_active(&enrollment.user_id, &enrollment.product)
                .await?
            {
                tracing::info!(
                    requested = %id,
                    enrollment_id = %active.id,
                    product = %active.product,
                    "extension moved to the active enrollment"
                );
                enrollment = active;
            }
        }

        let was_expired = enrollment.status == EnrollmentStatus::Expired;
        enrollment.extend(days, paid_by, reason, now)?;
        self.enrollments.update(&enrollment).await?;
        self.schedule_warnings(&enrollment, now).await?;
        tracing::info!(
            enrollment_id = %enrollment.id,
            days,
            revived = was_expired,
            expires_at = ?enrollment.expires_at,
            "access extended"
        );
        Ok(enrollment)
    }

    pub async fn has_access(
        &self,
        user_id: &UserId,
        product: &ProductRef,
    ) -> Result<bool, EnrollmentError> {
        self.has_access_at(user_id, product, Timestamp::now()).await
    }

    pub async fn has_access_at(
        &self,
        user_id: &UserId,
        product: &ProductRef,
        now: Timestamp,
    ) -> Result<bool, EnrollmentError> {
        Ok(self
            .enrollments
            .find_active(user_id, product)
            .await?
            .map(|e| e.has_access_at(now))
            .unwrap_or(false))
    }

    pub async fn find_active(
        &self,
        user_id: &UserId,
        product: &ProductRef,
    ) -> Result<Option<Enrollment>, EnrollmentError> {
        Ok(self.enrollments.find_active(user_id, product).await?)
    }

    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>, EnrollmentError> {
        Ok(self.enrollments.list_for_user(user_id).await?)
    }

    pub async fn process_expired(&self) -> Result<usize, EnrollmentError> {
        self.process_expired_at(Timestamp::now()).await
    }

    /// Expires active enrollments whose grace window has closed.
    ///
    /// An enrollment extended between the listing and the write is left
    /// alone; the newer write wins.
    pub async fn process_expired_at(&self, now: Timestamp) -> Result<usize, EnrollmentError> {
        let mut count = 0;
        for listed in self.enrollments.list_lapsed(now).await? {
            let Some(mut current) = self.enrollments.find_by_id(&listed.id).await? else {
                continue;
            };
            if current.status != EnrollmentStatus::Active || !current.is_past_grace(now) {
                continue;
            }
            current.expire(now)?;
            self.enrollments.update(&current).await?;
            count += 1;
        }
        if count > 0 {
            tracing::info!(count, "expired lapsed enrollments");
        }
        Ok(count)
    }

    /// Sends expiration warnings that have come due.
    ///
    /// Delivery failures are logged; a reminder is never retried.
    pub async fn send_due_reminders(
        &self,
        notifier: &dyn Notifier,
        now: Timestamp,
    ) -> Result<usize, EnrollmentError> {
        let due = self.reminders.take_due(now).await?;
        let count = due.len();
        for reminder in due {
            let notification = Notification::ExpirationWarning {
                user_id: reminder.user_id,
                enrollment_id: reminder.enrollment_id,
                product: reminder.product,
                days_before: reminder.days_before,
                expires_at: reminder.expires_at,
            };
            if let Err(err) = notifier.send(notification).await {
                tracing::warn!(
                    enrollment_id = %reminder.enrollment_id,
                    error = %err,
                    "expiration warning not sent"
                );
            }
        }
        Ok(count)
    }

    async fn load(&self, id: &EnrollmentId) -> Result<Enrollment, EnrollmentError> {
        self.enrollments
            .find_by_id(id)
            .await?
            .ok_or(EnrollmentError::NotFound(*id))
    }

    async fn schedule_warnings(
        &self,
        enrollment: &Enrollment,
        now: Timestamp,
    ) -> Result<(), EnrollmentError> {
        let Some(expires_at) = enrollment.expires_at else {
            return Ok(());
        };
        let reminders = enrollment
            .expiration_warnings(now)
            .into_iter()
            .map(|warning| ScheduledReminder {
                enrollment_id: enrollment.id,
                user_id: enrollment.user_id.clone(),
                product: enrollment.product.clone(),
                days_before: warning.days_before,
                send_at: warning.send_at,
                expires_at,
            })
            .collect();
        self.reminders
            .replace_for_enrollment(&enrollment.id, reminders)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryEnrollmentRepository, InMemoryReminderScheduler};
    use crate::adapters::notifications::RecordingNotifier;
    use crate::domain::foundation::{CourseId, PaymentId};

    // ════════════════════════════════════════════════════════════════════════
    // Test Infrastructure
    // ════════════════════════════════════════════════════════════════════════

    struct Fixture {
        ledger: AccessLedger,
        reminders: Arc<InMemoryReminderScheduler>,
    }

    fn fixture() -> Fixture {
        let reminders = Arc::new(InMemoryReminderScheduler::new());
        let ledger = AccessLedger::new(
            Arc::new(InMemoryEnrollmentRepository::new()),
            reminders.clone(),
        );
        Fixture { ledger, reminders }
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn course() -> ProductRef {
        ProductRef::Course(CourseId::new("rust-101").unwrap())
    }

    fn grant_request(expires_at: Option<Timestamp>, grace: u32) -> GrantAccess {
        GrantAccess {
            user_id: user(),
            product: course(),
            expires_at,
            grace_period_days: Some(grace),
            origin: Some(AccessOrigin::Payment(PaymentId::new())),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Grant
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn grant_twice_returns_the_same_enrollment() {
        let f = fixture();
        let first = f.ledger.grant(grant_request(None, 0)).await.unwrap();
        let second = f.ledger.grant(grant_request(None, 0)).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.enrollment.id, second.enrollment.id);
        assert_eq!(f.ledger.list_for_user(&user()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn grant_schedules_only_future_warnings() {
        let f = fixture();
        let now = Timestamp::now();
        let enrollment = f
            .ledger
            .grant_at(grant_request(Some(now.add_days(5)), 0), now)
            .await
            .unwrap()
            .enrollment;

        let pending = f.reminders.pending_for(&enrollment.id).await;
        let days: Vec<i64> = pending.iter().map(|r| r.days_before).collect();
        assert_eq!(days, vec![3, 1]);
    }

    #[tokio::test]
    async fn grant_replaces_a_lapsed_unswept_enrollment() {
        let f = fixture();
        let now = Timestamp::now();
        let old = f
            .ledger
            .grant_at(grant_request(Some(now.minus_days(2)), 0), now.minus_days(40))
            .await
            .unwrap()
            .enrollment;

        let fresh = f
            .ledger
            .grant_at(grant_request(Some(now.add_days(30)), 0), now)
            .await
            .unwrap()
            .enrollment;

        assert_ne!(old.id, fresh.id);
        assert!(f.ledger.has_access_at(&user(), &course(), now).await.unwrap());
        let history = f.ledger.list_for_user(&user()).await.unwrap();
        assert!(history
            .iter()
            .any(|e| e.id == old.id && e.status == EnrollmentStatus::Expired));
    }

    #[tokio::test]
    async fn default_grace_applies_when_request_has_none() {
        let reminders = Arc::new(InMemoryReminderScheduler::new());
        let ledger = AccessLedger::new(Arc::new(InMemoryEnrollmentRepository::new()), reminders)
            .with_default_grace_days(3);
        let now = Timestamp::now();
        let mut request = grant_request(Some(now.add_days(30)), 0);
        request.grace_period_days = None;

        let enrollment = ledger.grant_at(request, now).await.unwrap().enrollment;
        assert_eq!(enrollment.grace_period_end, Some(now.add_days(33)));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Revoke / Extend
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn revoke_removes_access_and_pending_reminders() {
        let f = fixture();
        let now = Timestamp::now();
        let enrollment = f
            .ledger
            .grant_at(grant_request(Some(now.add_days(30)), 0), now)
            .await
            .unwrap()
            .enrollment;

        let revoked = f.ledger.revoke(&enrollment.id, "refund").await.unwrap();
        assert_eq!(revoked.status, EnrollmentStatus::Revoked);
        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());
        assert!(f.reminders.pending_for(&enrollment.id).await.is_empty());

        // second revoke is a no-op
        let again = f.ledger.revoke(&enrollment.id, "other").await.unwrap();
        assert_eq!(again.revoked_at, revoked.revoked_at);
    }

    #[tokio::test]
    async fn revoke_for_origin_touches_only_that_origin() {
        let f = fixture();
        let origin = AccessOrigin::Payment(PaymentId::new());
        let mut paid = grant_request(None, 0);
        paid.origin = Some(origin);
        f.ledger.grant(paid).await.unwrap();

        let other = GrantAccess {
            product: ProductRef::Program("bootcamp".to_string()),
            ..grant_request(None, 0)
        };
        f.ledger.grant(other).await.unwrap();

        let revoked = f.ledger.revoke_for_origin(&origin, "refund").await.unwrap();
        assert_eq!(revoked.len(), 1);
        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());
        assert!(f
            .ledger
            .has_access(&user(), &ProductRef::Program("bootcamp".to_string()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn extend_revives_expired_enrollment() {
        let f = fixture();
        let now = Timestamp::now();
        let enrollment = f
            .ledger
            .grant_at(grant_request(Some(now.minus_days(10)), 2), now.minus_days(40))
            .await
            .unwrap()
            .enrollment;
        assert_eq!(f.ledger.process_expired_at(now).await.unwrap(), 1);
        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());

        let extended = f
            .ledger
            .extend(&enrollment.id, 30, None, Some("support"))
            .await
            .unwrap();
        assert_eq!(extended.status, EnrollmentStatus::Active);
        assert!(f.ledger.has_access(&user(), &course()).await.unwrap());
    }

    #[tokio::test]
    async fn extend_unknown_enrollment_is_not_found() {
        let f = fixture();
        let err = f
            .ledger
            .extend(&EnrollmentId::new(), 30, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::NotFound(_)));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Expiry
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn process_expired_is_monotonic() {
        let f = fixture();
        let now = Timestamp::now();
        f.ledger
            .grant_at(grant_request(Some(now.minus_days(5)), 1), now.minus_days(30))
            .await
            .unwrap();

        assert_eq!(f.ledger.process_expired_at(now).await.unwrap(), 1);
        assert_eq!(f.ledger.process_expired_at(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn enrollment_inside_grace_keeps_access_and_is_not_expired() {
        let f = fixture();
        let now = Timestamp::now();
        f.ledger
            .grant_at(grant_request(Some(now.minus_days(1)), 3), now.minus_days(30))
            .await
            .unwrap();

        assert_eq!(f.ledger.process_expired_at(now).await.unwrap(), 0);
        assert!(f.ledger.has_access_at(&user(), &course(), now).await.unwrap());
    }

    #[tokio::test]
    async fn due_reminders_are_sent_once() {
        let f = fixture();
        let now = Timestamp::now();
        f.ledger
            .grant_at(grant_request(Some(now.add_days(10)), 0), now)
            .await
            .unwrap();
        let notifier = RecordingNotifier::new();

        let later = now.add_days(4);
        assert_eq!(f.ledger.send_due_reminders(&notifier, later).await.unwrap(), 1);
        assert_eq!(f.ledger.send_due_reminders(&notifier, later).await.unwrap(), 0);
        assert_eq!(notifier.triggers().await, vec!["expirationWarning"]);
    }

    #[tokio::test]
    async fn full_lifecycle_ends_in_expiry_after_grace() {
        let f = fixture();
        let start = Timestamp::now();
        f.ledger
            .grant_at(grant_request(Some(start.add_days(365)), 7), start)
            .await
            .unwrap();

        let later = start.add_days(365 + 8);
        assert_eq!(f.ledger.process_expired_at(later).await.unwrap(), 1);

        let history = f.ledger.list_for_user(&user()).await.unwrap();
        assert_eq!(history[0].status, EnrollmentStatus::Expired);
        assert!(!f.ledger.has_access_at(&user(), &course(), later).await.unwrap());
    }

    #[tokio::test]
    async fn access_boundary_is_the_grace_end_to_the_second() {
        let f = fixture();
        let start = Timestamp::now();
        f.ledger
            .grant_at(grant_request(Some(start.add_days(30)), 7), start)
            .await
            .unwrap();
        let grace_end = start.add_days(37);

        for (at, expected) in [
            (grace_end.plus_secs(-1), true),
            (grace_end, true),
            (grace_end.plus_secs(1), false),
        ] {
            assert_eq!(
                f.ledger.has_access_at(&user(), &course(), at).await.unwrap(),
                expected,
                "access at {:?}",
                at
            );
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Paid extensions
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn refunding_the_original_payment_revokes_an_extended_enrollment() {
        let f = fixture();
        let now = Timestamp::now();
        let original = PaymentId::new();
        let mut request = grant_request(Some(now.add_days(30)), 0);
        request.origin = Some(AccessOrigin::Payment(original));
        let enrollment = f.ledger.grant_at(request, now).await.unwrap().enrollment;

        f.ledger
            .extend(&enrollment.id, 30, Some(PaymentId::new()), Some("purchase"))
            .await
            .unwrap();

        let revoked = f
            .ledger
            .revoke_for_origin(&AccessOrigin::Payment(original), "refund")
            .await
            .unwrap();
        assert_eq!(revoked.len(), 1);
        assert!(!f.ledger.has_access(&user(), &course()).await.unwrap());
    }

    #[tokio::test]
    async fn extension_of_a_superseded_enrollment_lands_on_the_active_one() {
        let f = fixture();
        let now = Timestamp::now();
        let old = f
            .ledger
            .grant_at(grant_request(Some(now.minus_days(10)), 0), now.minus_days(40))
            .await
            .unwrap()
            .enrollment;
        f.ledger.process_expired_at(now).await.unwrap();
        let active = f
            .ledger
            .grant_at(grant_request(Some(now.add_days(20)), 0), now)
            .await
            .unwrap()
            .enrollment;

        let paid_by = PaymentId::new();
        let extended = f
            .ledger
            .extend(&old.id, 30, Some(paid_by), Some("purchase"))
            .await
            .unwrap();

        assert_eq!(extended.id, active.id);
        assert_eq!(extended.expires_at, Some(now.add_days(50)));
        assert_eq!(extended.extended_by, vec![paid_by]);
        let history = f.ledger.list_for_user(&user()).await.unwrap();
        assert!(history
            .iter()
            .any(|e| e.id == old.id && e.status == EnrollmentStatus::Expired));
    }

    #[tokio::test]
    async fn concurrent_grants_create_exactly_one_enrollment() {
        let ledger = Arc::new(
            AccessLedger::new(
                Arc::new(InMemoryEnrollmentRepository::new()),
                Arc::new(InMemoryReminderScheduler::new()),
            ),
        );

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.grant(grant_request(None, 0)).await })
            })
            .collect();

        let mut created = 0;
        let mut ids = Vec::new();
        for task in tasks {
            let granted = task.await.unwrap().unwrap();
            created += usize::from(granted.created);
            ids.push(granted.enrollment.id);
        }

        assert_eq!(created, 1);
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }
}
