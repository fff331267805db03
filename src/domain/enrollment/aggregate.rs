//! Enrollment aggregate.
//!
//! An enrollment is the single source of truth for whether a user may use a
//! product. Access is never cached: it is derived from the status and the
//! grace window every time it is asked for.
//!
//! # Invariants
//!
//! - `grace_period_end >= expires_at` whenever both are set
//! - at most one `Active` enrollment per (user, product), enforced by storage
//! - `Revoked` is terminal

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    EnrollmentId, PaymentId, StateMachine, SubscriptionId, Timestamp, UserId,
};

use super::{EnrollmentError, EnrollmentStatus, ProductRef};

/// Days before `expires_at` at which an expiration warning goes out.
pub const EXPIRATION_WARNING_DAYS: [i64; 3] = [7, 3, 1];

/// Metadata key holding the reason of the last revocation.
pub const REVOCATION_REASON_KEY: &str = "revocation_reason";

/// Metadata key holding the reason of the last extension.
pub const EXTENSION_REASON_KEY: &str = "extension_reason";

/// What paid for an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccessOrigin {
    Payment(PaymentId),
    Subscription(SubscriptionId),
}

impl AccessOrigin {
    pub fn kind(&self) -> &'static str {
        match self {
            AccessOrigin::Payment(_) => "payment",
            AccessOrigin::Subscription(_) => "subscription",
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        match self {
            AccessOrigin::Payment(id) => *id.as_uuid(),
            AccessOrigin::Subscription(id) => *id.as_uuid(),
        }
    }

    /// Rebuilds an origin from its stored `(kind, id)` pair.
    pub fn from_parts(kind: &str, id: uuid::Uuid) -> Option<Self> {
        match kind {
            "payment" => Some(AccessOrigin::Payment(PaymentId::from_uuid(id))),
            "subscription" => Some(AccessOrigin::Subscription(SubscriptionId::from_uuid(id))),
            _ => None,
        }
    }
}

/// A scheduled expiration warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationWarning {
    pub days_before: i64,
    pub send_at: Timestamp,
}

/// Enrollment aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub product: ProductRef,
    pub status: EnrollmentStatus,
    pub enrolled_at: Timestamp,

    /// `None` means access never lapses on its own (memberships).
    pub expires_at: Option<Timestamp>,

    /// Last instant access is still honoured after `expires_at`.
    pub grace_period_end: Option<Timestamp>,

    /// What paid for the original grant. Extensions never replace it.
    pub origin: Option<AccessOrigin>,

    /// Payments that bought extensions, oldest first.
    #[serde(default)]
    pub extended_by: Vec<PaymentId>,

    pub metadata: HashMap<String, String>,
    pub revoked_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Enrollment {
    /// Creates a new active enrollment.
    ///
    /// A grace period only applies when there is an expiry to extend.
    pub fn grant(
        user_id: UserId,
        product: ProductRef,
        expires_at: Option<Timestamp>,
        grace_period_days: u32,
        origin: Option<AccessOrigin>,
        now: Timestamp,
    ) -> Self {
        let grace_period_end = expires_at.map(|exp| exp.add_days(i64::from(grace_period_days)));
        Self {
            id: EnrollmentId::new(),
            user_id,
            product,
            status: EnrollmentStatus::Active,
            enrolled_at: now,
            expires_at,
            grace_period_end,
            origin,
            extended_by: Vec::new(),
            metadata: HashMap::new(),
            revoked_at: None,
            updated_at: now,
        }
    }

    /// Whether `origin` paid for this enrollment or for one of its extensions.
    pub fn is_paid_by(&self, origin: &AccessOrigin) -> bool {
        if self.origin.as_ref() == Some(origin) {
            return true;
        }
        match origin {
            AccessOrigin::Payment(payment_id) => self.extended_by.contains(payment_id),
            AccessOrigin::Subscription(_) => false,
        }
    }

    /// Last instant at which access is still granted, if any.
    pub fn access_deadline(&self) -> Option<Timestamp> {
        self.grace_period_end.or(self.expires_at)
    }

    /// Whether the user may use the product at `now`.
    pub fn has_access_at(&self, now: Timestamp) -> bool {
        if self.status != EnrollmentStatus::Active {
            return false;
        }
        match self.access_deadline() {
            None => true,
            Some(deadline) => now <= deadline,
        }
    }

    /// Whether the grace window has fully elapsed at `now`.
    pub fn is_past_grace(&self, now: Timestamp) -> bool {
        self.access_deadline()
            .map(|deadline| now.is_after(&deadline))
            .unwrap_or(false)
    }

    /// Marks the enrollment expired.
    pub fn expire(&mut self, now: Timestamp) -> Result<(), EnrollmentError> {
        self.transition_to(EnrollmentStatus::Expired)?;
        self.updated_at = now;
        Ok(())
    }

    /// Revokes access.
    ///
    /// Returns `Ok(false)` when the enrollment was already revoked.
    pub fn revoke(&mut self, reason: &str, now: Timestamp) -> Result<bool, EnrollmentError> {
        if self.status == EnrollmentStatus::Revoked {
            return Ok(false);
        }
        self.transition_to(EnrollmentStatus::Revoked)?;
        self.revoked_at = Some(now);
        self.updated_at = now;
        self.metadata
            .insert(REVOCATION_REASON_KEY.to_string(), reason.to_string());
        Ok(true)
    }

    /// Pushes the expiry out by `days`, keeping the grace period length.
    ///
    /// An expired enrollment becomes active again. A revoked one is rejected.
    /// `paid_by` is appended to `extended_by`; `origin` is left as it was.
    pub fn extend(
        &mut self,
        days: i64,
        paid_by: Option<PaymentId>,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<(), EnrollmentError> {
        if self.status == EnrollmentStatus::Revoked {
            return Err(EnrollmentError::Revoked(self.id));
        }
        if days < 1 {
            return Err(EnrollmentError::InvalidExtension(days));
        }

        let grace = match (self.expires_at, self.grace_period_end) {
            (Some(exp), Some(end)) => end.duration_since(&exp),
            _ => Duration::zero(),
        };
        let new_expiry = self.expires_at.unwrap_or(now).add_days(days);

        if self.status == EnrollmentStatus::Expired {
            self.transition_to(EnrollmentStatus::Active)?;
        }
        self.expires_at = Some(new_expiry);
        self.grace_period_end = Some(new_expiry.plus(grace));
        if let Some(payment_id) = paid_by {
            if !self.extended_by.contains(&payment_id) {
                self.extended_by.push(payment_id);
            }
        }
        if let Some(reason) = reason {
            self.metadata
                .insert(EXTENSION_REASON_KEY.to_string(), reason.to_string());
        }
        self.updated_at = now;
        Ok(())
    }

    /// Expiration warnings still ahead of `now`.
    pub fn expiration_warnings(&self, now: Timestamp) -> Vec<ExpirationWarning> {
        let Some(expires_at) = self.expires_at else {
            return Vec::new();
        };
        EXPIRATION_WARNING_DAYS
            .iter()
            .map(|&days_before| ExpirationWarning {
                days_before,
                send_at: expires_at.minus_days(days_before),
            })
            .filter(|warning| warning.send_at.is_after(&now))
            .collect()
    }

    fn transition_to(&mut self, target: EnrollmentStatus) -> Result<(), EnrollmentError> {
        let from = self.status;
        self.status = from
            .transition_to(target)
            .map_err(|_| EnrollmentError::InvalidTransition { from, to: target })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::CourseId;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn course() -> ProductRef {
        ProductRef::Course(CourseId::new("rust-101").unwrap())
    }

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn timed_enrollment(now: Timestamp, days: i64, grace: u32) -> Enrollment {
        Enrollment::grant(user(), course(), Some(now.add_days(days)), grace, None, now)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Grant
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn grant_without_expiry_has_no_grace() {
        let now = at(1_000_000);
        let e = Enrollment::grant(user(), course(), None, 7, None, now);
        assert_eq!(e.status, EnrollmentStatus::Active);
        assert_eq!(e.expires_at, None);
        assert_eq!(e.grace_period_end, None);
        assert!(e.has_access_at(now.add_days(10_000)));
    }

    #[test]
    fn grant_sets_grace_end_after_expiry() {
        let now = at(1_000_000);
        let e = timed_enrollment(now, 30, 3);
        assert_eq!(e.grace_period_end, Some(now.add_days(33)));
        assert!(e.grace_period_end >= e.expires_at);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Access window
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn access_holds_until_exact_grace_end() {
        let now = at(1_000_000);
        let e = timed_enrollment(now, 30, 3);
        let end = now.add_days(33);

        assert!(e.has_access_at(end.plus_secs(-1)));
        assert!(e.has_access_at(end));
        assert!(!e.has_access_at(end.plus_secs(1)));
    }

    #[test]
    fn access_without_grace_ends_at_expiry() {
        let now = at(1_000_000);
        let e = timed_enrollment(now, 30, 0);
        assert!(e.has_access_at(now.add_days(30)));
        assert!(!e.has_access_at(now.add_days(30).plus_secs(1)));
    }

    #[test]
    fn revoked_enrollment_has_no_access() {
        let now = at(1_000_000);
        let mut e = Enrollment::grant(user(), course(), None, 0, None, now);
        e.revoke("refund", now).unwrap();
        assert!(!e.has_access_at(now));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Revoke
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn revoke_records_reason_and_time() {
        let now = at(1_000_000);
        let mut e = timed_enrollment(now, 30, 0);
        assert!(e.revoke("full refund", now.plus_secs(5)).unwrap());
        assert_eq!(e.status, EnrollmentStatus::Revoked);
        assert_eq!(e.revoked_at, Some(now.plus_secs(5)));
        assert_eq!(
            e.metadata.get(REVOCATION_REASON_KEY).map(String::as_str),
            Some("full refund")
        );
    }

    #[test]
    fn revoke_twice_is_a_no_op() {
        let now = at(1_000_000);
        let mut e = timed_enrollment(now, 30, 0);
        e.revoke("first", now).unwrap();
        assert!(!e.revoke("second", now.plus_secs(10)).unwrap());
        assert_eq!(e.revoked_at, Some(now));
        assert_eq!(e.metadata[REVOCATION_REASON_KEY], "first");
    }

    // ════════════════════════════════════════════════════════════════════════
    // Extend
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn extend_moves_expiry_and_keeps_grace_length() {
        let now = at(1_000_000);
        let mut e = timed_enrollment(now, 30, 5);
        e.extend(10, None, Some("bought more time"), now).unwrap();

        assert_eq!(e.expires_at, Some(now.add_days(40)));
        assert_eq!(e.grace_period_end, Some(now.add_days(45)));
        assert_eq!(e.metadata[EXTENSION_REASON_KEY], "bought more time");
    }

    #[test]
    fn paid_extension_keeps_the_original_origin() {
        let now = at(1_000_000);
        let original = PaymentId::new();
        let extension = PaymentId::new();
        let mut e = Enrollment::grant(
            user(),
            course(),
            Some(now.add_days(30)),
            0,
            Some(AccessOrigin::Payment(original)),
            now,
        );

        e.extend(30, Some(extension), Some("purchase"), now).unwrap();

        assert_eq!(e.origin, Some(AccessOrigin::Payment(original)));
        assert_eq!(e.extended_by, vec![extension]);
        assert!(e.is_paid_by(&AccessOrigin::Payment(original)));
        assert!(e.is_paid_by(&AccessOrigin::Payment(extension)));
        assert!(!e.is_paid_by(&AccessOrigin::Payment(PaymentId::new())));
    }

    #[test]
    fn extend_resurrects_expired_enrollment() {
        let now = at(1_000_000);
        let mut e = timed_enrollment(now, 1, 0);
        let later = now.add_days(2);
        e.expire(later).unwrap();
        assert!(!e.has_access_at(later));

        e.extend(30, None, None, later).unwrap();
        assert_eq!(e.status, EnrollmentStatus::Active);
        assert!(e.has_access_at(later));
    }

    #[test]
    fn extend_without_expiry_counts_from_now() {
        let now = at(1_000_000);
        let mut e = Enrollment::grant(user(), course(), None, 0, None, now);
        e.extend(14, None, None, now).unwrap();
        assert_eq!(e.expires_at, Some(now.add_days(14)));
        assert_eq!(e.grace_period_end, Some(now.add_days(14)));
    }

    #[test]
    fn extend_rejects_revoked_enrollment() {
        let now = at(1_000_000);
        let mut e = timed_enrollment(now, 30, 0);
        e.revoke("refund", now).unwrap();
        assert!(matches!(
            e.extend(10, None, None, now),
            Err(EnrollmentError::Revoked(_))
        ));
    }

    #[test]
    fn extend_rejects_non_positive_days() {
        let now = at(1_000_000);
        let mut e = timed_enrollment(now, 30, 0);
        assert!(matches!(
            e.extend(0, None, None, now),
            Err(EnrollmentError::InvalidExtension(0))
        ));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Expire and warnings
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn expired_enrollment_cannot_expire_again() {
        let now = at(1_000_000);
        let mut e = timed_enrollment(now, 1, 0);
        e.expire(now).unwrap();
        assert!(matches!(
            e.expire(now),
            Err(EnrollmentError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn is_past_grace_only_after_deadline() {
        let now = at(1_000_000);
        let e = timed_enrollment(now, 30, 2);
        assert!(!e.is_past_grace(now.add_days(32)));
        assert!(e.is_past_grace(now.add_days(32).plus_secs(1)));
    }

    #[test]
    fn warnings_skip_offsets_already_passed() {
        let now = at(1_000_000);
        let e = timed_enrollment(now, 5, 0);
        let warnings = e.expiration_warnings(now);
        let days: Vec<i64> = warnings.iter().map(|w| w.days_before).collect();
        assert_eq!(days, vec![3, 1]);
        assert_eq!(warnings[0].send_at, now.add_days(2));
    }

    #[test]
    fn warnings_empty_without_expiry() {
        let now = at(1_000_000);
        let e = Enrollment::grant(user(), course(), None, 0, None, now);
        assert!(e.expiration_warnings(now).is_empty());
    }

    #[test]
    fn origin_parts_round_back() {
        let origin = AccessOrigin::Payment(PaymentId::new());
        assert_eq!(AccessOrigin::from_parts(origin.kind(), origin.id()), Some(origin));
        assert_eq!(AccessOrigin::from_parts("gift", origin.id()), None);
    }
}
