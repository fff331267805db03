//! Subscription mirror.
//!
//! The processor owns the subscription lifecycle; this record mirrors the
//! last state it reported, so any status may follow any other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::enrollment::MembershipTier;
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId, ValidationError};

/// Processor-reported subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Incomplete,
    PastDue,
    Unpaid,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Statuses under which the member keeps access.
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    /// Revocation reason for statuses that withdraw access.
    ///
    /// `Incomplete` neither grants nor revokes: the first invoice is still
    /// being collected.
    pub fn revocation_reason(&self) -> Option<&'static str> {
        match self {
            SubscriptionStatus::Canceled => Some("subscription_canceled"),
            SubscriptionStatus::Unpaid => Some("subscription_unpaid"),
            SubscriptionStatus::PastDue => Some("subscription_past_due"),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            // The processor also reports a terminal `incomplete_expired`
            "canceled" | "incomplete_expired" => Ok(SubscriptionStatus::Canceled),
            other => Err(ValidationError::invalid_format(
                "subscription_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Locally mirrored recurring membership subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,

    /// Processor subscription id (`sub_...`).
    pub subscription_ref: String,

    /// Processor customer id (`cus_...`).
    pub customer_ref: String,

    pub tier: MembershipTier,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields the processor reports on every subscription event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub subscription_ref: String,
    pub customer_ref: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
}

impl Subscription {
    pub fn from_snapshot(
        user_id: UserId,
        tier: MembershipTier,
        snapshot: SubscriptionSnapshot,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id,
            subscription_ref: snapshot.subscription_ref,
            customer_ref: snapshot.customer_ref,
            tier,
            status: snapshot.status,
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            canceled_at: snapshot.canceled_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites mirrored fields with the processor's latest view.
    pub fn apply_snapshot(&mut self, snapshot: SubscriptionSnapshot, now: Timestamp) {
        self.customer_ref = snapshot.customer_ref;
        self.status = snapshot.status;
        self.current_period_start = snapshot.current_period_start;
        self.current_period_end = snapshot.current_period_end;
        self.cancel_at_period_end = snapshot.cancel_at_period_end;
        self.canceled_at = snapshot.canceled_at.or(self.canceled_at);
        self.updated_at = now;
    }

    pub fn mark_canceled(&mut self, now: Timestamp) {
        self.status = SubscriptionStatus::Canceled;
        self.canceled_at.get_or_insert(now);
        self.updated_at = now;
    }
}
