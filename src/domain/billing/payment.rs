//! Payment record mirrored from the processor's payment intent.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, StateMachine, Timestamp, UserId, ValidationError,
};

use super::{ProductType, PurchaseContext};

/// Payment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "canceled" => Ok(PaymentStatus::Canceled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Succeeded)
                | (Pending, Failed)
                | (Pending, Canceled)
                // The customer may retry with another card on the same intent
                | (Failed, Succeeded)
                | (Failed, Canceled)
                | (Succeeded, Refunded)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Succeeded, Failed, Canceled],
            Failed => vec![Succeeded, Canceled],
            Succeeded => vec![Refunded],
            Canceled | Refunded => vec![],
        }
    }
}

/// A one-time payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,

    /// Processor payment-intent id (`pi_...`).
    pub payment_intent_ref: String,

    /// Amount charged in minor units, tax included.
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub product_type: ProductType,
    pub product_id: String,
    pub metadata: HashMap<String, String>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    /// Records a freshly created payment intent.
    pub fn pending(
        payment_intent_ref: impl Into<String>,
        context: &PurchaseContext,
        amount: i64,
        currency: impl Into<String>,
        metadata: HashMap<String, String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            user_id: context.user_id().clone(),
            payment_intent_ref: payment_intent_ref.into(),
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            product_type: context.product_type(),
            product_id: context.product_id(),
            metadata,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decodes the purchase context stored with this payment.
    pub fn context(&self) -> Result<PurchaseContext, ValidationError> {
        PurchaseContext::from_metadata(&self.metadata)
    }

    /// Moves to `target`.
    ///
    /// Returns `Ok(false)` when already there, so redelivered events are
    /// harmless.
    pub fn apply_status(
        &mut self,
        target: PaymentStatus,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        if self.status == target {
            return Ok(false);
        }
        let id = self.id;
        self.status = self.status.transition_to(target).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
                .with_detail("payment_id", id.to_string())
        })?;
        self.updated_at = now;
        Ok(true)
    }

    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        let changed = self.apply_status(PaymentStatus::Failed, now)?;
        self.failure_reason = Some(reason.into());
        Ok(changed)
    }
}
