//! Refund and dispute records.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DisputeId, PaymentId, RefundId, Timestamp};

/// A refund observed on a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub payment_id: PaymentId,

    /// Processor charge id (`ch_...`).
    pub charge_ref: String,

    /// Processor refund id (`re_...`), when the event carries one.
    pub refund_ref: Option<String>,

    /// Cumulative amount refunded on the charge, in minor units.
    pub amount_refunded: i64,

    /// Amount originally captured on the charge.
    pub charge_amount: i64,
    pub currency: String,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl Refund {
    /// Whether the whole charge has been returned.
    pub fn is_full(&self) -> bool {
        self.amount_refunded >= self.charge_amount
    }
}

/// Processor dispute status.
///
/// Kept as the raw wire string; only closure matters to this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisputeStatus(pub String);

impl DisputeStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self.0.as_str(), "won" | "lost" | "warning_closed")
    }
}

/// A chargeback opened against a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,

    /// Processor dispute id (`dp_...`).
    pub dispute_ref: String,
    pub charge_ref: String,
    pub payment_id: Option<PaymentId>,
    pub amount: i64,
    pub currency: String,
    pub reason: String,
    pub status: DisputeStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refund(refunded: i64, charged: i64) -> Refund {
        Refund {
            id: RefundId::new(),
            payment_id: PaymentId::new(),
            charge_ref: "ch_1".to_string(),
            refund_ref: None,
            amount_refunded: refunded,
            charge_amount: charged,
            currency: "usd".to_string(),
            reason: None,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn full_refund_matches_charge_amount() {
        assert!(refund(9999, 9999).is_full());
        assert!(!refund(5000, 9999).is_full());
    }

    #[test]
    fn closed_dispute_statuses() {
        assert!(DisputeStatus("won".into()).is_closed());
        assert!(DisputeStatus("lost".into()).is_closed());
        assert!(!DisputeStatus("needs_response".into()).is_closed());
    }
}
