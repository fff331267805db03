//! Refund and dispute repository ports.
//!
//! Refunds are unique on `(charge_ref, amount_refunded)`. Stripe reports the
//! cumulative refunded amount on a charge, so the same refund redelivered
//! under a new event id maps to the same row.

use async_trait::async_trait;

use crate::domain::billing::{Dispute, Refund};
use crate::domain::foundation::{DomainError, PaymentId};

#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Inserts the refund unless one with the same charge and cumulative
    /// amount exists. Returns `true` when a row was written.
    async fn insert_if_absent(&self, refund: &Refund) -> Result<bool, DomainError>;

    async fn list_for_payment(&self, payment_id: &PaymentId) -> Result<Vec<Refund>, DomainError>;
}

#[async_trait]
pub trait DisputeRepository: Send + Sync {
    /// Inserts or updates the dispute keyed by `dispute_ref`.
    ///
    /// Returns `true` when the dispute was not known before.
    async fn upsert(&self, dispute: &Dispute) -> Result<bool, DomainError>;

    async fn find_by_ref(&self, dispute_ref: &str) -> Result<Option<Dispute>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_ports_are_object_safe() {
        fn _refunds(_repo: &dyn RefundRepository) {}
        fn _disputes(_repo: &dyn DisputeRepository) {}
    }
}
