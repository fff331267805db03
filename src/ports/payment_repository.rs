//! Payment repository port.
//!
//! Payments are keyed externally by their payment intent reference, which
//! is what every `payment_intent.*` and `charge.*` event carries.

use async_trait::async_trait;

use crate::domain::billing::Payment;
use crate::domain::foundation::{DomainError, PaymentId, UserId};

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Stores a new payment.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a payment with the same intent reference exists
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `PaymentNotFound` if the payment doesn't exist
    async fn update(&self, payment: &Payment) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    async fn find_by_intent_ref(&self, intent_ref: &str) -> Result<Option<Payment>, DomainError>;

    /// Every payment the user has made, oldest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Payment>, DomainError>;
}
