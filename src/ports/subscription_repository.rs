//! Subscription repository port.

use async_trait::async_trait;

use crate::domain::billing::Subscription;
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts or replaces the subscription keyed by `subscription_ref`.
    async fn upsert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    async fn find_by_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// A subscription of the user whose status still grants access.
    async fn find_live_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError>;
}
