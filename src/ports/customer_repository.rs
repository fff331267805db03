//! Customer profile mirror port.

use async_trait::async_trait;

use crate::domain::billing::CustomerProfile;
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Inserts or replaces the profile keyed by `customer_ref`.
    async fn upsert(&self, profile: &CustomerProfile) -> Result<(), DomainError>;

    async fn find_by_ref(&self, customer_ref: &str)
        -> Result<Option<CustomerProfile>, DomainError>;

    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<CustomerProfile>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn CustomerRepository) {}
    }
}
