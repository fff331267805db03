//! Catalog reader port - prices of sellable products.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::enrollment::MembershipTier;
use crate::domain::foundation::{CourseId, DomainError};

/// Price of a catalog item in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPrice {
    pub amount: i64,
    pub currency: String,

    /// Days of access a purchase grants; `None` for lifetime access.
    pub access_days: Option<u32>,
}

/// Price reference for a recurring membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPlan {
    /// Processor price id (`price_...`).
    pub price_ref: String,

    /// Per-month amount, used to price gifted months.
    pub monthly_amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// `None` if the course doesn't exist or isn't for sale.
    async fn course_price(&self, course_id: &CourseId) -> Result<Option<CatalogPrice>, DomainError>;

    async fn program_price(&self, program: &str) -> Result<Option<CatalogPrice>, DomainError>;

    async fn membership_plan(
        &self,
        tier: MembershipTier,
    ) -> Result<Option<MembershipPlan>, DomainError>;

    /// Price per day of access extension for a course or program.
    async fn extension_daily_price(&self, product_key: &str) -> Result<Option<i64>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_reader_is_object_safe() {
        fn _accepts_dyn(_reader: &dyn CatalogReader) {}
    }
}
