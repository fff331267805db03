//! Promo code storage port.
//!
//! Validation itself is a pure function over the stored code
//! (`domain::billing::validate_promo`); this port only loads and counts.
//!
//! # Example
//!
//! ```ignore
//! let promo = repo.find(&normalize_code(input)).await?;
//! let validation = validate_promo(promo.as_ref(), amount, ProductType::Course, now);
//! if validation.valid {
//!     repo.record_redemption(&promo.unwrap().code).await?;
//! }
//! ```

use async_trait::async_trait;

use crate::domain::billing::PromoCode;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait PromoCodeRepository: Send + Sync {
    /// Looks a code up by its canonical (upper-case) form.
    async fn find(&self, code: &str) -> Result<Option<PromoCode>, DomainError>;

    /// Increments the usage counter.
    ///
    /// Call after the purchase has been created, not during validation.
    async fn record_redemption(&self, code: &str) -> Result<(), DomainError>;
}
