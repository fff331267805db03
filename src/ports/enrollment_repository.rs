//! Enrollment repository port.
//!
//! # Invariants
//!
//! - At most one `Active` enrollment per (user, product). `insert` reports a
//!   `Conflict` when a second one would be created, so concurrent grants
//!   can fall back to reading the winner.
//! - Enrollments are never deleted.

use async_trait::async_trait;

use crate::domain::enrollment::{AccessOrigin, Enrollment, ProductRef};
use crate::domain::foundation::{DomainError, EnrollmentId, Timestamp, UserId};

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Inserts a new enrollment.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the user already has an active enrollment for the product
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, enrollment: &Enrollment) -> Result<(), DomainError>;

    /// Overwrites an existing enrollment.
    ///
    /// # Errors
    ///
    /// - `EnrollmentNotFound` if the enrollment doesn't exist
    async fn update(&self, enrollment: &Enrollment) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, DomainError>;

    /// The active enrollment for a user and product, if any.
    async fn find_active(
        &self,
        user_id: &UserId,
        product: &ProductRef,
    ) -> Result<Option<Enrollment>, DomainError>;

    /// Every enrollment the user has ever had, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>, DomainError>;

    /// Active enrollments paid for by `origin`.
    async fn list_active_by_origin(
        &self,
        origin: &AccessOrigin,
    ) -> Result<Vec<Enrollment>, DomainError>;

    /// Active enrollments whose access deadline is strictly before `now`.
    async fn list_lapsed(&self, now: Timestamp) -> Result<Vec<Enrollment>, DomainError>;
}
