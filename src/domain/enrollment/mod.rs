//! Enrollment module - access grants and their lifecycle.
//!
//! An enrollment moves `active -> expired -> active` through expiry and
//! extension, and `active -> revoked` when a refund or a lapsed
//! subscription withdraws access.

mod aggregate;
mod errors;
mod product;
mod status;

pub use aggregate::{
    AccessOrigin, Enrollment, ExpirationWarning, EXPIRATION_WARNING_DAYS, EXTENSION_REASON_KEY,
    REVOCATION_REASON_KEY,
};
pub use errors::EnrollmentError;
pub use product::{MembershipTier, ProductRef};
pub use status::EnrollmentStatus;
