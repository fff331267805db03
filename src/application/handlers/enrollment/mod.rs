//! Enrollment handlers.
//!
//! The `AccessLedger` owns every enrollment write and access query.

mod access_ledger;

pub use access_ledger::{AccessLedger, GrantAccess, Granted};
