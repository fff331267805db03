//! Application handlers.
//!
//! - `enrollment` - the access ledger
//! - `purchase` - pricing and starting purchases
//! - `webhook` - processor event handlers

pub mod enrollment;
pub mod purchase;
pub mod webhook;

pub use enrollment::{AccessLedger, GrantAccess, Granted};
pub use purchase::{
    CreatePurchaseCommand, PurchaseItem, PurchaseOrchestrator, PurchaseOutcome, PurchaseQuote,
    PurchaseReceipt,
};
pub use webhook::{HandleWebhookCommand, HandleWebhookHandler};
