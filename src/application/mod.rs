//! Application layer - command handlers over the domain and ports.
//!
//! Handlers own the order of side effects: storage writes, processor calls
//! and notifications. The domain types they drive stay free of I/O.

pub mod handlers;

pub use handlers::{
    AccessLedger, CreatePurchaseCommand, GrantAccess, HandleWebhookCommand, HandleWebhookHandler,
    PurchaseItem, PurchaseOrchestrator, PurchaseOutcome, PurchaseQuote, PurchaseReceipt,
};
