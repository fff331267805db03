//! Purchase handlers.

mod create_purchase;
mod quote_purchase;

pub use create_purchase::{PurchaseOrchestrator, PurchaseOutcome, PurchaseReceipt};
pub use quote_purchase::{
    CreatePurchaseCommand, PurchaseItem, PurchaseQuote, MAX_EXTENSION_DAYS, MAX_GIFT_MONTHS,
};
