//! Customer profile mirror.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

/// Local copy of the processor's customer object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    /// Processor customer id (`cus_...`).
    pub customer_ref: String,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub default_payment_method: Option<String>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub updated_at: Timestamp,
}

impl CustomerProfile {
    pub fn new(customer_ref: impl Into<String>, now: Timestamp) -> Self {
        Self {
            customer_ref: customer_ref.into(),
            user_id: None,
            email: None,
            name: None,
            default_payment_method: None,
            card_brand: None,
            card_last4: None,
            updated_at: now,
        }
    }
}
