//! Typed views of the `data.object` payloads this service handles.
//!
//! Unknown fields are ignored. Fields Stripe may omit are `Option` or
//! defaulted so an older API version does not break decoding.

use std::collections::HashMap;

use serde::Deserialize;

/// `payment_intent.*` object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub decline_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PaymentIntentObject {
    /// Human-readable failure reason, most specific first.
    pub fn failure_reason(&self) -> String {
        self.last_payment_error
            .as_ref()
            .and_then(|e| {
                e.message
                    .clone()
                    .or_else(|| e.decline_code.clone())
                    .or_else(|| e.code.clone())
            })
            .unwrap_or_else(|| "payment_failed".to_string())
    }
}

/// `customer.subscription.*` object.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// `charge.*` object.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    pub currency: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub refunds: Option<RefundList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundList {
    #[serde(default)]
    pub data: Vec<RefundObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundObject {
    pub id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ChargeObject {
    /// The most recent refund attached to the charge, if listed.
    pub fn latest_refund(&self) -> Option<&RefundObject> {
        self.refunds.as_ref().and_then(|list| list.data.first())
    }
}

/// `charge.dispute.*` object.
#[derive(Debug, Clone, Deserialize)]
pub struct DisputeObject {
    pub id: String,
    pub charge: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub reason: String,
    pub status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

/// `customer.*` object.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerObject {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub invoice_settings: Option<InvoiceSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSettings {
    #[serde(default)]
    pub default_payment_method: Option<String>,
}

/// `payment_method.*` object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub card: Option<CardDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub brand: String,
    pub last4: String,
}
