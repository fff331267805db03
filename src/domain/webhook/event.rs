//! Stripe webhook event envelope.
//!
//! Only the envelope is parsed eagerly. Each handler decodes `data.object`
//! into the payload type it needs (see `payloads`).

use serde::{Deserialize, Serialize};

use super::WebhookError;

/// Stripe webhook event (simplified).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (`evt_...`).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp of creation.
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,

    /// Body as delivered, kept for the event ledger.
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event; shape depends on the type.
    pub object: serde_json::Value,

    /// Previous values of changed attributes (update events only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    /// Parses a delivery body, keeping the untouched JSON alongside.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_slice(payload)?;
        let mut event: StripeEvent = serde_json::from_value(raw.clone())?;
        event.raw = Some(raw);
        Ok(event)
    }

    /// JSON to store for this event: the delivered body when known.
    pub fn raw_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.raw {
            Some(raw) => Ok(raw.clone()),
            None => serde_json::to_value(self),
        }
    }

    /// Parse the event type into a known enum variant.
    pub fn parsed_type(&self) -> StripeEventType {
        StripeEventType::from(self.event_type.as_str())
    }

    /// Decodes `data.object` as `T`.
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            WebhookError::Processing(format!(
                "malformed {} object: {}",
                self.event_type, e
            ))
        })
    }
}

/// Stripe event types this service reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StripeEventType {
    PaymentIntentSucceeded,
    PaymentIntentPaymentFailed,
    PaymentIntentCanceled,
    CustomerSubscriptionCreated,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    ChargeRefunded,
    ChargeDisputeCreated,
    ChargeDisputeUpdated,
    ChargeDisputeClosed,
    CustomerCreated,
    CustomerUpdated,
    PaymentMethodAttached,
    /// Anything else; acknowledged and ignored.
    Unknown,
}

impl StripeEventType {
    /// All handled (non-`Unknown`) types.
    pub const HANDLED: [StripeEventType; 13] = [
        StripeEventType::PaymentIntentSucceeded,
        StripeEventType::PaymentIntentPaymentFailed,
        StripeEventType::PaymentIntentCanceled,
        StripeEventType::CustomerSubscriptionCreated,
        StripeEventType::CustomerSubscriptionUpdated,
        StripeEventType::CustomerSubscriptionDeleted,
        StripeEventType::ChargeRefunded,
        StripeEventType::ChargeDisputeCreated,
        StripeEventType::ChargeDisputeUpdated,
        StripeEventType::ChargeDisputeClosed,
        StripeEventType::CustomerCreated,
        StripeEventType::CustomerUpdated,
        StripeEventType::PaymentMethodAttached,
    ];

    /// The Stripe wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::PaymentIntentPaymentFailed => "payment_intent.payment_failed",
            Self::PaymentIntentCanceled => "payment_intent.canceled",
            Self::CustomerSubscriptionCreated => "customer.subscription.created",
            Self::CustomerSubscriptionUpdated => "customer.subscription.updated",
            Self::CustomerSubscriptionDeleted => "customer.subscription.deleted",
            Self::ChargeRefunded => "charge.refunded",
            Self::ChargeDisputeCreated => "charge.dispute.created",
            Self::ChargeDisputeUpdated => "charge.dispute.updated",
            Self::ChargeDisputeClosed => "charge.dispute.closed",
            Self::CustomerCreated => "customer.created",
            Self::CustomerUpdated => "customer.updated",
            Self::PaymentMethodAttached => "payment_method.attached",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for StripeEventType {
    fn from(s: &str) -> Self {
        Self::HANDLED
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .unwrap_or(Self::Unknown)
    }
}

/// Builder for test events.
#[cfg(test)]
pub struct StripeEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    previous_attributes: Option<serde_json::Value>,
    livemode: bool,
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            event_type: event_type.into(),
            created: chrono::Utc::now().timestamp(),
            object: serde_json::json!({}),
            previous_attributes: None,
            livemode: false,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn previous_attributes(mut self, attrs: serde_json::Value) -> Self {
        self.previous_attributes = Some(attrs);
        self
    }

    pub fn livemode(mut self, livemode: bool) -> Self {
        self.livemode = livemode;
        self
    }

    pub fn build(self) -> StripeEvent {
        StripeEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: StripeEventData {
                object: self.object,
                previous_attributes: self.previous_attributes,
            },
            livemode: self.livemode,
            api_version: Some("2023-10-16".to_string()),
            raw: None,
        }
    }
}
