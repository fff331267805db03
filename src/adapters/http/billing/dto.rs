//! Request and response bodies for the billing endpoints.

use serde::{Deserialize, Serialize};

use crate::application::handlers::purchase::PurchaseItem;
use crate::domain::enrollment::Enrollment;
use crate::domain::foundation::{EnrollmentId, Timestamp};
use crate::ports::WebhookResult;

// ════════════════════════════════════════════════════════════════════════════════
// Purchases
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /purchases` and `POST /purchases/quote`.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub item: PurchaseItem,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Two-letter billing state, used for sales tax.
    #[serde(default)]
    pub billing_state: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Access
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentResponse {
    pub id: EnrollmentId,
    pub product: String,
    pub status: String,
    pub enrolled_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub grace_period_end: Option<Timestamp>,
}

impl From<&Enrollment> for EnrollmentResponse {
    fn from(enrollment: &Enrollment) -> Self {
        Self {
            id: enrollment.id,
            product: enrollment.product.to_string(),
            status: enrollment.status.as_str().to_string(),
            enrolled_at: enrollment.enrolled_at,
            expires_at: enrollment.expires_at,
            grace_period_end: enrollment.grace_period_end,
        }
    }
}

/// Response of `GET /access/:product_kind/:product_id`.
#[derive(Debug, Clone, Serialize)]
pub struct AccessResponse {
    pub has_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<EnrollmentResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentListResponse {
    pub enrollments: Vec<EnrollmentResponse>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub result: &'static str,
}

impl From<WebhookResult> for WebhookAck {
    fn from(result: WebhookResult) -> Self {
        let result = match result {
            WebhookResult::Processed => "processed",
            WebhookResult::Ignored => "ignored",
            WebhookResult::AlreadyProcessed => "already_processed",
        };
        Self {
            received: true,
            result,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
