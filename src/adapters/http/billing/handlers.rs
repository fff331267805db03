//! HTTP handlers for purchases, access checks and Stripe webhooks.
//!
//! These handlers connect Axum routes to the application layer.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::enrollment::AccessLedger;
use crate::application::handlers::purchase::{
    CreatePurchaseCommand, PurchaseOrchestrator, PurchaseOutcome,
};
use crate::application::handlers::webhook::{HandleWebhookCommand, HandleWebhookHandler};
use crate::domain::billing::BillingError;
use crate::domain::enrollment::{EnrollmentError, ProductRef};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId, ValidationError};
use crate::domain::webhook::WebhookError;

use super::dto::{
    AccessResponse, EnrollmentListResponse, EnrollmentResponse, ErrorResponse, PurchaseRequest,
    WebhookAck,
};

const SIGNATURE_HEADER: &str = "Stripe-Signature";
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes.
///
/// Built once at start-up; cloning only bumps reference counts.
#[derive(Clone)]
pub struct BillingAppState {
    pub orchestrator: Arc<PurchaseOrchestrator>,
    pub ledger: Arc<AccessLedger>,
    pub webhooks: Arc<HandleWebhookHandler>,
}

impl BillingAppState {
    pub fn new(
        orchestrator: Arc<PurchaseOrchestrator>,
        ledger: Arc<AccessLedger>,
        webhooks: Arc<HandleWebhookHandler>,
    ) -> Self {
        Self {
            orchestrator,
            ledger,
            webhooks,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity, forwarded by the upstream auth proxy as `X-User-Id`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

fn purchase_command(
    user: AuthenticatedUser,
    headers: &HeaderMap,
    request: PurchaseRequest,
) -> CreatePurchaseCommand {
    CreatePurchaseCommand {
        user_id: user.user_id,
        email: request.email,
        item: request.item,
        promo_code: request.promo_code,
        billing_state: request.billing_state,
        idempotency_key: headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Purchases
// ════════════════════════════════════════════════════════════════════════════════

/// POST /purchases/quote - Price a purchase without charging
pub async fn quote_purchase(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(request): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = purchase_command(user, &headers, request);
    let quote = state.orchestrator.quote(&cmd).await?;
    Ok(Json(quote))
}

/// POST /purchases - Start a payment or subscription
///
/// A rejected promo code is a 422 carrying the evaluation; nothing is charged.
pub async fn create_purchase(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(request): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = purchase_command(user, &headers, request);
    let outcome = state.orchestrator.create(cmd).await?;

    let status = match outcome {
        PurchaseOutcome::Created(_) => StatusCode::CREATED,
        PurchaseOutcome::PromoRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(outcome)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Access
// ════════════════════════════════════════════════════════════════════════════════

/// GET /access/:product_kind/:product_id - Whether the caller may use a product
pub async fn check_access(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path((product_kind, product_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, BillingApiError> {
    let product = ProductRef::from_parts(&product_kind, &product_id)?;

    let active = state.ledger.find_active(&user.user_id, &product).await?;
    let now = Timestamp::now();
    let response = AccessResponse {
        has_access: active.as_ref().is_some_and(|e| e.has_access_at(now)),
        enrollment: active.as_ref().map(EnrollmentResponse::from),
    };

    Ok(Json(response))
}

/// GET /enrollments - Every enrollment of the caller, newest first
pub async fn list_enrollments(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let enrollments = state.ledger.list_for_user(&user.user_id).await?;
    Ok(Json(EnrollmentListResponse {
        enrollments: enrollments.iter().map(EnrollmentResponse::from).collect(),
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/stripe - Handle Stripe webhook events
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WebhookError::ParseError("missing Stripe-Signature header".to_string()))?;

    let cmd = HandleWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };
    let result = state.webhooks.handle(cmd).await?;

    Ok((StatusCode::OK, Json(WebhookAck::from(result))))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts purchase and ledger errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<EnrollmentError> for BillingApiError {
    fn from(err: EnrollmentError) -> Self {
        Self(err.into())
    }
}

impl From<ValidationError> for BillingApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            BillingError::AlreadyEnrolled(_) => (StatusCode::CONFLICT, "ALREADY_ENROLLED"),
            BillingError::AlreadySubscribed(_) => (StatusCode::CONFLICT, "ALREADY_SUBSCRIBED"),
            BillingError::CourseNotFound(_) => (StatusCode::NOT_FOUND, "COURSE_NOT_FOUND"),
            BillingError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "PRODUCT_NOT_FOUND"),
            BillingError::EnrollmentNotFound(_) => {
                (StatusCode::NOT_FOUND, "ENROLLMENT_NOT_FOUND")
            }
            BillingError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            BillingError::PaymentCreationFailed(_) => {
                (StatusCode::BAD_GATEWAY, "PAYMENT_CREATION_FAILED")
            }
            BillingError::SubscriptionCreationFailed(_) => {
                (StatusCode::BAD_GATEWAY, "SUBSCRIPTION_CREATION_FAILED")
            }
            BillingError::Storage(err) => match err.code {
                ErrorCode::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
                ErrorCode::EnrollmentRevoked | ErrorCode::InvalidStateTransition => {
                    (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
                }
                ErrorCode::ValidationFailed
                | ErrorCode::EmptyField
                | ErrorCode::OutOfRange
                | ErrorCode::InvalidFormat => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "billing request failed");
        }

        let body = ErrorResponse::new(error_code, self.0.to_string());
        (status, Json(body)).into_response()
    }
}

/// API error type for webhook deliveries.
///
/// The status code decides whether Stripe redelivers.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let error_code = match &self.0 {
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            WebhookError::InvalidTimestamp => "INVALID_TIMESTAMP",
            WebhookError::ParseError(_) => "PARSE_ERROR",
            WebhookError::Ignored(_) => "IGNORED",
            _ => "WEBHOOK_PROCESSING_ERROR",
        };
        let body = ErrorResponse::new(error_code, self.0.to_string());
        (self.0.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::EnrollmentId;

    fn status_of(err: impl Into<BillingApiError>) -> StatusCode {
        let err: BillingApiError = err.into();
        err.into_response().status()
    }

    #[test]
    fn purchase_conflicts_map_to_409() {
        assert_eq!(
            status_of(BillingError::AlreadyEnrolled("course:rust-101".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(BillingError::AlreadySubscribed("monthly".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn missing_products_map_to_404() {
        assert_eq!(
            status_of(BillingError::CourseNotFound("nope".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BillingError::EnrollmentNotFound(EnrollmentId::new())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn gateway_failures_map_to_502() {
        assert_eq!(
            status_of(BillingError::PaymentCreationFailed("card_declined".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn storage_errors_map_by_code() {
        assert_eq!(
            status_of(DomainError::new(ErrorCode::DatabaseError, "down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(DomainError::new(ErrorCode::Conflict, "raced")),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn webhook_errors_use_their_status() {
        let status = |err: WebhookError| WebhookApiError::from(err).into_response().status();

        assert_eq!(status(WebhookError::InvalidSignature), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(WebhookError::ParseError("bad json".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(WebhookError::Database("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
