//! PostgreSQL mirrors of processor-side billing objects.
//!
//! Every table here is keyed by the processor's own reference so webhook
//! redeliveries land on the same row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, db_error, is_unique_violation};
use crate::domain::billing::{
    CustomerProfile, Discount, Dispute, DisputeStatus, Payment, PaymentStatus, ProductType,
    PromoCode, Refund, Subscription, SubscriptionStatus,
};
use crate::domain::enrollment::MembershipTier;
use crate::domain::foundation::{
    DisputeId, DomainError, ErrorCode, PaymentId, RefundId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::{
    CustomerRepository, DisputeRepository, PaymentRepository, PromoCodeRepository,
    RefundRepository, SubscriptionRepository,
};

fn ts(at: &Timestamp) -> &DateTime<Utc> {
    at.as_datetime()
}

fn opt_ts(at: &Option<Timestamp>) -> Option<&DateTime<Utc>> {
    at.as_ref().map(Timestamp::as_datetime)
}

// ════════════════════════════════════════════════════════════════════════════════
// Payments
// ════════════════════════════════════════════════════════════════════════════════

const PAYMENT_COLUMNS: &str = "id, user_id, payment_intent_ref, amount, currency, status, \
     product_type, product_id, metadata, failure_reason, created_at, updated_at";

pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: String,
    payment_intent_ref: String,
    amount: i64,
    currency: String,
    status: String,
    product_type: String,
    product_id: String,
    metadata: Json<HashMap<String, String>>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            payment_intent_ref: row.payment_intent_ref,
            amount: row.amount,
            currency: row.currency,
            status: row
                .status
                .parse::<PaymentStatus>()
                .map_err(|e| corrupt("status", e))?,
            product_type: row
                .product_type
                .parse::<ProductType>()
                .map_err(|e| corrupt("product_type", e))?,
            product_id: row.product_id,
            metadata: row.metadata.0,
            failure_reason: row.failure_reason,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, payment_intent_ref, amount, currency, status,
                product_type, product_id, metadata, failure_reason, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_str())
        .bind(&payment.payment_intent_ref)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.product_type.as_str())
        .bind(&payment.product_id)
        .bind(Json(&payment.metadata))
        .bind(&payment.failure_reason)
        .bind(ts(&payment.created_at))
        .bind(ts(&payment.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "payments_payment_intent_ref_key") {
                return DomainError::new(
                    ErrorCode::Conflict,
                    format!("Payment for {} already exists", payment.payment_intent_ref),
                );
            }
            db_error("insert payment", e)
        })?;

        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $2,
                metadata = $3,
                failure_reason = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(Json(&payment.metadata))
        .bind(&payment.failure_reason)
        .bind(ts(&payment.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update payment", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::PaymentNotFound,
                format!("Payment {} not found", payment.id),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_intent_ref(&self, intent_ref: &str) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE payment_intent_ref = $1",
            PAYMENT_COLUMNS
        ))
        .bind(intent_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find payment by intent", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE user_id = $1 ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list payments", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscriptions
// ════════════════════════════════════════════════════════════════════════════════

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, subscription_ref, customer_ref, tier, status, \
     current_period_start, current_period_end, cancel_at_period_end, canceled_at, \
     created_at, updated_at";

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    subscription_ref: String,
    customer_ref: String,
    tier: String,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            subscription_ref: row.subscription_ref,
            customer_ref: row.customer_ref,
            tier: row
                .tier
                .parse::<MembershipTier>()
                .map_err(|e| corrupt("tier", e))?,
            status: row
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|e| corrupt("status", e))?,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn upsert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, subscription_ref, customer_ref, tier, status,
                current_period_start, current_period_end, cancel_at_period_end,
                canceled_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (subscription_ref) DO UPDATE SET
                customer_ref = EXCLUDED.customer_ref,
                tier = EXCLUDED.tier,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                canceled_at = EXCLUDED.canceled_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(&subscription.subscription_ref)
        .bind(&subscription.customer_ref)
        .bind(subscription.tier.as_str())
        .bind(subscription.status.as_str())
        .bind(ts(&subscription.current_period_start))
        .bind(ts(&subscription.current_period_end))
        .bind(subscription.cancel_at_period_end)
        .bind(opt_ts(&subscription.canceled_at))
        .bind(ts(&subscription.created_at))
        .bind(ts(&subscription.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("upsert subscription", e))?;

        Ok(())
    }

    async fn find_by_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE subscription_ref = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_live_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY updated_at DESC",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list subscriptions", e))?;

        // Which statuses grant access is domain knowledge, so filter here.
        for row in rows {
            let subscription = Subscription::try_from(row)?;
            if subscription.status.grants_access() {
                return Ok(Some(subscription));
            }
        }
        Ok(None)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Refunds and disputes
// ════════════════════════════════════════════════════════════════════════════════

pub struct PostgresRefundRepository {
    pool: PgPool,
}

impl PostgresRefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    payment_id: Uuid,
    charge_ref: String,
    refund_ref: Option<String>,
    amount_refunded: i64,
    charge_amount: i64,
    currency: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<RefundRow> for Refund {
    fn from(row: RefundRow) -> Self {
        Refund {
            id: RefundId::from_uuid(row.id),
            payment_id: PaymentId::from_uuid(row.payment_id),
            charge_ref: row.charge_ref,
            refund_ref: row.refund_ref,
            amount_refunded: row.amount_refunded,
            charge_amount: row.charge_amount,
            currency: row.currency,
            reason: row.reason,
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

#[async_trait]
impl RefundRepository for PostgresRefundRepository {
    async fn insert_if_absent(&self, refund: &Refund) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO refunds (
                id, payment_id, charge_ref, refund_ref, amount_refunded,
                charge_amount, currency, reason, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (charge_ref, amount_refunded) DO NOTHING
            "#,
        )
        .bind(refund.id.as_uuid())
        .bind(refund.payment_id.as_uuid())
        .bind(&refund.charge_ref)
        .bind(&refund.refund_ref)
        .bind(refund.amount_refunded)
        .bind(refund.charge_amount)
        .bind(&refund.currency)
        .bind(&refund.reason)
        .bind(ts(&refund.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert refund", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_payment(&self, payment_id: &PaymentId) -> Result<Vec<Refund>, DomainError> {
        let rows: Vec<RefundRow> = sqlx::query_as(
            r#"
            SELECT id, payment_id, charge_ref, refund_ref, amount_refunded,
                   charge_amount, currency, reason, created_at
            FROM refunds
            WHERE payment_id = $1
            ORDER BY amount_refunded
            "#,
        )
        .bind(payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list refunds", e))?;

        Ok(rows.into_iter().map(Refund::from).collect())
    }
}

pub struct PostgresDisputeRepository {
    pool: PgPool,
}

impl PostgresDisputeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    dispute_ref: String,
    charge_ref: String,
    payment_id: Option<Uuid>,
    amount: i64,
    currency: String,
    reason: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DisputeRow> for Dispute {
    fn from(row: DisputeRow) -> Self {
        Dispute {
            id: DisputeId::from_uuid(row.id),
            dispute_ref: row.dispute_ref,
            charge_ref: row.charge_ref,
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            amount: row.amount,
            currency: row.currency,
            reason: row.reason,
            status: DisputeStatus(row.status),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

#[async_trait]
impl DisputeRepository for PostgresDisputeRepository {
    async fn upsert(&self, dispute: &Dispute) -> Result<bool, DomainError> {
        // xmax is zero only for a freshly inserted tuple.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO disputes (
                id, dispute_ref, charge_ref, payment_id, amount, currency,
                reason, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (dispute_ref) DO UPDATE SET
                amount = EXCLUDED.amount,
                reason = EXCLUDED.reason,
                status = EXCLUDED.status,
                payment_id = COALESCE(disputes.payment_id, EXCLUDED.payment_id),
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0)
            "#,
        )
        .bind(dispute.id.as_uuid())
        .bind(&dispute.dispute_ref)
        .bind(&dispute.charge_ref)
        .bind(dispute.payment_id.as_ref().map(PaymentId::as_uuid))
        .bind(dispute.amount)
        .bind(&dispute.currency)
        .bind(&dispute.reason)
        .bind(&dispute.status.0)
        .bind(ts(&dispute.created_at))
        .bind(ts(&dispute.updated_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("upsert dispute", e))?;

        Ok(inserted)
    }

    async fn find_by_ref(&self, dispute_ref: &str) -> Result<Option<Dispute>, DomainError> {
        let row: Option<DisputeRow> = sqlx::query_as(
            r#"
            SELECT id, dispute_ref, charge_ref, payment_id, amount, currency,
                   reason, status, created_at, updated_at
            FROM disputes
            WHERE dispute_ref = $1
            "#,
        )
        .bind(dispute_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find dispute", e))?;

        Ok(row.map(Dispute::from))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Customers
// ════════════════════════════════════════════════════════════════════════════════

const CUSTOMER_COLUMNS: &str = "customer_ref, user_id, email, name, default_payment_method, \
     card_brand, card_last4, updated_at";

pub struct PostgresCustomerRepository {
    pool: PgPool,
}

impl PostgresCustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    customer_ref: String,
    user_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    default_payment_method: Option<String>,
    card_brand: Option<String>,
    card_last4: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for CustomerProfile {
    type Error = DomainError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        Ok(CustomerProfile {
            customer_ref: row.customer_ref,
            user_id: row
                .user_id
                .map(UserId::new)
                .transpose()
                .map_err(|e| corrupt("user_id", e))?,
            email: row.email,
            name: row.name,
            default_payment_method: row.default_payment_method,
            card_brand: row.card_brand,
            card_last4: row.card_last4,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    async fn upsert(&self, profile: &CustomerProfile) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                customer_ref, user_id, email, name, default_payment_method,
                card_brand, card_last4, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (customer_ref) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                email = EXCLUDED.email,
                name = EXCLUDED.name,
                default_payment_method = EXCLUDED.default_payment_method,
                card_brand = EXCLUDED.card_brand,
                card_last4 = EXCLUDED.card_last4,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&profile.customer_ref)
        .bind(profile.user_id.as_ref().map(UserId::as_str))
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(&profile.default_payment_method)
        .bind(&profile.card_brand)
        .bind(&profile.card_last4)
        .bind(ts(&profile.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("upsert customer", e))?;

        Ok(())
    }

    async fn find_by_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<CustomerProfile>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM customers WHERE customer_ref = $1",
            CUSTOMER_COLUMNS
        ))
        .bind(customer_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find customer", e))?;

        row.map(CustomerProfile::try_from).transpose()
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<CustomerProfile>, DomainError> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM customers WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1",
            CUSTOMER_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find customer by user", e))?;

        row.map(CustomerProfile::try_from).transpose()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Promo codes
// ════════════════════════════════════════════════════════════════════════════════

pub struct PostgresPromoCodeRepository {
    pool: PgPool,
}

impl PostgresPromoCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PromoCodeRow {
    code: String,
    active: bool,
    discount_type: String,
    discount_value: i64,
    expires_at: Option<DateTime<Utc>>,
    max_uses: Option<i32>,
    times_used: i32,
    applicable_products: Vec<String>,
    minimum_amount: i64,
}

impl TryFrom<PromoCodeRow> for PromoCode {
    type Error = DomainError;

    fn try_from(row: PromoCodeRow) -> Result<Self, Self::Error> {
        let discount = match row.discount_type.as_str() {
            "percentage" => Discount::Percentage(
                u32::try_from(row.discount_value).map_err(|e| corrupt("discount_value", e))?,
            ),
            "fixed" => Discount::Fixed(row.discount_value),
            other => return Err(corrupt("discount_type", other)),
        };

        let applicable_products = row
            .applicable_products
            .iter()
            .map(|p| p.parse::<ProductType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| corrupt("applicable_products", e))?;

        Ok(PromoCode {
            code: row.code,
            active: row.active,
            discount,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            max_uses: row
                .max_uses
                .map(u32::try_from)
                .transpose()
                .map_err(|e| corrupt("max_uses", e))?,
            times_used: u32::try_from(row.times_used).map_err(|e| corrupt("times_used", e))?,
            applicable_products,
            minimum_amount: row.minimum_amount,
        })
    }
}

#[async_trait]
impl PromoCodeRepository for PostgresPromoCodeRepository {
    async fn find(&self, code: &str) -> Result<Option<PromoCode>, DomainError> {
        let row: Option<PromoCodeRow> = sqlx::query_as(
            r#"
            SELECT code, active, discount_type, discount_value, expires_at,
                   max_uses, times_used, applicable_products, minimum_amount
            FROM promo_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find promo code", e))?;

        row.map(PromoCode::try_from).transpose()
    }

    async fn record_redemption(&self, code: &str) -> Result<(), DomainError> {
        sqlx::query("UPDATE promo_codes SET times_used = times_used + 1 WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("record promo redemption", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promo_row(discount_type: &str, value: i64) -> PromoCodeRow {
        PromoCodeRow {
            code: "SAVE10".to_string(),
            active: true,
            discount_type: discount_type.to_string(),
            discount_value: value,
            expires_at: None,
            max_uses: Some(100),
            times_used: 3,
            applicable_products: vec!["course".to_string(), "program".to_string()],
            minimum_amount: 0,
        }
    }

    #[test]
    fn percentage_promo_row_decodes() {
        let promo = PromoCode::try_from(promo_row("percentage", 10)).unwrap();
        assert_eq!(promo.discount, Discount::Percentage(10));
        assert_eq!(promo.max_uses, Some(100));
        assert_eq!(promo.times_used, 3);
        assert_eq!(
            promo.applicable_products,
            vec![ProductType::Course, ProductType::Program]
        );
    }

    #[test]
    fn fixed_promo_row_decodes() {
        let promo = PromoCode::try_from(promo_row("fixed", 1500)).unwrap();
        assert_eq!(promo.discount, Discount::Fixed(1500));
    }

    #[test]
    fn unknown_discount_type_is_corrupt() {
        let err = PromoCode::try_from(promo_row("bogo", 1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn payment_row_with_unknown_status_is_corrupt() {
        let now = Utc::now();
        let row = PaymentRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            payment_intent_ref: "pi_1".to_string(),
            amount: 9999,
            currency: "usd".to_string(),
            status: "settled".to_string(),
            product_type: "course".to_string(),
            product_id: "rust-101".to_string(),
            metadata: Json(HashMap::new()),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        assert!(Payment::try_from(row).is_err());
    }

    #[test]
    fn subscription_row_decodes() {
        let now = Utc::now();
        let row = SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            subscription_ref: "sub_1".to_string(),
            customer_ref: "cus_1".to_string(),
            tier: "annual".to_string(),
            status: "past_due".to_string(),
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        let subscription = Subscription::try_from(row).unwrap();
        assert_eq!(subscription.tier, MembershipTier::Annual);
        assert_eq!(subscription.status, SubscriptionStatus::PastDue);
    }
}
