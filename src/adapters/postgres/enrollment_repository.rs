//! PostgreSQL implementation of EnrollmentRepository.
//!
//! The partial unique index `enrollments_one_active` enforces a single
//! active row per user and product; a violation surfaces as `Conflict`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, db_error, is_unique_violation};
use crate::domain::enrollment::{AccessOrigin, Enrollment, EnrollmentStatus, ProductRef};
use crate::domain::foundation::{
    DomainError, EnrollmentId, ErrorCode, PaymentId, Timestamp, UserId,
};
use crate::ports::EnrollmentRepository;

const COLUMNS: &str = "id, user_id, product_kind, product_key, status, enrolled_at, expires_at, \
     grace_period_end, origin_kind, origin_id, extended_by, metadata, revoked_at, updated_at";

pub struct PostgresEnrollmentRepository {
    pool: PgPool,
}

impl PostgresEnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    user_id: String,
    product_kind: String,
    product_key: String,
    status: String,
    enrolled_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    grace_period_end: Option<DateTime<Utc>>,
    origin_kind: Option<String>,
    origin_id: Option<Uuid>,
    extended_by: Vec<Uuid>,
    metadata: Json<HashMap<String, String>>,
    revoked_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = DomainError;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        let origin = match (row.origin_kind.as_deref(), row.origin_id) {
            (Some(kind), Some(id)) => Some(
                AccessOrigin::from_parts(kind, id)
                    .ok_or_else(|| corrupt("origin_kind", kind))?,
            ),
            _ => None,
        };

        Ok(Enrollment {
            id: EnrollmentId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            product: ProductRef::from_parts(&row.product_kind, &row.product_key)
                .map_err(|e| corrupt("product", e))?,
            status: row
                .status
                .parse::<EnrollmentStatus>()
                .map_err(|e| corrupt("status", e))?,
            enrolled_at: Timestamp::from_datetime(row.enrolled_at),
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            grace_period_end: row.grace_period_end.map(Timestamp::from_datetime),
            origin,
            extended_by: row
                .extended_by
                .into_iter()
                .map(PaymentId::from_uuid)
                .collect(),
            metadata: row.metadata.0,
            revoked_at: row.revoked_at.map(Timestamp::from_datetime),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn extension_ids(enrollment: &Enrollment) -> Vec<Uuid> {
    enrollment.extended_by.iter().map(|id| *id.as_uuid()).collect()
}

fn collect(rows: Vec<EnrollmentRow>) -> Result<Vec<Enrollment>, DomainError> {
    rows.into_iter().map(Enrollment::try_from).collect()
}

#[async_trait]
impl EnrollmentRepository for PostgresEnrollmentRepository {
    async fn insert(&self, enrollment: &Enrollment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (
                id, user_id, product_kind, product_key, status, enrolled_at, expires_at,
                grace_period_end, origin_kind, origin_id, extended_by, metadata, revoked_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.user_id.as_str())
        .bind(enrollment.product.kind())
        .bind(enrollment.product.key())
        .bind(enrollment.status.as_str())
        .bind(enrollment.enrolled_at.as_datetime())
        .bind(enrollment.expires_at.as_ref().map(Timestamp::as_datetime))
        .bind(enrollment.grace_period_end.as_ref().map(Timestamp::as_datetime))
        .bind(enrollment.origin.as_ref().map(AccessOrigin::kind))
        .bind(enrollment.origin.as_ref().map(AccessOrigin::id))
        .bind(extension_ids(enrollment))
        .bind(Json(&enrollment.metadata))
        .bind(enrollment.revoked_at.as_ref().map(Timestamp::as_datetime))
        .bind(enrollment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "enrollments_one_active") {
                return DomainError::new(
                    ErrorCode::Conflict,
                    format!("{} already has an active enrollment", enrollment.user_id),
                )
                .with_detail("product", enrollment.product.to_string());
            }
            db_error("insert enrollment", e)
        })?;

        Ok(())
    }

    async fn update(&self, enrollment: &Enrollment) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments SET
                status = $2,
                expires_at = $3,
                grace_period_end = $4,
                origin_kind = $5,
                origin_id = $6,
                extended_by = $7,
                metadata = $8,
                revoked_at = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.status.as_str())
        .bind(enrollment.expires_at.as_ref().map(Timestamp::as_datetime))
        .bind(enrollment.grace_period_end.as_ref().map(Timestamp::as_datetime))
        .bind(enrollment.origin.as_ref().map(AccessOrigin::kind))
        .bind(enrollment.origin.as_ref().map(AccessOrigin::id))
        .bind(extension_ids(enrollment))
        .bind(Json(&enrollment.metadata))
        .bind(enrollment.revoked_at.as_ref().map(Timestamp::as_datetime))
        .bind(enrollment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // Reviving an expired row while a newer one is active.
            if is_unique_violation(&e, "enrollments_one_active") {
                return DomainError::new(
                    ErrorCode::Conflict,
                    "another enrollment for this product is active",
                );
            }
            db_error("update enrollment", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::EnrollmentNotFound,
                format!("Enrollment {} not found", enrollment.id),
            ));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, DomainError> {
        let row: Option<EnrollmentRow> =
            sqlx::query_as(&format!("SELECT {} FROM enrollments WHERE id = $1", COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find enrollment", e))?;

        row.map(Enrollment::try_from).transpose()
    }

    async fn find_active(
        &self,
        user_id: &UserId,
        product: &ProductRef,
    ) -> Result<Option<Enrollment>, DomainError> {
        let row: Option<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enrollments \
             WHERE user_id = $1 AND product_kind = $2 AND product_key = $3 AND status = 'active'",
            COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(product.kind())
        .bind(product.key())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find active enrollment", e))?;

        row.map(Enrollment::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>, DomainError> {
        let rows: Vec<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enrollments WHERE user_id = $1 ORDER BY enrolled_at DESC",
            COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list enrollments", e))?;

        collect(rows)
    }

    async fn list_active_by_origin(
        &self,
        origin: &AccessOrigin,
    ) -> Result<Vec<Enrollment>, DomainError> {
        let rows: Vec<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enrollments \
             WHERE status = 'active' \
               AND ((origin_kind = $1 AND origin_id = $2) \
                    OR ($1 = 'payment' AND $2 = ANY(extended_by)))",
            COLUMNS
        ))
        .bind(origin.kind())
        .bind(origin.id())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list enrollments by origin", e))?;

        collect(rows)
    }

    async fn list_lapsed(&self, now: Timestamp) -> Result<Vec<Enrollment>, DomainError> {
        let rows: Vec<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enrollments \
             WHERE status = 'active' AND COALESCE(grace_period_end, expires_at) < $1 \
             ORDER BY COALESCE(grace_period_end, expires_at)",
            COLUMNS
        ))
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list lapsed enrollments", e))?;

        collect(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::CourseId;

    fn row(status: &str) -> EnrollmentRow {
        let now = Utc::now();
        EnrollmentRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            product_kind: "course".to_string(),
            product_key: "rust-101".to_string(),
            status: status.to_string(),
            enrolled_at: now,
            expires_at: Some(now),
            grace_period_end: None,
            origin_kind: Some("payment".to_string()),
            origin_id: Some(Uuid::new_v4()),
            extended_by: Vec::new(),
            metadata: Json(HashMap::new()),
            revoked_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn row_decodes_into_enrollment() {
        let r = row("active");
        let origin_id = r.origin_id.unwrap();
        let enrollment = Enrollment::try_from(r).unwrap();

        assert_eq!(enrollment.status, EnrollmentStatus::Active);
        assert_eq!(
            enrollment.product,
            ProductRef::Course(CourseId::new("rust-101").unwrap())
        );
        assert_eq!(
            enrollment.origin,
            Some(AccessOrigin::Payment(PaymentId::from_uuid(origin_id)))
        );
    }

    #[test]
    fn extension_payments_decode_in_order() {
        let mut r = row("active");
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        r.extended_by = vec![first, second];

        let enrollment = Enrollment::try_from(r).unwrap();
        assert_eq!(
            enrollment.extended_by,
            vec![PaymentId::from_uuid(first), PaymentId::from_uuid(second)]
        );
    }

    #[test]
    fn unknown_status_is_reported_as_corrupt() {
        let err = Enrollment::try_from(row("paused")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn origin_without_id_decodes_as_none() {
        let mut r = row("active");
        r.origin_id = None;
        assert_eq!(Enrollment::try_from(r).unwrap().origin, None);
    }
}
