//! Catalog prices from PostgreSQL.
//!
//! Course and program prices live in the database. Membership plans map to
//! processor price ids and come from configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{corrupt, db_error};
use crate::domain::enrollment::MembershipTier;
use crate::domain::foundation::{CourseId, DomainError};
use crate::ports::{CatalogPrice, CatalogReader, MembershipPlan};

pub struct PostgresCatalogReader {
    pool: PgPool,
    plans: HashMap<MembershipTier, MembershipPlan>,
}

impl PostgresCatalogReader {
    pub fn new(pool: PgPool, plans: HashMap<MembershipTier, MembershipPlan>) -> Self {
        Self { pool, plans }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PriceRow {
    amount: i64,
    currency: String,
    access_days: Option<i32>,
}

impl TryFrom<PriceRow> for CatalogPrice {
    type Error = DomainError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        Ok(CatalogPrice {
            amount: row.amount,
            currency: row.currency,
            access_days: row
                .access_days
                .map(u32::try_from)
                .transpose()
                .map_err(|e| corrupt("access_days", e))?,
        })
    }
}

#[async_trait]
impl CatalogReader for PostgresCatalogReader {
    async fn course_price(&self, course_id: &CourseId) -> Result<Option<CatalogPrice>, DomainError> {
        let row: Option<PriceRow> = sqlx::query_as(
            r#"
            SELECT amount, currency, access_days
            FROM catalog_courses
            WHERE course_id = $1 AND for_sale
            "#,
        )
        .bind(course_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("read course price", e))?;

        row.map(CatalogPrice::try_from).transpose()
    }

    async fn program_price(&self, program: &str) -> Result<Option<CatalogPrice>, DomainError> {
        let row: Option<PriceRow> = sqlx::query_as(
            r#"
            SELECT amount, currency, access_days
            FROM catalog_programs
            WHERE program = $1 AND for_sale
            "#,
        )
        .bind(program)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("read program price", e))?;

        row.map(CatalogPrice::try_from).transpose()
    }

    async fn membership_plan(
        &self,
        tier: MembershipTier,
    ) -> Result<Option<MembershipPlan>, DomainError> {
        Ok(self.plans.get(&tier).cloned())
    }

    async fn extension_daily_price(&self, product_key: &str) -> Result<Option<i64>, DomainError> {
        // Courses shadow programs with the same key.
        let price: Option<Option<i64>> = sqlx::query_scalar(
            r#"
            SELECT extension_daily_amount FROM (
                SELECT extension_daily_amount, 0 AS rank FROM catalog_courses WHERE course_id = $1
                UNION ALL
                SELECT extension_daily_amount, 1 AS rank FROM catalog_programs WHERE program = $1
            ) prices
            ORDER BY rank
            LIMIT 1
            "#,
        )
        .bind(product_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("read extension price", e))?;

        Ok(price.flatten())
    }
}
