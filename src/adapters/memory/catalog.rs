//! Static catalog and in-memory reminder queue.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::enrollment::MembershipTier;
use crate::domain::foundation::{CourseId, DomainError, EnrollmentId, Timestamp};
use crate::ports::{CatalogPrice, CatalogReader, MembershipPlan, ReminderScheduler, ScheduledReminder};

/// Catalog built up front, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    courses: HashMap<String, CatalogPrice>,
    programs: HashMap<String, CatalogPrice>,
    plans: HashMap<MembershipTier, MembershipPlan>,
    extension_daily: HashMap<String, i64>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_course(mut self, course_id: &str, amount: i64, access_days: Option<u32>) -> Self {
        self.courses.insert(
            course_id.to_string(),
            CatalogPrice {
                amount,
                currency: "usd".to_string(),
                access_days,
            },
        );
        self
    }

    pub fn with_program(mut self, program: &str, amount: i64, access_days: Option<u32>) -> Self {
        self.programs.insert(
            program.to_string(),
            CatalogPrice {
                amount,
                currency: "usd".to_string(),
                access_days,
            },
        );
        self
    }

    pub fn with_plan(mut self, tier: MembershipTier, price_ref: &str, monthly_amount: i64) -> Self {
        self.plans.insert(
            tier,
            MembershipPlan {
                price_ref: price_ref.to_string(),
                monthly_amount,
                currency: "usd".to_string(),
            },
        );
        self
    }

    pub fn with_extension_price(mut self, product_key: &str, daily_amount: i64) -> Self {
        self.extension_daily
            .insert(product_key.to_string(), daily_amount);
        self
    }
}

#[async_trait]
impl CatalogReader for StaticCatalog {
    async fn course_price(&self, course_id: &CourseId) -> Result<Option<CatalogPrice>, DomainError> {
        Ok(self.courses.get(course_id.as_str()).cloned())
    }

    async fn program_price(&self, program: &str) -> Result<Option<CatalogPrice>, DomainError> {
        Ok(self.programs.get(program).cloned())
    }

    async fn membership_plan(
        &self,
        tier: MembershipTier,
    ) -> Result<Option<MembershipPlan>, DomainError> {
        Ok(self.plans.get(&tier).cloned())
    }

    async fn extension_daily_price(&self, product_key: &str) -> Result<Option<i64>, DomainError> {
        Ok(self.extension_daily.get(product_key).copied())
    }
}

#[derive(Default)]
pub struct InMemoryReminderScheduler {
    reminders: RwLock<Vec<ScheduledReminder>>,
}

impl InMemoryReminderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending reminders of one enrollment, soonest first.
    pub async fn pending_for(&self, enrollment_id: &EnrollmentId) -> Vec<ScheduledReminder> {
        let mut pending: Vec<ScheduledReminder> = self
            .reminders
            .read()
            .await
            .iter()
            .filter(|r| &r.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.send_at);
        pending
    }
}

#[async_trait]
impl ReminderScheduler for InMemoryReminderScheduler {
    async fn replace_for_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
        reminders: Vec<ScheduledReminder>,
    ) -> Result<(), DomainError> {
        let mut all = self.reminders.write().await;
        all.retain(|r| &r.enrollment_id != enrollment_id);
        all.extend(reminders);
        Ok(())
    }

    async fn cancel_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<(), DomainError> {
        self.reminders
            .write()
            .await
            .retain(|r| &r.enrollment_id != enrollment_id);
        Ok(())
    }

    async fn take_due(&self, now: Timestamp) -> Result<Vec<ScheduledReminder>, DomainError> {
        let mut all = self.reminders.write().await;
        let (due, pending): (Vec<_>, Vec<_>) = all.drain(..).partition(|r| r.send_at <= now);
        *all = pending;
        Ok(due)
    }
}
