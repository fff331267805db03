//! In-memory enrollment repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::enrollment::{AccessOrigin, Enrollment, EnrollmentStatus, ProductRef};
use crate::domain::foundation::{DomainError, EnrollmentId, ErrorCode, Timestamp, UserId};
use crate::ports::EnrollmentRepository;

/// Enrollment storage backed by a map, enforcing the one-active-per-product
/// rule the same way the Postgres partial unique index does.
#[derive(Default)]
pub struct InMemoryEnrollmentRepository {
    enrollments: RwLock<HashMap<EnrollmentId, Enrollment>>,
}

impl InMemoryEnrollmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.enrollments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.enrollments.read().await.is_empty()
    }
}

fn active_for<'a>(
    map: &'a HashMap<EnrollmentId, Enrollment>,
    user_id: &UserId,
    product: &ProductRef,
) -> Option<&'a Enrollment> {
    map.values().find(|e| {
        e.status == EnrollmentStatus::Active && &e.user_id == user_id && &e.product == product
    })
}

#[async_trait]
impl EnrollmentRepository for InMemoryEnrollmentRepository {
    async fn insert(&self, enrollment: &Enrollment) -> Result<(), DomainError> {
        let mut map = self.enrollments.write().await;
        if enrollment.status == EnrollmentStatus::Active
            && active_for(&map, &enrollment.user_id, &enrollment.product).is_some()
        {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!(
                    "user {} already has an active enrollment for {}",
                    enrollment.user_id, enrollment.product
                ),
            ));
        }
        map.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn update(&self, enrollment: &Enrollment) -> Result<(), DomainError> {
        let mut map = self.enrollments.write().await;
        if enrollment.status == EnrollmentStatus::Active {
            if let Some(other) = active_for(&map, &enrollment.user_id, &enrollment.product) {
                if other.id != enrollment.id {
                    return Err(DomainError::new(
                        ErrorCode::Conflict,
                        format!("another active enrollment exists for {}", enrollment.product),
                    ));
                }
            }
        }
        match map.get_mut(&enrollment.id) {
            Some(slot) => {
                *slot = enrollment.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::EnrollmentNotFound,
                format!("enrollment {} not found", enrollment.id),
            )),
        }
    }

    async fn find_by_id(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, DomainError> {
        Ok(self.enrollments.read().await.get(id).cloned())
    }

    async fn find_active(
        &self,
        user_id: &UserId,
        product: &ProductRef,
    ) -> Result<Option<Enrollment>, DomainError> {
        let map = self.enrollments.read().await;
        Ok(active_for(&map, user_id, product).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>, DomainError> {
        let map = self.enrollments.read().await;
        let mut list: Vec<Enrollment> = map
            .values()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(list)
    }

    async fn list_active_by_origin(
        &self,
        origin: &AccessOrigin,
    ) -> Result<Vec<Enrollment>, DomainError> {
        let map = self.enrollments.read().await;
        Ok(map
            .values()
            .filter(|e| e.status == EnrollmentStatus::Active && e.is_paid_by(origin))
            .cloned()
            .collect())
    }

    async fn list_lapsed(&self, now: Timestamp) -> Result<Vec<Enrollment>, DomainError> {
        let map = self.enrollments.read().await;
        Ok(map
            .values()
            .filter(|e| e.status == EnrollmentStatus::Active && e.is_past_grace(now))
            .cloned()
            .collect())
    }
}
