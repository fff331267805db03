//! In-memory billing repositories: payments, subscriptions, refunds,
//! disputes, customers and promo codes.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{CustomerProfile, Dispute, Payment, PromoCode, Refund, Subscription};
use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, UserId};
use crate::ports::{
    CustomerRepository, DisputeRepository, PaymentRepository, PromoCodeRepository,
    RefundRepository, SubscriptionRepository,
};

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: RwLock<HashMap<PaymentId, Payment>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut map = self.payments.write().await;
        if map
            .values()
            .any(|p| p.payment_intent_ref == payment.payment_intent_ref)
        {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!("payment for {} already exists", payment.payment_intent_ref),
            ));
        }
        map.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut map = self.payments.write().await;
        match map.get_mut(&payment.id) {
            Some(slot) => {
                *slot = payment.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::PaymentNotFound,
                format!("payment {} not found", payment.id),
            )),
        }
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn find_by_intent_ref(&self, intent_ref: &str) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.payment_intent_ref == intent_ref)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Payment>, DomainError> {
        let map = self.payments.read().await;
        let mut list: Vec<Payment> = map
            .values()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<String, Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn upsert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.subscription_ref.clone(), subscription.clone());
        Ok(())
    }

    async fn find_by_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self.subscriptions.read().await.get(subscription_ref).cloned())
    }

    async fn find_live_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| &s.user_id == user_id && s.status.grants_access())
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRefundRepository {
    refunds: RwLock<Vec<Refund>>,
}

impl InMemoryRefundRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefundRepository for InMemoryRefundRepository {
    async fn insert_if_absent(&self, refund: &Refund) -> Result<bool, DomainError> {
        let mut refunds = self.refunds.write().await;
        if refunds.iter().any(|r| {
            r.charge_ref == refund.charge_ref && r.amount_refunded == refund.amount_refunded
        }) {
            return Ok(false);
        }
        refunds.push(refund.clone());
        Ok(true)
    }

    async fn list_for_payment(&self, payment_id: &PaymentId) -> Result<Vec<Refund>, DomainError> {
        Ok(self
            .refunds
            .read()
            .await
            .iter()
            .filter(|r| &r.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDisputeRepository {
    disputes: RwLock<HashMap<String, Dispute>>,
}

impl InMemoryDisputeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DisputeRepository for InMemoryDisputeRepository {
    async fn upsert(&self, dispute: &Dispute) -> Result<bool, DomainError> {
        let mut map = self.disputes.write().await;
        let created = match map.get_mut(&dispute.dispute_ref) {
            Some(existing) => {
                existing.status = dispute.status.clone();
                existing.reason = dispute.reason.clone();
                existing.amount = dispute.amount;
                existing.updated_at = dispute.updated_at;
                false
            }
            None => {
                map.insert(dispute.dispute_ref.clone(), dispute.clone());
                true
            }
        };
        Ok(created)
    }

    async fn find_by_ref(&self, dispute_ref: &str) -> Result<Option<Dispute>, DomainError> {
        Ok(self.disputes.read().await.get(dispute_ref).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerRepository {
    customers: RwLock<HashMap<String, CustomerProfile>>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn upsert(&self, profile: &CustomerProfile) -> Result<(), DomainError> {
        self.customers
            .write()
            .await
            .insert(profile.customer_ref.clone(), profile.clone());
        Ok(())
    }

    async fn find_by_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<CustomerProfile>, DomainError> {
        Ok(self.customers.read().await.get(customer_ref).cloned())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<CustomerProfile>, DomainError> {
        Ok(self
            .customers
            .read()
            .await
            .values()
            .find(|c| c.user_id.as_ref() == Some(user_id))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryPromoCodeRepository {
    codes: RwLock<HashMap<String, PromoCode>>,
}

impl InMemoryPromoCodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a code, keyed by its canonical form.
    pub async fn put(&self, promo: PromoCode) {
        self.codes.write().await.insert(promo.code.clone(), promo);
    }
}

#[async_trait]
impl PromoCodeRepository for InMemoryPromoCodeRepository {
    async fn find(&self, code: &str) -> Result<Option<PromoCode>, DomainError> {
        Ok(self.codes.read().await.get(code).cloned())
    }

    async fn record_redemption(&self, code: &str) -> Result<(), DomainError> {
        match self.codes.write().await.get_mut(code) {
            Some(promo) => {
                promo.times_used += 1;
                Ok(())
            }
            None => Err(DomainError::validation("promo_code", "unknown promo code")),
        }
    }
}
