//! PurchaseOrchestrator - starts one-time payments and membership subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::{CreatePurchaseCommand, PurchaseQuote};
use crate::application::handlers::enrollment::AccessLedger;
use crate::domain::billing::{
    BillingError, CustomerProfile, Installment, Payment, PriceBreakdown, PromoValidation,
    TaxPolicy,
};
use crate::domain::foundation::{PaymentId, Timestamp, UserId};
use crate::ports::{
    CatalogReader, CustomerRepository, PaymentGateway, PaymentIntentRequest, PaymentRepository,
    PromoCodeRepository, SubscriptionRepository, SubscriptionRequest,
};

/// What the client needs to confirm the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    /// Local payment id; `None` for subscriptions.
    pub payment_id: Option<PaymentId>,
    /// `pi_...` or `sub_...`
    pub processor_ref: String,
    pub client_secret: Option<String>,
    pub currency: String,
    pub price: PriceBreakdown,
    pub charge_now: i64,
    pub installment: Option<Installment>,
}

/// Result of a purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Created(PurchaseReceipt),
    /// The entered promo code was not accepted; nothing was charged.
    PromoRejected(PromoValidation),
}

pub struct PurchaseOrchestrator {
    pub(super) gateway: Arc<dyn PaymentGateway>,
    pub(super) payments: Arc<dyn PaymentRepository>,
    pub(super) subscriptions: Arc<dyn SubscriptionRepository>,
    pub(super) customers: Arc<dyn CustomerRepository>,
    pub(super) promos: Arc<dyn PromoCodeRepository>,
    pub(super) catalog: Arc<dyn CatalogReader>,
    pub(super) ledger: Arc<AccessLedger>,
    pub(super) tax: TaxPolicy,
    pub(super) default_currency: String,
}

impl PurchaseOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<dyn PaymentRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        customers: Arc<dyn CustomerRepository>,
        promos: Arc<dyn PromoCodeRepository>,
        catalog: Arc<dyn CatalogReader>,
        ledger: Arc<AccessLedger>,
    ) -> Self {
        Self {
            gateway,
            payments,
            subscriptions,
            customers,
            promos,
            catalog,
            ledger,
            tax: TaxPolicy::default(),
            default_currency: "usd".to_string(),
        }
    }

    pub fn with_tax_policy(mut self, tax: TaxPolicy) -> Self {
        self.tax = tax;
        self
    }

    /// Currency used when the catalog doesn't name one.
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    pub async fn create(&self, cmd: CreatePurchaseCommand) -> Result<PurchaseOutcome, BillingError> {
        let now = Timestamp::now();
        let quote = self.quote_at(&cmd, now).await?;

        if let Some(rejected) = quote.promo_rejection() {
            tracing::info!(
                user_id = %cmd.user_id,
                reason = ?rejected.reason(),
                "purchase stopped on promo code"
            );
            return Ok(PurchaseOutcome::PromoRejected(rejected.clone()));
        }

        let metadata = metadata_for(&quote);
        let receipt = match &quote.subscription_price_ref {
            Some(price_ref) => {
                self.start_subscription(&cmd, &quote, price_ref.clone(), metadata)
                    .await?
            }
            None => self.start_payment(&cmd, &quote, metadata, now).await?,
        };

        if let Some(code) = &quote.applied_code {
            if let Err(err) = self.promos.record_redemption(code).await {
                tracing::warn!(%code, error = %err, "promo redemption not recorded");
            }
        }

        tracing::info!(
            user_id = %cmd.user_id,
            purchase_type = quote.context.purchase_type(),
            processor_ref = %receipt.processor_ref,
            charge_now = receipt.charge_now,
            "purchase started"
        );
        Ok(PurchaseOutcome::Created(receipt))
    }

    async fn start_payment(
        &self,
        cmd: &CreatePurchaseCommand,
        quote: &PurchaseQuote,
        metadata: HashMap<String, String>,
        now: Timestamp,
    ) -> Result<PurchaseReceipt, BillingError> {
        let customer_ref = self
            .customers
            .find_by_user(&cmd.user_id)
            .await?
            .map(|profile| profile.customer_ref);

        let intent = self
            .gateway
            .create_payment_intent(PaymentIntentRequest {
                amount: quote.charge_now,
                currency: quote.currency.clone(),
                customer_ref,
                metadata: metadata.clone(),
                idempotency_key: cmd.idempotency_key.clone(),
            })
            .await
            .map_err(|err| {
                tracing::error!(code = %err.code, error = %err, "payment intent creation failed");
                BillingError::PaymentCreationFailed(err.message)
            })?;

        let payment = Payment::pending(
            &intent.id,
            &quote.context,
            quote.charge_now,
            &quote.currency,
            metadata,
            now,
        );
        self.payments.insert(&payment).await?;

        Ok(PurchaseReceipt {
            payment_id: Some(payment.id),
            processor_ref: intent.id,
            client_secret: Some(intent.client_secret),
            currency: quote.currency.clone(),
            price: quote.price,
            charge_now: quote.charge_now,
            installment: quote.installment,
        })
    }

    async fn start_subscription(
        &self,
        cmd: &CreatePurchaseCommand,
        quote: &PurchaseQuote,
        price_ref: String,
        metadata: HashMap<String, String>,
    ) -> Result<PurchaseReceipt, BillingError> {
        let customer_ref = self.customer_for(&cmd.user_id, cmd.email.as_deref()).await?;

        let subscription = self
            .gateway
            .create_subscription(SubscriptionRequest {
                customer_ref,
                price_ref,
                metadata,
                idempotency_key: cmd.idempotency_key.clone(),
            })
            .await
            .map_err(|err| {
                tracing::error!(code = %err.code, error = %err, "subscription creation failed");
                BillingError::SubscriptionCreationFailed(err.message)
            })?;

        Ok(PurchaseReceipt {
            payment_id: None,
            processor_ref: subscription.id,
            client_secret: subscription.client_secret,
            currency: quote.currency.clone(),
            price: quote.price,
            charge_now: quote.charge_now,
            installment: None,
        })
    }

    /// Processor customer for `user_id`, created on first subscription.
    async fn customer_for(
        &self,
        user_id: &UserId,
        email: Option<&str>,
    ) -> Result<String, BillingError> {
        if let Some(profile) = self.customers.find_by_user(user_id).await? {
            return Ok(profile.customer_ref);
        }
        let email = email.filter(|e| !e.trim().is_empty()).ok_or_else(|| {
            BillingError::InvalidRequest("an email address is required for memberships".to_string())
        })?;

        let customer_ref = self
            .gateway
            .create_customer(user_id, email)
            .await
            .map_err(|err| BillingError::SubscriptionCreationFailed(err.message))?;

        let mut profile = CustomerProfile::new(&customer_ref, Timestamp::now());
        profile.user_id = Some(user_id.clone());
        profile.email = Some(email.to_string());
        self.customers.upsert(&profile).await?;
        tracing::info!(%user_id, %customer_ref, "processor customer created");
        Ok(customer_ref)
    }
}

/// Purchase context plus the itemised price, as processor metadata.
fn metadata_for(quote: &PurchaseQuote) -> HashMap<String, String> {
    let mut metadata = quote.context.to_metadata();
    metadata.insert("base_amount".to_string(), quote.price.base_amount.to_string());
    metadata.insert(
        "discount_amount".to_string(),
        quote.price.discount_amount.to_string(),
    );
    metadata.insert("tax_amount".to_string(), quote.price.tax_amount.to_string());
    metadata.insert("total_amount".to_string(), quote.price.total.to_string());
    if let Some(code) = &quote.applied_code {
        metadata.insert("promo_code".to_string(), code.clone());
    }
    metadata
}

/// Reads back the itemised price written by [`metadata_for`].
pub(super) fn breakdown_from(metadata: &HashMap<String, String>) -> Option<PriceBreakdown> {
    let amount = |key: &str| metadata.get(key)?.parse::<i64>().ok();
    Some(PriceBreakdown::compute(
        amount("base_amount")?,
        amount("discount_amount")?,
        amount("tax_amount")?,
    ))
}
