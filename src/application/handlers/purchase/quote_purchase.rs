//! Pricing a purchase before any money moves.
//!
//! A quote resolves the catalog price, checks ownership, evaluates the promo
//! code and adds tax. `create` charges exactly what `quote` returns.

use serde::{Deserialize, Serialize};

use super::create_purchase::breakdown_from;
use super::PurchaseOrchestrator;
use crate::domain::billing::{
    installment_amount, normalize_code, validate_promo, BillingError, GiftItem, Installment,
    PaymentStatus, PriceBreakdown, ProductType, PromoRejection, PromoValidation, PurchaseContext,
};
use crate::domain::enrollment::{EnrollmentStatus, MembershipTier, ProductRef};
use crate::domain::foundation::{CourseId, EnrollmentId, PaymentId, Timestamp, UserId};

/// Months a membership gift may cover.
pub const MAX_GIFT_MONTHS: u32 = 24;

/// Days a single extension purchase may add.
pub const MAX_EXTENSION_DAYS: i64 = 365;

/// What the customer is buying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseItem {
    Course {
        course_id: CourseId,
    },
    Program {
        program: String,
        /// Split into 2 or 3 payments; `None` pays in full.
        #[serde(default)]
        installments: Option<u8>,
    },
    Membership {
        tier: MembershipTier,
    },
    Gift {
        recipient_email: String,
        item: GiftItem,
    },
    Extension {
        enrollment_id: EnrollmentId,
        days: i64,
    },
    /// A later payment of a program plan opened earlier.
    Installment {
        plan_payment_id: PaymentId,
        number: u8,
    },
}

/// Command to start a purchase.
#[derive(Debug, Clone)]
pub struct CreatePurchaseCommand {
    pub user_id: UserId,
    /// Needed to create the processor customer for memberships.
    pub email: Option<String>,
    pub item: PurchaseItem,
    pub promo_code: Option<String>,
    /// Two-letter destination state for sales tax.
    pub billing_state: Option<String>,
    /// Forwarded to the processor so client retries create one intent.
    pub idempotency_key: Option<String>,
}

/// Priced purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseQuote {
    pub context: PurchaseContext,
    pub currency: String,
    pub price: PriceBreakdown,

    /// Charged by this purchase; one installment for plans.
    pub charge_now: i64,
    pub installment: Option<Installment>,

    /// Evaluation of the entered code, if any.
    pub promo: Option<PromoValidation>,

    /// Canonical form of an accepted code.
    pub applied_code: Option<String>,

    /// Processor price for recurring memberships.
    pub subscription_price_ref: Option<String>,
}

impl PurchaseQuote {
    /// The promo evaluation, when a code was entered and rejected.
    pub fn promo_rejection(&self) -> Option<&PromoValidation> {
        self.promo.as_ref().filter(|p| !p.valid)
    }
}

/// Base price before promo and tax.
struct Base {
    context: PurchaseContext,
    amount: i64,
    currency: String,
    installments: Option<u8>,
    subscription_price_ref: Option<String>,
}

impl PurchaseOrchestrator {
    /// Prices `cmd` without side effects.
    pub async fn quote(&self, cmd: &CreatePurchaseCommand) -> Result<PurchaseQuote, BillingError> {
        self.quote_at(cmd, Timestamp::now()).await
    }

    pub async fn quote_at(
        &self,
        cmd: &CreatePurchaseCommand,
        now: Timestamp,
    ) -> Result<PurchaseQuote, BillingError> {
        if let PurchaseItem::Installment {
            plan_payment_id,
            number,
        } = &cmd.item
        {
            return self.quote_installment(cmd, plan_payment_id, *number).await;
        }

        let base = self.resolve_base(cmd, now).await?;
        let product_type = base.context.product_type();

        let (promo, applied_code) = match cmd.promo_code.as_deref().map(normalize_code) {
            None => (None, None),
            Some(code) if code.is_empty() => (None, None),
            Some(code) if product_type == ProductType::Membership => {
                tracing::debug!(%code, "promo codes do not apply to recurring memberships");
                (
                    Some(PromoValidation {
                        valid: false,
                        discount_amount: 0,
                        final_amount: base.amount,
                        rejection: Some(PromoRejection::NotApplicable { product_type }),
                    }),
                    None,
                )
            }
            Some(code) => {
                let stored = self.promos.find(&code).await?;
                let validation = validate_promo(stored.as_ref(), base.amount, product_type, now);
                let applied = validation.valid.then_some(code);
                (Some(validation), applied)
            }
        };

        let discount = promo
            .as_ref()
            .filter(|p| p.valid)
            .map(|p| p.discount_amount)
            .unwrap_or(0);
        // Recurring prices are taxed by the processor on each invoice.
        let tax = if base.subscription_price_ref.is_some() {
            0
        } else {
            self.tax
                .tax_for(base.amount - discount, cmd.billing_state.as_deref())
        };
        let price = PriceBreakdown::compute(base.amount, discount, tax);

        let (charge_now, installment) = match base.installments {
            None => (price.total, None),
            Some(count) => (
                installment_amount(price.total, count)?,
                Some(Installment::first_of(count)),
            ),
        };

        let context = match base.context {
            PurchaseContext::Program {
                user_id, program, ..
            } => PurchaseContext::Program {
                user_id,
                program,
                installment,
            },
            other => other,
        };

        Ok(PurchaseQuote {
            context,
            currency: base.currency,
            price,
            charge_now,
            installment,
            promo,
            applied_code,
            subscription_price_ref: base.subscription_price_ref,
        })
    }

    async fn resolve_base(
        &self,
        cmd: &CreatePurchaseCommand,
        now: Timestamp,
    ) -> Result<Base, BillingError> {
        let user_id = cmd.user_id.clone();
        match &cmd.item {
            PurchaseItem::Course { course_id } => {
                let product = ProductRef::Course(course_id.clone());
                self.ensure_not_owned(&user_id, &product, now).await?;
                let price = self
                    .catalog
                    .course_price(course_id)
                    .await?
                    .ok_or_else(|| BillingError::CourseNotFound(course_id.to_string()))?;
                Ok(Base {
                    context: PurchaseContext::Course {
                        user_id,
                        course_id: course_id.clone(),
                    },
                    amount: price.amount,
                    currency: price.currency,
                    installments: None,
                    subscription_price_ref: None,
                })
            }
            PurchaseItem::Program {
                program,
                installments,
            } => {
                let product = ProductRef::Program(program.clone());
                self.ensure_not_owned(&user_id, &product, now).await?;
                let price = self
                    .catalog
                    .program_price(program)
                    .await?
                    .ok_or_else(|| BillingError::ProductNotFound(product.to_string()))?;
                Ok(Base {
                    context: PurchaseContext::Program {
                        user_id,
                        program: program.clone(),
                        installment: None,
                    },
                    amount: price.amount,
                    currency: price.currency,
                    installments: *installments,
                    subscription_price_ref: None,
                })
            }
            PurchaseItem::Membership { tier } => {
                if let Some(live) = self.subscriptions.find_live_for_user(&user_id).await? {
                    return Err(BillingError::AlreadySubscribed(live.tier.to_string()));
                }
                self.ensure_not_owned(&user_id, &ProductRef::Membership(*tier), now)
                    .await
                    .map_err(|err| match err {
                        BillingError::AlreadyEnrolled(_) => {
                            BillingError::AlreadySubscribed(tier.to_string())
                        }
                        other => other,
                    })?;
                let plan = self
                    .catalog
                    .membership_plan(*tier)
                    .await?
                    .ok_or_else(|| BillingError::ProductNotFound(format!("membership:{}", tier)))?;
                Ok(Base {
                    context: PurchaseContext::Membership {
                        user_id,
                        tier: *tier,
                    },
                    amount: plan.monthly_amount,
                    currency: plan.currency,
                    installments: None,
                    subscription_price_ref: Some(plan.price_ref),
                })
            }
            PurchaseItem::Gift {
                recipient_email,
                item,
            } => {
                let recipient_email = recipient_email.trim().to_string();
                if recipient_email.is_empty() || !recipient_email.contains('@') {
                    return Err(BillingError::InvalidRequest(
                        "gift recipient email is invalid".to_string(),
                    ));
                }
                let (amount, currency) = self.gift_price(item).await?;
                Ok(Base {
                    context: PurchaseContext::Gift {
                        purchaser_id: user_id,
                        recipient_email,
                        item: item.clone(),
                    },
                    amount,
                    currency,
                    installments: None,
                    subscription_price_ref: None,
                })
            }
            PurchaseItem::Extension {
                enrollment_id,
                days,
            } => {
                if !(1..=MAX_EXTENSION_DAYS).contains(days) {
                    return Err(BillingError::InvalidRequest(format!(
                        "extension must be between 1 and {} days",
                        MAX_EXTENSION_DAYS
                    )));
                }
                // Only the owner's own enrollments are visible here.
                let enrollment = self
                    .ledger
                    .list_for_user(&user_id)
                    .await?
                    .into_iter()
                    .find(|e| e.id == *enrollment_id)
                    .ok_or(BillingError::EnrollmentNotFound(*enrollment_id))?;
                if enrollment.status == EnrollmentStatus::Revoked {
                    return Err(BillingError::InvalidRequest(
                        "revoked enrollments cannot be extended".to_string(),
                    ));
                }
                // A newer enrollment took over the product; extend that one.
                if let Some(active) = self.ledger.find_active(&user_id, &enrollment.product).await? {
                    if active.id != enrollment.id {
                        return Err(BillingError::AlreadyEnrolled(enrollment.product.to_string()));
                    }
                }
                if matches!(enrollment.product, ProductRef::Membership(_)) {
                    return Err(BillingError::InvalidRequest(
                        "memberships renew through their subscription".to_string(),
                    ));
                }
                let daily = self
                    .catalog
                    .extension_daily_price(enrollment.product.key())
                    .await?
                    .ok_or_else(|| BillingError::ProductNotFound(enrollment.product.to_string()))?;
                let currency = match &enrollment.product {
                    ProductRef::Course(course_id) => self.catalog.course_price(course_id).await?,
                    ProductRef::Program(program) => self.catalog.program_price(program).await?,
                    ProductRef::Membership(_) => None,
                }
                .map(|p| p.currency)
                .unwrap_or_else(|| self.default_currency.clone());
                Ok(Base {
                    context: PurchaseContext::Extension {
                        user_id,
                        enrollment_id: *enrollment_id,
                        days: *days,
                    },
                    amount: daily * days,
                    currency,
                    installments: None,
                    subscription_price_ref: None,
                })
            }
            PurchaseItem::Installment { .. } => Err(BillingError::InvalidRequest(
                "installments are priced from their plan".to_string(),
            )),
        }
    }

    /// Prices payment `number` of the plan opened by `plan_id`.
    ///
    /// Every installment charges what the first one did. Promo codes and tax
    /// were settled when the plan was opened.
    async fn quote_installment(
        &self,
        cmd: &CreatePurchaseCommand,
        plan_id: &PaymentId,
        number: u8,
    ) -> Result<PurchaseQuote, BillingError> {
        let plan = self
            .payments
            .find_by_id(plan_id)
            .await?
            .filter(|p| p.user_id == cmd.user_id)
            .ok_or_else(|| BillingError::ProductNotFound(format!("installment plan {}", plan_id)))?;
        let context = plan
            .context()
            .map_err(|e| BillingError::InvalidRequest(e.to_string()))?;
        let PurchaseContext::Program {
            user_id,
            program,
            installment: Some(opening),
        } = context
        else {
            return Err(BillingError::InvalidRequest(format!(
                "payment {} is not an installment plan",
                plan_id
            )));
        };
        if opening.number != 1 {
            return Err(BillingError::InvalidRequest(
                "installments are charged against the plan's first payment".to_string(),
            ));
        }
        if plan.status != PaymentStatus::Succeeded {
            return Err(BillingError::InvalidRequest(
                "the first installment has not been paid".to_string(),
            ));
        }
        if !(2..=opening.count).contains(&number) {
            return Err(BillingError::InvalidRequest(format!(
                "installment must be between 2 and {}",
                opening.count
            )));
        }

        let paid: Vec<u8> = self
            .payments
            .list_for_user(&cmd.user_id)
            .await?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Succeeded)
            .filter_map(|p| match p.context() {
                Ok(PurchaseContext::Program {
                    installment: Some(inst),
                    ..
                }) if inst.belongs_to(plan_id) => Some(inst.number),
                _ => None,
            })
            .collect();
        if paid.contains(&number) {
            return Err(BillingError::InvalidRequest(format!(
                "installment {} is already paid",
                number
            )));
        }
        if number > 2 && !paid.contains(&(number - 1)) {
            return Err(BillingError::InvalidRequest(format!(
                "installment {} must be paid first",
                number - 1
            )));
        }

        if cmd.promo_code.is_some() {
            tracing::debug!(%plan_id, "promo code ignored on a later installment");
        }
        let price = breakdown_from(&plan.metadata).ok_or_else(|| {
            BillingError::InvalidRequest(format!("plan {} carries no price breakdown", plan_id))
        })?;
        let installment = Installment::later(plan.id, number, opening.count);

        Ok(PurchaseQuote {
            context: PurchaseContext::Program {
                user_id,
                program,
                installment: Some(installment),
            },
            currency: plan.currency,
            price,
            charge_now: plan.amount,
            installment: Some(installment),
            promo: None,
            applied_code: None,
            subscription_price_ref: None,
        })
    }

    async fn gift_price(&self, item: &GiftItem) -> Result<(i64, String), BillingError> {
        match item {
            GiftItem::Course(course_id) => {
                let price = self
                    .catalog
                    .course_price(course_id)
                    .await?
                    .ok_or_else(|| BillingError::CourseNotFound(course_id.to_string()))?;
                Ok((price.amount, price.currency))
            }
            GiftItem::Program(program) => {
                let price = self
                    .catalog
                    .program_price(program)
                    .await?
                    .ok_or_else(|| BillingError::ProductNotFound(format!("program:{}", program)))?;
                Ok((price.amount, price.currency))
            }
            GiftItem::MembershipMonths { tier, months } => {
                if !(1..=MAX_GIFT_MONTHS).contains(months) {
                    return Err(BillingError::InvalidRequest(format!(
                        "gifted memberships cover 1 to {} months",
                        MAX_GIFT_MONTHS
                    )));
                }
                let plan = self
                    .catalog
                    .membership_plan(*tier)
                    .await?
                    .ok_or_else(|| BillingError::ProductNotFound(format!("membership:{}", tier)))?;
                Ok((plan.monthly_amount * i64::from(*months), plan.currency))
            }
        }
    }

    async fn ensure_not_owned(
        &self,
        user_id: &UserId,
        product: &ProductRef,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if self.ledger.has_access_at(user_id, product, now).await? {
            return Err(BillingError::AlreadyEnrolled(product.to_string()));
        }
        Ok(())
    }
}
