//! Promotion codes and their evaluation.
//!
//! Validation never fails with an error: every rejection is reported as a
//! [`PromoRejection`] carried inside [`PromoValidation`], so the checkout
//! can show it and carry on at full price.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. code exists and is active
//! 2. not expired
//! 3. usage below the cap
//! 4. applicable to the product type
//! 5. purchase amount at or above the minimum

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

use super::ProductType;

/// Normalises user input to the stored, case-insensitive form.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// How a promo code reduces the price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Whole percent, 0..=100.
    Percentage(u32),
    /// Fixed amount in minor units.
    Fixed(i64),
}

impl Discount {
    /// Discount for `amount`, never more than `amount` and never negative.
    ///
    /// Percentages floor to the minor unit.
    pub fn amount_off(&self, amount: i64) -> i64 {
        if amount <= 0 {
            return 0;
        }
        let off = match *self {
            Discount::Percentage(pct) => amount * i64::from(pct.min(100)) / 100,
            Discount::Fixed(value) => value,
        };
        off.clamp(0, amount)
    }
}

/// A stored promotion code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Canonical upper-case code.
    pub code: String,
    pub active: bool,
    pub discount: Discount,
    pub expires_at: Option<Timestamp>,
    pub max_uses: Option<u32>,
    pub times_used: u32,

    /// Empty means every product type.
    pub applicable_products: Vec<ProductType>,

    /// Minimum purchase in minor units.
    pub minimum_amount: i64,
}

/// Why a code was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromoRejection {
    NotFound,
    Expired,
    UsageLimitReached,
    NotApplicable { product_type: ProductType },
    BelowMinimum { minimum_amount: i64 },
}

impl PromoRejection {
    pub fn user_message(&self) -> String {
        match self {
            PromoRejection::NotFound => "Invalid promo code".to_string(),
            PromoRejection::Expired => "This promo code has expired".to_string(),
            PromoRejection::UsageLimitReached => {
                "This promo code has reached its usage limit".to_string()
            }
            PromoRejection::NotApplicable { product_type } => {
                format!("This promo code cannot be used for a {} purchase", product_type)
            }
            PromoRejection::BelowMinimum { minimum_amount } => format!(
                "Minimum purchase of {}.{:02} required for this promo code",
                minimum_amount / 100,
                minimum_amount % 100
            ),
        }
    }
}

impl std::fmt::Display for PromoRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message())
    }
}

/// Outcome of evaluating a code against a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoValidation {
    pub valid: bool,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub rejection: Option<PromoRejection>,
}

impl PromoValidation {
    fn accepted(amount: i64, discount_amount: i64) -> Self {
        Self {
            valid: true,
            discount_amount,
            final_amount: amount - discount_amount,
            rejection: None,
        }
    }

    fn rejected(amount: i64, reason: PromoRejection) -> Self {
        Self {
            valid: false,
            discount_amount: 0,
            final_amount: amount,
            rejection: Some(reason),
        }
    }

    /// User-facing reason, if rejected.
    pub fn reason(&self) -> Option<String> {
        self.rejection.as_ref().map(PromoRejection::user_message)
    }
}

/// Evaluates `promo` (as looked up for the entered code) against a purchase.
pub fn validate_promo(
    promo: Option<&PromoCode>,
    purchase_amount: i64,
    product_type: ProductType,
    now: Timestamp,
) -> PromoValidation {
    let promo = match promo {
        Some(p) if p.active => p,
        _ => return PromoValidation::rejected(purchase_amount, PromoRejection::NotFound),
    };

    if let Some(expires_at) = promo.expires_at {
        if now.is_after(&expires_at) {
            return PromoValidation::rejected(purchase_amount, PromoRejection::Expired);
        }
    }

    if let Some(max_uses) = promo.max_uses {
        if promo.times_used >= max_uses {
            return PromoValidation::rejected(purchase_amount, PromoRejection::UsageLimitReached);
        }
    }

    if !promo.applicable_products.is_empty() && !promo.applicable_products.contains(&product_type)
    {
        return PromoValidation::rejected(
            purchase_amount,
            PromoRejection::NotApplicable { product_type },
        );
    }

    if purchase_amount < promo.minimum_amount {
        return PromoValidation::rejected(
            purchase_amount,
            PromoRejection::BelowMinimum {
                minimum_amount: promo.minimum_amount,
            },
        );
    }

    PromoValidation::accepted(purchase_amount, promo.discount.amount_off(purchase_amount))
}
