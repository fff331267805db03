//! Payment configuration

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::enrollment::MembershipTier;
use crate::ports::MembershipPlan;

/// Payment configuration (Stripe)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe API key
    pub stripe_api_key: SecretString,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: SecretString,

    /// Accepted clock skew on webhook signatures, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,

    /// Reject events whose `livemode` doesn't match the API key
    #[serde(default)]
    pub enforce_livemode: bool,

    /// Stripe price ID for monthly plan
    pub stripe_monthly_price_id: Option<String>,

    /// Monthly plan amount in cents
    pub monthly_amount: Option<i64>,

    /// Stripe price ID for annual plan
    pub stripe_annual_price_id: Option<String>,

    /// Annual plan amount per month in cents, used to price gifted months
    pub annual_monthly_amount: Option<i64>,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Override for the Stripe API base URL (stripe-mock, proxies)
    pub api_base_url: Option<String>,
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_live_")
    }

    /// Membership plans that are fully configured.
    pub fn membership_plans(&self) -> HashMap<MembershipTier, MembershipPlan> {
        let mut plans = HashMap::new();
        let tiers = [
            (
                MembershipTier::Monthly,
                &self.stripe_monthly_price_id,
                self.monthly_amount,
            ),
            (
                MembershipTier::Annual,
                &self.stripe_annual_price_id,
                self.annual_monthly_amount,
            ),
        ];
        for (tier, price_ref, amount) in tiers {
            if let (Some(price_ref), Some(monthly_amount)) = (price_ref, amount) {
                plans.insert(
                    tier,
                    MembershipPlan {
                        price_ref: price_ref.clone(),
                        monthly_amount,
                        currency: self.currency.clone(),
                    },
                );
            }
        }
        plans
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();

        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }

        // Verify key prefixes for safety
        if !api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }

        if !(1..=3600).contains(&self.webhook_tolerance_secs) {
            return Err(ValidationError::InvalidWebhookTolerance);
        }

        validate_plan(
            "monthly",
            self.stripe_monthly_price_id.as_deref(),
            self.monthly_amount,
        )?;
        validate_plan(
            "annual",
            self.stripe_annual_price_id.as_deref(),
            self.annual_monthly_amount,
        )?;

        Ok(())
    }
}

fn validate_plan(
    tier: &'static str,
    price_id: Option<&str>,
    amount: Option<i64>,
) -> Result<(), ValidationError> {
    match (price_id, amount) {
        (None, None) => Ok(()),
        (Some(id), Some(amount)) if amount > 0 => {
            if id.starts_with("price_") {
                Ok(())
            } else {
                Err(ValidationError::InvalidPriceId(id.to_string()))
            }
        }
        _ => Err(ValidationError::IncompletePlan(tier)),
    }
}

fn default_webhook_tolerance() -> i64 {
    300
}

fn default_currency() -> String {
    "usd".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str, webhook_secret: &str) -> PaymentConfig {
        PaymentConfig {
            stripe_api_key: SecretString::new(api_key.to_string()),
            stripe_webhook_secret: SecretString::new(webhook_secret.to_string()),
            webhook_tolerance_secs: default_webhook_tolerance(),
            enforce_livemode: false,
            stripe_monthly_price_id: None,
            monthly_amount: None,
            stripe_annual_price_id: None,
            annual_monthly_amount: None,
            currency: default_currency(),
            api_base_url: None,
        }
    }

    #[test]
    fn test_is_test_mode() {
        let config = config("sk_test_xxx", "whsec_xxx");
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());
    }

    #[test]
    fn test_is_live_mode() {
        let config = config("sk_live_xxx", "whsec_xxx");
        assert!(config.is_live_mode());
        assert!(!config.is_test_mode());
    }

    #[test]
    fn test_validation_missing_api_key() {
        assert!(matches!(
            config("", "whsec_xxx").validate(),
            Err(ValidationError::MissingRequired("STRIPE_API_KEY"))
        ));
    }

    #[test]
    fn test_validation_missing_webhook_secret() {
        assert!(config("sk_test_xxx", "").validate().is_err());
    }

    #[test]
    fn test_validation_invalid_api_key_prefix() {
        assert!(matches!(
            config("pk_test_xxx", "whsec_xxx").validate(),
            Err(ValidationError::InvalidStripeKey)
        ));
    }

    #[test]
    fn test_validation_invalid_webhook_secret_prefix() {
        assert!(matches!(
            config("sk_test_xxx", "secret_xxx").validate(),
            Err(ValidationError::InvalidStripeWebhookSecret)
        ));
    }

    #[test]
    fn test_validation_tolerance_range() {
        let mut config = config("sk_test_xxx", "whsec_xxx");
        config.webhook_tolerance_secs = 0;
        assert!(config.validate().is_err());

        config.webhook_tolerance_secs = 3601;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_half_configured_plan_rejected() {
        let mut config = config("sk_test_xxx", "whsec_xxx");
        config.stripe_monthly_price_id = Some("price_monthly".to_string());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::IncompletePlan("monthly"))
        ));
    }

    #[test]
    fn test_price_id_prefix_checked() {
        let mut config = config("sk_test_xxx", "whsec_xxx");
        config.stripe_annual_price_id = Some("annual".to_string());
        config.annual_monthly_amount = Some(1500);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPriceId(_))
        ));
    }

    #[test]
    fn test_membership_plans_only_include_complete_tiers() {
        let mut config = config("sk_test_abcd1234", "whsec_xyz789");
        config.stripe_monthly_price_id = Some("price_monthly".to_string());
        config.monthly_amount = Some(1900);
        assert!(config.validate().is_ok());

        let plans = config.membership_plans();
        assert_eq!(plans.len(), 1);
        let monthly = &plans[&MembershipTier::Monthly];
        assert_eq!(monthly.price_ref, "price_monthly");
        assert_eq!(monthly.monthly_amount, 1900);
        assert_eq!(monthly.currency, "usd");
    }
}
