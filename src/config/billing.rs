//! Enrollment and tax policy

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::billing::TaxPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Days of access kept after a dated enrollment expires
    #[serde(default)]
    pub default_grace_days: u32,

    /// Billing state that is charged sales tax
    #[serde(default = "default_taxable_state")]
    pub taxable_state: String,

    /// Sales tax in basis points
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,

    /// How often the expiry and reminder sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Processed webhook events older than this are purged
    #[serde(default = "default_webhook_retention_days")]
    pub webhook_retention_days: u32,
}

impl BillingConfig {
    pub fn tax_policy(&self) -> TaxPolicy {
        TaxPolicy {
            taxable_state: self.taxable_state.to_ascii_uppercase(),
            rate_bps: self.tax_rate_bps,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.taxable_state.len() != 2
            || !self.taxable_state.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(ValidationError::InvalidTaxState);
        }
        if self.tax_rate_bps > 10_000 {
            return Err(ValidationError::InvalidTaxRate);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_grace_days: 0,
            taxable_state: default_taxable_state(),
            tax_rate_bps: default_tax_rate_bps(),
            sweep_interval_secs: default_sweep_interval(),
            webhook_retention_days: default_webhook_retention_days(),
        }
    }
}

fn default_taxable_state() -> String {
    "TX".to_string()
}

fn default_tax_rate_bps() -> u32 {
    825
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_webhook_retention_days() -> u32 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tax_policy_default() {
        let config = BillingConfig::default();
        assert_eq!(config.tax_policy(), TaxPolicy::default());
        assert_eq!(config.default_grace_days, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn state_is_upper_cased() {
        let config = BillingConfig {
            taxable_state: "ca".to_string(),
            ..Default::default()
        };
        assert_eq!(config.tax_policy().taxable_state, "CA");
    }

    #[test]
    fn rejects_bad_state_and_rate() {
        let config = BillingConfig {
            taxable_state: "Texas".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidTaxState)
        ));

        let config = BillingConfig {
            tax_rate_bps: 10_001,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTaxRate)));
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let config = BillingConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
