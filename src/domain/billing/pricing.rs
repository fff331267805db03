//! Sales tax and installment arithmetic.
//!
//! All amounts are minor units. Installments round up, so a plan may
//! collect a few cents more than the one-time price (49900 in three
//! installments is 3 x 16634 = 49902).

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Allowed installment plan lengths.
pub const INSTALLMENT_COUNTS: [u8; 2] = [2, 3];

/// Destination-based sales tax for a single taxable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxPolicy {
    /// Two-letter state code, upper-case.
    pub taxable_state: String,
    /// Rate in basis points (825 = 8.25%).
    pub rate_bps: u32,
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            taxable_state: "TX".to_string(),
            rate_bps: 825,
        }
    }
}

impl TaxPolicy {
    /// Tax owed on `amount` shipped to `state`, rounded half-up.
    pub fn tax_for(&self, amount: i64, state: Option<&str>) -> i64 {
        let taxable = state
            .map(|s| s.trim().eq_ignore_ascii_case(&self.taxable_state))
            .unwrap_or(false);
        if !taxable || amount <= 0 {
            return 0;
        }
        (amount * i64::from(self.rate_bps) + 5_000) / 10_000
    }
}

/// Itemised price of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_amount: i64,
    pub discount_amount: i64,
    pub tax_amount: i64,
    /// Amount to charge now.
    pub total: i64,
}

impl PriceBreakdown {
    pub fn compute(base_amount: i64, discount_amount: i64, tax_amount: i64) -> Self {
        Self {
            base_amount,
            discount_amount,
            tax_amount,
            total: base_amount - discount_amount + tax_amount,
        }
    }
}

/// Amount of each installment: `ceil(total / count)`.
pub fn installment_amount(total: i64, count: u8) -> Result<i64, ValidationError> {
    if !INSTALLMENT_COUNTS.contains(&count) {
        return Err(ValidationError::out_of_range(
            "installments",
            i32::from(INSTALLMENT_COUNTS[0]),
            i32::from(INSTALLMENT_COUNTS[INSTALLMENT_COUNTS.len() - 1]),
            i32::from(count),
        ));
    }
    if total < 0 {
        return Err(ValidationError::invalid_format(
            "amount",
            "installment total cannot be negative",
        ));
    }
    let count = i64::from(count);
    Ok((total + count - 1) / count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn texas_is_taxed_at_825_bps() {
        let policy = TaxPolicy::default();
        // 9999 * 0.0825 = 824.9175
        assert_eq!(policy.tax_for(9999, Some("TX")), 825);
        assert_eq!(policy.tax_for(10000, Some("tx")), 825);
    }

    #[test]
    fn other_states_and_unknown_are_untaxed() {
        let policy = TaxPolicy::default();
        assert_eq!(policy.tax_for(9999, Some("CA")), 0);
        assert_eq!(policy.tax_for(9999, None), 0);
    }

    #[test]
    fn breakdown_adds_tax_after_discount() {
        let b = PriceBreakdown::compute(10000, 2000, 660);
        assert_eq!(b.total, 8660);
    }

    #[test]
    fn three_installments_of_49900_round_up() {
        assert_eq!(installment_amount(49900, 3).unwrap(), 16634);
        assert_eq!(installment_amount(49900, 2).unwrap(), 24950);
    }

    #[test]
    fn unsupported_installment_count_is_rejected() {
        assert!(matches!(
            installment_amount(49900, 4),
            Err(ValidationError::OutOfRange { min: 2, max: 3, actual: 4, .. })
        ));
        assert!(installment_amount(49900, 1).is_err());
    }

    proptest! {
        #[test]
        fn installments_cover_total_with_less_than_count_overshoot(total in 0i64..100_000_000, count in 2u8..=3) {
            let each = installment_amount(total, count).unwrap();
            let collected = each * i64::from(count);
            prop_assert!(collected >= total);
            prop_assert!(collected - total < i64::from(count));
        }
    }
}
