//! Monetary conversion helpers.
//!
//! Amounts are persisted as integer minor units (cents) and only converted to
//! decimal at the presentation and ingest boundaries.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ServiceError;

/// Converts a decimal currency amount to minor units, rounding half-up
/// (midpoint away from zero). Negative amounts are rejected; storage holds
/// non-negative integers only.
pub fn to_minor_units(value: Decimal) -> Result<i64, ServiceError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ServiceError::validation(format!(
            "amount must not be negative, got {value}"
        )));
    }
    let cents = (value * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents
        .to_i64()
        .ok_or_else(|| ServiceError::validation(format!("amount {value} out of range")))
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_whole_and_fractional_amounts() {
        assert_eq!(to_minor_units(dec!(100)).unwrap(), 10_000);
        assert_eq!(to_minor_units(dec!(123.45)).unwrap(), 12_345);
        assert_eq!(to_minor_units(dec!(0)).unwrap(), 0);
    }

    #[test]
    fn rounds_half_up() {
        assert_eq!(to_minor_units(dec!(10.005)).unwrap(), 1_001);
        assert_eq!(to_minor_units(dec!(10.004)).unwrap(), 1_000);
        assert_eq!(to_minor_units(dec!(0.995)).unwrap(), 100);
    }

    #[test]
    fn rejects_negative_amounts() {
        assert!(to_minor_units(dec!(-0.01)).is_err());
    }

    #[test]
    fn minor_units_roundtrip() {
        assert_eq!(from_minor_units(12_345), dec!(123.45));
        assert_eq!(to_minor_units(from_minor_units(9_999)).unwrap(), 9_999);
    }
}
