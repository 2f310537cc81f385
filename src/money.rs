// Money conversion
// Balances and amounts are `Decimal` in memory and INTEGER minor units in
// storage. Every conversion between the two goes through this module.

use rust_decimal::prelude::*;
use thiserror::Error;

/// Number of fractional digits kept in storage
pub const MONEY_SCALE: u32 = 4;

/// Minor units per whole currency unit (10^MONEY_SCALE)
pub const MINOR_UNITS_PER_UNIT: i64 = 10_000;

/// Money conversion errors
#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount too large, would overflow")]
    Overflow,
}

/// Convert a decimal amount to stored minor units.
///
/// Rejects amounts with more fractional digits than the storage scale
/// instead of silently truncating them.
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: MONEY_SCALE,
        });
    }

    normalized
        .checked_mul(Decimal::from(MINOR_UNITS_PER_UNIT))
        .and_then(|scaled| scaled.to_i64())
        .ok_or(MoneyError::Overflow)
}

/// Convert stored minor units back to a decimal amount
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}

/// Round a computed amount (fees, conversions) to the storage scale
pub fn round_to_scale(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use test_case::test_case;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test_case("1", 10_000 ; "whole unit")]
    #[test_case("0.0001", 1 ; "smallest unit")]
    #[test_case("92.1", 921_000 ; "one fractional digit")]
    #[test_case("1.50000", 15_000 ; "trailing zeros beyond scale")]
    #[test_case("-3.25", -32_500 ; "negative")]
    fn test_to_minor_units(input: &str, expected: i64) {
        assert_eq!(to_minor_units(d(input)), Ok(expected));
    }

    #[test]
    fn test_to_minor_units_rejects_excess_precision() {
        assert_eq!(
            to_minor_units(d("0.00001")),
            Err(MoneyError::PrecisionOverflow { provided: 5, max: MONEY_SCALE })
        );
    }

    #[test]
    fn test_to_minor_units_overflow() {
        assert_eq!(to_minor_units(Decimal::MAX), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(from_minor_units(921_000), d("92.1"));
        assert_eq!(from_minor_units(0), Decimal::ZERO);
    }

    #[test]
    fn test_round_to_scale() {
        assert_eq!(round_to_scale(d("0.091422367")), d("0.0914"));
        assert_eq!(round_to_scale(d("0.00005")), d("0.0001"));
        assert_eq!(round_to_scale(d("0.00004")), Decimal::ZERO);
    }
}
