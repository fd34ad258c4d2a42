//! Decimal money amounts and conversion to provider minor units.
//!
//! Prices are stored as `NUMERIC(12,2)` and handled as [`Decimal`] so that
//! totals never pick up binary floating-point drift. Payment providers want
//! integer minor units (kobo, cents), which is where [`Money`] comes in.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Minor units per major unit for every supported currency.
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Errors that can occur when converting amounts.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// Amount does not fit in the provider's integer range.
    #[error("amount is too large")]
    Overflow,
}

/// A non-negative amount in a currency's major unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero in any currency.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount, rounding to two places (half away from zero).
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for amounts below zero.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        Ok(Self(
            amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        ))
    }

    /// Build an amount from integer minor units.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for amounts below zero.
    pub fn from_minor_units(minor: i64) -> Result<Self, MoneyError> {
        if minor < 0 {
            return Err(MoneyError::Negative);
        }
        Ok(Self(Decimal::new(minor, 2)))
    }

    /// Convert to integer minor units for the payment provider.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the amount exceeds `i64`.
    pub fn to_minor_units(self) -> Result<i64, MoneyError> {
        self.0
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .and_then(|minor| minor.to_i64())
            .ok_or(MoneyError::Overflow)
    }

    /// The amount in major units.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Sum `quantity * unit_price` over the given lines.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the total overflows, or
    /// `MoneyError::Negative` if any line has a negative price.
    pub fn total_of<I>(lines: I) -> Result<Self, MoneyError>
    where
        I: IntoIterator<Item = (i32, Decimal)>,
    {
        let mut total = Decimal::ZERO;
        for (quantity, unit_price) in lines {
            if unit_price.is_sign_negative() && !unit_price.is_zero() {
                return Err(MoneyError::Negative);
            }
            let line = unit_price
                .checked_mul(Decimal::from(quantity))
                .ok_or(MoneyError::Overflow)?;
            total = total.checked_add(line).ok_or(MoneyError::Overflow)?;
        }
        Self::new(total)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(Money::new(dec("1500.50")).unwrap().to_minor_units(), Ok(150_050));
        assert_eq!(Money::ZERO.to_minor_units(), Ok(0));
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        assert_eq!(Money::new(dec("10.005")).unwrap().amount(), dec("10.01"));
        assert_eq!(Money::new(dec("10.004")).unwrap().amount(), dec("10.00"));
    }

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Money::new(dec("-0.01")), Err(MoneyError::Negative));
        assert_eq!(Money::from_minor_units(-1), Err(MoneyError::Negative));
    }

    #[test]
    fn test_from_minor_units() {
        assert_eq!(Money::from_minor_units(1999).unwrap().amount(), dec("19.99"));
    }

    #[test]
    fn test_total_of_lines() {
        let total = Money::total_of([(2, dec("19.99")), (1, dec("5.00"))]).unwrap();
        assert_eq!(total.amount(), dec("44.98"));
        assert_eq!(Money::total_of(std::iter::empty()).unwrap(), Money::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(dec("7.5")).unwrap().to_string(), "7.50");
    }
}
