//! Currency amounts backed by exact decimal arithmetic.

use core::ops::Add;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of fractional digits kept for stored currency amounts.
pub const CURRENCY_SCALE: u32 = 2;

/// A monetary amount in the store currency.
///
/// Arithmetic is exact (no binary floating point). Amounts are rounded to
/// [`CURRENCY_SCALE`] places only when [`Money::rounded`] is called, which uses
/// banker's rounding (half to even).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Build an amount from minor units (e.g. cents): `from_minor(15000)` is `150.00`.
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, CURRENCY_SCALE))
    }

    /// Parse a decimal string such as `"50.00"` or `"19.9"`.
    pub fn parse(s: &str) -> DomainResult<Self> {
        let amount = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid amount {s:?}: {e}")))?;
        Ok(Self(amount))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Round to two decimal places and pin the scale, so `150` reads back as `150.00`.
    pub fn rounded(&self) -> Self {
        let mut amount = self.0.round_dp(CURRENCY_SCALE);
        amount.rescale(CURRENCY_SCALE);
        Self(amount)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_always_shows_two_decimals() {
        assert_eq!(Money::parse("150").unwrap().to_string(), "150.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(Money::parse("0.125").unwrap().rounded(), Money::parse("0.12").unwrap());
        assert_eq!(Money::parse("0.135").unwrap().rounded(), Money::parse("0.14").unwrap());
    }

    #[test]
    fn decimal_sum_has_no_binary_float_drift() {
        let total = (Money::parse("0.1").unwrap() + Money::parse("0.2").unwrap()).rounded();
        assert_eq!(total.to_string(), "0.30");
        assert_eq!(total, Money::parse("0.3").unwrap());
    }

    #[test]
    fn rejects_garbage() {
        let err = Money::parse("fifty").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn sign_helpers() {
        assert!(Money::from_minor(1).is_positive());
        assert!(!Money::zero().is_positive());
        assert!(!Money::zero().is_negative());
        assert!(Money::from_minor(-1).is_negative());
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&Money::from_minor(15000)).unwrap();
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from_minor(15000));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: adding two cent-precise amounts is exact.
        #[test]
        fn addition_of_minor_units_is_exact(a in -1_000_000_00i64..1_000_000_00i64, b in 0i64..1_000_000_00i64) {
            let sum = (Money::from_minor(a) + Money::from_minor(b)).rounded();
            prop_assert_eq!(sum, Money::from_minor(a + b));
        }
    }
}
