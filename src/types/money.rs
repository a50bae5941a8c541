//! Money amounts in minor currency units
//!
//! Every stored amount is an integer count of the smallest currency unit
//! (kobo, cents). Fractional input is rejected at the boundary by
//! [`Money::from_decimal`]; nothing inside the ledger ever sees a fraction.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::LedgerError;

/// An amount of money expressed in minor currency units
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero minor units
    pub const ZERO: Money = Money(0);

    /// Wrap a count of minor units
    pub const fn from_minor(units: i64) -> Self {
        Money(units)
    }

    /// The count of minor units
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Convert an externally supplied amount into minor units
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AmountNotInteger`] if the amount has a fractional part
    /// - [`LedgerError::Validation`] if it does not fit in 64 bits
    pub fn from_decimal(amount: Decimal) -> Result<Self, LedgerError> {
        if !amount.fract().is_zero() {
            return Err(LedgerError::amount_not_integer(amount));
        }
        amount
            .to_i64()
            .map(Money)
            .ok_or_else(|| LedgerError::validation("amount", format!("{} is out of range", amount)))
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Clamp negative results to zero
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }

    /// Value in major units (two decimal places), for display only
    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Money {
    fn from(units: i64) -> Self {
        Money(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::whole(Decimal::new(43001, 0), 43001)]
    #[case::trailing_zero_scale(Decimal::new(430010, 1), 43001)]
    #[case::zero(Decimal::ZERO, 0)]
    fn test_from_decimal_accepts_integers(#[case] input: Decimal, #[case] expected: i64) {
        assert_eq!(Money::from_decimal(input).unwrap(), Money::from_minor(expected));
    }

    #[rstest]
    #[case::half(Decimal::new(4300150, 2))]
    #[case::tiny(Decimal::new(1, 4))]
    fn test_from_decimal_rejects_fractions(#[case] input: Decimal) {
        let err = Money::from_decimal(input).unwrap_err();
        assert!(matches!(err, LedgerError::AmountNotInteger { .. }));
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::from_minor(i64::MAX);
        assert_eq!(a.checked_add(Money::from_minor(1)), None);
        assert_eq!(
            Money::from_minor(5).checked_sub(Money::from_minor(7)),
            Some(Money::from_minor(-2))
        );
        assert_eq!(Money::from_minor(-2).non_negative(), Money::ZERO);
    }

    #[test]
    fn test_to_major() {
        assert_eq!(Money::from_minor(44000).to_major(), Decimal::new(44000, 2));
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from_minor(999)).unwrap();
        assert_eq!(json, "999");
    }
}
