//! Monetary amounts.

use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// A monetary amount in the ledger's single (implicit) currency.
///
/// Backed by a fixed-point decimal so that unit costs such as `19.99` multiply
/// without binary floating point drift.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Clamp negative amounts to zero. Stock value is never negative.
    pub fn non_negative(self) -> Self {
        if self.0.is_sign_negative() {
            Self::ZERO
        } else {
            self
        }
    }

    /// `None` if the sum does not fit.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sums_amounts() {
        let total: Money = [dec!(10.50), dec!(0.25), dec!(4)]
            .into_iter()
            .map(Money::new)
            .sum();
        assert_eq!(total, Money::new(dec!(14.75)));
    }

    #[test]
    fn non_negative_clamps_below_zero() {
        assert_eq!(Money::new(dec!(-3)).non_negative(), Money::ZERO);
        assert_eq!(Money::new(dec!(3)).non_negative(), Money::new(dec!(3)));
    }

    #[test]
    fn checked_add_reports_overflow() {
        assert_eq!(
            Money::new(dec!(1.5)).checked_add(Money::new(dec!(2))),
            Some(Money::new(dec!(3.5)))
        );
        assert_eq!(Money::new(Decimal::MAX).checked_add(Money::new(dec!(1))), None);
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(Money::new(dec!(100.0)), Money::new(dec!(100)));
    }
}
