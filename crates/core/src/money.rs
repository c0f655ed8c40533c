use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Signed currency value. Positive is income, negative is expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).to_i64().unwrap_or(0)
    }

    /// Normalizes to two decimal places, so values round-trip through the
    /// content digest and the cents column identically.
    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_income(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_expense(self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip() {
        assert_eq!(Money::from_cents(-575).to_cents(), -575);
        assert_eq!(Money::from_cents(120_000).to_cents(), 120_000);
        assert_eq!(Money::from_cents(0).to_cents(), 0);
    }

    #[test]
    fn sign_helpers() {
        assert!(Money::from_cents(120_000).is_income());
        assert!(Money::from_cents(-575).is_expense());
        assert!(!Money::zero().is_income());
        assert!(!Money::zero().is_expense());
    }

    #[test]
    fn from_decimal_rounds_to_cents() {
        let m = Money::from_decimal(Decimal::new(1239, 3)); // 1.239
        assert_eq!(m.to_cents(), 124);
    }

    #[test]
    fn display_two_places() {
        assert_eq!(Money::from_cents(-50).to_string(), "$-0.50");
        assert_eq!(Money::from_cents(575).to_string(), "$5.75");
    }
}
