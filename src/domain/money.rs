//! Exact decimal arithmetic for prices, quantities and account values.
//!
//! `Money` wraps [`rust_decimal::Decimal`] so that accounting paths never
//! touch binary floats. The only float escape hatch is
//! [`Money::to_f64_lossy`], reserved for rule-threshold comparisons and
//! metric gauges.

use crate::domain::errors::CoreError;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Exact signed decimal amount. Copy-cheap; equality ignores trailing zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Parse a canonical signed decimal string.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Decimal::from_str(value)
            .map(Money)
            .map_err(|_| CoreError::InvalidMoneyLiteral(value.to_string()))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn from_int(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    /// Build from a float. Lossy; for strategy signals and config-derived
    /// thresholds only, never for accounting inputs. Non-finite values
    /// collapse to zero.
    pub fn from_f64_lossy(value: f64) -> Self {
        Decimal::from_f64(value).map(Money).unwrap_or_default()
    }

    /// Division with an explicit zero-divisor error.
    pub fn checked_div(&self, other: &Money) -> Result<Money, CoreError> {
        if other.0.is_zero() {
            return Err(CoreError::DivisionByZero);
        }
        Ok(Money(self.0 / other.0))
    }

    pub fn abs(&self) -> Money {
        Money(self.0.abs())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Lossy projection for threshold comparisons and observability.
    pub fn to_f64_lossy(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Mul for Money {
    type Output = Money;
    fn mul(self, rhs: Money) -> Money {
        Money(self.0 * rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        Money::parse(s).unwrap()
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            Money::parse("12.3.4"),
            Err(CoreError::InvalidMoneyLiteral(_))
        ));
        assert!(Money::parse("not-a-number").is_err());
        assert!(Money::parse("").is_err());
    }

    #[test]
    fn string_round_trip() {
        for s in ["0", "1", "-1", "0.001", "-42.5", "123456789.987654321"] {
            let v = m(s);
            assert_eq!(Money::parse(&v.to_string()).unwrap(), v);
        }
    }

    #[test]
    fn arithmetic_identities() {
        let a = m("10.5");
        let b = m("2.25");
        assert_eq!(a + b, b + a);
        assert_eq!(a + (-a), Money::zero());
        assert_eq!(a - b, m("8.25"));
        assert_eq!(a * b, m("23.625"));
        assert_eq!((a + b) + m("1"), a + (b + m("1")));
    }

    #[test]
    fn division_is_exact_for_terminating_quotients() {
        let notional = m("3000");
        let price = m("50000");
        assert_eq!(notional.checked_div(&price).unwrap(), m("0.06"));
    }

    #[test]
    fn division_by_zero_surfaces_kind() {
        assert!(matches!(
            m("1").checked_div(&Money::zero()),
            Err(CoreError::DivisionByZero)
        ));
    }

    #[test]
    fn equality_ignores_trailing_zeros() {
        assert_eq!(m("1.50"), m("1.5"));
        assert_eq!(m("0.0"), Money::zero());
    }

    #[test]
    fn sign_predicates() {
        assert!(m("0.01").is_positive());
        assert!(m("-0.01").is_negative());
        assert!(Money::zero().is_zero());
        assert!(!Money::zero().is_positive());
        assert!(!Money::zero().is_negative());
        assert_eq!(m("-3").abs(), m("3"));
    }

    #[test]
    fn serde_uses_canonical_strings() {
        let v = m("1234.5678");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1234.5678\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn lossy_float_projection() {
        assert!((m("0.30").to_f64_lossy() - 0.30).abs() < 1e-12);
        assert_eq!(Money::from_f64_lossy(0.25), m("0.25"));
    }
}
