//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Points are floor(price × multiplier). With floats:                     │
//! │    floor(100.1 × 1.15) could land on either side of 115                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer piasters + basis-point multipliers               │
//! │    floor(10010 × 11500 / 1_000_000) = 115, every time                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_cents(15_050); // 150.50
//! let profit = price - Money::from_cents(5_000);
//! assert_eq!(profit.to_string(), "100.50");
//!
//! let parsed = Money::parse_decimal("150.5").unwrap();
//! assert_eq!(parsed, price);
//! ```

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (piasters).
///
/// ## Design Decisions
/// - **i64 (signed)**: cash-back sales carry a negative price
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Serialized as decimal currency units** (`150`, `99.5`), the number
///   the dashboard types into its forms; cents never appear in documents
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Sale.price ──┬──► profit = price − service_cost                        │
/// │               ├──► points = floor(price × tier multiplier)              │
/// │               └──► CustomerView.total_spent ──► tier_for()              │
/// │                                                                         │
/// │  Redemption: points / rate ──► discount or cash-back amount            │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[ts(export)]
pub struct Money(#[ts(type = "number")] i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole currency units.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Parses a decimal amount as typed into a form ("150", "150.5", "-10.00").
    ///
    /// ## Rules
    /// - At most two fractional digits
    /// - Optional leading sign
    /// - Surrounding whitespace ignored
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("19.99").unwrap().cents(), 1999);
    /// assert_eq!(Money::parse_decimal("-10").unwrap().cents(), -1000);
    /// assert!(Money::parse_decimal("1.234").is_err());
    /// assert!(Money::parse_decimal("abc").is_err());
    /// ```
    pub fn parse_decimal(input: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (major_str, minor_str) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major_str.is_empty() && minor_str.is_empty() {
            return Err(invalid("no digits"));
        }
        if !major_str.chars().all(|c| c.is_ascii_digit())
            || !minor_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("not a number"));
        }
        if minor_str.len() > 2 {
            return Err(invalid("more than two decimal places"));
        }

        let major: i64 = if major_str.is_empty() {
            0
        } else {
            major_str.parse().map_err(|_| invalid("amount too large"))?
        };
        let minor: i64 = match minor_str.len() {
            0 => 0,
            1 => minor_str.parse::<i64>().map_err(|_| invalid("not a number"))? * 10,
            _ => minor_str.parse().map_err(|_| invalid("not a number"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

// =============================================================================
// Document Encoding
// =============================================================================
//
// ┌──────────────────────┬────────────────────┐
// │  Document value      │  Money             │
// ├──────────────────────┼────────────────────┤
// │  150                 │  15000 cents       │
// │  99.5                │  9950 cents        │
// │  19.999              │  2000 cents        │
// │  "150.50"            │  15050 cents       │
// └──────────────────────┴────────────────────┘
//
// Whole amounts are written as integers and everything else as a float
// rounded to the cent. Fractions below a cent are rounded half away from zero.

/// Largest amount, in whole units, that survives the trip through f64.
const MAX_DOCUMENT_MAJOR: f64 = 90_071_992_547_409.0;

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % 100 == 0 {
            serializer.serialize_i64(self.0 / 100)
        } else {
            serializer.serialize_f64(self.0 as f64 / 100.0)
        }
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an amount in currency units")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        v.checked_mul(100)
            .map(Money)
            .ok_or_else(|| E::custom(format!("amount {} out of range", v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        let v = i64::try_from(v).map_err(|_| E::custom(format!("amount {} out of range", v)))?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        if !v.is_finite() || v.abs() > MAX_DOCUMENT_MAJOR {
            return Err(E::custom(format!("amount {} out of range", v)));
        }
        Ok(Money((v * 100.0).round() as i64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        Money::parse_decimal(v).map_err(E::custom)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering ("150.50", "-10.00").
///
/// ## Note
/// Currency symbols and localization are the dashboard's concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        f.pad(&format!("{}{}.{:02}", sign, self.major().abs(), self.minor_part()))
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_from_major() {
        assert_eq!(Money::from_major(2000).cents(), 200_000);
        assert_eq!(Money::from_major(-10), -Money::from_cents(1000));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-1000).to_string(), "-10.00");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("150").unwrap().cents(), 15_000);
        assert_eq!(Money::parse_decimal("150.5").unwrap().cents(), 15_050);
        assert_eq!(Money::parse_decimal(" 0.07 ").unwrap().cents(), 7);
        assert_eq!(Money::parse_decimal(".5").unwrap().cents(), 50);
        assert_eq!(Money::parse_decimal("-10.00").unwrap().cents(), -1000);
        assert_eq!(Money::parse_decimal("+3").unwrap().cents(), 300);
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert!(Money::parse_decimal("").is_err());
        assert!(Money::parse_decimal("-").is_err());
        assert!(Money::parse_decimal("12a").is_err());
        assert!(Money::parse_decimal("1.999").is_err());
        assert!(Money::parse_decimal("1,50").is_err());
        assert!(Money::parse_decimal("99999999999999999999").is_err());
    }

    #[test]
    fn test_sign_checks() {
        assert!(!Money::zero().is_positive());
        assert!(!Money::zero().is_negative());
        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
    }

    #[test]
    fn test_document_encoding_uses_currency_units() {
        assert_eq!(serde_json::to_value(Money::from_major(150)).unwrap(), serde_json::json!(150));
        assert_eq!(serde_json::to_value(Money::from_cents(9950)).unwrap(), serde_json::json!(99.5));
        assert_eq!(serde_json::to_value(Money::from_cents(-1000)).unwrap(), serde_json::json!(-10));
        assert_eq!(serde_json::to_value(Money::from_cents(1999)).unwrap(), serde_json::json!(19.99));
    }

    #[test]
    fn test_document_decoding_accepts_dashboard_numbers() {
        let decode = |v: serde_json::Value| serde_json::from_value::<Money>(v).unwrap().cents();
        assert_eq!(decode(serde_json::json!(150)), 15_000);
        assert_eq!(decode(serde_json::json!(99.5)), 9_950);
        assert_eq!(decode(serde_json::json!(0.1)), 10);
        assert_eq!(decode(serde_json::json!(19.999)), 2_000);
        assert_eq!(decode(serde_json::json!(-10)), -1_000);
        assert_eq!(decode(serde_json::json!("150.50")), 15_050);

        assert!(serde_json::from_value::<Money>(serde_json::json!("lots")).is_err());
        assert!(serde_json::from_value::<Money>(serde_json::json!(1e300)).is_err());
        assert!(serde_json::from_value::<Money>(serde_json::json!(null)).is_err());
    }
}
