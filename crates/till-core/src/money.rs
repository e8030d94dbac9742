//! # Money and Quantity
//!
//! Exact two-fraction-digit fixed point values for every amount and count
//! the ledger touches.
//!
//! ## Representation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Type       Stored as          Example       Wire (serde)               │
//! │  ────────   ────────────────   ───────────   ─────────────────────────  │
//! │  Money      i64 minor units    1250          "12.50"                    │
//! │  Quantity   i64 hundredths     150           "1.50"                     │
//! │                                                                         │
//! │  Money × Quantity                                                       │
//! │    cents × hundredths / 100, rounded half away from zero                │
//! │    12.50 × 1.50 = 18.75      0.99 × 0.50 = 0.495 → 0.50                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both types serialize as decimal strings so no consumer ever sees a float.
//! Parsing rejects more than two fraction digits instead of rounding silently.
//!
//! ## Usage
//! ```rust
//! use till_core::money::{Money, Quantity};
//!
//! let price: Money = "12.50".parse().unwrap();
//! let qty = Quantity::from_units(3);
//! assert_eq!(price.times(qty), Money::from_cents(3750));
//! assert_eq!(price.to_string(), "12.50");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Decimal Parsing
// =============================================================================

/// Failure to read a fixed point decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDecimalError {
    #[error("empty decimal value")]
    Empty,

    #[error("invalid character in decimal value '{0}'")]
    InvalidDigit(String),

    #[error("'{0}' has more than two fraction digits")]
    TooManyFractionDigits(String),

    #[error("'{0}' is out of range")]
    Overflow(String),
}

/// Parses `[+-]digits[.d[d]]` into hundredths.
fn parse_hundredths(input: &str) -> Result<i64, ParseDecimalError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ParseDecimalError::Empty);
    }

    let (negative, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let (whole, fraction) = match body.split_once('.') {
        Some((w, f)) => (w, f),
        None => (body, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(ParseDecimalError::InvalidDigit(input.to_string()));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ParseDecimalError::InvalidDigit(input.to_string()));
    }
    if fraction.len() > 2 {
        return Err(ParseDecimalError::TooManyFractionDigits(input.to_string()));
    }

    let overflow = || ParseDecimalError::Overflow(input.to_string());

    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let fraction_value: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| overflow())? * 10,
        _ => fraction.parse().map_err(|_| overflow())?,
    };

    let magnitude = whole_value
        .checked_mul(100)
        .and_then(|v| v.checked_add(fraction_value))
        .ok_or_else(overflow)?;

    Ok(if negative { -magnitude } else { magnitude })
}

/// Writes hundredths as `[-]units.dd`.
fn fmt_hundredths(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
}

// =============================================================================
// Money
// =============================================================================

/// A monetary amount in minor currency units (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: compensations and cash-out movements can be negative
/// - **No float constructor**: values come from cents or decimal strings
/// - **String serde**: `"12.50"` on the wire, integer cents in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.to_string(), "10.99");
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole currency units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity, rounding half away from zero
    /// to whole cents.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::{Money, Quantity};
    ///
    /// let unit = Money::from_cents(99);
    /// let half = Quantity::from_hundredths(50);
    /// // 0.99 × 0.50 = 0.495 → 0.50
    /// assert_eq!(unit.times(half).cents(), 50);
    /// ```
    pub fn times(&self, quantity: Quantity) -> Money {
        // i128 so large prices times large quantities cannot overflow
        let product = self.0 as i128 * quantity.hundredths() as i128;
        let quotient = product / 100;
        let remainder = product % 100;
        let rounded = if remainder.abs() >= 50 {
            quotient + product.signum()
        } else {
            quotient
        };
        // Clamp instead of wrapping when the result leaves the i64 range
        let clamped = i64::try_from(rounded).unwrap_or(if rounded.is_negative() {
            i64::MIN
        } else {
            i64::MAX
        });
        Money(clamped)
    }

    /// `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// `None` on overflow.
    #[inline]
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hundredths(self.0, f)
    }
}

impl FromStr for Money {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hundredths(s).map(Money)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
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
// Quantity
// =============================================================================

/// A stock or line quantity in hundredths of a unit.
///
/// Fractional quantities cover goods sold by weight or volume
/// (`1.25` kg is `Quantity::from_hundredths(125)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Quantity(hundredths)
    }

    /// Creates a whole-unit quantity.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * 100)
    }

    #[inline]
    pub const fn hundredths(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    /// `None` on overflow.
    #[inline]
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_sub(other.0).map(Quantity)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hundredths(self.0, f)
    }
}

impl FromStr for Quantity {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hundredths(s).map(Quantity)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
        assert_eq!(Quantity::from_hundredths(125).to_string(), "1.25");
    }

    #[test]
    fn test_parse() {
        assert_eq!("12.50".parse::<Money>().unwrap().cents(), 1250);
        assert_eq!("12.5".parse::<Money>().unwrap().cents(), 1250);
        assert_eq!("12".parse::<Money>().unwrap().cents(), 1200);
        assert_eq!(".75".parse::<Money>().unwrap().cents(), 75);
        assert_eq!("-0.05".parse::<Money>().unwrap().cents(), -5);
        assert_eq!("+3.00".parse::<Quantity>().unwrap().hundredths(), 300);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<Money>(), Err(ParseDecimalError::Empty));
        assert!(matches!(
            "1.234".parse::<Money>(),
            Err(ParseDecimalError::TooManyFractionDigits(_))
        ));
        assert!(matches!(
            "1,50".parse::<Money>(),
            Err(ParseDecimalError::InvalidDigit(_))
        ));
        assert!(matches!(
            "-".parse::<Money>(),
            Err(ParseDecimalError::InvalidDigit(_))
        ));
        assert!(matches!(
            "99999999999999999999".parse::<Money>(),
            Err(ParseDecimalError::Overflow(_))
        ));
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let json = serde_json::to_string(&Money::from_cents(1250)).unwrap();
        assert_eq!(json, "\"12.50\"");

        let back: Money = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(back, Money::from_cents(1250));

        assert!(serde_json::from_str::<Money>("12.5").is_err());
        assert!(serde_json::from_str::<Quantity>("\"0.333\"").is_err());
    }

    #[test]
    fn test_times_rounds_half_away_from_zero() {
        let unit = Money::from_cents(99);
        assert_eq!(unit.times(Quantity::from_hundredths(50)).cents(), 50);
        assert_eq!((-unit).times(Quantity::from_hundredths(50)).cents(), -50);

        let price = Money::from_cents(1250);
        assert_eq!(price.times(Quantity::from_hundredths(150)).cents(), 1875);
        assert_eq!(price.times(Quantity::from_units(2)).cents(), 2500);

        // 0.33 × 0.33 = 0.1089 → 0.11
        let third = Money::from_cents(33);
        assert_eq!(third.times(Quantity::from_hundredths(33)).cents(), 11);
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!((-b).cents(), -250);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 1500);

        let qty: Quantity = vec![Quantity::from_units(1), Quantity::from_hundredths(50)]
            .into_iter()
            .sum();
        assert_eq!(qty.hundredths(), 150);
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let near_max = Quantity::from_hundredths(i64::MAX - 10);
        assert_eq!(near_max.checked_add(near_max), None);
        assert_eq!(
            near_max.checked_add(Quantity::from_hundredths(10)),
            Some(Quantity::from_hundredths(i64::MAX))
        );
        assert_eq!(Quantity::from_hundredths(i64::MIN).checked_sub(Quantity::from_units(1)), None);

        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(5).checked_sub(Money::from_cents(7)),
            Some(Money::from_cents(-2))
        );
    }

    #[test]
    fn test_times_clamps_instead_of_wrapping() {
        let huge = Money::from_cents(i64::MAX / 2);
        assert_eq!(huge.times(Quantity::from_units(1_000)).cents(), i64::MAX);
        assert_eq!((-huge).times(Quantity::from_units(1_000)).cents(), i64::MIN);
    }

    proptest! {
        #[test]
        fn prop_display_parse_is_identity(cents in -1_000_000_000i64..1_000_000_000) {
            let money = Money::from_cents(cents);
            let parsed: Money = money.to_string().parse().unwrap();
            prop_assert_eq!(parsed, money);
        }

        #[test]
        fn prop_whole_units_multiply_exactly(cents in -1_000_000i64..1_000_000, units in 0i64..1_000) {
            let line = Money::from_cents(cents).times(Quantity::from_units(units));
            prop_assert_eq!(line.cents(), cents * units);
        }
    }
}
