//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Splitting a shared platter three ways with floats:                     │
//! │    10.00 / 3 = 3.3333...  → each diner shown 3.33                       │
//! │    3.33 × 3 = 9.99        → the table is short by 0.01!                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units + explicit remainder                 │
//! │    1000 / 3 = 333 rem 1                                                 │
//! │    shares = [334, 333, 333]  → always sums back to 1000                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Money crosses every API boundary as a decimal string with exactly two
//! fraction digits (`"10.00"`, `"3.34"`), never as a JSON float.
//!
//! ## Usage
//! ```rust
//! use splitpay_core::money::Money;
//!
//! let platter = Money::from_minor(1000); // 10.00
//! let shares = platter.divide_equally(3);
//! assert_eq!(shares, vec![Money::from_minor(334), Money::from_minor(333), Money::from_minor(333)]);
//!
//! let parsed: Money = "12.50".parse().unwrap();
//! assert_eq!(parsed.to_string(), "12.50");
//! ```

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::Rate;

/// Minor units per major unit (pesewas per cedi, cents per dollar).
pub const MINOR_PER_MAJOR: i64 = 100;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (pesewas for GH₵).
///
/// ## Design Decisions
/// - **i64 (signed)**: subtraction stays total (outstanding balances can go
///   negative in reports); prices themselves are validated non-negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **String serialization**: `"10.00"`, see the module docs
///
/// ## Where Money Flows
/// ```text
/// LineItem.price ──► shares (divide_equally) ──► Obligation.subtotal
///                                                    │
///                         apply_rate(tax / service) ◄┘
///                                                    │
///                    Obligation.total ──► PaymentRecord.amount
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ```rust
    /// use splitpay_core::money::Money;
    ///
    /// let price = Money::from_minor(1099); // 10.99
    /// assert_eq!(price.minor(), 1099);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * MINOR_PER_MAJOR - minor)
        } else {
            Money(major * MINOR_PER_MAJOR + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the whole major units (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / MINOR_PER_MAJOR
    }

    /// Returns the fractional part in minor units (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % MINOR_PER_MAJOR).abs()
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

    /// Multiplies by a rate, rounding half-up to the nearest minor unit.
    ///
    /// ## Rounding
    /// Half-up means halves move away from zero: 0.825 → 0.83, and
    /// symmetrically -0.825 → -0.83. Integer math only:
    /// `(|amount| × bps + 5000) / 10000`, sign restored afterwards.
    ///
    /// ```rust
    /// use splitpay_core::money::Money;
    /// use splitpay_core::types::Rate;
    ///
    /// let subtotal = Money::from_minor(1650); // 16.50
    /// let tax = subtotal.apply_rate(Rate::from_bps(1000)); // 10%
    /// assert_eq!(tax.minor(), 165);
    ///
    /// let service = Money::from_minor(1650).apply_rate(Rate::from_bps(500)); // 5%
    /// assert_eq!(service.minor(), 83); // 0.825 → 0.83
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        // i128 so large subtotals times 10000 bps cannot overflow
        let magnitude = (self.0 as i128).abs() * rate.bps() as i128;
        let rounded = (magnitude + 5000) / 10000;
        let signed = if self.0 < 0 { -rounded } else { rounded };
        Money(signed as i64)
    }

    /// Splits the amount into `n` shares that always sum to `self`.
    ///
    /// ## Remainder Distribution
    /// ```text
    /// 10.00 ÷ 3  →  base 3.33, remainder 1 minor unit
    ///
    ///   share[0] = 3.33 + 0.01 = 3.34   ← first `remainder` shares get +1
    ///   share[1] = 3.33
    ///   share[2] = 3.33
    ///                    ─────
    ///                    10.00  ✓ exact
    /// ```
    /// Share order is the caller's order (for shared items: assignment
    /// order), so the same inputs always give the same shares.
    ///
    /// Returns an empty vector when `n` is zero.
    pub fn divide_equally(&self, n: usize) -> Vec<Money> {
        if n == 0 {
            return Vec::new();
        }

        let parts = n as i64;
        // Euclidean division keeps the remainder in 0..n even for negatives
        let base = self.0.div_euclid(parts);
        let remainder = self.0.rem_euclid(parts) as usize;

        (0..n)
            .map(|i| {
                if i < remainder {
                    Money(base + 1)
                } else {
                    Money(base)
                }
            })
            .collect()
    }

    /// Adds, returning `None` on i64 overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses a decimal string with at most two fraction digits.
///
/// Accepted: `"10"`, `"10.5"`, `"10.50"`, `"-3.20"`, `" 7.00 "`.
/// Rejected: `"10.505"` (sub-minor precision), `"1e3"`, `""`, `"abc"`.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Required {
                field: "amount".to_string(),
            });
        }

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (major_str, minor_str) = match unsigned.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (unsigned, ""),
        };

        if major_str.is_empty() || !major_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number like 12.50"));
        }
        if !minor_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number like 12.50"));
        }
        if minor_str.len() > 2 {
            return Err(invalid("at most two fraction digits are allowed"));
        }

        let major: i64 = major_str
            .parse()
            .map_err(|_| invalid("amount is too large"))?;
        let minor: i64 = match minor_str.len() {
            0 => 0,
            1 => minor_str.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => minor_str.parse::<i64>().map_err(|_| invalid("bad fraction"))?,
        };

        let magnitude = major
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(minor))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -magnitude } else { magnitude }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Renders the canonical two-digit decimal form, e.g. `10.99`, `-5.50`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

/// Accepts decimal strings, and whole numbers as major units.
/// JSON floats are refused so that `10.1` can never arrive as 10.0999...
struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string with at most two fraction digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        v.checked_mul(MINOR_PER_MAJOR)
            .map(Money)
            .ok_or_else(|| E::custom("amount is too large"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(MINOR_PER_MAJOR))
            .map(Money)
            .ok_or_else(|| E::custom("amount is too large"))
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<Money, E> {
        Err(E::custom(
            "floating-point amounts are not accepted, send a decimal string",
        ))
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
    fn test_from_minor() {
        let money = Money::from_minor(1099);
        assert_eq!(money.minor(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).minor(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).minor(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1099).to_string(), "10.99");
        assert_eq!(Money::from_minor(500).to_string(), "5.00");
        assert_eq!(Money::from_minor(-550).to_string(), "-5.50");
        assert_eq!(Money::from_minor(0).to_string(), "0.00");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
    }

    #[test]
    fn test_parse() {
        assert_eq!("10".parse::<Money>().unwrap().minor(), 1000);
        assert_eq!("10.5".parse::<Money>().unwrap().minor(), 1050);
        assert_eq!("10.05".parse::<Money>().unwrap().minor(), 1005);
        assert_eq!("-3.20".parse::<Money>().unwrap().minor(), -320);
        assert_eq!(" 7.00 ".parse::<Money>().unwrap().minor(), 700);

        assert!("10.505".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("1e3".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
        assert!("99999999999999999999".parse::<Money>().is_err());
    }

    #[test]
    fn test_serde_uses_two_digit_strings() {
        let json = serde_json::to_string(&Money::from_minor(334)).unwrap();
        assert_eq!(json, "\"3.34\"");

        let back: Money = serde_json::from_str("\"3.34\"").unwrap();
        assert_eq!(back.minor(), 334);

        let whole: Money = serde_json::from_str("12").unwrap();
        assert_eq!(whole.minor(), 1200);

        assert!(serde_json::from_str::<Money>("10.1").is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!((a * 3).minor(), 3000);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.minor(), 2000);
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        // 10% of 10.00 = 1.00
        assert_eq!(Money::from_minor(1000).apply_rate(Rate::from_bps(1000)).minor(), 100);
        // 5% of 16.50 = 0.825 → 0.83
        assert_eq!(Money::from_minor(1650).apply_rate(Rate::from_bps(500)).minor(), 83);
        // 5% of 16.30 = 0.815 → 0.82
        assert_eq!(Money::from_minor(1630).apply_rate(Rate::from_bps(500)).minor(), 82);
        // 5% of 16.20 = 0.81 exactly
        assert_eq!(Money::from_minor(1620).apply_rate(Rate::from_bps(500)).minor(), 81);
        // halves move away from zero for negatives too
        assert_eq!(Money::from_minor(-1650).apply_rate(Rate::from_bps(500)).minor(), -83);
        assert!(Money::from_minor(1650).apply_rate(Rate::zero()).is_zero());
    }

    #[test]
    fn test_divide_equally_ten_by_three() {
        let shares = Money::from_minor(1000).divide_equally(3);
        assert_eq!(
            shares,
            vec![
                Money::from_minor(334),
                Money::from_minor(333),
                Money::from_minor(333)
            ]
        );
        assert_eq!(shares.iter().sum::<Money>().minor(), 1000);
    }

    #[test]
    fn test_divide_equally_edge_cases() {
        assert!(Money::from_minor(1000).divide_equally(0).is_empty());
        assert_eq!(Money::from_minor(1000).divide_equally(1), vec![Money::from_minor(1000)]);
        assert_eq!(
            Money::from_minor(1).divide_equally(3),
            vec![Money::from_minor(1), Money::zero(), Money::zero()]
        );
        let negative = Money::from_minor(-1000).divide_equally(3);
        assert_eq!(negative.iter().sum::<Money>().minor(), -1000);
    }

    proptest! {
        #[test]
        fn prop_shares_always_sum_to_amount(minor in 0i64..10_000_000, n in 1usize..40) {
            let amount = Money::from_minor(minor);
            let shares = amount.divide_equally(n);
            prop_assert_eq!(shares.len(), n);
            prop_assert_eq!(shares.iter().sum::<Money>(), amount);

            // no share differs from another by more than one minor unit
            let max = shares.iter().max().unwrap().minor();
            let min = shares.iter().min().unwrap().minor();
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn prop_display_parse_is_identity(minor in -10_000_000i64..10_000_000) {
            let money = Money::from_minor(minor);
            prop_assert_eq!(money.to_string().parse::<Money>().unwrap(), money);
        }
    }
}
