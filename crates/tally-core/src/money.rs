//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Floats:          0.1 + 0.2 = 0.30000000000000004                       │
//! │  Integer cents:   10 + 20   = 30                                        │
//! │                                                                         │
//! │  Prices, totals, paid amounts, debts and payments are all cents.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let total = price * 2_i64 + Money::from_cents(500);
//! assert_eq!(total.cents(), 2698);
//! ```
//!
//! ## Overflow
//! The operators saturate at the `i64` bounds, which is good enough for
//! report aggregates. Anything that gets recorded (line totals, sale totals)
//! goes through [`Money::multiply_quantity`] and [`Money::checked_sum`],
//! which fail with [`CoreError::AmountOverflow`] instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Where Money is Used
/// ```text
/// Product.price ──► CartItem.unit_price ──► SaleLine.unit_price ──► Sale.total
///                                                                      │
/// Payment.amount ──► allocate_payment ──► Sale.amount_paid ◄───────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
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

    /// Largest representable amount.
    pub const MAX: Money = Money(i64::MAX);

    /// Price × quantity for a sale line.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let line_total = Money::from_cents(299).multiply_quantity(3).unwrap();
    /// assert_eq!(line_total.cents(), 897);
    /// assert!(Money::MAX.multiply_quantity(2).is_err());
    /// ```
    pub fn multiply_quantity(&self, qty: i64) -> CoreResult<Self> {
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| CoreError::AmountOverflow(format!("{} × {}", self, qty)))
    }

    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Exact sum of `amounts`.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let parts = [Money::from_cents(100), Money::from_cents(250)];
    /// assert_eq!(Money::checked_sum(parts).unwrap().cents(), 350);
    /// assert!(Money::checked_sum([Money::MAX, Money::from_cents(1)]).is_err());
    /// ```
    pub fn checked_sum<I>(amounts: I) -> CoreResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().try_fold(Money::zero(), |acc, m| {
            acc.checked_add(m)
                .ok_or_else(|| CoreError::AmountOverflow(format!("{} + {}", acc, m)))
        })
    }

    /// Subtraction that floors at zero. Used when an outstanding debt
    /// would otherwise go negative.
    #[inline]
    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented rendering. UI layers format with their own locale.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
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
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
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
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3_i64).cents(), 3000);
        assert_eq!(b.saturating_sub(a), Money::zero());
    }

    #[test]
    fn test_sum() {
        let prices = [Money::from_cents(100), Money::from_cents(250)];
        let total: Money = prices.iter().sum();
        assert_eq!(total.cents(), 350);
    }

    #[test]
    fn test_multiply_quantity_overflow() {
        assert_eq!(
            Money::from_cents(299).multiply_quantity(3).unwrap(),
            Money::from_cents(897)
        );
        assert!(matches!(
            Money::from_cents(i64::MAX / 2 + 1).multiply_quantity(2),
            Err(CoreError::AmountOverflow(_))
        ));
    }

    #[test]
    fn test_checked_sum_overflow() {
        let near_max = Money::from_cents(i64::MAX - 10);
        assert!(matches!(
            Money::checked_sum([near_max, Money::from_cents(11)]),
            Err(CoreError::AmountOverflow(_))
        ));
        assert_eq!(
            Money::checked_sum([near_max, Money::from_cents(10)]).unwrap(),
            Money::MAX
        );
    }

    #[test]
    fn test_operators_saturate() {
        assert_eq!(Money::MAX + Money::from_cents(1), Money::MAX);
        let total: Money = [Money::MAX, Money::MAX].iter().sum();
        assert_eq!(total, Money::MAX);
    }

    #[test]
    fn test_serializes_as_plain_cents() {
        let json = serde_json::to_string(&Money::from_cents(1250)).unwrap();
        assert_eq!(json, "1250");
        let back: Money = serde_json::from_str("1250").unwrap();
        assert_eq!(back, Money::from_cents(1250));
    }
}
