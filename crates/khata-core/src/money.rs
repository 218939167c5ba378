//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  A ledger summing such values drifts, and "is this invoice paid?"      │
//! │  turns into a fuzzy comparison.                                         │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (paise / cents)                      │
//! │    ₹100.00 = 10000                                                      │
//! │    Every allocation and reversal is exact integer arithmetic.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use khata_core::money::Money;
//!
//! let due = Money::from_cents(5000);
//! let payment = Money::from_cents(12000);
//! assert_eq!(due.min(payment), due);
//! assert_eq!((due - payment).non_negative(), Money::zero());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Sale.subtotal ──► GST ──► Sale.total ──► due = total − amount_paid    │
/// │                                                  │                      │
/// │  Payment.amount ──► allocation ──► Σ applied ────┘                      │
/// │                         │                                               │
/// │                         └──► unapplied (customer credit)                │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // ₹10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in minor units.
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
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
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

    /// Clamps negative values to zero.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(-20).non_negative(), Money::zero());
    /// assert_eq!(Money::from_cents(20).non_negative().cents(), 20);
    /// ```
    #[inline]
    pub fn non_negative(self) -> Self {
        self.max(Money::zero())
    }

    /// Calculates tax at the given rate, rounding half up.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    /// use khata_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_cents(10_000); // ₹100.00
    /// let gst = TaxRate::from_bps(1800);        // 18%
    /// assert_eq!(subtotal.calculate_tax(gst).cents(), 1800);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money::from_cents(basis_points_of(self.0, rate.bps()))
    }

    /// Multiplies money by a quantity, `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).checked_multiply_quantity(3).unwrap().cents(), 897);
    /// assert!(Money::from_cents(i64::MAX / 2).checked_multiply_quantity(3).is_none());
    /// ```
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Arguments
    /// * `discount` - Discount as a rate (1000 bps = 10%)
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::money::Money;
    /// use khata_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_cents(10000);
    /// let discounted = subtotal.apply_percentage_discount(TaxRate::from_bps(1000));
    /// assert_eq!(discounted.cents(), 9000);
    /// ```
    pub fn apply_percentage_discount(&self, discount: TaxRate) -> Money {
        let discount_amount = basis_points_of(self.0, discount.bps());
        Money::from_cents(self.0.saturating_sub(discount_amount))
    }
}

/// `cents × bps / 10000`, rounded half up, saturating at the `i64` bounds.
fn basis_points_of(cents: i64, bps: u32) -> i64 {
    let scaled = (i128::from(cents) * i128::from(bps) + 5000) / 10000;
    i64::try_from(scaled).unwrap_or(if scaled < 0 { i64::MIN } else { i64::MAX })
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display; the frontend does localized formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.major().abs(), self.minor())
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
