//! Decimal money amounts in the marketplace currency.
//!
//! Amounts are kept at full precision; rounding to two decimals happens only
//! when a value is formatted for display.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ISO 4217 code of the marketplace currency.
pub const CURRENCY_CODE: &str = "ETB";

/// A money amount.
///
/// Deserializes from either a JSON number or a numeric string, since the
/// backend serializes database `NUMERIC` columns as strings.
///
/// ```
/// use souk_core::Money;
///
/// let price = Money::from_major(100);
/// assert_eq!((price * 3).to_string(), "ETB 300.00");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// A whole amount in the major unit (birr).
    #[must_use]
    pub fn from_major(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }

    /// An amount given in minor units (cents).
    #[must_use]
    pub fn from_minor(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The unrounded decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Display form rounded to two decimals, without the currency code.
    #[must_use]
    pub fn to_fixed(&self) -> String {
        format!("{:.2}", self.0.round_dp(2))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CURRENCY_CODE} {}", self.to_fixed())
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}
