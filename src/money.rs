//! Exact money amounts.
//!
//! Every stored or computed amount in the ledger is a [`Money`]: a signed count of
//! integer cents. Summing thousands of rows never accumulates rounding error, and
//! equality is exact unless a caller explicitly asks for the one-cent tolerance
//! through [`Money::approx_eq`].

use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Signed money amount represented as **integer cents**.
///
/// Formats with two fraction digits and no currency symbol:
///
/// ```rust
/// use card_ledger::Money;
///
/// let amount = Money::new(1_000_00);
/// assert_eq!(amount.to_string(), "1000.00");
/// assert_eq!("33,34".parse::<Money>().unwrap(), Money::new(33_34));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Largest difference still considered equal by [`Money::approx_eq`] (0.01).
    pub const TOLERANCE: Self = Self(1);

    /// Largest magnitude a single amount may have (999 999 999 999.99).
    ///
    /// Parsing rejects anything above it, and write paths check amounts built from raw
    /// cents against it, so folding the rows of a ledger stays far inside `i64`.
    pub const MAX: Self = Self(99_999_999_999_999);

    /// Creates an amount from integer cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is strictly negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Equality within [`Money::TOLERANCE`].
    #[must_use]
    pub const fn approx_eq(self, other: Self) -> bool {
        self.0.abs_diff(other.0) <= Self::TOLERANCE.0.unsigned_abs()
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Sums `amounts`, returning `None` if the total overflows.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |total, amount| total.checked_add(amount))
    }

    /// Returns the amount if its magnitude does not exceed [`Money::MAX`].
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidAmount`] for larger amounts.
    pub fn within_limit(self) -> Result<Self, ValidationError> {
        if self.0.unsigned_abs() > Self::MAX.0.unsigned_abs() {
            return Err(ValidationError::InvalidAmount {
                input: self.to_string(),
                reason: "amount too large",
            });
        }
        Ok(self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Money {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    /// Parses a decimal string into cents.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    /// Rejects more than two fraction digits and anything that is not a number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &'static str| ValidationError::InvalidAmount {
            input: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(stripped) => (true, stripped),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if rest.is_empty() {
            return Err(invalid("empty amount"));
        }

        let normalized = rest.replace(',', ".");
        let (units_str, frac_str) = match normalized.split_once('.') {
            Some((units, frac)) => (units, frac),
            None => (normalized.as_str(), ""),
        };

        if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a number"));
        }
        if !frac_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a number"));
        }

        let units: i64 = units_str.parse().map_err(|_| invalid("amount too large"))?;
        let frac: i64 = match frac_str.len() {
            0 => 0,
            1 => frac_str.parse::<i64>().map_err(|_| invalid("not a number"))? * 10,
            2 => frac_str.parse().map_err(|_| invalid("not a number"))?,
            _ => return Err(invalid("too many decimals")),
        };

        let cents = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .filter(|cents| *cents <= Self::MAX.0)
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}
