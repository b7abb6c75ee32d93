use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

pub const DEFAULT_CURRENCY_CODE: &str = "BRL";

//--------------------------------------      Money       ------------------------------------------------------------
/// A monetary amount in integer cents. Orders and metrics store prices with two decimal places, so
/// cents are exact and safe to sum.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
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
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(pub String);

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Converts a decimal major-unit amount (e.g. `42.9` meaning R$ 42,90) into cents, rounding to
    /// the nearest cent. Upstream payloads carry prices as JSON numbers in major units.
    pub fn from_major_units(amount: f64) -> Result<Self, MoneyConversionError> {
        let cents = (amount * 100.0).round();
        if !cents.is_finite() || cents.abs() >= i64::MAX as f64 {
            return Err(MoneyConversionError(format!("{amount} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(cents as i64))
    }

    /// Formats the amount the way the notification templates expect: comma decimal separator and
    /// dot thousands separator, e.g. `1.234,50`.
    pub fn format_brl(&self) -> String {
        let negative = self.0 < 0;
        let cents = self.0.unsigned_abs();
        let whole = cents / 100;
        let frac = cents % 100;
        let mut digits = whole.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        while digits.len() > 3 {
            let rest = digits.split_off(digits.len() - 3);
            if grouped.is_empty() {
                grouped = rest;
            } else {
                grouped = format!("{rest}.{grouped}");
            }
        }
        if grouped.is_empty() {
            grouped = digits;
        } else {
            grouped = format!("{digits}.{grouped}");
        }
        let sign = if negative { "-" } else { "" };
        format!("{sign}{grouped},{frac:02}")
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R$ {}", self.format_brl())
    }
}
