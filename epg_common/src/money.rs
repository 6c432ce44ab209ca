use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "USD";

//--------------------------------------       Money       ---------------------------------------------------------
/// A monetary amount in minor currency units (e.g. cents). Order totals and fees coming off the partner platform are
/// stored in this form so that they can be summed and compared without floating point drift.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Money {
    /// Converts a major-unit amount (e.g. 12.34) to minor units, rounding to the nearest cent.
    pub fn from_major(value: f64) -> Self {
        Self((value * 100.0).round() as i64)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let major = self.0 as f64 / 100.0;
        write!(f, "{major:0.2} {DEFAULT_CURRENCY_CODE}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_on_minor_units() {
        let a = Money::from(1050);
        let b = Money::from(450);
        assert_eq!(a + b, Money::from(1500));
        assert_eq!(a - b, Money::from(600));
        assert_eq!(-b, Money::from(-450));
        assert_eq!(a * 3, Money::from(3150));
    }

    #[test]
    fn major_unit_conversion_rounds() {
        assert_eq!(Money::from_major(12.34), Money::from(1234));
        assert_eq!(Money::from_major(0.005), Money::from(1));
    }

    #[test]
    fn display_formats_major_units() {
        assert_eq!(Money::from(1234).to_string(), "12.34 USD");
    }
}
