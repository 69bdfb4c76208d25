//! Money types with precise decimal arithmetic
//!
//! This module provides a type-safe representation of monetary values using
//! rust_decimal. Amounts are carried at full precision through intermediate
//! calculations; rounding to the currency's two decimal places happens
//! exactly once, at the final invoice amount, using round-half-up.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use thiserror::Error;

use crate::volume::Volume;

/// Number of decimal places carried by billed amounts.
pub const CURRENCY_SCALE: u32 = 2;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount
///
/// Money uses rust_decimal for precise arithmetic without floating-point
/// errors. Intermediate values keep their full precision; only
/// [`Money::round_invoice`] applies the billing rounding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a new Money value at full precision
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self(dec!(0))
    }

    /// Returns the inner decimal amount
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Returns the smaller of two amounts
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Rounds to the invoice scale using round-half-up
    ///
    /// This is the only place the billing rounding rule is applied.
    /// Intermediate consumption and rate arithmetic never round.
    pub fn round_invoice(&self) -> Self {
        Self(self.0.round_dp_with_strategy(
            CURRENCY_SCALE,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        ))
    }

    /// Checked addition
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiplies by a scalar (e.g. a proportion), without rounding
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self(self.0 * factor)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TZS {:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A volumetric tariff: price per cubic metre
///
/// Tariffs are applied to consumption volumes to produce charge amounts.
/// The product is rounded once, at the invoice boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    /// Price per cubic metre, at full precision
    rate: Decimal,
}

impl Tariff {
    /// Creates a tariff from a per-cubic-metre rate
    pub fn per_cubic_metre(rate: Decimal) -> Result<Self, MoneyError> {
        if rate.is_sign_negative() {
            return Err(MoneyError::InvalidAmount(format!(
                "tariff rate must be non-negative, got {rate}"
            )));
        }
        Ok(Self { rate })
    }

    /// Returns the rate per cubic metre
    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Applies this tariff to a consumption volume
    ///
    /// Returns the invoice amount, rounded half-up to two decimal places.
    pub fn charge_for(&self, consumption: Volume) -> Money {
        Money::new(consumption.value() * self.rate).round_invoice()
    }
}

impl fmt::Display for Tariff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/m3", self.rate)
    }
}
