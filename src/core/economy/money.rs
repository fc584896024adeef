// Money & currency value objects.
//
// Amounts are decimals, never floats, and can never be negative once they are
// wrapped in an `Amount`. Anything that would produce a negative value is
// rejected here, before it can reach a provider's store.

use super::economy_error::EconomyError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// AMOUNT
// ============================================================================

/// A non-negative monetary quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Wrap a decimal, failing with `InvalidAmount` if it is negative.
    pub fn new(value: Decimal) -> Result<Self, EconomyError> {
        if value < Decimal::ZERO {
            return Err(EconomyError::InvalidAmount(value));
        }
        Ok(Self(value))
    }

    /// Wrap a decimal after coercing negative values up to zero.
    pub fn clamped(value: Decimal) -> Self {
        Self(clamp_non_negative(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount, EconomyError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(EconomyError::InvalidAmount(other.0))
    }

    /// Subtract, failing with `InvalidAmount` if the result would be negative.
    pub fn checked_sub(self, other: Amount) -> Result<Amount, EconomyError> {
        let result = self
            .0
            .checked_sub(other.0)
            .ok_or(EconomyError::InvalidAmount(other.0))?;
        Amount::new(result)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EconomyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Add two raw quantities. Either operand being negative is an `InvalidAmount`.
pub fn add(a: Decimal, b: Decimal) -> Result<Amount, EconomyError> {
    Amount::new(a)?.checked_add(Amount::new(b)?)
}

/// Subtract `b` from `a`. Negative operands or a negative result are an `InvalidAmount`.
pub fn subtract(a: Decimal, b: Decimal) -> Result<Amount, EconomyError> {
    Amount::new(a)?.checked_sub(Amount::new(b)?)
}

/// Coerce negative values (typically rounding noise) up to zero.
///
/// Every balance read is passed through this before it is used as a
/// withdraw/deposit argument.
pub fn clamp_non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

// ============================================================================
// CURRENCY
// ============================================================================

/// A currency as exposed by one provider.
///
/// Identifiers are unique within a provider and compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    identifier: String,
    symbol: String,
    display_name_singular: String,
    display_name_plural: String,
    decimal_digits: u32,
}

impl Currency {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            symbol: String::new(),
            display_name_singular: identifier.clone(),
            display_name_plural: identifier.clone(),
            decimal_digits: 2,
            identifier,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn with_display_names(
        mut self,
        singular: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        self.display_name_singular = singular.into();
        self.display_name_plural = plural.into();
        self
    }

    pub fn with_decimal_digits(mut self, digits: u32) -> Self {
        self.decimal_digits = digits;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn display_name_singular(&self) -> &str {
        &self.display_name_singular
    }

    pub fn display_name_plural(&self) -> &str {
        &self.display_name_plural
    }

    pub fn decimal_digits(&self) -> u32 {
        self.decimal_digits
    }

    /// Case-insensitive identifier comparison.
    pub fn matches(&self, identifier: &str) -> bool {
        self.identifier.eq_ignore_ascii_case(identifier)
    }

    /// Normalized identifier, used as a storage key.
    pub fn key(&self) -> String {
        self.identifier.to_ascii_lowercase()
    }

    /// Render an amount using this currency's symbol and precision.
    pub fn format(&self, amount: &Amount) -> String {
        let rounded = amount.value().round_dp(self.decimal_digits);
        format!("{}{:.*}", self.symbol, self.decimal_digits as usize, rounded)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier)
    }
}
