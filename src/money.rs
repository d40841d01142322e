//! Money Parsing Module
//!
//! Unified conversion between client-provided amounts and the ledger's
//! `rust_decimal::Decimal` representation. All transfer amounts MUST go
//! through [`parse_amount`] (or [`Amount::new`] for values read back from
//! storage).
//!
//! ## Rules
//! 1. Amounts are strictly positive and finite (`Decimal` has no NaN/Inf)
//! 2. No silent truncation: more fractional digits than `max_scale` is an error
//! 3. Ambiguous formats (`.5`, `5.`, `+5`, `1e3`) are rejected
//!
//! ## Usage
//! ```rust
//! use funds_transfer::money::parse_amount;
//!
//! let amount = parse_amount("300.50", 2).unwrap();
//! assert_eq!(amount.to_string(), "300.50");
//! assert!(parse_amount("0", 2).is_err());
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum scale `rust_decimal` can represent
pub const MAX_DECIMAL_SCALE: u32 = 28;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount is required")]
    Missing,

    #[error("Amount must be greater than zero")]
    NotPositive,

    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Amount
// ============================================================================

/// A strictly positive transfer amount.
///
/// Construction is the only place positivity is checked, so every `Amount`
/// flowing into the ledger can be debited or credited without re-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Wrap a decimal, rejecting zero and negative values
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value <= Decimal::ZERO {
            return Err(MoneyError::NotPositive);
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

// ============================================================================
// Parse: Client → Amount
// ============================================================================

/// Convert a client amount string into an [`Amount`]
///
/// # Errors
/// * `Missing` - blank input
/// * `InvalidFormat` - sign prefix, bare dot, exponent, or non-numeric text
/// * `PrecisionOverflow` - more than `max_scale` fractional digits
/// * `NotPositive` - zero
pub fn parse_amount(raw: &str, max_scale: u32) -> Result<Amount, MoneyError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(MoneyError::Missing);
    }

    if s.starts_with('-') {
        return Err(MoneyError::NotPositive);
    }
    if s.starts_with('+') {
        return Err(MoneyError::InvalidFormat("+ prefix not allowed".into()));
    }
    if s.starts_with('.') {
        return Err(MoneyError::InvalidFormat("use 0.5 not .5".into()));
    }
    if s.ends_with('.') {
        return Err(MoneyError::InvalidFormat("use 5.0 not 5.".into()));
    }
    if s.contains(['e', 'E']) {
        return Err(MoneyError::InvalidFormat(
            "scientific notation not allowed".into(),
        ));
    }

    let value = Decimal::from_str(s)
        .map_err(|e| MoneyError::InvalidFormat(format!("{}: {}", s, e)))?;

    let max = max_scale.min(MAX_DECIMAL_SCALE);
    if value.scale() > max {
        return Err(MoneyError::PrecisionOverflow {
            provided: value.scale(),
            max,
        });
    }

    Amount::new(value)
}

// ============================================================================
// RawAmount: API input
// ============================================================================

/// Amount exactly as the client sent it.
///
/// Accepts a JSON string (`"300.50"`) or a JSON number (`300.5`); numbers are
/// kept in their textual form so [`parse_amount`] applies the same format
/// and precision rules to both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawAmount(String);

impl RawAmount {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RawAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(RawAmount(s)),
            serde_json::Value::Number(n) => Ok(RawAmount(n.to_string())),
            serde_json::Value::Null => Ok(RawAmount(String::new())),
            other => Err(D::Error::custom(format!(
                "amount must be a string or number, got {}",
                other
            ))),
        }
    }
}
