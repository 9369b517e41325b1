//! Money type
//!
//! Integer minor-unit amounts bound to a currency. Arithmetic is checked and
//! never mixes currencies; there is no floating point anywhere in this module.
//! `rust_decimal` is only used to render an amount in major units.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Errors that can occur in money arithmetic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("Amount arithmetic overflow")]
    Overflow,

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),
}

/// ISO 4217 alpha-3 currency code.
///
/// Always three uppercase ASCII letters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");
    pub const GBP: Currency = Currency(*b"GBP");
    pub const JPY: Currency = Currency(*b"JPY");

    /// Parse a currency code, normalizing to uppercase.
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let bytes = code.trim().as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }

        let mut normalized = [0u8; 3];
        for (slot, byte) in normalized.iter_mut().zip(bytes) {
            *slot = byte.to_ascii_uppercase();
        }
        Ok(Self(normalized))
    }

    pub fn code(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Number of minor-unit digits (2 for cents)
    pub fn exponent(&self) -> u32 {
        match &self.0 {
            b"JPY" | b"KRW" | b"VND" | b"CLP" | b"ISK" => 0,
            b"BHD" | b"KWD" | b"JOD" | b"OMR" | b"TND" => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

/// An amount of money in minor units.
///
/// # Invariants
/// - Every binary operation requires both sides in the same currency
/// - Arithmetic is checked; overflow is an error, never a wrap
///
/// # Example
/// ```
/// use core_ledger::domain::{Currency, Money};
///
/// let a = Money::new(1_000, Currency::USD);
/// let b = Money::new(250, Currency::USD);
/// assert_eq!(a.try_sub(&b).unwrap().amount_minor(), 750);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: Currency,
}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_positive(&self) -> bool {
        self.amount_minor > 0
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    pub fn is_negative(&self) -> bool {
        self.amount_minor < 0
    }

    /// Fail unless `other` has the same currency
    pub fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency,
                found: other.currency,
            });
        }
        Ok(())
    }

    pub fn try_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let sum = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(sum, self.currency))
    }

    pub fn try_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let difference = self
            .amount_minor
            .checked_sub(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(difference, self.currency))
    }

    pub fn try_neg(&self) -> Result<Money, MoneyError> {
        let negated = self.amount_minor.checked_neg().ok_or(MoneyError::Overflow)?;
        Ok(Money::new(negated, self.currency))
    }

    /// Amount in major units, for presentation only.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount_minor, self.currency.exponent())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}

impl Add for Money {
    type Output = Result<Money, MoneyError>;

    fn add(self, rhs: Self) -> Self::Output {
        self.try_add(&rhs)
    }
}

impl Sub for Money {
    type Output = Result<Money, MoneyError>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.try_sub(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_normalized() {
        let currency = Currency::new("usd").unwrap();
        assert_eq!(currency, Currency::USD);
        assert_eq!(currency.code(), "USD");
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        for code in ["", "US", "USDX", "U$D", "123"] {
            assert!(
                matches!(Currency::new(code), Err(MoneyError::InvalidCurrency(_))),
                "expected rejection for {:?}",
                code
            );
        }
    }

    #[test]
    fn test_currency_exponent() {
        assert_eq!(Currency::USD.exponent(), 2);
        assert_eq!(Currency::JPY.exponent(), 0);
        assert_eq!(Currency::new("KWD").unwrap().exponent(), 3);
    }

    #[test]
    fn test_add_same_currency() {
        let sum = Money::new(150, Currency::USD)
            .try_add(&Money::new(50, Currency::USD))
            .unwrap();
        assert_eq!(sum, Money::new(200, Currency::USD));
    }

    #[test]
    fn test_add_currency_mismatch() {
        let result = Money::new(1, Currency::USD) + Money::new(1, Currency::EUR);
        assert_eq!(
            result,
            Err(MoneyError::CurrencyMismatch {
                expected: Currency::USD,
                found: Currency::EUR,
            })
        );
    }

    #[test]
    fn test_subtract_can_go_negative() {
        let result = (Money::new(100, Currency::USD) - Money::new(300, Currency::USD)).unwrap();
        assert_eq!(result.amount_minor(), -200);
        assert!(result.is_negative());
    }

    #[test]
    fn test_overflow_detected() {
        let max = Money::new(i64::MAX, Currency::USD);
        assert_eq!(max.try_add(&Money::new(1, Currency::USD)), Err(MoneyError::Overflow));

        let min = Money::new(i64::MIN, Currency::USD);
        assert_eq!(min.try_sub(&Money::new(1, Currency::USD)), Err(MoneyError::Overflow));
        assert_eq!(min.try_neg(), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_predicates() {
        assert!(Money::zero(Currency::EUR).is_zero());
        assert!(!Money::zero(Currency::EUR).is_positive());
        assert!(Money::new(1, Currency::EUR).is_positive());
    }

    #[test]
    fn test_to_decimal_and_display() {
        assert_eq!(Money::new(12_345, Currency::USD).to_decimal(), dec!(123.45));
        assert_eq!(Money::new(500, Currency::JPY).to_decimal(), dec!(500));
        assert_eq!(Money::new(-705, Currency::EUR).to_string(), "-7.05 EUR");
    }

    #[test]
    fn test_serde_shape() {
        let money = Money::new(700, Currency::USD);
        let json = serde_json::to_value(money).unwrap();
        assert_eq!(json, serde_json::json!({"amount_minor": 700, "currency": "USD"}));

        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, money);
        assert!(serde_json::from_str::<Currency>("\"dollars\"").is_err());
    }
}
