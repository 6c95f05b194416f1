//! Monetary amounts using decimal arithmetic.
//!
//! All amounts are stored as `NUMERIC(12,2)` and carried as [`Decimal`] in
//! the standard unit of the store currency (e.g. dollars, not cents).

use core::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Round an amount to two decimal places, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// An amount with currency information, used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount, rounded to two decimal places.
    #[must_use]
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self {
            amount: round_money(amount),
            currency,
        }
    }

    /// Format for display (e.g. "$19.99").
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}{:.2}", self.currency.symbol(), self.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    TRY,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::TRY => "₺",
        }
    }

    /// Three-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::TRY => "TRY",
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            "TRY" => Ok(Self::TRY),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(10_005, 3)), Decimal::new(1001, 2));
        assert_eq!(round_money(Decimal::new(10_004, 3)), Decimal::new(1000, 2));
    }

    #[test]
    fn test_display() {
        let price = Money::new(Decimal::new(1999, 2), CurrencyCode::USD);
        assert_eq!(price.display(), "$19.99");

        let whole = Money::new(Decimal::from(5), CurrencyCode::EUR);
        assert_eq!(whole.to_string(), "€5.00");
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("try".parse::<CurrencyCode>().unwrap(), CurrencyCode::TRY);
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }
}
