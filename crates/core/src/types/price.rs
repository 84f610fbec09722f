//! Price helpers using decimal arithmetic.
//!
//! Prices are stored as [`Decimal`] in whole currency units. Shops running on
//! this engine sell in a single currency, so there is no conversion logic;
//! [`CurrencyCode`] only names the currency for display and order payloads.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    UAH,
    USD,
    EUR,
}

impl CurrencyCode {
    /// The three-letter ISO code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UAH => "UAH",
            Self::USD => "USD",
            Self::EUR => "EUR",
        }
    }

    /// Parse a currency code, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UAH" => Some(Self::UAH),
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            _ => None,
        }
    }
}

impl core::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Round an amount to whole units, halves away from zero.
///
/// Saturates at the `i64` range.
#[must_use]
pub fn round_to_units(amount: Decimal) -> i64 {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Format an amount for display: no decimals, thousands grouped by spaces.
///
/// ```
/// use rust_decimal::Decimal;
/// use shopcart_core::{CurrencyCode, format_price};
///
/// assert_eq!(format_price(Decimal::from(12_000), CurrencyCode::UAH), "12 000 UAH");
/// ```
#[must_use]
pub fn format_price(amount: Decimal, currency: CurrencyCode) -> String {
    let units = round_to_units(amount);
    let digits = units.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if units < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    format!("{grouped} {}", currency.code())
}
