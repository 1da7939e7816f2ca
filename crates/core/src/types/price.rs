//! Euro price formatting and parsing.
//!
//! Prices are displayed the way the `nl-BE` locale renders euro amounts:
//! the currency symbol first, a `.` as thousands separator and a `,` before
//! the two decimals (`€ 1.234,50`). All arithmetic uses [`Decimal`] so that
//! cart totals never drift the way binary floats do.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Errors that can occur when parsing or converting a price.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input contains no digits.
    #[error("price cannot be empty")]
    Empty,
    /// The input is not a number once the formatting is stripped.
    #[error("invalid price: {0}")]
    Invalid(String),
    /// The amount does not fit in the smallest-unit integer representation.
    #[error("price out of range: {0}")]
    OutOfRange(Decimal),
}

/// Format an amount as a Belgian euro price.
///
/// ```
/// use okapi_core::format_euro_price;
/// use rust_decimal::Decimal;
///
/// assert_eq!(format_euro_price(Decimal::new(125, 1)), "€ 12,50");
/// assert_eq!(format_euro_price(Decimal::new(123_456, 2)), "€ 1.234,56");
/// ```
#[must_use]
pub fn format_euro_price(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let fixed = format!("{:.2}", rounded.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    format!("€ {sign}{grouped},{fraction}")
}

/// Parse a displayed price back into a decimal amount.
///
/// Accepts both the `nl-BE` display form produced by [`format_euro_price`]
/// (`€ 1.234,56`) and the plain decimal strings returned by the fulfillment
/// provider (`"12.50"`). When a comma is present it is taken as the decimal
/// separator and dots are treated as thousands separators.
///
/// # Errors
///
/// Returns `PriceError::Empty` when nothing numeric remains after stripping the
/// currency symbol and whitespace, and `PriceError::Invalid` when the remainder
/// is not a number.
pub fn standardize_price(input: &str) -> Result<Decimal, PriceError> {
    let stripped: String = input
        .chars()
        .filter(|c| *c != '€' && !c.is_whitespace())
        .collect();

    if stripped.is_empty() {
        return Err(PriceError::Empty);
    }

    let normalized = if stripped.contains(',') {
        stripped.replace('.', "").replace(',', ".")
    } else {
        stripped
    };

    normalized
        .parse::<Decimal>()
        .map(|d| d.normalize())
        .map_err(|_| PriceError::Invalid(input.to_string()))
}

/// Convert a euro amount to cents, rounding half away from zero.
///
/// # Errors
///
/// Returns `PriceError::OutOfRange` if the amount does not fit in an `i64`.
pub fn to_cents(amount: Decimal) -> Result<i64, PriceError> {
    let cents = (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    cents.to_i64().ok_or(PriceError::OutOfRange(amount))
}

/// Convert an amount in cents to euros.
#[must_use]
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_simple() {
        assert_eq!(format_euro_price(Decimal::new(125, 1)), "€ 12,50");
        assert_eq!(format_euro_price(Decimal::ZERO), "€ 0,00");
        assert_eq!(format_euro_price(Decimal::new(5, 0)), "€ 5,00");
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_euro_price(Decimal::new(100_000, 2)), "€ 1.000,00");
        assert_eq!(
            format_euro_price(Decimal::new(123_456_789, 2)),
            "€ 1.234.567,89"
        );
        assert_eq!(format_euro_price(Decimal::new(99_999, 2)), "€ 999,99");
    }

    #[test]
    fn test_format_rounds_half_away_from_zero() {
        assert_eq!(format_euro_price(Decimal::new(12_345, 3)), "€ 12,35");
        assert_eq!(format_euro_price(Decimal::new(-12_345, 3)), "€ -12,35");
    }

    #[test]
    fn test_standardize_display_form() {
        assert_eq!(standardize_price("€ 12,50").unwrap(), Decimal::new(125, 1));
        assert_eq!(
            standardize_price("€ 1.234,56").unwrap(),
            Decimal::new(123_456, 2)
        );
        assert_eq!(standardize_price("€\u{a0}3,00").unwrap(), Decimal::new(3, 0));
    }

    #[test]
    fn test_standardize_provider_form() {
        assert_eq!(standardize_price("12.50").unwrap(), Decimal::new(125, 1));
        assert_eq!(standardize_price("29").unwrap(), Decimal::new(29, 0));
    }

    #[test]
    fn test_standardize_rejects_garbage() {
        assert_eq!(standardize_price("€ "), Err(PriceError::Empty));
        assert!(matches!(
            standardize_price("twelve"),
            Err(PriceError::Invalid(_))
        ));
    }

    #[test]
    fn test_format_then_standardize_is_stable() {
        for cents in [0_i64, 1, 99, 1250, 100_000, 123_456_789] {
            let amount = from_cents(cents);
            let parsed = standardize_price(&format_euro_price(amount)).unwrap();
            assert_eq!(parsed, amount.normalize());
        }
    }

    #[test]
    fn test_cents_conversion() {
        assert_eq!(to_cents(Decimal::new(125, 1)).unwrap(), 1250);
        assert_eq!(to_cents(Decimal::new(19_995, 3)).unwrap(), 2000);
        assert_eq!(from_cents(1999), Decimal::new(1999, 2));
    }
}
