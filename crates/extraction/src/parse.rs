//! Normalisation of human-formatted price text into a [`Decimal`].
//!
//! Retail pages mix Brazilian (`1.234,56`) and US (`1,234.56`) conventions,
//! often with surrounding noise such as "De R$ 1.299,00 por R$ 999,00".

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::PriceParseError;

const CURRENCY_SYMBOLS: [&str; 5] = ["US$", "R$", "€", "£", "$"];

static CURRENCY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:R\$|US\$|€|£|\$)\s*(\d(?:[\d.,]*\d)?)").expect("currency token regex")
});

static BARE_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{3})*,\d{2}\b").expect("bare amount regex"));

/// Numeric parts of every currency-prefixed token in `text`, in order.
pub(crate) fn currency_tokens(text: &str) -> impl Iterator<Item = &str> {
    CURRENCY_TOKEN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Every `d.ddd,dd`-shaped amount in `text`, in order.
pub(crate) fn bare_amounts(text: &str) -> impl Iterator<Item = &str> {
    BARE_AMOUNT.find_iter(text).map(|m| m.as_str())
}

/// Parse a price out of free text.
///
/// The first currency-prefixed token wins when there is one. A comma is the
/// decimal separator only when it is the last separator and exactly two
/// digits follow it; otherwise commas are thousands separators.
pub fn parse_price(text: &str) -> Result<Decimal, PriceParseError> {
    let candidate = currency_tokens(text).next().unwrap_or(text);

    let mut cleaned: String = candidate.chars().filter(|c| !c.is_whitespace()).collect();
    for symbol in CURRENCY_SYMBOLS {
        cleaned = cleaned.replace(symbol, "");
    }

    let last_dot = cleaned.rfind('.');
    let normalized = match cleaned.rfind(',') {
        Some(comma)
            if last_dot.is_none_or(|dot| comma > dot)
                && digit_count(&cleaned[comma + 1..]) == 2 =>
        {
            let integer: String = cleaned[..comma]
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            format!("{integer}.{}", &cleaned[comma + 1..])
        }
        Some(_) => cleaned.replace(',', ""),
        None => cleaned,
    };

    let mut digits: String = normalized
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return Err(PriceParseError::new(text, "no digits"));
    }
    if digits.matches('.').count() > 1 {
        return Err(PriceParseError::new(text, "ambiguous separators"));
    }
    if digits.ends_with('.') {
        digits.pop();
    }
    if digits.starts_with('.') {
        digits.insert(0, '0');
    }

    Decimal::from_str(&digits).map_err(|_| PriceParseError::new(text, "out of range"))
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(|c| c.is_ascii_digit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn brazilian_format() {
        assert_eq!(parse_price("R$ 1.234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_price("1.234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_price("1234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_price("R$\u{a0}99,90").unwrap(), dec!(99.90));
        assert_eq!(parse_price("1.234.567,89").unwrap(), dec!(1234567.89));
    }

    #[test]
    fn us_format() {
        assert_eq!(parse_price("US$ 1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_price("$19.99").unwrap(), dec!(19.99));
    }

    #[test]
    fn comma_without_two_decimals_is_a_thousands_separator() {
        assert_eq!(parse_price("1,234").unwrap(), dec!(1234));
        assert_eq!(parse_price("12,5").unwrap(), dec!(125));
    }

    #[test]
    fn first_currency_token_wins() {
        assert_eq!(
            parse_price("De R$ 1.299,00 por R$ 999,00").unwrap(),
            dec!(1299.00)
        );
    }

    #[test]
    fn noise_around_the_number_is_dropped() {
        assert_eq!(parse_price("  149,90 à vista ").unwrap(), dec!(149.90));
        assert_eq!(parse_price("€ 10").unwrap(), dec!(10));
    }

    #[test]
    fn rejects_text_without_digits() {
        assert!(parse_price("Indisponível").is_err());
        assert!(parse_price("").is_err());
    }

    #[test]
    fn rejects_multiple_dots() {
        assert!(parse_price("1.234.567").is_err());
    }

    fn format_brl(cents: u64) -> String {
        let reais = (cents / 100).to_string();
        let mut grouped = String::new();
        for (i, ch) in reais.chars().enumerate() {
            if i > 0 && (reais.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        format!("R$ {grouped},{:02}", cents % 100)
    }

    fn format_usd(cents: u64) -> String {
        let dollars = (cents / 100).to_string();
        let mut grouped = String::new();
        for (i, ch) in dollars.chars().enumerate() {
            if i > 0 && (dollars.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("${grouped}.{:02}", cents % 100)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn brl_formatted_amounts_parse_exactly(cents in 1u64..10_000_000_000u64) {
            let parsed = parse_price(&format_brl(cents)).unwrap();
            prop_assert_eq!(parsed, Decimal::new(cents as i64, 2));
        }

        #[test]
        fn usd_formatted_amounts_parse_exactly(cents in 1u64..10_000_000_000u64) {
            let parsed = parse_price(&format_usd(cents)).unwrap();
            prop_assert_eq!(parsed, Decimal::new(cents as i64, 2));
        }

        #[test]
        fn never_panics_and_never_negative(text in ".{0,40}") {
            if let Ok(price) = parse_price(&text) {
                prop_assert!(price >= Decimal::ZERO);
            }
        }
    }
}
