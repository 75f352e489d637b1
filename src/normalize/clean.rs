//! Field cleaning shared by all normalizers: date parsing across the
//! formats marketplaces actually emit, money and quantity coercion, and
//! state canonicalization with config overrides.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::core::money::{coerce_rate, parse_decimal, round2};
use crate::core::{Config, states};

/// Date formats seen across marketplace exports.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse a report date field.
pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    // Datetime cells ("2025-08-01 00:00:00") keep only the date part.
    let date_part = trimmed.split_whitespace().next().unwrap_or("");
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Ok(date);
        }
    }
    Err(format!("unparseable date '{raw}'"))
}

/// Parse a quantity field (integer, tolerating "2.0" style cells).
pub fn parse_qty(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    match parse_decimal(trimmed) {
        Ok(d) if d.fract().is_zero() => d
            .to_i64()
            .ok_or_else(|| format!("quantity '{raw}' out of range")),
        _ => Err(format!("unparseable quantity '{raw}'")),
    }
}

/// Parse a money field and round to 2 places.
pub fn parse_money(raw: &str) -> Result<Decimal, String> {
    parse_decimal(raw)
        .map(round2)
        .map_err(|_| format!("unparseable amount '{raw}'"))
}

/// Parse a GST rate field; blank falls back to `default_rate`. Percent
/// integers ("18") are coerced to fractions (0.18).
pub fn parse_rate(raw: &str, default_rate: Decimal) -> Result<Decimal, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(default_rate);
    }
    let value = trimmed
        .strip_suffix('%')
        .unwrap_or(trimmed)
        .parse::<Decimal>()
        .map_err(|_| format!("unparseable GST rate '{raw}'"))?;
    Ok(coerce_rate(value))
}

/// Canonicalize a state field, consulting the configured two-digit-code
/// overrides before the built-in table.
pub fn clean_state(raw: &str, config: &Config) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        if let Some(name) = config.state_for_code(trimmed) {
            return name;
        }
    }
    states::canonical_state(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigBuilder;
    use rust_decimal_macros::dec;

    #[test]
    fn dates_across_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        assert_eq!(parse_date("2025-08-01").unwrap(), expected);
        assert_eq!(parse_date("01-08-2025").unwrap(), expected);
        assert_eq!(parse_date("01/08/2025").unwrap(), expected);
        assert_eq!(parse_date("2025-08-01 00:00:00").unwrap(), expected);
        assert!(parse_date("August 1").is_err());
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_qty("2").unwrap(), 2);
        assert_eq!(parse_qty(" 3 ").unwrap(), 3);
        assert_eq!(parse_qty("").unwrap(), 0);
        assert_eq!(parse_qty("2.0").unwrap(), 2);
        assert!(parse_qty("2.5").is_err());
        assert!(parse_qty("two").is_err());
    }

    #[test]
    fn rates_with_default() {
        assert_eq!(parse_rate("18", dec!(0.18)).unwrap(), dec!(0.18));
        assert_eq!(parse_rate("18%", dec!(0.18)).unwrap(), dec!(0.18));
        assert_eq!(parse_rate("0.05", dec!(0.18)).unwrap(), dec!(0.05));
        assert_eq!(parse_rate("", dec!(0.12)).unwrap(), dec!(0.12));
        assert!(parse_rate("abc", dec!(0.18)).is_err());
    }

    #[test]
    fn state_cleaning() {
        let config = ConfigBuilder::new("b").build();
        assert_eq!(clean_state("27", &config), "MAHARASHTRA");
        assert_eq!(clean_state(" haryana ", &config), "HARYANA");
        let custom = ConfigBuilder::new("b")
            .state_override("27", "BOMBAY REGION")
            .build();
        assert_eq!(clean_state("27", &custom), "BOMBAY REGION");
    }
}
