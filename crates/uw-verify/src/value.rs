//! Reading extracted values as numbers and comparable text.
//!
//! Extractors return figures as JSON numbers or as formatted strings
//! (`"$1,250.00"`, `"(3,400)"`, `"6.5%"`). Everything numeric is compared as
//! [`Decimal`] so no check depends on binary floating point.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

/// Parse a JSON value as a decimal figure.
///
/// Accepts numbers and strings with currency symbols, thousands separators,
/// a trailing `%`, or accounting-style parentheses for negatives.
#[must_use]
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(Decimal::from(i));
            }
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => parse_decimal_str(s),
        _ => None,
    }
}

fn parse_decimal_str(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.trim_start();
    }
    let s = s.strip_suffix('%').unwrap_or(s).trim();
    let s = s.strip_prefix('$').unwrap_or(s).trim();
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let parsed = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -parsed } else { parsed })
}

/// Case- and whitespace-insensitive form of a text value.
#[must_use]
pub fn normalize_text(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Render a figure without trailing zeros.
#[must_use]
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

/// JSON value for a figure, as a string so precision survives storage.
#[must_use]
pub fn decimal_value(value: Decimal) -> Value {
    Value::String(format_decimal(value))
}

/// Render any JSON leaf for an issue's expected/actual columns.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Absolute difference as a percentage of the larger magnitude.
///
/// Two zeros differ by 0%. `None` only on arithmetic overflow.
#[must_use]
pub fn pct_difference(a: Decimal, b: Decimal) -> Option<Decimal> {
    let diff = a.checked_sub(b)?.abs();
    let scale = a.abs().max(b.abs());
    if scale.is_zero() {
        return Some(Decimal::ZERO);
    }
    diff.checked_div(scale)?.checked_mul(Decimal::ONE_HUNDRED)
}
