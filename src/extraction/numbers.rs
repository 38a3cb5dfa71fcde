//! Lenient numeric parsing for model output.
//!
//! The model is asked for plain JSON numbers but regularly returns strings
//! such as `"€ 1.234,50"`. Anything that cannot be read as a number becomes
//! `None` instead of failing the whole document.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `deserialize_with` helper for `Option<Decimal>` fields.
pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(decimal_from_value))
}

/// `deserialize_with` helper for `Option<String>` fields that may arrive as numbers.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Read a JSON value as a decimal.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Parse a human-formatted amount (`12.5`, `1.234,56`, `€ 99`, `-3,10`).
///
/// Scientific notation (`1e20`, `2.5E-3`) is read exactly or not at all.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if has_exponent(trimmed) {
        return Decimal::from_scientific(trimmed).ok();
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // 1.234,56
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        // 1,234.56
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        // 12,50
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// A digit followed by `e`/`E`, an optional sign and another digit.
fn has_exponent(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.iter().enumerate().skip(1).any(|(i, b)| {
        if !matches!(*b, b'e' | b'E') || !bytes[i - 1].is_ascii_digit() {
            return false;
        }
        let rest = &bytes[i + 1..];
        let rest = match rest.first() {
            Some(b'+' | b'-') => &rest[1..],
            _ => rest,
        };
        rest.first().is_some_and(u8::is_ascii_digit)
    })
}
