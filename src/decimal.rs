//! Decimal parsing for loosely-typed API payloads
//!
//! Gamma and Deribit send prices as JSON numbers, numeric strings or null.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Parse plain (`0.52`) or scientific (`5e-4`) notation
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Deserialize a number, numeric string or null into `Option<Decimal>`
///
/// Anything unparseable becomes `None` rather than failing the whole payload.
pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(Value::String(s)) => parse_decimal(&s),
        _ => None,
    })
}
