/*
[INPUT]:  Loosely typed JSON fields from real-time payloads
[OUTPUT]: Optional typed values; never a deserialization error
[POS]:    Data layer - tolerant field decoding for stream adapters
[UPDATE]: When adding field types to stream payloads
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

use super::enums::TokenActivityType;

pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            Decimal::from_str(raw)
                .or_else(|_| Decimal::from_scientific(raw))
                .ok()
        }
        Value::Number(number) => {
            let raw = number.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .ok()
        }
        _ => None,
    }
}

pub fn i64_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

pub fn string_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decimal_from_value(&value))
}

pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(i64_from_value(&value))
}

pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(string_from_value(&value))
}

pub fn lenient_activity_type<'de, D>(
    deserializer: D,
) -> Result<Option<TokenActivityType>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(|raw| raw.parse().ok()))
}
