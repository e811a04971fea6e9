/*
[INPUT]:  Compact real-time payloads (single-letter field names)
[OUTPUT]: Named structs from `models`
[POS]:    Data layer - wire-to-model field remapping for stream adapters
[UPDATE]: When the server adds or renames compact fields
*/

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::enums::TokenActivityType;
use super::models::{Balance, Candle, TokenActivity};
use super::serde_helpers::{lenient_activity_type, lenient_decimal, lenient_i64, lenient_string};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CandleWire {
    #[serde(rename = "o", deserialize_with = "lenient_decimal")]
    open: Option<Decimal>,
    #[serde(rename = "c", deserialize_with = "lenient_decimal")]
    close: Option<Decimal>,
    #[serde(rename = "h", deserialize_with = "lenient_decimal")]
    high: Option<Decimal>,
    #[serde(rename = "l", deserialize_with = "lenient_decimal")]
    low: Option<Decimal>,
    #[serde(rename = "v", deserialize_with = "lenient_decimal")]
    volume: Option<Decimal>,
    #[serde(rename = "r", deserialize_with = "lenient_string")]
    resolution: Option<String>,
    #[serde(rename = "t", deserialize_with = "lenient_i64")]
    time: Option<i64>,
}

impl From<CandleWire> for Candle {
    fn from(wire: CandleWire) -> Self {
        Candle {
            open: wire.open,
            close: wire.close,
            high: wire.high,
            low: wire.low,
            volume: wire.volume,
            resolution: wire.resolution,
            time: wire.time,
        }
    }
}

// Maker (`m`) has no target field and is dropped.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenActivityWire {
    #[serde(rename = "a", deserialize_with = "lenient_string")]
    address: Option<String>,
    #[serde(rename = "p", deserialize_with = "lenient_decimal")]
    price_usd: Option<Decimal>,
    #[serde(rename = "n", deserialize_with = "lenient_decimal")]
    amount: Option<Decimal>,
    #[serde(rename = "k", deserialize_with = "lenient_activity_type")]
    activity_type: Option<TokenActivityType>,
    #[serde(rename = "h", deserialize_with = "lenient_string")]
    tx_hash: Option<String>,
    #[serde(rename = "t", deserialize_with = "lenient_i64")]
    timestamp: Option<i64>,
}

impl From<TokenActivityWire> for TokenActivity {
    fn from(wire: TokenActivityWire) -> Self {
        TokenActivity {
            address: wire.address,
            price_usd: wire.price_usd,
            amount: wire.amount,
            activity_type: wire.activity_type,
            tx_hash: wire.tx_hash,
            timestamp: wire.timestamp,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BalanceWire {
    #[serde(rename = "a", deserialize_with = "lenient_string")]
    wallet_address: Option<String>,
    #[serde(rename = "t", deserialize_with = "lenient_string")]
    token_address: Option<String>,
    #[serde(rename = "b", deserialize_with = "lenient_decimal")]
    amount: Option<Decimal>,
    #[serde(rename = "u", deserialize_with = "lenient_decimal")]
    value_usd: Option<Decimal>,
    #[serde(rename = "ts", deserialize_with = "lenient_i64")]
    timestamp: Option<i64>,
}

impl From<BalanceWire> for Balance {
    fn from(wire: BalanceWire) -> Self {
        Balance {
            wallet_address: wire.wallet_address,
            token_address: wire.token_address,
            amount: wire.amount,
            value_usd: wire.value_usd,
            timestamp: wire.timestamp,
        }
    }
}

/// Decode one object payload into `T`, falling back to an empty value.
///
/// Non-object payloads (null, numbers, arrays) yield `W::default()`.
pub fn reshape<W, T>(payload: &Value) -> T
where
    W: for<'de> Deserialize<'de> + Default,
    T: From<W>,
{
    let wire = match W::deserialize(payload) {
        Ok(wire) => wire,
        Err(err) => {
            debug!(error = %err, "stream payload did not match wire shape");
            W::default()
        }
    };
    T::from(wire)
}

/// Decode a list payload; a single object is treated as a one-element list.
pub fn reshape_list<W, T>(payload: &Value) -> Vec<T>
where
    W: for<'de> Deserialize<'de> + Default,
    T: From<W>,
{
    match payload {
        Value::Array(items) => items.iter().map(reshape::<W, T>).collect(),
        Value::Object(_) => vec![reshape::<W, T>(payload)],
        _ => Vec::new(),
    }
}
