/*
[INPUT]:  Reshaped real-time payloads
[OUTPUT]: Named structs delivered to stream callbacks
[POS]:    Data layer - type definitions for stream adapters
[UPDATE]: When payload schema changes or new types added
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::TokenActivityType;
use super::serde_helpers::{lenient_decimal, lenient_i64, lenient_string};

/// One OHLCV candle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Option<Decimal>,
    pub close: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub resolution: Option<String>,
    pub time: Option<i64>,
}

/// Rolling token statistics.
///
/// The wire already uses these names, so the struct decodes the payload directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenStat {
    #[serde(deserialize_with = "lenient_string")]
    pub address: Option<String>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub price_1m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub price_5m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub price_1h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub price_6h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub price_24h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buys_1m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buys_5m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buys_1h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buys_6h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buys_24h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sells_1m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sells_5m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sells_1h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sells_6h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sells_24h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub volume_1m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub volume_5m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub volume_1h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub volume_6h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub volume_24h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buy_volume_1m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buy_volume_5m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buy_volume_1h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buy_volume_6h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub buy_volume_24h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sell_volume_1m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sell_volume_5m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sell_volume_1h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sell_volume_6h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub sell_volume_24h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub swaps_1m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub swaps_5m: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub swaps_1h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub swaps_6h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_decimal")]
    pub swaps_24h: Option<Decimal>,
    #[serde(deserialize_with = "lenient_i64")]
    pub hot_level: Option<i64>,
}

/// A swap or liquidity event on a token; trades use the same shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenActivity {
    pub address: Option<String>,
    pub price_usd: Option<Decimal>,
    pub amount: Option<Decimal>,
    #[serde(rename = "type")]
    pub activity_type: Option<TokenActivityType>,
    pub tx_hash: Option<String>,
    pub timestamp: Option<i64>,
}

/// Wallet balance of one token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub wallet_address: Option<String>,
    pub token_address: Option<String>,
    pub amount: Option<Decimal>,
    pub value_usd: Option<Decimal>,
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_token_stat_decodes_partial_payload() {
        let stat: TokenStat = serde_json::from_value(json!({
            "address": "ABC",
            "price": "1.25",
            "volume_24h": 1000,
            "hot_level": 3,
            "swaps_1m": {"unexpected": true},
        }))
        .expect("token stat");

        assert_eq!(stat.address.as_deref(), Some("ABC"));
        assert_eq!(stat.price, Some(Decimal::from_str("1.25").expect("decimal")));
        assert_eq!(stat.volume_24h, Some(Decimal::from(1000)));
        assert_eq!(stat.hot_level, Some(3));
        assert_eq!(stat.swaps_1m, None);
        assert_eq!(stat.price_1h, None);
    }

    #[test]
    fn test_token_activity_serializes_type_field() {
        let activity = TokenActivity {
            activity_type: Some(TokenActivityType::Buy),
            ..Default::default()
        };
        let value = serde_json::to_value(&activity).expect("serialize");
        assert_eq!(value["type"], "buy");
    }
}
