/*
[INPUT]:  Payload schema definitions and serde requirements
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions for stream payloads
[UPDATE]: When payload schema changes or new types added
*/

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of on-chain activity reported for a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenActivityType {
    Sell,
    Buy,
    AddLiquidity,
    RemoveLiquidity,
}

impl FromStr for TokenActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sell" => Ok(Self::Sell),
            "buy" => Ok(Self::Buy),
            "add_liquidity" => Ok(Self::AddLiquidity),
            "remove_liquidity" => Ok(Self::RemoveLiquidity),
            other => Err(format!("unknown activity type: {other}")),
        }
    }
}

/// Candle resolutions accepted by the candle channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "15s")]
    FifteenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneSecond => "1s",
            Resolution::FifteenSeconds => "15s",
            Resolution::ThirtySeconds => "30s",
            Resolution::OneMinute => "1m",
            Resolution::FiveMinutes => "5m",
            Resolution::FifteenMinutes => "15m",
            Resolution::OneHour => "1h",
            Resolution::FourHours => "4h",
            Resolution::OneDay => "1d",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1s" => Ok(Self::OneSecond),
            "15s" => Ok(Self::FifteenSeconds),
            "30s" => Ok(Self::ThirtySeconds),
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            other => Err(format!("unknown resolution: {other}")),
        }
    }
}
