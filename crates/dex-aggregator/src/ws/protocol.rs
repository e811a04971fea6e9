/*
[INPUT]:  Raw WebSocket text frames / outbound commands
[OUTPUT]: Parsed replies and pushes, serialized commands
[POS]:    WebSocket layer - real-time JSON protocol messages
[UPDATE]: When adding commands or push types
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transport::DeltaMode;

/// Outbound command; exactly one request body is set
#[derive(Debug, Clone, Default, Serialize)]
pub struct Command {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<ConnectRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<SubscribeRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsubscribe: Option<UnsubscribeRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectRequest {
    pub token: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub channel: String,
    #[serde(skip_serializing_if = "is_no_delta")]
    pub delta: DeltaMode,
}

fn is_no_delta(delta: &DeltaMode) -> bool {
    *delta == DeltaMode::None
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeRequest {
    pub channel: String,
}

impl Command {
    pub fn connect(id: u32, token: String) -> Self {
        Self {
            id,
            connect: Some(ConnectRequest {
                token,
                name: "rust".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn subscribe(id: u32, channel: &str, delta: DeltaMode) -> Self {
        Self {
            id,
            subscribe: Some(SubscribeRequest {
                channel: channel.to_string(),
                delta,
            }),
            ..Default::default()
        }
    }

    pub fn unsubscribe(id: u32, channel: &str) -> Self {
        Self {
            id,
            unsubscribe: Some(UnsubscribeRequest {
                channel: channel.to_string(),
            }),
            ..Default::default()
        }
    }
}

/// Any inbound message: a reply (id > 0), a push, or an empty ping
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub id: u32,
    pub error: Option<ReplyError>,
    pub connect: Option<ConnectResult>,
    pub subscribe: Option<SubscribeResult>,
    pub push: Option<Push>,
}

impl Reply {
    pub fn is_ping(&self) -> bool {
        self.id == 0
            && self.error.is_none()
            && self.connect.is_none()
            && self.subscribe.is_none()
            && self.push.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyError {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub temporary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectResult {
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub version: String,
    /// Server ping interval in seconds; 0 disables ping tracking
    #[serde(default)]
    pub ping: u64,
    #[serde(default)]
    pub pong: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeResult {
    #[serde(default)]
    pub delta: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Push {
    #[serde(default)]
    pub channel: String,
    #[serde(rename = "pub")]
    pub publication: Option<Publication>,
    pub unsubscribe: Option<UnsubscribePush>,
    pub disconnect: Option<DisconnectPush>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Publication {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub delta: bool,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsubscribePush {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisconnectPush {
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub reason: String,
}

/// Split a text frame into its newline-delimited messages.
///
/// Lines that fail to parse are returned as errors so the caller can log them.
pub fn decode_frame(text: &str) -> Vec<Result<Reply, serde_json::Error>> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str::<Reply>)
        .collect()
}
