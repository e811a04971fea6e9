/*
[INPUT]:  Access token, explicit overrides, optional YAML file
[OUTPUT]: Resolved REST/stream endpoints and client tuning
[POS]:    Configuration layer - SDK setup
[UPDATE]: When adding configuration options or regions
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::{ClientConfig, DexError, Result};
use crate::ws::TransportConfig;
use crate::ws::client::DEFAULT_STREAM_URL;

pub const DEFAULT_SERVER_URL: &str = "https://api.dex.openweb3.io";

/// Region tag (second dot-separated segment of the access token) to REST base URL
const REGIONS: &[(&str, &str)] = &[
    ("us", "https://api.dex.openweb3.io"),
    ("eu", "https://api.dex.openweb3.io"),
    ("in", "https://api.dex.openweb3.io"),
];

/// Region tag embedded in an access token, if any
pub fn token_region(access_token: &str) -> Option<&str> {
    access_token.split('.').nth(1)
}

/// REST base URL for the token's region
pub fn regional_server_url(access_token: &str) -> Option<&'static str> {
    let region = token_region(access_token)?;
    REGIONS
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, url)| *url)
}

/// Explicit endpoint overrides
#[derive(Debug, Clone, Default)]
pub struct DexAggregatorOptions {
    pub server_url: Option<String>,
    pub stream_url: Option<String>,
}

/// Reconnection backoff bounds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Top-level SDK configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DexConfig {
    pub access_token: String,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect timeout in seconds, shared by HTTP and the stream
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_min_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl DexConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            server_url: None,
            stream_url: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_options(mut self, options: DexAggregatorOptions) -> Self {
        if options.server_url.is_some() {
            self.server_url = options.server_url;
        }
        if options.stream_url.is_some() {
            self.stream_url = options.stream_url;
        }
        self
    }

    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| DexError::Config(format!("read {path}: {err}")))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|err| DexError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(DexError::Config("access_token must not be empty".to_string()));
        }
        if self.reconnect.min_delay_ms == 0 || self.reconnect.min_delay_ms > self.reconnect.max_delay_ms {
            return Err(DexError::Config(
                "reconnect.min_delay_ms must be positive and not exceed max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Explicit override, then token region, then the default
    pub fn resolved_server_url(&self) -> String {
        self.server_url
            .clone()
            .or_else(|| regional_server_url(&self.access_token).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    pub fn resolved_stream_url(&self) -> String {
        self.stream_url
            .clone()
            .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.resolved_stream_url(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            min_reconnect_delay: Duration::from_millis(self.reconnect.min_delay_ms),
            max_reconnect_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            ..TransportConfig::default()
        }
    }
}
