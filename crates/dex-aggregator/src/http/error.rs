/*
[INPUT]:  Error sources (HTTP, API replies, serialization, auth, WebSocket, config)
[OUTPUT]: Structured error types with retry hints
[POS]:    Error handling layer - unified error type for the entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the DEX aggregator SDK
#[derive(Error, Debug)]
pub enum DexError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API or real-time server returned an error reply
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Authentication failed
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Access token is missing or expired
    #[error("Access token expired, please provide a new one")]
    TokenExpired,

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport already holds a subscription for the channel
    #[error("Duplicate subscription for channel {channel}")]
    DuplicateSubscription { channel: String },

    /// Connection timeout
    #[error("Connection timeout after {duration}s")]
    Timeout { duration: u64 },
}

impl DexError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DexError::Http(_)
                | DexError::Timeout { .. }
                | DexError::WebSocket(_)
                | DexError::InvalidResponse(_)
        )
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            DexError::Authentication { .. } | DexError::TokenExpired
        )
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        DexError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DexError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        DexError::WebSocket(err.to_string())
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, DexError>;
