/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public DEX aggregator SDK surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod http;
pub mod stream;
pub mod types;
pub mod ws;

pub use aggregator::{DexAggregator, DexRequestContext};

// Re-export commonly used types from auth
pub use auth::{AccessTokenStore, StaticToken, TokenProvider};

pub use config::{DexAggregatorOptions, DexConfig, ReconnectConfig};

// Re-export commonly used types from http
pub use http::{ClientConfig, DexError, DexHttpClient, Result};

// Re-export commonly used types from stream
pub use stream::{
    ChannelKind, ChannelMultiplexer, Listener, StreamApi, SubscriptionGuard, SubscriptionHandle,
};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    CentrifugeTransport, ConnectionEvents, ConnectionState, DeltaMode, LoggingConnectionEvents,
    SubscriptionEvents, SubscriptionOptions, Transport, TransportConfig, TransportSubscription,
};
