/*
[INPUT]:  Stream URL, token provider and channel subscriptions
[OUTPUT]: Real-time publications delivered through transport events
[POS]:    WebSocket layer - pub/sub transport and its contract
[UPDATE]: When changing the transport contract or protocol handling
*/

pub mod client;
pub mod fossil;
pub mod protocol;
pub mod transport;

pub use client::{CentrifugeTransport, ConnectionState, TransportConfig};
pub use transport::{
    ConnectionEvents, DeltaMode, LoggingConnectionEvents, SubscriptionEvents, SubscriptionOptions,
    Transport, TransportSubscription,
};
