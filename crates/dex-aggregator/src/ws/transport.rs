/*
[INPUT]:  Channel names, subscription options, event handlers
[OUTPUT]: Transport contract consumed by the subscription multiplexer
[POS]:    WebSocket layer - seam between multiplexer and pub/sub connection
[UPDATE]: When the multiplexer needs new transport capabilities
*/

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::http::Result;

/// Payload compression negotiated per subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaMode {
    /// Every publication carries the full payload
    #[default]
    None,
    /// Publications after the first may be fossil deltas against the previous one
    Fossil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionOptions {
    pub delta: DeltaMode,
}

/// Per-subscription events raised by the transport
pub trait SubscriptionEvents: Send + Sync {
    fn on_subscribed(&self) {}
    fn on_unsubscribed(&self) {}
    fn on_message(&self, payload: &Value);
}

/// Connection-level events raised by the transport
pub trait ConnectionEvents: Send + Sync {
    fn on_connected(&self) {}
    fn on_disconnected(&self, _reason: &str) {}
    fn on_error(&self, _reason: &str) {}
}

/// Connection events that only log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingConnectionEvents;

impl ConnectionEvents for LoggingConnectionEvents {
    fn on_connected(&self) {
        info!("stream connected");
    }

    fn on_disconnected(&self, reason: &str) {
        warn!(reason, "stream disconnected");
    }

    fn on_error(&self, reason: &str) {
        error!(reason, "stream error");
    }
}

/// One channel subscription living on a transport
pub trait TransportSubscription: Send + Sync {
    fn channel(&self) -> &str;

    /// Ask the server for the channel; delivery starts once it confirms
    fn subscribe(&self);

    /// Stop delivery and tell the server to drop the channel
    fn unsubscribe(&self);
}

/// Shared pub/sub connection
pub trait Transport: Send + Sync {
    /// Start connecting; returns immediately
    fn connect(&self);

    /// Register a subscription for `channel`.
    ///
    /// Fails with `DexError::DuplicateSubscription` when one is already registered.
    fn new_subscription(
        &self,
        channel: &str,
        options: SubscriptionOptions,
        events: Arc<dyn SubscriptionEvents>,
    ) -> Result<Arc<dyn TransportSubscription>>;

    fn get_subscription(&self, channel: &str) -> Option<Arc<dyn TransportSubscription>>;

    /// Forget a subscription; a no-op if a newer one replaced it
    fn remove_subscription(&self, subscription: &Arc<dyn TransportSubscription>);
}
