/*
[INPUT]:  Transport configuration and lifecycle calls
[OUTPUT]: Test results for the WebSocket transport
[POS]:    Integration tests - WebSocket
[UPDATE]: When the transport contract changes
*/

use std::sync::Arc;
use std::time::Duration;

use dex_aggregator::{
    CentrifugeTransport, ConnectionState, DexConfig, DexError, LoggingConnectionEvents,
    ReconnectConfig, StaticToken, SubscriptionEvents, SubscriptionOptions, Transport,
    TransportConfig,
};
use serde_json::Value;

struct NoopEvents;

impl SubscriptionEvents for NoopEvents {
    fn on_message(&self, _payload: &Value) {}
}

fn transport(url: &str) -> CentrifugeTransport {
    CentrifugeTransport::new(
        TransportConfig {
            url: url.to_string(),
            min_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(50),
            ..TransportConfig::default()
        },
        Arc::new(StaticToken::new("token")),
        Arc::new(LoggingConnectionEvents),
    )
}

#[test]
fn test_transport_config_from_sdk_config() {
    let mut config = DexConfig::new("key.us.secret");
    config.stream_url = Some("ws://localhost:8000/connection/websocket".to_string());
    config.reconnect = ReconnectConfig {
        min_delay_ms: 250,
        max_delay_ms: 4_000,
    };

    let transport = config.transport_config();
    assert_eq!(transport.url, "ws://localhost:8000/connection/websocket");
    assert_eq!(transport.min_reconnect_delay, Duration::from_millis(250));
    assert_eq!(transport.max_reconnect_delay, Duration::from_secs(4));
}

#[test]
fn test_initial_state_is_disconnected() {
    let transport = transport("ws://127.0.0.1:9/connection/websocket");
    assert_eq!(
        *transport.subscribe_connection_state().borrow(),
        ConnectionState::Disconnected { retry_count: 0 }
    );
}

#[test]
fn test_duplicate_subscription_rejected() {
    let transport = transport("ws://127.0.0.1:9/connection/websocket");
    let first = transport
        .new_subscription("dex-trades:sol_ABC", SubscriptionOptions::default(), Arc::new(NoopEvents))
        .expect("first subscription");

    let second = transport.new_subscription(
        "dex-trades:sol_ABC",
        SubscriptionOptions::default(),
        Arc::new(NoopEvents),
    );
    assert!(matches!(second, Err(DexError::DuplicateSubscription { .. })));

    transport.remove_subscription(&first);
    assert!(transport.get_subscription("dex-trades:sol_ABC").is_none());
}

#[test]
fn test_connect_without_runtime_is_noop() {
    let transport = transport("ws://127.0.0.1:9/connection/websocket");
    transport.connect();
    assert_eq!(
        *transport.subscribe_connection_state().borrow(),
        ConnectionState::Disconnected { retry_count: 0 }
    );
}

#[tokio::test]
async fn test_unreachable_server_keeps_retrying_until_disconnect() {
    let transport = transport("ws://127.0.0.1:9/connection/websocket");
    let mut state = transport.subscribe_connection_state();
    transport.connect();

    let retried = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if state.changed().await.is_err() {
                return false;
            }
            if let ConnectionState::Disconnected { retry_count } = *state.borrow()
                && retry_count >= 1
            {
                return true;
            }
        }
    })
    .await;
    assert_eq!(retried, Ok(true));

    transport.disconnect();
}
