/*
[INPUT]:  Stream URL, token provider, subscription requests from the multiplexer
[OUTPUT]: Publications and connection events delivered through transport traits
[POS]:    WebSocket layer - real-time connection, reconnection and delta decoding
[UPDATE]: When changing protocol handling, reconnection backoff, or shutdown semantics
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::TokenProvider;
use crate::http::{DexError, Result};

use super::fossil;
use super::protocol::{Command, ConnectResult, Publication, Reply, ReplyError, decode_frame};
use super::transport::{
    ConnectionEvents, DeltaMode, SubscriptionEvents, SubscriptionOptions, Transport,
    TransportSubscription,
};

pub const DEFAULT_STREAM_URL: &str = "wss://realtime.dex.openweb3.io/connection/websocket";

const ERROR_UNAUTHORIZED: i32 = 101;
const ERROR_TOKEN_EXPIRED: i32 = 109;

/// Transport tuning
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub min_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    /// Grace period on top of the server ping interval before the link is considered dead
    pub max_ping_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            min_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            max_ping_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected { retry_count: u32 },
}

#[derive(Debug)]
enum WorkerCommand {
    Subscribe { channel: String, sub_id: u64 },
    Unsubscribe { channel: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

#[derive(Debug)]
struct SubscriptionState {
    phase: Phase,
    delta_negotiated: bool,
    prev_data: Option<Vec<u8>>,
}

struct WsSubscription {
    id: u64,
    channel: String,
    options: SubscriptionOptions,
    events: Arc<dyn SubscriptionEvents>,
    state: Mutex<SubscriptionState>,
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl WsSubscription {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> Phase {
        self.lock_state().phase
    }

    fn request_subscribe(&self) {
        let _ = self.command_tx.send(WorkerCommand::Subscribe {
            channel: self.channel.clone(),
            sub_id: self.id,
        });
    }

    /// Move back to `Subscribing` after a reconnect or a recoverable server unsubscribe.
    fn mark_resubscribing(&self) -> bool {
        let mut state = self.lock_state();
        if state.phase == Phase::Unsubscribed {
            return false;
        }
        state.phase = Phase::Subscribing;
        state.delta_negotiated = false;
        state.prev_data = None;
        true
    }

    fn confirm(&self, delta_negotiated: bool) {
        {
            let mut state = self.lock_state();
            if state.phase != Phase::Subscribing {
                return;
            }
            state.phase = Phase::Subscribed;
            state.delta_negotiated = delta_negotiated;
            state.prev_data = None;
        }
        self.events.on_subscribed();
    }

    fn close(&self) -> bool {
        let mut state = self.lock_state();
        if state.phase == Phase::Unsubscribed {
            return false;
        }
        state.phase = Phase::Unsubscribed;
        state.delta_negotiated = false;
        state.prev_data = None;
        true
    }

    fn handle_publication(&self, publication: Publication) {
        let payload = {
            let mut state = self.lock_state();
            if state.phase != Phase::Subscribed {
                return;
            }
            if !state.delta_negotiated {
                publication.data
            } else {
                match decode_delta_payload(&mut state, &publication) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(channel = %self.channel, error = %err, "dropping undecodable publication");
                        return;
                    }
                }
            }
        };

        self.events.on_message(&payload);
    }
}

fn decode_delta_payload(state: &mut SubscriptionState, publication: &Publication) -> Result<Value> {
    let Value::String(raw) = &publication.data else {
        return Err(DexError::InvalidResponse(
            "delta publication data must be a string".to_string(),
        ));
    };

    let bytes = if publication.delta {
        let prev = state.prev_data.as_deref().ok_or_else(|| {
            DexError::InvalidResponse("delta received before a full publication".to_string())
        })?;
        fossil::apply_delta(prev, raw.as_bytes())
            .map_err(|err| DexError::InvalidResponse(format!("fossil delta: {err}")))?
    } else {
        raw.as_bytes().to_vec()
    };

    let value = serde_json::from_slice(&bytes)?;
    state.prev_data = Some(bytes);
    Ok(value)
}

impl TransportSubscription for WsSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn subscribe(&self) {
        {
            let mut state = self.lock_state();
            if state.phase != Phase::Unsubscribed {
                return;
            }
            state.phase = Phase::Subscribing;
        }
        self.request_subscribe();
    }

    fn unsubscribe(&self) {
        if !self.close() {
            return;
        }
        let _ = self.command_tx.send(WorkerCommand::Unsubscribe {
            channel: self.channel.clone(),
        });
        self.events.on_unsubscribed();
    }
}

struct TransportInner {
    config: TransportConfig,
    token_provider: Arc<dyn TokenProvider>,
    events: Arc<dyn ConnectionEvents>,
    subscriptions: Mutex<HashMap<String, Arc<WsSubscription>>>,
    next_sub_id: AtomicU64,
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerCommand>>>,
    connection_state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl TransportInner {
    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<WsSubscription>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self, channel: &str, sub_id: Option<u64>) -> Option<Arc<WsSubscription>> {
        let subs = self.lock_subscriptions();
        subs.get(channel)
            .filter(|sub| sub_id.is_none_or(|id| sub.id == id))
            .cloned()
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.connection_state.send(state);
    }
}

/// WebSocket transport speaking the real-time service's JSON protocol.
///
/// A single worker task owns the socket; subscription calls only enqueue
/// commands and never wait on the network.
pub struct CentrifugeTransport {
    inner: Arc<TransportInner>,
}

impl std::fmt::Debug for CentrifugeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentrifugeTransport")
            .field("url", &self.inner.config.url)
            .field("state", &*self.inner.connection_state.borrow())
            .finish()
    }
}

impl CentrifugeTransport {
    pub fn new(
        config: TransportConfig,
        token_provider: Arc<dyn TokenProvider>,
        events: Arc<dyn ConnectionEvents>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (connection_state, _rx) =
            watch::channel(ConnectionState::Disconnected { retry_count: 0 });

        Self {
            inner: Arc::new(TransportInner {
                config,
                token_provider,
                events,
                subscriptions: Mutex::new(HashMap::new()),
                next_sub_id: AtomicU64::new(1),
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                connection_state,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Stop the worker and close the socket.
    pub fn disconnect(&self) {
        self.inner.shutdown.cancel();
    }
}

impl Drop for CentrifugeTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Transport for CentrifugeTransport {
    fn connect(&self) {
        let Some(command_rx) = self
            .inner
            .command_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("stream transport connect called without Tokio runtime; worker not started");
            *self
                .inner
                .command_rx
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(command_rx);
            return;
        }

        let worker = Worker {
            inner: self.inner.clone(),
            command_rx,
            pending: HashMap::new(),
            next_request_id: 0,
            pong: false,
        };
        tokio::spawn(worker.run());
    }

    fn new_subscription(
        &self,
        channel: &str,
        options: SubscriptionOptions,
        events: Arc<dyn SubscriptionEvents>,
    ) -> Result<Arc<dyn TransportSubscription>> {
        let mut subs = self.inner.lock_subscriptions();
        if subs.contains_key(channel) {
            return Err(DexError::DuplicateSubscription {
                channel: channel.to_string(),
            });
        }

        let sub = Arc::new(WsSubscription {
            id: self.inner.next_sub_id.fetch_add(1, Ordering::Relaxed),
            channel: channel.to_string(),
            options,
            events,
            state: Mutex::new(SubscriptionState {
                phase: Phase::Unsubscribed,
                delta_negotiated: false,
                prev_data: None,
            }),
            command_tx: self.inner.command_tx.clone(),
        });
        subs.insert(channel.to_string(), sub.clone());
        Ok(sub as Arc<dyn TransportSubscription>)
    }

    fn get_subscription(&self, channel: &str) -> Option<Arc<dyn TransportSubscription>> {
        self.inner
            .current(channel, None)
            .map(|sub| sub as Arc<dyn TransportSubscription>)
    }

    fn remove_subscription(&self, subscription: &Arc<dyn TransportSubscription>) {
        let removed = {
            let mut subs = self.inner.lock_subscriptions();
            let same = subs.get(subscription.channel()).is_some_and(|existing| {
                Arc::as_ptr(existing).cast::<()>() == Arc::as_ptr(subscription).cast::<()>()
            });
            if same {
                subs.remove(subscription.channel())
            } else {
                None
            }
        };

        if let Some(sub) = removed {
            sub.unsubscribe();
        }
    }
}

#[derive(Debug)]
enum PendingRequest {
    Subscribe { channel: String, sub_id: u64 },
    Unsubscribe { channel: String },
}

#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Closed { reason: String, reconnect: bool },
}

enum ReplyAction {
    None,
    Pong,
    Disconnect { reason: String, reconnect: bool },
}

struct Worker {
    inner: Arc<TransportInner>,
    command_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    pending: HashMap<u32, PendingRequest>,
    next_request_id: u32,
    pong: bool,
}

impl Worker {
    async fn run(mut self) {
        let mut retry_count: u32 = 0;

        loop {
            if self.inner.shutdown.is_cancelled() {
                break;
            }

            self.inner.set_state(ConnectionState::Connecting);
            let (was_connected, outcome) = self.session().await;
            if was_connected {
                retry_count = 0;
            }
            self.pending.clear();

            let reason = match outcome {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed { reason, reconnect }) => {
                    if !reconnect {
                        self.inner.set_state(ConnectionState::Disconnected { retry_count });
                        self.inner.events.on_disconnected(&reason);
                        info!(reason = %reason, "stream closed permanently");
                        return;
                    }
                    reason
                }
                Err(err) => {
                    let reason = err.to_string();
                    self.inner.events.on_error(&reason);
                    reason
                }
            };

            self.inner.set_state(ConnectionState::Disconnected { retry_count });
            if was_connected {
                self.inner.events.on_disconnected(&reason);
            }

            let delay = backoff_delay(
                retry_count,
                self.inner.config.min_reconnect_delay,
                self.inner.config.max_reconnect_delay,
            );
            debug!(retry_count, delay_ms = delay.as_millis() as u64, "stream reconnect scheduled");
            retry_count = retry_count.saturating_add(1);

            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.inner.set_state(ConnectionState::Disconnected { retry_count });
        info!("stream worker stopped");
    }

    fn next_id(&mut self) -> u32 {
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        self.next_request_id
    }

    async fn session(&mut self) -> (bool, Result<SessionEnd>) {
        let config = self.inner.config.clone();
        let shutdown = self.inner.shutdown.clone();

        let token = match self.inner.token_provider.get_token().await {
            Ok(token) => token,
            Err(err) => return (false, Err(err)),
        };

        let connected = tokio::select! {
            _ = shutdown.cancelled() => return (false, Ok(SessionEnd::Shutdown)),
            result = tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str())) => result,
        };
        let (ws_stream, _response) = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return (false, Err(err.into())),
            Err(_) => {
                return (
                    false,
                    Err(DexError::Timeout {
                        duration: config.connect_timeout.as_secs(),
                    }),
                );
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let connect_id = self.next_id();
        if let Err(err) = write.send(encode(&Command::connect(connect_id, token))).await {
            return (false, Err(err.into()));
        }

        let handshake = tokio::time::timeout(config.connect_timeout, async {
            while let Some(frame) = read.next().await {
                let Some(text) = frame_text(frame?) else {
                    continue;
                };
                for reply in decode_frame(&text).into_iter().flatten() {
                    if reply.id != connect_id {
                        continue;
                    }
                    if let Some(error) = reply.error {
                        return Err(connect_error(error));
                    }
                    return Ok(reply.connect.unwrap_or_default());
                }
            }
            Err(DexError::WebSocket("closed during handshake".to_string()))
        })
        .await;

        let connect_result: ConnectResult = match handshake {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => return (false, Err(err)),
            Err(_) => {
                return (
                    false,
                    Err(DexError::Timeout {
                        duration: config.connect_timeout.as_secs(),
                    }),
                );
            }
        };

        self.pong = connect_result.pong;
        self.inner.set_state(ConnectionState::Connected);
        info!(client = %connect_result.client, version = %connect_result.version, "stream session established");
        self.inner.events.on_connected();

        // Queued commands predate this session; subscription state is authoritative.
        while self.command_rx.try_recv().is_ok() {}
        self.resubscribe_all();

        let ping_window = (connect_result.ping > 0)
            .then(|| Duration::from_secs(connect_result.ping) + config.max_ping_delay);
        let ping_sleep = tokio::time::sleep(ping_window.unwrap_or(Duration::from_secs(3600)));
        tokio::pin!(ping_sleep);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return (true, Ok(SessionEnd::Shutdown));
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        return (true, Ok(SessionEnd::Shutdown));
                    };
                    if let Some(outbound) = self.encode_command(command)
                        && let Err(err) = write.send(encode(&outbound)).await
                    {
                        return (true, Err(err.into()));
                    }
                }
                incoming = read.next() => {
                    let message = match incoming {
                        Some(Ok(WsMessage::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.as_str().to_string())
                                .unwrap_or_else(|| "closed by server".to_string());
                            return (true, Ok(SessionEnd::Closed { reason, reconnect: true }));
                        }
                        Some(Ok(message)) => message,
                        Some(Err(err)) => return (true, Err(err.into())),
                        None => {
                            return (
                                true,
                                Ok(SessionEnd::Closed {
                                    reason: "connection closed".to_string(),
                                    reconnect: true,
                                }),
                            );
                        }
                    };

                    if let Some(window) = ping_window {
                        ping_sleep
                            .as_mut()
                            .reset(tokio::time::Instant::now() + window);
                    }

                    let Some(text) = frame_text(message) else {
                        continue;
                    };
                    for decoded in decode_frame(&text) {
                        let reply = match decoded {
                            Ok(reply) => reply,
                            Err(err) => {
                                warn!(error = %err, bytes = text.len(), "stream message parse failed");
                                continue;
                            }
                        };
                        match self.handle_reply(reply) {
                            ReplyAction::None => {}
                            ReplyAction::Pong => {
                                if let Err(err) = write.send(WsMessage::Text("{}".into())).await {
                                    return (true, Err(err.into()));
                                }
                            }
                            ReplyAction::Disconnect { reason, reconnect } => {
                                let _ = write.send(WsMessage::Close(None)).await;
                                return (true, Ok(SessionEnd::Closed { reason, reconnect }));
                            }
                        }
                    }
                }
                _ = &mut ping_sleep, if ping_window.is_some() => {
                    return (
                        true,
                        Ok(SessionEnd::Closed {
                            reason: "no ping from server".to_string(),
                            reconnect: true,
                        }),
                    );
                }
            }
        }
    }

    fn resubscribe_all(&mut self) {
        let subs: Vec<Arc<WsSubscription>> =
            self.inner.lock_subscriptions().values().cloned().collect();
        for sub in subs {
            if sub.mark_resubscribing() {
                sub.request_subscribe();
            }
        }
    }

    fn encode_command(&mut self, command: WorkerCommand) -> Option<Command> {
        match command {
            WorkerCommand::Subscribe { channel, sub_id } => {
                let sub = self.inner.current(&channel, Some(sub_id))?;
                if sub.phase() != Phase::Subscribing || self.subscribe_pending(sub_id) {
                    return None;
                }
                let id = self.next_id();
                self.pending
                    .insert(id, PendingRequest::Subscribe { channel, sub_id });
                Some(Command::subscribe(id, &sub.channel, sub.options.delta))
            }
            WorkerCommand::Unsubscribe { channel } => {
                let id = self.next_id();
                let command = Command::unsubscribe(id, &channel);
                self.pending
                    .insert(id, PendingRequest::Unsubscribe { channel });
                Some(command)
            }
        }
    }

    /// At most one subscribe request per subscription is in flight.
    fn subscribe_pending(&self, sub_id: u64) -> bool {
        self.pending.values().any(|request| {
            matches!(request, PendingRequest::Subscribe { sub_id: pending, .. } if *pending == sub_id)
        })
    }

    fn handle_reply(&mut self, reply: Reply) -> ReplyAction {
        if reply.is_ping() {
            return if self.pong {
                ReplyAction::Pong
            } else {
                ReplyAction::None
            };
        }

        if reply.id > 0 {
            match self.pending.remove(&reply.id) {
                Some(PendingRequest::Subscribe { channel, sub_id }) => {
                    self.handle_subscribe_reply(&channel, sub_id, reply);
                }
                Some(PendingRequest::Unsubscribe { channel }) => {
                    if let Some(error) = reply.error {
                        debug!(channel = %channel, code = error.code, message = %error.message, "unsubscribe rejected");
                    }
                }
                None => debug!(id = reply.id, "reply for unknown request"),
            }
            return ReplyAction::None;
        }

        let Some(push) = reply.push else {
            return ReplyAction::None;
        };

        if let Some(disconnect) = push.disconnect {
            return ReplyAction::Disconnect {
                reconnect: !is_terminal_disconnect(disconnect.code),
                reason: disconnect.reason,
            };
        }

        if let Some(publication) = push.publication {
            if let Some(sub) = self.inner.current(&push.channel, None) {
                sub.handle_publication(publication);
            }
        } else if let Some(unsubscribe) = push.unsubscribe
            && let Some(sub) = self.inner.current(&push.channel, None)
        {
            if is_resubscribe_code(unsubscribe.code) {
                info!(channel = %push.channel, code = unsubscribe.code, "server asked to resubscribe");
                if sub.mark_resubscribing() {
                    sub.request_subscribe();
                }
            } else if sub.close() {
                info!(channel = %push.channel, reason = %unsubscribe.reason, "unsubscribed by server");
                sub.events.on_unsubscribed();
            }
        }

        ReplyAction::None
    }

    fn handle_subscribe_reply(&mut self, channel: &str, sub_id: u64, reply: Reply) {
        let Some(sub) = self.inner.current(channel, Some(sub_id)) else {
            debug!(channel, sub_id, "ignoring subscribe reply for replaced subscription");
            return;
        };

        match reply.error {
            Some(error) if error.temporary => {
                warn!(channel, code = error.code, message = %error.message, "subscribe failed temporarily, retrying");
                sub.request_subscribe();
            }
            Some(error) => {
                warn!(channel, code = error.code, message = %error.message, "subscribe rejected");
                if sub.close() {
                    sub.events.on_unsubscribed();
                }
            }
            None => {
                let delta = reply.subscribe.map(|result| result.delta).unwrap_or(false)
                    && sub.options.delta != DeltaMode::None;
                sub.confirm(delta);
            }
        }
    }
}

fn encode(command: &Command) -> WsMessage {
    let text = serde_json::to_string(command).unwrap_or_else(|_| "{}".to_string());
    WsMessage::Text(text.into())
}

fn frame_text(message: WsMessage) -> Option<String> {
    match message {
        WsMessage::Text(text) => Some(text.to_string()),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

fn connect_error(error: ReplyError) -> DexError {
    match error.code {
        ERROR_TOKEN_EXPIRED => DexError::TokenExpired,
        ERROR_UNAUTHORIZED => DexError::Authentication {
            message: error.message,
        },
        code => DexError::Api {
            code,
            message: error.message,
        },
    }
}

fn is_terminal_disconnect(code: u32) -> bool {
    (3500..4000).contains(&code) || (4500..5000).contains(&code)
}

fn is_resubscribe_code(code: u32) -> bool {
    (2500..3000).contains(&code)
}

/// Exponential backoff: `min * 2^attempt`, clamped at `max`.
pub(crate) fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    min.checked_mul(factor).unwrap_or(max).min(max)
}
