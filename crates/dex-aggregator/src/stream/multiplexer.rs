/*
[INPUT]:  subscribe/unsubscribe calls per (channel, listener), transport publications
[OUTPUT]: One transport subscription per channel, fanned out to every listener
[POS]:    Stream layer - reference-counted channel subscription registry
[UPDATE]: When changing subscription lifecycle or fan-out semantics
*/

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, error, info};

use crate::http::{DexError, Result};
use crate::ws::{DeltaMode, SubscriptionEvents, SubscriptionOptions, Transport, TransportSubscription};

/// Application callback for one channel.
///
/// Identity is the `Arc` allocation: clones of the same `Arc` are the same
/// listener, two separately created closures never are.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

fn listener_key(listener: &Listener) -> usize {
    Arc::as_ptr(listener).cast::<()>() as usize
}

#[derive(Default)]
struct ListenerSet {
    closed: bool,
    entries: HashMap<usize, Listener>,
}

/// Listener set of one channel; receives the transport's subscription events.
struct ChannelListeners {
    channel: String,
    set: Mutex<ListenerSet>,
}

impl ChannelListeners {
    fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            set: Mutex::new(ListenerSet::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListenerSet> {
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, listener: Listener) {
        self.lock().entries.insert(listener_key(&listener), listener);
    }

    /// Remove a listener, returning the remaining count if it was present.
    fn remove(&self, key: usize) -> Option<usize> {
        let mut set = self.lock();
        set.entries.remove(&key).map(|_| set.entries.len())
    }

    fn contains(&self, key: usize) -> bool {
        self.lock().entries.contains_key(&key)
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Drop all listeners and refuse further deliveries.
    fn close(&self) {
        let mut set = self.lock();
        set.closed = true;
        set.entries.clear();
    }

    fn fan_out(&self, payload: &Value) {
        let snapshot: Vec<(usize, Listener)> = {
            let set = self.lock();
            if set.closed {
                return;
            }
            set.entries
                .iter()
                .map(|(key, listener)| (*key, listener.clone()))
                .collect()
        };

        for (key, listener) in snapshot {
            // An earlier listener may have unsubscribed this one.
            if !self.contains(key) {
                continue;
            }
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                error!(
                    channel = %self.channel,
                    panic = panic_message(panic.as_ref()),
                    "stream listener panicked"
                );
            }
        }
    }
}

impl SubscriptionEvents for ChannelListeners {
    fn on_subscribed(&self) {
        info!(channel = %self.channel, "channel subscribed");
    }

    fn on_unsubscribed(&self) {
        info!(channel = %self.channel, "channel unsubscribed");
    }

    fn on_message(&self, payload: &Value) {
        self.fan_out(payload);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

struct ChannelEntry {
    listeners: Arc<ChannelListeners>,
    subscription: Arc<dyn TransportSubscription>,
}

struct MultiplexerInner {
    transport: Arc<dyn Transport>,
    channels: Mutex<HashMap<String, ChannelEntry>>,
}

impl MultiplexerInner {
    fn lock_channels(&self) -> MutexGuard<'_, HashMap<String, ChannelEntry>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unsubscribe(&self, channel: &str, listener: &Listener) {
        let mut channels = self.lock_channels();
        let Some(entry) = channels.get(channel) else {
            return;
        };
        let Some(remaining) = entry.listeners.remove(listener_key(listener)) else {
            return;
        };
        debug!(channel, remaining, "listener removed");
        if remaining > 0 {
            return;
        }

        // Teardown runs under the registry lock: entry and transport subscription go together.
        if let Some(entry) = channels.remove(channel) {
            info!(channel, "releasing transport subscription");
            entry.listeners.close();
            entry.subscription.unsubscribe();
            self.transport.remove_subscription(&entry.subscription);
        }
    }
}

/// Shares one transport subscription per channel among any number of listeners.
#[derive(Clone)]
pub struct ChannelMultiplexer {
    inner: Arc<MultiplexerInner>,
}

impl std::fmt::Debug for ChannelMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMultiplexer")
            .field("channels", &self.channels())
            .finish()
    }
}

impl ChannelMultiplexer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(MultiplexerInner {
                transport,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register `listener` on `channel`.
    ///
    /// The first listener of a channel creates and activates its transport
    /// subscription (fossil delta requested). Registering the same listener
    /// twice is a no-op.
    pub fn subscribe(&self, channel: &str, listener: Listener) -> Result<SubscriptionHandle> {
        if channel.is_empty() {
            return Err(DexError::Config("channel name must not be empty".to_string()));
        }

        let mut channels = self.inner.lock_channels();
        let (entry, created) = match channels.entry(channel.to_string()) {
            Entry::Occupied(occupied) => (occupied.into_mut(), false),
            Entry::Vacant(vacant) => {
                info!(channel, "creating transport subscription");
                let listeners = Arc::new(ChannelListeners::new(channel));
                let subscription = self.inner.transport.new_subscription(
                    channel,
                    SubscriptionOptions {
                        delta: DeltaMode::Fossil,
                    },
                    listeners.clone(),
                )?;
                let entry = vacant.insert(ChannelEntry {
                    listeners,
                    subscription,
                });
                (entry, true)
            }
        };

        entry.listeners.insert(listener.clone());
        if created {
            entry.subscription.subscribe();
        }
        debug!(channel, listeners = entry.listeners.len(), "listener added");

        Ok(SubscriptionHandle {
            multiplexer: Arc::downgrade(&self.inner),
            channel: channel.to_string(),
            listener,
        })
    }

    /// Remove `listener` from `channel`; unknown pairs are ignored.
    ///
    /// Removing the last listener releases the channel's transport subscription.
    pub fn unsubscribe(&self, channel: &str, listener: &Listener) {
        self.inner.unsubscribe(channel, listener);
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.inner.lock_channels().contains_key(channel)
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.inner
            .lock_channels()
            .get(channel)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Names of channels with at least one listener
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock_channels().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Undo token for one `subscribe` call.
#[must_use = "dropping the handle keeps the listener registered; call `unsubscribe` or `into_guard`"]
pub struct SubscriptionHandle {
    multiplexer: Weak<MultiplexerInner>,
    channel: String,
    listener: Listener,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("channel", &self.channel)
            .field("listener", &listener_key(&self.listener))
            .finish()
    }
}

impl SubscriptionHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn unsubscribe(self) {
        if let Some(inner) = self.multiplexer.upgrade() {
            inner.unsubscribe(&self.channel, &self.listener);
        }
    }

    /// Unsubscribe automatically when the returned guard is dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard(Some(self))
    }
}

/// Unsubscribes its listener on drop
#[derive(Debug)]
pub struct SubscriptionGuard(Option<SubscriptionHandle>);

impl SubscriptionGuard {
    pub fn channel(&self) -> Option<&str> {
        self.0.as_ref().map(SubscriptionHandle::channel)
    }

    /// Give the handle back without unsubscribing.
    pub fn into_handle(mut self) -> Option<SubscriptionHandle> {
        self.0.take()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.unsubscribe();
        }
    }
}
