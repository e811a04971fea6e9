/*
[INPUT]:  Test scenarios needing a transport without a network
[OUTPUT]: Mock transport, recording listeners, fixtures
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for dex-aggregator tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dex_aggregator::{
    DexError, Listener, Result, SubscriptionEvents, SubscriptionOptions, Transport,
    TransportSubscription,
};
use serde_json::Value;
use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Mock access token carrying the `us` region tag
pub fn mock_access_token() -> String {
    "key.us.secret".to_string()
}

pub struct MockSubscription {
    channel: String,
    pub options: SubscriptionOptions,
    events: Arc<dyn SubscriptionEvents>,
    active: Mutex<bool>,
    confirmed: Mutex<bool>,
    pub subscribe_calls: AtomicUsize,
    pub unsubscribe_calls: AtomicUsize,
}

impl MockSubscription {
    pub fn is_confirmed(&self) -> bool {
        *self.confirmed.lock().expect("lock")
    }
}

impl TransportSubscription for MockSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn subscribe(&self) {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        *self.active.lock().expect("lock") = true;
    }

    fn unsubscribe(&self) {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        *self.active.lock().expect("lock") = false;
        *self.confirmed.lock().expect("lock") = false;
        self.events.on_unsubscribed();
    }
}

/// In-memory transport: tests drive confirmations and publications by hand.
#[derive(Default)]
pub struct MockTransport {
    pub connect_calls: AtomicUsize,
    pub created: AtomicUsize,
    pub removed: AtomicUsize,
    subscriptions: Mutex<Vec<Arc<MockSubscription>>>,
    fail_channels: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn removed_count(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    /// Make `new_subscription` fail for `channel`
    pub fn fail_on(&self, channel: &str) {
        self.fail_channels.lock().expect("lock").push(channel.to_string());
    }

    /// Live subscription registered for `channel`
    pub fn subscription(&self, channel: &str) -> Option<Arc<MockSubscription>> {
        self.subscriptions
            .lock()
            .expect("lock")
            .iter()
            .find(|sub| sub.channel == channel)
            .cloned()
    }

    pub fn active_count(&self, channel: &str) -> usize {
        self.subscriptions
            .lock()
            .expect("lock")
            .iter()
            .filter(|sub| sub.channel == channel)
            .count()
    }

    /// Server confirms the subscription; publications flow afterwards
    pub fn confirm(&self, channel: &str) {
        let sub = self.subscription(channel).expect("subscription to confirm");
        *sub.confirmed.lock().expect("lock") = true;
        sub.events.on_subscribed();
    }

    /// Deliver a publication; dropped unless the subscription is confirmed
    pub fn publish(&self, channel: &str, payload: Value) {
        let Some(sub) = self.subscription(channel) else {
            return;
        };
        if !sub.is_confirmed() {
            return;
        }
        sub.events.on_message(&payload);
    }
}

impl Transport for MockTransport {
    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn new_subscription(
        &self,
        channel: &str,
        options: SubscriptionOptions,
        events: Arc<dyn SubscriptionEvents>,
    ) -> Result<Arc<dyn TransportSubscription>> {
        if self.fail_channels.lock().expect("lock").iter().any(|c| c == channel)
            || self.subscription(channel).is_some()
        {
            return Err(DexError::DuplicateSubscription {
                channel: channel.to_string(),
            });
        }

        let sub = Arc::new(MockSubscription {
            channel: channel.to_string(),
            options,
            events,
            active: Mutex::new(false),
            confirmed: Mutex::new(false),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
        });
        self.created.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().expect("lock").push(sub.clone());
        Ok(sub as Arc<dyn TransportSubscription>)
    }

    fn get_subscription(&self, channel: &str) -> Option<Arc<dyn TransportSubscription>> {
        self.subscription(channel)
            .map(|sub| sub as Arc<dyn TransportSubscription>)
    }

    fn remove_subscription(&self, subscription: &Arc<dyn TransportSubscription>) {
        let mut subs = self.subscriptions.lock().expect("lock");
        let before = subs.len();
        subs.retain(|sub| {
            Arc::as_ptr(sub).cast::<()>() != Arc::as_ptr(subscription).cast::<()>()
        });
        if subs.len() < before {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Listener that records every payload it receives
pub fn recording_listener() -> (Listener, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let listener: Listener = Arc::new(move |payload: &Value| {
        sink.lock().expect("lock").push(payload.clone());
    });
    (listener, received)
}

pub fn received(log: &Arc<Mutex<Vec<Value>>>) -> Vec<Value> {
    log.lock().expect("lock").clone()
}
