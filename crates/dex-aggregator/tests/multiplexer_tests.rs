/*
[INPUT]:  Mock transport confirmations and publications
[OUTPUT]: Test results for the channel multiplexer
[POS]:    Integration tests - subscription lifecycle and fan-out
[UPDATE]: When multiplexer semantics change
*/

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{MockTransport, received, recording_listener};
use dex_aggregator::{ChannelMultiplexer, DeltaMode, DexError, Listener, Transport};
use serde_json::{Value, json};
use tokio_test::assert_ok;

const STATS: &str = "dex-token-stats:sol_ABC";

fn multiplexer() -> (Arc<MockTransport>, ChannelMultiplexer) {
    let transport = MockTransport::new();
    let mux = ChannelMultiplexer::new(transport.clone() as Arc<dyn Transport>);
    (transport, mux)
}

#[test]
fn test_publication_reaches_listener_after_confirmation() {
    let (transport, mux) = multiplexer();
    let (listener, log) = recording_listener();

    let _handle = assert_ok!(mux.subscribe(STATS, listener));
    transport.publish(STATS, json!({"price": "0.9"}));
    assert!(received(&log).is_empty());

    transport.confirm(STATS);
    transport.publish(STATS, json!({"price": "1.0"}));
    assert_eq!(received(&log), vec![json!({"price": "1.0"})]);
}

#[test]
fn test_subscription_requests_fossil_delta() {
    let (transport, mux) = multiplexer();
    let (listener, _log) = recording_listener();

    let _handle = assert_ok!(mux.subscribe(STATS, listener));
    let sub = transport.subscription(STATS).expect("subscription");
    assert_eq!(sub.options.delta, DeltaMode::Fossil);
    assert_eq!(sub.subscribe_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_one_transport_subscription_per_channel() {
    let (transport, mux) = multiplexer();
    let (first, _) = recording_listener();
    let (second, _) = recording_listener();
    let (third, _) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, first));
    let _b = assert_ok!(mux.subscribe(STATS, second));
    let _c = assert_ok!(mux.subscribe(STATS, third));

    assert_eq!(transport.created_count(), 1);
    assert_eq!(transport.active_count(STATS), 1);
    assert_eq!(mux.listener_count(STATS), 3);
    let sub = transport.subscription(STATS).expect("subscription");
    assert_eq!(sub.subscribe_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fan_out_delivers_identical_payload_to_every_listener() {
    let (transport, mux) = multiplexer();
    let logs: Vec<_> = (0..4)
        .map(|_| {
            let (listener, log) = recording_listener();
            let _ = mux.subscribe(STATS, listener).expect("subscribe");
            log
        })
        .collect();

    transport.confirm(STATS);
    let payload = json!({"price": "1.0", "holders": 12});
    transport.publish(STATS, payload.clone());

    for log in &logs {
        assert_eq!(received(log), vec![payload.clone()]);
    }
}

#[test]
fn test_same_listener_registered_twice_is_invoked_once() {
    let (transport, mux) = multiplexer();
    let (listener, log) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, listener.clone()));
    let _b = assert_ok!(mux.subscribe(STATS, listener.clone()));
    assert_eq!(mux.listener_count(STATS), 1);

    transport.confirm(STATS);
    transport.publish(STATS, json!(1));
    assert_eq!(received(&log).len(), 1);

    mux.unsubscribe(STATS, &listener);
    assert!(!mux.is_subscribed(STATS));
}

#[test]
fn test_partial_unsubscribe_keeps_channel_alive() {
    let (transport, mux) = multiplexer();
    let (first, first_log) = recording_listener();
    let (second, second_log) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, first.clone()));
    let _b = assert_ok!(mux.subscribe(STATS, second));
    transport.confirm(STATS);

    mux.unsubscribe(STATS, &first);
    assert!(mux.is_subscribed(STATS));
    assert_eq!(transport.removed_count(), 0);

    transport.publish(STATS, json!({"price": "2.0"}));
    assert!(received(&first_log).is_empty());
    assert_eq!(received(&second_log), vec![json!({"price": "2.0"})]);
}

#[test]
fn test_teardown_on_drain_in_any_order() {
    let (transport, mux) = multiplexer();
    let listeners: Vec<Listener> = (0..3).map(|_| recording_listener().0).collect();
    for listener in &listeners {
        let _ = mux.subscribe(STATS, listener.clone()).expect("subscribe");
    }
    let sub = transport.subscription(STATS).expect("subscription");

    for index in [1, 2, 0] {
        mux.unsubscribe(STATS, &listeners[index]);
    }

    assert!(!mux.is_subscribed(STATS));
    assert!(mux.channels().is_empty());
    assert_eq!(transport.removed_count(), 1);
    assert_eq!(transport.active_count(STATS), 0);
    assert_eq!(sub.unsubscribe_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_resubscribe_after_teardown_creates_new_subscription() {
    let (transport, mux) = multiplexer();
    let (first, first_log) = recording_listener();
    let (second, second_log) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, first.clone()));
    mux.unsubscribe(STATS, &first);
    assert_eq!(transport.removed_count(), 1);

    let _b = assert_ok!(mux.subscribe(STATS, second));
    assert_eq!(transport.created_count(), 2);

    transport.confirm(STATS);
    transport.publish(STATS, json!({"price": "3.0"}));
    assert!(received(&first_log).is_empty());
    assert_eq!(received(&second_log), vec![json!({"price": "3.0"})]);
}

#[test]
fn test_duplicate_unsubscribe_is_noop() {
    let (transport, mux) = multiplexer();
    let (first, _) = recording_listener();
    let (second, _) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, first.clone()));
    let _b = assert_ok!(mux.subscribe(STATS, second));

    mux.unsubscribe(STATS, &first);
    mux.unsubscribe(STATS, &first);
    assert_eq!(mux.listener_count(STATS), 1);
    assert_eq!(transport.removed_count(), 0);

    mux.unsubscribe("dex-trades:sol_UNKNOWN", &first);
    assert_eq!(mux.channels(), vec![STATS.to_string()]);
}

#[test]
fn test_late_subscriber_sees_only_later_messages() {
    let (transport, mux) = multiplexer();
    let (early, early_log) = recording_listener();
    let (late, late_log) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, early));
    transport.confirm(STATS);
    transport.publish(STATS, json!(1));
    transport.publish(STATS, json!(2));

    let _b = assert_ok!(mux.subscribe(STATS, late));
    transport.publish(STATS, json!(3));

    assert_eq!(received(&early_log), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(received(&late_log), vec![json!(3)]);
    assert_eq!(transport.created_count(), 1);
}

#[test]
fn test_channels_are_independent() {
    let (transport, mux) = multiplexer();
    let (stats, stats_log) = recording_listener();
    let (trades, trades_log) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, stats));
    let _b = assert_ok!(mux.subscribe("dex-trades:sol_ABC", trades));
    transport.confirm(STATS);
    transport.confirm("dex-trades:sol_ABC");

    transport.publish("dex-trades:sol_ABC", json!([{"p": 1}]));
    assert!(received(&stats_log).is_empty());
    assert_eq!(received(&trades_log).len(), 1);
    assert_eq!(
        mux.channels(),
        vec!["dex-token-stats:sol_ABC".to_string(), "dex-trades:sol_ABC".to_string()]
    );
}

#[test]
fn test_panicking_listener_does_not_stop_fan_out() {
    let (transport, mux) = multiplexer();
    let panicking: Listener = Arc::new(|_payload: &Value| panic!("listener failure"));
    let (healthy, log) = recording_listener();

    let _a = assert_ok!(mux.subscribe(STATS, panicking));
    let _b = assert_ok!(mux.subscribe(STATS, healthy));
    transport.confirm(STATS);

    transport.publish(STATS, json!(1));
    transport.publish(STATS, json!(2));
    assert_eq!(received(&log), vec![json!(1), json!(2)]);
    assert!(mux.is_subscribed(STATS));
}

#[test]
fn test_listener_may_unsubscribe_itself_during_fan_out() {
    let (transport, mux) = multiplexer();
    let hits = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));

    let self_removing: Listener = {
        let mux = mux.clone();
        let hits = hits.clone();
        let slot = slot.clone();
        Arc::new(move |_payload: &Value| {
            hits.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = slot.lock().expect("lock").take() {
                mux.unsubscribe(STATS, &me);
            }
        })
    };
    *slot.lock().expect("lock") = Some(self_removing.clone());

    let _a = assert_ok!(mux.subscribe(STATS, self_removing));
    transport.confirm(STATS);
    transport.publish(STATS, json!(1));
    transport.publish(STATS, json!(2));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!mux.is_subscribed(STATS));
    assert_eq!(transport.removed_count(), 1);
}

#[test]
fn test_listener_removed_by_another_is_skipped() {
    let (transport, mux) = multiplexer();
    let (removed, removed_log) = recording_listener();
    let remover_hits = Arc::new(AtomicUsize::new(0));

    let remover: Listener = {
        let mux = mux.clone();
        let hits = remover_hits.clone();
        let target = removed.clone();
        Arc::new(move |_payload: &Value| {
            hits.fetch_add(1, Ordering::SeqCst);
            mux.unsubscribe(STATS, &target);
        })
    };

    let _a = assert_ok!(mux.subscribe(STATS, remover));
    let _b = assert_ok!(mux.subscribe(STATS, removed));
    transport.confirm(STATS);
    transport.publish(STATS, json!(1));
    transport.publish(STATS, json!(2));

    // Delivery order within a round is unspecified; the removed listener sees message 1 at most.
    let seen = received(&removed_log);
    assert!(seen.is_empty() || seen == vec![json!(1)], "unexpected deliveries: {seen:?}");
    assert_eq!(remover_hits.load(Ordering::SeqCst), 2);
    assert_eq!(mux.listener_count(STATS), 1);
    assert_eq!(transport.removed_count(), 0);
}

#[test]
fn test_handle_unsubscribe_and_guard_drop() {
    let (transport, mux) = multiplexer();
    let (first, _) = recording_listener();
    let (second, _) = recording_listener();

    let handle = assert_ok!(mux.subscribe(STATS, first));
    assert_eq!(handle.channel(), STATS);
    let guard = assert_ok!(mux.subscribe(STATS, second)).into_guard();
    assert_eq!(guard.channel(), Some(STATS));

    handle.unsubscribe();
    assert_eq!(mux.listener_count(STATS), 1);

    drop(guard);
    assert!(!mux.is_subscribed(STATS));
    assert_eq!(transport.removed_count(), 1);
}

#[test]
fn test_guard_into_handle_keeps_subscription() {
    let (_transport, mux) = multiplexer();
    let (listener, _) = recording_listener();

    let guard = assert_ok!(mux.subscribe(STATS, listener)).into_guard();
    let handle = guard.into_handle().expect("handle");
    assert!(mux.is_subscribed(STATS));

    handle.unsubscribe();
    assert!(!mux.is_subscribed(STATS));
}

#[test]
fn test_handle_outliving_multiplexer_is_harmless() {
    let (_transport, mux) = multiplexer();
    let (listener, _) = recording_listener();

    let handle = assert_ok!(mux.subscribe(STATS, listener));
    drop(mux);
    handle.unsubscribe();
}

#[test]
fn test_empty_channel_rejected() {
    let (transport, mux) = multiplexer();
    let (listener, _) = recording_listener();

    assert!(matches!(mux.subscribe("", listener), Err(DexError::Config(_))));
    assert_eq!(transport.created_count(), 0);
}

#[test]
fn test_transport_failure_leaves_no_entry() {
    let (transport, mux) = multiplexer();
    transport.fail_on(STATS);
    let (listener, _) = recording_listener();

    let result = mux.subscribe(STATS, listener);
    assert!(matches!(result, Err(DexError::DuplicateSubscription { .. })));
    assert!(!mux.is_subscribed(STATS));
    assert_eq!(mux.listener_count(STATS), 0);
}

#[test]
fn test_concurrent_subscribers_share_one_subscription() {
    let (transport, mux) = multiplexer();

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let mux = mux.clone();
            std::thread::spawn(move || {
                let (listener, _) = recording_listener();
                let _handle = mux.subscribe(STATS, listener.clone()).expect("subscribe");
                listener
            })
        })
        .collect();
    let listeners: Vec<Listener> = threads
        .into_iter()
        .map(|thread| thread.join().expect("thread"))
        .collect();

    assert_eq!(transport.created_count(), 1);
    assert_eq!(mux.listener_count(STATS), 8);

    for listener in &listeners {
        mux.unsubscribe(STATS, listener);
    }
    assert_eq!(transport.removed_count(), 1);
}
