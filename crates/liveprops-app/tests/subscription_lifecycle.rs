//! Topic subscription lifecycle against the shared connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use liveprops_app::{HandlerMap, SubscriptionOptions, SubscriptionPhase};
use liveprops_core::{LiveError, Payload, PropsMap};
use liveprops_transport::{
    ConnectionOptions, JoinPolicy, JoinReply, MetaTagTokenSource, ParamsSource, ReconnectPolicy,
    TransportState, CSRF_PARAM,
};
use liveprops_testkit::{init_tracing, Harness};
use serde_json::json;

fn counting() -> (Arc<AtomicUsize>, HandlerMap) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let handlers = HandlerMap::new().on("msg", move |_: &Payload| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (count, handlers)
}

// =============================================================================
// Sharing
// =============================================================================

#[test]
fn test_two_consumers_share_the_connection() {
    init_tracing();
    let harness = Harness::new(PropsMap::new());
    let (first_count, first_handlers) = counting();
    let (second_count, second_handlers) = counting();

    let mut first = harness.subscription();
    let mut second = harness.subscription();
    first
        .sync(Some("room:1"), first_handlers, SubscriptionOptions::default())
        .unwrap();
    second
        .sync(Some("room:1"), second_handlers, SubscriptionOptions::default())
        .unwrap();

    assert_eq!(harness.transport.connect_attempts(), 1);
    assert_eq!(harness.transport.joined_channels("room:1"), 2);

    drop(first);
    assert_eq!(harness.transport.joined_channels("room:1"), 1);
    assert!(harness.connection.is_open());

    harness.transport.emit("room:1", "msg", json!({})).unwrap();
    assert_eq!(first_count.load(Ordering::SeqCst), 0);
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
    assert_eq!(second.phase(), SubscriptionPhase::Joined);
}

#[test]
fn test_topic_switches_release_handlers() {
    let harness = Harness::new(PropsMap::new());
    let (count, handlers) = counting();
    let mut sub = harness.subscription();

    for room in 0..50 {
        let topic = format!("room:{room}");
        sub.sync(Some(&topic), handlers.clone(), SubscriptionOptions::default())
            .unwrap();
    }
    assert_eq!(harness.transport.retained_channels(), 1);
    assert_eq!(harness.transport.channels_created("room:0"), 1);

    drop(sub);
    drop(handlers);
    assert_eq!(harness.transport.retained_channels(), 0);
    assert_eq!(Arc::strong_count(&count), 1);
}

#[test]
fn test_events_after_leave_are_ignored() {
    let harness = Harness::new(PropsMap::new());
    let (count, handlers) = counting();
    let mut sub = harness.subscription();
    sub.sync(Some("room:1"), handlers.clone(), SubscriptionOptions::default())
        .unwrap();

    sub.sync(Some("room:1"), handlers, SubscriptionOptions::enabled(false))
        .unwrap();
    let delivered = harness.transport.emit("room:1", "msg", json!({})).unwrap();

    assert_eq!(delivered, 0);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reenable_joins_a_new_channel() {
    let harness = Harness::new(PropsMap::new());
    let mut sub = harness.subscription();
    sub.sync(Some("room:1"), HandlerMap::new(), SubscriptionOptions::default())
        .unwrap();
    sub.sync(Some("room:1"), HandlerMap::new(), SubscriptionOptions::enabled(false))
        .unwrap();
    let handle = sub
        .sync(Some("room:1"), HandlerMap::new(), SubscriptionOptions::default())
        .unwrap();

    assert!(handle.is_some_and(|h| h.is_joined()));
    assert_eq!(harness.transport.channels_created("room:1"), 2);
    assert_eq!(harness.transport.active_channels("room:1"), 1);
}

// =============================================================================
// Join outcomes
// =============================================================================

#[test]
fn test_join_waits_for_server_reply() {
    let harness = Harness::with_join_policy(PropsMap::new(), JoinPolicy::Manual);
    let joined = Arc::new(Mutex::new(None));
    let sink = joined.clone();
    let mut sub = harness.subscription();

    let handle = sub
        .sync(
            Some("room:1"),
            HandlerMap::new(),
            SubscriptionOptions::default().on_join(move |reply| {
                *sink.lock().unwrap() = Some(reply.clone());
            }),
        )
        .unwrap();
    assert!(handle.is_none());
    assert_eq!(sub.phase(), SubscriptionPhase::Joining);

    harness
        .transport
        .reply_join("room:1", JoinReply::ok(json!({"history": []})));

    assert_eq!(sub.phase(), SubscriptionPhase::Joined);
    assert!(sub.channel().is_some());
    assert_eq!(*joined.lock().unwrap(), Some(json!({"history": []})));
}

#[test]
fn test_join_timeout_is_an_error_without_retry() {
    let harness = Harness::with_join_policy(PropsMap::new(), JoinPolicy::Manual);
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = errors.clone();
    let mut sub = harness.subscription();
    let options = SubscriptionOptions::default().on_error(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    sub.sync(Some("room:1"), HandlerMap::new(), options.clone())
        .unwrap();

    harness.transport.reply_join("room:1", JoinReply::timeout());
    sub.sync(Some("room:1"), HandlerMap::new(), options).unwrap();

    assert_eq!(sub.phase(), SubscriptionPhase::Errored);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(harness.transport.channels_created("room:1"), 1);
}

#[test]
fn test_server_close_reports_on_close() {
    let harness = Harness::new(PropsMap::new());
    let closed = Arc::new(AtomicUsize::new(0));
    let seen = closed.clone();
    let mut sub = harness.subscription();
    sub.sync(
        Some("room:1"),
        HandlerMap::new(),
        SubscriptionOptions::default().on_close(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    assert_eq!(harness.transport.close_channel("room:1"), 1);

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(sub.phase(), SubscriptionPhase::Left);
}

#[test]
fn test_handler_error_surfaces_to_emitter() {
    let harness = Harness::new(PropsMap::new());
    let mut sub = harness.subscription();
    sub.sync(
        Some("room:1"),
        HandlerMap::new().on("bad", |_: &Payload| Err(LiveError::dispatch("bad", "boom"))),
        SubscriptionOptions::default(),
    )
    .unwrap();

    let result = harness.transport.emit("room:1", "bad", json!({}));
    assert_matches!(result, Err(LiveError::Dispatch { reason, .. }) if reason == "boom");
}

// =============================================================================
// Connection
// =============================================================================

#[test]
fn test_connect_params_follow_the_page_token() {
    let page = MetaTagTokenSource::new(r#"<meta name="csrf-token" content="initial">"#);
    let options = ConnectionOptions::default().with_params(ParamsSource::csrf(Arc::new(page.clone())));
    let harness = Harness::with_options(PropsMap::new(), JoinPolicy::Accept, options);

    page.set_markup(r#"<meta name="csrf-token" content="rotated">"#);
    let mut sub = harness.subscription();
    sub.sync(Some("room:1"), HandlerMap::new(), SubscriptionOptions::default())
        .unwrap();

    let params = harness.transport.last_params().unwrap();
    assert_eq!(params[CSRF_PARAM], json!("rotated"));
}

#[test]
fn test_unreachable_server_keeps_joins_pending() {
    let options = ConnectionOptions::default().with_reconnect(ReconnectPolicy::Exponential {
        base: std::time::Duration::from_millis(100),
        multiplier: 2.0,
        max: std::time::Duration::from_secs(1),
    });
    let harness = Harness::with_options(PropsMap::new(), JoinPolicy::Accept, options);
    harness.transport.set_reachable(false);

    let mut sub = harness.subscription();
    sub.sync(Some("room:1"), HandlerMap::new(), SubscriptionOptions::default())
        .unwrap();
    assert_eq!(sub.phase(), SubscriptionPhase::Joining);
    assert_eq!(harness.connection.state(), TransportState::Connecting);

    harness.transport.set_reachable(true);
    assert_eq!(sub.phase(), SubscriptionPhase::Joined);
}

#[tokio::test]
async fn test_state_watch_reports_open() {
    let harness = Harness::new(PropsMap::new());
    let mut states = harness.connection.watch_state();
    let mut sub = harness.subscription();

    sub.sync(Some("room:1"), HandlerMap::new(), SubscriptionOptions::default())
        .unwrap();

    states.wait_for(|state| *state == TransportState::Open).await.unwrap();
}
