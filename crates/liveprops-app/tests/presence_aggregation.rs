//! Presence aggregation over the memory transport.

use std::sync::{Arc, Mutex};

use liveprops_app::{PresenceOptions, SubscriptionPhase};
use liveprops_core::PropsMap;
use liveprops_transport::{JoinPolicy, JoinReply, PRESENCE_DIFF_EVENT, PRESENCE_STATE_EVENT};
use liveprops_testkit::{meta, presence_state, Harness};
use serde_json::json;

const LOBBY: &str = "lobby";

#[test]
fn test_devices_join_and_leave_independently() {
    let harness = Harness::new(PropsMap::new());
    let mut presence = harness.presence();
    presence.sync(Some(LOBBY), PresenceOptions::default()).unwrap();

    harness
        .transport
        .emit(LOBBY, PRESENCE_STATE_EVENT, presence_state(&[("ann", "phone")]))
        .unwrap();
    harness
        .transport
        .emit(
            LOBBY,
            PRESENCE_DIFF_EVENT,
            json!({"joins": {"ann": {"metas": [meta("laptop")]}}}),
        )
        .unwrap();
    assert_eq!(presence.get_by_key("ann").map(|m| m.len()), Some(2));

    harness
        .transport
        .emit(
            LOBBY,
            PRESENCE_DIFF_EVENT,
            json!({"leaves": {"ann": {"metas": [meta("phone")]}}}),
        )
        .unwrap();
    assert_eq!(presence.get_by_key("ann"), Some(vec![meta("laptop")]));
}

#[test]
fn test_leave_callbacks_see_remaining_metas() {
    let harness = Harness::new(PropsMap::new());
    let leaves = Arc::new(Mutex::new(Vec::new()));
    let sink = leaves.clone();
    let mut presence = harness.presence();
    presence
        .sync(
            Some(LOBBY),
            PresenceOptions::default().on_leave(move |id, current, left| {
                sink.lock()
                    .unwrap()
                    .push((id.to_string(), current.metas.len(), left.metas.len()));
            }),
        )
        .unwrap();

    harness
        .transport
        .emit(LOBBY, PRESENCE_STATE_EVENT, presence_state(&[("ann", "a"), ("bob", "b")]))
        .unwrap();
    harness
        .transport
        .emit(LOBBY, PRESENCE_STATE_EVENT, presence_state(&[("ann", "a")]))
        .unwrap();

    assert_eq!(*leaves.lock().unwrap(), vec![("bob".to_string(), 0, 1)]);
    let ids: Vec<String> = presence.list().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec!["ann"]);
}

#[test]
fn test_diff_before_state_is_replayed() {
    let harness = Harness::new(PropsMap::new());
    let mut presence = harness.presence();
    presence.sync(Some(LOBBY), PresenceOptions::default()).unwrap();

    harness
        .transport
        .emit(
            LOBBY,
            PRESENCE_DIFF_EVENT,
            json!({"joins": {"bob": {"metas": [meta("b")]}}}),
        )
        .unwrap();
    assert!(presence.presences().is_empty());

    harness
        .transport
        .emit(LOBBY, PRESENCE_STATE_EVENT, presence_state(&[("ann", "a")]))
        .unwrap();

    let ids: Vec<String> = presence.list().iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, vec!["ann", "bob"]);
}

#[test]
fn test_nothing_present_before_join() {
    let harness = Harness::with_join_policy(PropsMap::new(), JoinPolicy::Manual);
    let mut presence = harness.presence();
    presence.sync(Some(LOBBY), PresenceOptions::default()).unwrap();

    assert_eq!(presence.phase(), SubscriptionPhase::Joining);
    assert_eq!(
        harness
            .transport
            .emit(LOBBY, PRESENCE_STATE_EVENT, presence_state(&[("ann", "a")]))
            .unwrap(),
        0
    );

    harness.transport.reply_join(LOBBY, JoinReply::ok(json!({})));
    harness
        .transport
        .emit(LOBBY, PRESENCE_STATE_EVENT, presence_state(&[("ann", "a")]))
        .unwrap();
    assert_eq!(presence.list().len(), 1);
}

#[test]
fn test_disabled_presence_leaves_channel() {
    let harness = Harness::new(PropsMap::new());
    let mut presence = harness.presence();
    presence.sync(Some(LOBBY), PresenceOptions::default()).unwrap();
    harness
        .transport
        .emit(LOBBY, PRESENCE_STATE_EVENT, presence_state(&[("ann", "a")]))
        .unwrap();

    presence
        .sync(
            Some(LOBBY),
            PresenceOptions {
                enabled: false,
                ..PresenceOptions::default()
            },
        )
        .unwrap();

    assert!(presence.presences().is_empty());
    assert_eq!(harness.transport.active_channels(LOBBY), 0);
}
