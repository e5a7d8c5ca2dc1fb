//! Integration tests for correlated dispatch
//!
//! Drives the dispatcher against in-process channels, playing the agent by
//! hand so response order and timing are under test control.

use nodeplane_control::{DispatchError, Dispatcher, DispatcherConfig};
use nodeplane_proto::{CommandKind, ResponseEnvelope};
use nodeplane_transport::memory_channel;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn dispatcher() -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(DispatcherConfig {
        default_timeout: Duration::from_secs(2),
        max_timeout: Duration::from_secs(30),
        max_in_flight: 8,
    }))
}

/// Two commands in flight on one node, answered in reverse order
#[tokio::test]
async fn test_out_of_order_responses_reach_their_own_callers() {
    let dispatcher = dispatcher();
    let (channel, source, mut peer) = memory_channel(8);
    dispatcher.attach(1, channel, source).await;

    let d1 = dispatcher.clone();
    let first = tokio::spawn(async move {
        d1.dispatch(1, CommandKind::Status, json!({}), Duration::from_secs(5))
            .await
    });
    let a = peer.recv_command().await.expect("first command");

    let d2 = dispatcher.clone();
    let second = tokio::spawn(async move {
        d2.dispatch(1, CommandKind::Restart, json!({}), Duration::from_secs(5))
            .await
    });
    let b = peer.recv_command().await.expect("second command");

    assert_ne!(a.request_id, b.request_id);

    peer.respond(&ResponseEnvelope::ok(
        b.request_id.clone(),
        Some(json!({"echo": b.command})),
    ))
    .await
    .unwrap();
    peer.respond(&ResponseEnvelope::ok(
        a.request_id.clone(),
        Some(json!({"echo": a.command})),
    ))
    .await
    .unwrap();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first, Some(json!({"echo": "Status"})));
    assert_eq!(second, Some(json!({"echo": "Restart"})));
}

#[tokio::test]
async fn test_offline_dispatch_does_not_wait_for_timeout() {
    let dispatcher = dispatcher();

    let result = timeout(
        Duration::from_millis(200),
        dispatcher.dispatch(42, CommandKind::Start, json!({}), Duration::from_secs(20)),
    )
    .await
    .expect("offline dispatch must return immediately");

    assert_eq!(result, Err(DispatchError::NodeOffline(42)));
}

#[tokio::test]
async fn test_many_concurrent_callers_on_many_nodes() {
    let dispatcher = dispatcher();

    for node_id in 1..=3 {
        let (channel, source, mut peer) = memory_channel(32);
        dispatcher.attach(node_id, channel, source).await;
        tokio::spawn(async move {
            while let Some(cmd) = peer.recv_command().await {
                let reply = ResponseEnvelope::ok(
                    cmd.request_id.clone(),
                    Some(json!({"node": node_id, "payload": cmd.payload})),
                );
                if peer.respond(&reply).await.is_err() {
                    break;
                }
            }
        });
    }

    let mut calls = Vec::new();
    for node_id in 1..=3i64 {
        for n in 0..5 {
            let d = dispatcher.clone();
            calls.push(tokio::spawn(async move {
                let data = d
                    .dispatch(node_id, CommandKind::Status, json!({"n": n}), Duration::from_secs(5))
                    .await
                    .unwrap();
                (node_id, n, data)
            }));
        }
    }

    for call in calls {
        let (node_id, n, data) = call.await.unwrap();
        assert_eq!(data, Some(json!({"node": node_id, "payload": {"n": n}})));
    }
}

#[tokio::test]
async fn test_late_response_after_timeout_is_dropped() {
    let dispatcher = dispatcher();
    let (channel, source, mut peer) = memory_channel(8);
    dispatcher.attach(5, channel, source).await;

    let result = dispatcher
        .dispatch(5, CommandKind::Status, json!({}), Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(DispatchError::Timeout { node_id: 5, .. })));

    let stale = peer.recv_command().await.unwrap();
    peer.respond(&ResponseEnvelope::ok(stale.request_id, Some(json!("late"))))
        .await
        .unwrap();

    // The next caller gets its own answer, never the stale one
    let d = dispatcher.clone();
    let next = tokio::spawn(async move {
        d.dispatch(5, CommandKind::Status, json!({}), Duration::from_secs(5))
            .await
    });
    let fresh = peer.recv_command().await.unwrap();
    peer.respond(&ResponseEnvelope::ok(fresh.request_id, Some(json!("fresh"))))
        .await
        .unwrap();

    assert_eq!(next.await.unwrap().unwrap(), Some(json!("fresh")));
    let session = dispatcher.registry().lookup(5).unwrap();
    assert!(session.pending().is_empty());
}
