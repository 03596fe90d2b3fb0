//! Error handling and edge case tests.

use gql_live::{
    memory_pair, ClientError, ConnectionId, ConnectionParams, ConnectionState, MemoryCache, Message,
    MutationId, MutationRequest, MutationStatus, OptimisticMutationManager, PeerEvent,
    SubscribeOptions, SubscriptionEvent, SubscriptionId, SubscriptionTransport, TransportConfig,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const URL: &str = "ws://localhost:4000/graphql";

/// Id of the transport's current socket, or one no socket ever gets.
fn live(transport: &SubscriptionTransport) -> ConnectionId {
    transport.connection_id().unwrap_or(ConnectionId(0))
}

fn connected() -> (SubscriptionTransport, gql_live::MemoryPeer) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (connector, peer) = memory_pair();
    let transport = SubscriptionTransport::new(TransportConfig::new(URL), connector).unwrap();
    transport.handle_open(live(&transport), Instant::now());
    transport.handle_message(live(&transport), Instant::now(), r#"{"type":"connection_ack"}"#);
    peer.drain();
    (transport, peer)
}

// --- Configuration Errors ---

#[test]
fn test_missing_url_rejected() {
    let (connector, peer) = memory_pair();
    let result = SubscriptionTransport::new(TransportConfig::new("  "), connector);
    assert!(matches!(result, Err(ClientError::Config(_))));
    assert_eq!(peer.connect_attempts(), 0);
}

#[test]
fn test_zero_keepalive_interval_rejected() {
    let (connector, _peer) = memory_pair();
    let config = TransportConfig {
        keep_alive_interval: std::time::Duration::ZERO,
        ..TransportConfig::new(URL)
    };
    assert!(matches!(
        SubscriptionTransport::new(config, connector),
        Err(ClientError::Config(_))
    ));
}

// --- Server Errors ---

#[test]
fn test_error_frame_with_message_object() {
    let (transport, _peer) = connected();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = transport.subscribe(
        SubscribeOptions::new("subscription { tick }").on_error(move |e| sink.lock().push(e.clone())),
    );

    transport.handle_message(
        live(&transport),
        Instant::now(),
        r#"{"id":"1","type":"error","payload":{"message":"Not authorized"}}"#,
    );

    let expected = ClientError::Subscription {
        id: SubscriptionId(1),
        message: "Not authorized".to_string(),
    };
    assert_eq!(handle.error().get(), Some(expected.clone()));
    assert_eq!(*seen.lock(), vec![expected]);
    // Errors do not end the subscription.
    assert!(handle.active().get());
    assert!(transport.has_subscription(handle.id()));
}

#[test]
fn test_error_frame_with_error_list() {
    let (transport, _peer) = connected();
    let handle = transport.subscribe(SubscribeOptions::new("subscription { tick }"));

    transport.handle_message(
        live(&transport),
        Instant::now(),
        r#"{"id":"1","type":"error","payload":[{"message":"Field 'tick' is deprecated"}]}"#,
    );
    match handle.error().get() {
        Some(ClientError::Subscription { message, .. }) => {
            assert_eq!(message, "Field 'tick' is deprecated")
        }
        other => panic!("unexpected error state: {other:?}"),
    }
}

#[test]
fn test_error_frame_without_payload_uses_default_message() {
    let (transport, _peer) = connected();
    let handle = transport.subscribe(SubscribeOptions::new("subscription { tick }"));

    transport.handle_message(live(&transport), Instant::now(), r#"{"id":"1","type":"error"}"#);
    assert_eq!(
        handle.error().get(),
        Some(ClientError::Subscription {
            id: SubscriptionId(1),
            message: "Subscription error".to_string(),
        })
    );
}

#[test]
fn test_next_clears_previous_error() {
    let (transport, _peer) = connected();
    let handle = transport.subscribe(SubscribeOptions::new("subscription { tick }"));
    let now = Instant::now();

    transport.handle_message(
        live(&transport),
        now,
        r#"{"id":"1","type":"error","payload":{"message":"x"}}"#,
    );
    transport.handle_message(
        live(&transport),
        now,
        r#"{"id":"1","type":"next","payload":{"data":{"tick":1}}}"#,
    );
    assert_eq!(handle.error().get(), None);
    assert_eq!(handle.data().get(), Some(json!({"tick": 1})));
}

#[test]
fn test_frames_for_unknown_ids_ignored() {
    let (transport, _peer) = connected();
    let handle = transport.subscribe(SubscribeOptions::new("subscription { tick }"));
    let now = Instant::now();

    transport.handle_message(
        live(&transport),
        now,
        r#"{"id":"99","type":"next","payload":{"data":{}}}"#,
    );
    transport.handle_message(live(&transport), now, r#"{"id":"not-a-number","type":"error"}"#);
    transport.handle_message(live(&transport), now, r#"{"id":"42","type":"complete"}"#);

    assert!(handle.drain_events().is_empty());
    assert_eq!(transport.subscription_count(), 1);
}

#[test]
fn test_malformed_frames_do_not_reconnect() {
    let (transport, peer) = connected();
    let handle = transport.subscribe(SubscribeOptions::new("subscription { tick }"));
    peer.drain();
    let now = Instant::now();

    for frame in ["", "[]", "{\"type\":\"next\"}", "{\"id\":1,\"type\":\"complete\"}"] {
        transport.handle_message(live(&transport), now, frame);
    }
    assert_eq!(transport.connection_state(), ConnectionState::Connected);
    assert!(peer.drain().is_empty());
    assert_eq!(handle.error().get(), None);
}

// --- Connection Errors ---

#[test]
fn test_failed_send_triggers_reconnect() {
    let (transport, peer) = connected();
    let first = transport.subscribe(SubscribeOptions::new("subscription { a }"));
    peer.reject_sends(true);

    let second = transport.subscribe(SubscribeOptions::new("subscription { b }"));
    assert_eq!(transport.connection_state(), ConnectionState::Reconnecting);
    assert!(matches!(
        first.drain_events().last(),
        Some(SubscriptionEvent::Error(ClientError::Connection(_)))
    ));
    assert!(transport.has_subscription(second.id()));
}

#[test]
fn test_connect_refused_surfaces_error() {
    let (connector, peer) = memory_pair();
    peer.fail_next_connects(1);
    let config = TransportConfig {
        lazy: true,
        ..TransportConfig::new(URL)
    };
    let transport = SubscriptionTransport::new(config, connector).unwrap();
    let handle = transport.subscribe(SubscribeOptions::new("subscription { tick }"));

    assert!(matches!(
        handle.error().get(),
        Some(ClientError::Connection(_))
    ));
    assert_eq!(transport.connection_state(), ConnectionState::Reconnecting);
}

#[test]
fn test_failing_params_provider_aborts_handshake() {
    let (connector, peer) = memory_pair();
    let config = TransportConfig {
        connection_params: Some(ConnectionParams::provider(|| {
            Err(ClientError::Connection("token expired".to_string()))
        })),
        ..TransportConfig::new(URL)
    };
    let transport = SubscriptionTransport::new(config, connector).unwrap();
    let handle = transport.subscribe(SubscribeOptions::new("subscription { tick }"));
    peer.drain();

    transport.handle_open(live(&transport), Instant::now());
    assert_eq!(
        handle.error().get(),
        Some(ClientError::Connection("token expired".to_string()))
    );
    assert!(peer.drain().iter().all(|e| !matches!(e, PeerEvent::Frame(_))));
    assert_eq!(transport.connection_state(), ConnectionState::Reconnecting);
}

#[test]
fn test_stray_ack_ignored() {
    let (transport, peer) = connected();
    transport.subscribe(SubscribeOptions::new("subscription { tick }"));
    peer.drain();

    transport.handle_message(live(&transport), Instant::now(), r#"{"type":"connection_ack"}"#);
    assert!(peer.messages().is_empty());
}

#[test]
fn test_server_sent_client_frames_ignored() {
    let (transport, peer) = connected();
    transport.handle_message(
        live(&transport),
        Instant::now(),
        r#"{"id":"1","type":"subscribe","payload":{"query":"subscription { x }"}}"#,
    );
    assert!(peer.messages().is_empty());
    assert_eq!(transport.subscription_count(), 0);
}

#[test]
fn test_pong_sent_for_ping_with_payload() {
    let (transport, peer) = connected();
    transport.handle_message(
        live(&transport),
        Instant::now(),
        r#"{"type":"ping","payload":{"ts":1}}"#,
    );
    assert_eq!(peer.messages(), vec![Message::pong()]);
}

// --- Mutation Errors ---

#[test]
fn test_unknown_mutation_ids() {
    let manager = OptimisticMutationManager::new();
    let cache = MemoryCache::new();
    let id = MutationId(7);

    assert!(manager.get_mutation(id).is_none());
    assert_eq!(
        manager.apply_optimistic(id, &cache),
        Err(ClientError::MutationNotFound(id))
    );
    assert_eq!(
        manager.rollback(id, &cache, None),
        Err(ClientError::MutationNotFound(id))
    );
}

#[test]
fn test_double_apply_rejected() {
    let manager = OptimisticMutationManager::new();
    let cache = MemoryCache::new();
    let mutation = manager.create_mutation(
        MutationRequest::new("mutation { x }")
            .optimistic_response(json!(1))
            .update(|cache, result| cache.set("x", result.data.clone())),
    );

    manager.apply_optimistic(mutation.id, &cache).unwrap();
    assert!(matches!(
        manager.apply_optimistic(mutation.id, &cache),
        Err(ClientError::InvalidTransition { from: "optimistic", .. })
    ));
    assert_eq!(mutation.status(), MutationStatus::Optimistic);
}

#[test]
fn test_rollback_after_commit_rejected() {
    let manager = OptimisticMutationManager::new();
    let cache = MemoryCache::new();
    let mutation = manager.create_mutation(MutationRequest::new("mutation { x }"));

    manager.commit(mutation.id, &cache, json!({})).unwrap();
    let result = manager.rollback(mutation.id, &cache, None);
    assert!(matches!(
        result,
        Err(ClientError::InvalidTransition {
            from: "completed",
            to: "rolled-back",
            ..
        })
    ));
}

#[test]
fn test_failed_mutation_records_error() {
    let manager = OptimisticMutationManager::new();
    let cache = MemoryCache::new();
    let mutation = manager.create_mutation(MutationRequest::new("mutation { x }"));

    let error = ClientError::MutationFailed("409 Conflict".to_string());
    manager.rollback(mutation.id, &cache, Some(error.clone())).unwrap();
    assert_eq!(mutation.status(), MutationStatus::Failed);
    assert_eq!(mutation.error(), Some(error.clone()));

    // Nothing is in flight any more, so a second rollback is rejected and
    // the recorded error survives.
    assert!(matches!(
        manager.rollback(mutation.id, &cache, None),
        Err(ClientError::InvalidTransition {
            from: "failed",
            to: "rolled-back",
            ..
        })
    ));
    assert_eq!(mutation.error(), Some(error));
}
