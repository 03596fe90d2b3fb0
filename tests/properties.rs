//! Property tests for backoff, queue ordering, rollback and resubscription.

use gql_live::{
    memory_pair, CacheStore, CloseEvent, ConnectionId, MemoryCache, Message, MutationRequest,
    OptimisticMutationManager, MutationManagerConfig, SubscribeOptions, SubscriptionTransport,
    Timestamp, TransportConfig,
};
use proptest::prelude::*;
use serde_json::json;
use std::time::{Duration, Instant};

const KEYS: usize = 8;

/// Id of the transport's current socket, or one no socket ever gets.
fn live(transport: &SubscriptionTransport) -> ConnectionId {
    transport.connection_id().unwrap_or(ConnectionId(0))
}

fn key(i: usize) -> String {
    format!("entity:{i}")
}

/// Cache contents for every key in the test key space.
fn contents(cache: &MemoryCache) -> Vec<Option<serde_json::Value>> {
    (0..KEYS).map(|i| cache.read(&key(i))).collect()
}

proptest! {
    /// Delays never shrink as attempts grow.
    #[test]
    fn backoff_is_monotonic(
        base_ms in 1u64..10_000,
        multiplier in 1.0f64..4.0,
        a in 0u32..40,
        b in 0u32..40,
    ) {
        let config = TransportConfig {
            reconnect_delay: Duration::from_millis(base_ms),
            backoff_multiplier: multiplier,
            ..TransportConfig::new("ws://x")
        };
        let (low, high) = (a.min(b), a.max(b));
        prop_assert!(config.reconnect_delay_for(low) <= config.reconnect_delay_for(high));
    }

    /// Dequeue order is priority descending, then oldest first.
    #[test]
    fn queue_pops_by_priority_then_age(priorities in prop::collection::vec(-5i32..5, 1..40)) {
        let manager = OptimisticMutationManager::with_config(MutationManagerConfig {
            max_queue_size: 64,
            ..Default::default()
        });
        let mut ids = Vec::new();
        for (i, priority) in priorities.iter().enumerate() {
            let m = manager.create_mutation(
                MutationRequest::new("mutation { x }").timestamp(Timestamp(i as i64)),
            );
            prop_assert!(manager.queue_mutation(&m, *priority));
            ids.push(m.id);
        }

        let mut expected: Vec<usize> = (0..priorities.len()).collect();
        expected.sort_by_key(|&i| std::cmp::Reverse(priorities[i]));
        let expected: Vec<_> = expected.into_iter().map(|i| ids[i]).collect();

        let mut popped = Vec::new();
        while let Some(m) = manager.get_next_queued_mutation() {
            popped.push(m.id);
        }
        prop_assert_eq!(popped, expected);
    }

    /// Rolling back restores every key the update touched, whatever it did.
    #[test]
    fn rollback_restores_prior_contents(
        initial in prop::collection::vec(prop::option::of(0i64..100), KEYS),
        writes in prop::collection::vec((0..KEYS, prop::option::of(0i64..100)), 0..24),
    ) {
        let cache = MemoryCache::new();
        for (i, value) in initial.iter().enumerate() {
            if let Some(v) = value {
                cache.set(&key(i), json!(v), None);
            }
        }
        let before = contents(&cache);

        let manager = OptimisticMutationManager::new();
        let m = manager.create_mutation(
            MutationRequest::new("mutation { batch }")
                .optimistic_response(json!(null))
                .update(move |cache, _| {
                    for (i, value) in &writes {
                        match value {
                            Some(v) => cache.set(&key(*i), json!(v)),
                            None => cache.delete(&key(*i)),
                        }
                    }
                }),
        );
        manager.apply_optimistic(m.id, &cache).unwrap();
        manager.rollback(m.id, &cache, None).unwrap();

        prop_assert_eq!(contents(&cache), before);
    }

    /// After an abnormal close, the next handshake resends exactly the
    /// registered subscriptions with their original ids and queries.
    #[test]
    fn reconnect_resubscribes_exactly_once(count in 1usize..20, dropped in prop::collection::vec(any::<bool>(), 20)) {
        let (connector, peer) = memory_pair();
        let transport = SubscriptionTransport::new(TransportConfig::new("ws://x"), connector).unwrap();
        let now = Instant::now();
        transport.handle_open(live(&transport), now);
        transport.handle_message(live(&transport), now, r#"{"type":"connection_ack"}"#);

        let mut expected = Vec::new();
        for i in 0..count {
            let query = format!("subscription S{i} {{ s{i} }}");
            let handle = transport.subscribe(SubscribeOptions::new(query.as_str()));
            if dropped[i] {
                handle.unsubscribe();
            } else {
                expected.push((handle.id().to_wire(), query));
            }
        }
        peer.drain();

        transport.handle_close(live(&transport), now, CloseEvent::abnormal());
        let at = now + Duration::from_secs(1);
        transport.tick(at);
        transport.handle_open(live(&transport), at);
        transport.handle_message(live(&transport), at, r#"{"type":"connection_ack"}"#);

        let sent: Vec<(String, String)> = peer
            .messages()
            .into_iter()
            .filter_map(|m| match m {
                Message::Subscribe { id, payload } => Some((id, payload.query)),
                _ => None,
            })
            .collect();
        prop_assert_eq!(sent, expected);
    }
}
