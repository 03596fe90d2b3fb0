//! Scaling tests with many subscriptions, frames and mutations.
//!
//! Measures:
//! - Fan-out of `next` frames across many subscriptions
//! - Resubscription of a large registry after reconnect
//! - Apply/rollback of mutations touching many cache keys

use gql_live::{
    memory_pair, CacheStore, CloseEvent, ConnectionId, MemoryCache, MemoryCacheConfig, Message,
    MutationRequest, MutationStatus, OptimisticMutationManager, SubscribeOptions,
    SubscriptionTransport, TransportConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SUBSCRIPTIONS: usize = 1_000;
const FRAMES: usize = 20_000;

/// Id of the transport's current socket, or one no socket ever gets.
fn live(transport: &SubscriptionTransport) -> ConnectionId {
    transport.connection_id().unwrap_or(ConnectionId(0))
}

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn report_with_count(&self, count: usize) {
        let ms = self.elapsed_ms();
        println!(
            "  {} took {:.2}ms ({} items, {:.0} items/sec)",
            self.name,
            ms,
            count,
            if ms > 0.0 { count as f64 / (ms / 1000.0) } else { 0.0 }
        );
    }
}

fn connected(config: TransportConfig) -> (SubscriptionTransport, gql_live::MemoryPeer) {
    let (connector, peer) = memory_pair();
    let transport = SubscriptionTransport::new(config, connector).unwrap();
    transport.handle_open(live(&transport), Instant::now());
    transport.handle_message(live(&transport), Instant::now(), r#"{"type":"connection_ack"}"#);
    peer.drain();
    (transport, peer)
}

#[test]
fn test_scaling_frame_fanout() {
    println!("\n=== Frame Fan-out ===");
    let (transport, _peer) = connected(TransportConfig {
        event_buffer_size: 64,
        ..TransportConfig::new("ws://scale")
    });

    let delivered = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..SUBSCRIPTIONS)
        .map(|i| {
            let counter = delivered.clone();
            transport.subscribe(
                SubscribeOptions::new(format!("subscription {{ feed{i} }}")).on_data(move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                }),
            )
        })
        .collect();

    let frames: Vec<String> = (0..FRAMES)
        .map(|n| {
            let id = n % SUBSCRIPTIONS + 1;
            format!(r#"{{"id":"{id}","type":"next","payload":{{"data":{{"n":{n}}}}}}}"#)
        })
        .collect();

    let timer = Timer::new("dispatch");
    let now = Instant::now();
    for frame in &frames {
        transport.handle_message(live(&transport), now, frame);
    }
    timer.report_with_count(FRAMES);

    assert_eq!(delivered.load(Ordering::Relaxed), FRAMES);
    // Last frame for subscription 1 was n = FRAMES - SUBSCRIPTIONS.
    assert_eq!(
        handles[0].data().get(),
        Some(json!({"n": FRAMES - SUBSCRIPTIONS}))
    );
    // Every frame also lands on the handle's channel.
    assert_eq!(handles[0].drain_events().len(), FRAMES / SUBSCRIPTIONS);
    println!("  ✓ Fan-out test passed");
}

#[test]
fn test_scaling_resubscribe_after_reconnect() {
    println!("\n=== Resubscribe Large Registry ===");
    let (transport, peer) = connected(TransportConfig::new("ws://scale"));
    for i in 0..SUBSCRIPTIONS {
        transport.subscribe(SubscribeOptions::new(format!("subscription {{ feed{i} }}")));
    }
    peer.drain();

    let now = Instant::now();
    transport.handle_close(live(&transport), now, CloseEvent::abnormal());
    let at = now + Duration::from_secs(1);
    transport.tick(at);
    transport.handle_open(live(&transport), at);

    let timer = Timer::new("handshake + resubscribe");
    transport.handle_message(live(&transport), at, r#"{"type":"connection_ack"}"#);
    timer.report_with_count(SUBSCRIPTIONS);

    let ids: Vec<u64> = peer
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            Message::Subscribe { id, .. } => id.parse().ok(),
            _ => None,
        })
        .collect();
    assert_eq!(ids, (1..=SUBSCRIPTIONS as u64).collect::<Vec<_>>());
    println!("  ✓ Resubscribe test passed");
}

#[test]
fn test_scaling_wide_optimistic_updates() {
    println!("\n=== Wide Optimistic Updates ===");
    const KEYS: usize = 5_000;
    let cache = MemoryCache::with_config(MemoryCacheConfig {
        capacity: KEYS * 2,
        default_ttl: None,
    });
    for i in 0..KEYS {
        cache.set(&format!("row:{i}"), json!({"v": 0}), None);
    }

    let manager = OptimisticMutationManager::new();
    let mutations: Vec<_> = (0..10)
        .map(|round| {
            manager.create_mutation(
                MutationRequest::new("mutation { bulkUpdate }")
                    .optimistic_response(json!({"v": round}))
                    .update(|cache, result| {
                        for i in 0..KEYS {
                            cache.set(&format!("row:{i}"), result.data.clone());
                        }
                    }),
            )
        })
        .collect();

    let timer = Timer::new("apply");
    for m in &mutations {
        manager.apply_optimistic(m.id, &cache).unwrap();
    }
    timer.report_with_count(KEYS * mutations.len());

    let timer = Timer::new("rollback");
    for m in mutations.iter().rev() {
        manager.rollback(m.id, &cache, None).unwrap();
    }
    timer.report_with_count(KEYS * mutations.len());

    assert!(mutations
        .iter()
        .all(|m| m.status() == MutationStatus::RolledBack));
    assert_eq!(cache.read("row:0"), Some(json!({"v": 0})));
    assert_eq!(cache.read(&format!("row:{}", KEYS - 1)), Some(json!({"v": 0})));
    assert_eq!(manager.clear_completed(), mutations.len());
    println!("  ✓ Wide update test passed");
}
