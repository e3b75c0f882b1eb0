//! Retention sweeps and restart recovery
//!
//! The coordinator runs [`sweep`] on a timer (hourly by default): states
//! idle past the maximum age go first, then the oldest states beyond the
//! size cap. Children of an evicted parent are left in place and simply
//! render standalone afterwards.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use meshlink_core::{PacketId, RetentionPolicy};

use crate::store::MessageStore;

/// Evict expired and excess states, returning the evicted packet ids so the
/// caller can delete their persisted snapshots.
pub fn sweep(store: &mut MessageStore, policy: &RetentionPolicy, now: DateTime<Utc>) -> Vec<PacketId> {
    let max_age =
        Duration::from_std(policy.max_age).unwrap_or_else(|_| Duration::seconds(86_400));

    let mut evicted: Vec<PacketId> = store
        .iter()
        .filter(|state| state.age(now) > max_age)
        .map(|state| state.packet_id)
        .collect();
    for packet_id in &evicted {
        store.evict(*packet_id);
    }

    if store.len() > policy.max_size {
        let mut by_age: Vec<(DateTime<Utc>, PacketId)> = store
            .iter()
            .map(|state| (state.last_update_at, state.packet_id))
            .collect();
        by_age.sort();
        let excess = store.len() - policy.max_size;
        for (_, packet_id) in by_age.into_iter().take(excess) {
            store.evict(packet_id);
            evicted.push(packet_id);
        }
    }

    if !evicted.is_empty() {
        info!(
            evicted = evicted.len(),
            remaining = store.len(),
            "Retention sweep finished"
        );
    }
    evicted
}
