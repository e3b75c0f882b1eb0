//! Per-packet serialisation
//!
//! The same logical packet arrives from several gateways on arbitrary
//! schedules, sometimes concurrently. For a given packet id at most one
//! handler may run the classify-create-merge-edit pipeline at a time; a
//! second observation waits for the first to finish and then proceeds
//! against the up-to-date state. Handlers for different packet ids run
//! concurrently.
//!
//! Entries are created on first acquisition and removed when the last
//! holder releases, so the map only ever contains packets with in-flight
//! handlers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use meshlink_core::PacketId;

/// Registry of per-packet-id serialisation locks
#[derive(Default)]
pub struct PacketLocks {
    entries: Arc<Mutex<HashMap<PacketId, Arc<AsyncMutex<()>>>>>,
}

impl PacketLocks {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a packet id.
    ///
    /// The returned guard releases on drop and removes the registry entry
    /// once no other handler is waiting on it.
    pub async fn acquire(&self, packet_id: PacketId) -> PacketGuard {
        let entry = {
            let mut entries = self.entries.lock();
            Arc::clone(
                entries
                    .entry(packet_id)
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        let guard = entry.lock_owned().await;
        PacketGuard {
            entries: Arc::clone(&self.entries),
            packet_id,
            _guard: guard,
        }
    }

    /// Number of packets with in-flight handlers
    pub fn in_flight(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Exclusive access to one packet id, released on drop
pub struct PacketGuard {
    entries: Arc<Mutex<HashMap<PacketId, Arc<AsyncMutex<()>>>>>,
    packet_id: PacketId,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for PacketGuard {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&self.packet_id) {
            // Two strong references mean the map and this guard are the only
            // holders left; nobody is queued behind us
            if Arc::strong_count(entry) <= 2 {
                entries.remove(&self.packet_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = PacketLocks::new();
        {
            let _guard = locks.acquire(PacketId(1)).await;
            assert_eq!(locks.in_flight(), 1);
        }
        assert_eq!(locks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_same_packet_serialises() {
        let locks = Arc::new(PacketLocks::new());
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(PacketId(42)).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_different_packets_run_concurrently() {
        let locks = Arc::new(PacketLocks::new());
        let first = locks.acquire(PacketId(1)).await;
        // A different packet id must not block
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(PacketId(2)))
            .await
            .expect("independent packet was blocked");
        drop(first);
        drop(second);
    }
}
