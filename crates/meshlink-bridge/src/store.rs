//! In-memory message-state index
//!
//! The authoritative copy of every correlated packet, indexed two ways:
//! by packet id for the mesh path and by Matrix event id for inbound Matrix
//! reactions and replies. Also tracks the last packet seen per channel for
//! the emoji-only correlation heuristic.
//!
//! The store is plain data behind the coordinator's lock; all operations are
//! O(1) on average.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use meshlink_core::{MessageState, PacketId};

/// Two-way index over the bridge's message states
#[derive(Debug, Default)]
pub struct MessageStore {
    by_packet: HashMap<PacketId, MessageState>,
    by_event: HashMap<String, PacketId>,
    last_seen: HashMap<u32, (PacketId, DateTime<Utc>)>,
}

impl MessageStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted snapshots.
    ///
    /// Restores both indexes and recomputes `last_seen` per channel as the
    /// most recently created packet on that channel.
    pub fn rehydrate(states: Vec<MessageState>) -> Self {
        let mut store = Self::new();
        for state in states {
            let channel = state.channel;
            let seen = (state.packet_id, state.created_at);
            match store.last_seen.get(&channel) {
                Some((_, existing)) if *existing >= seen.1 => {}
                _ => {
                    store.last_seen.insert(channel, seen);
                }
            }
            store.put(state);
        }
        store
    }

    /// Number of tracked packets
    pub fn len(&self) -> usize {
        self.by_packet.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.by_packet.is_empty()
    }

    /// Whether a packet is tracked
    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.by_packet.contains_key(&packet_id)
    }

    /// Look up a state by packet id
    pub fn get(&self, packet_id: PacketId) -> Option<&MessageState> {
        self.by_packet.get(&packet_id)
    }

    /// Look up a state by the Matrix event it converged to
    pub fn get_by_event(&self, event_id: &str) -> Option<&MessageState> {
        self.by_event
            .get(event_id)
            .and_then(|packet_id| self.by_packet.get(packet_id))
    }

    /// Insert a new state, indexing its Matrix event if it already has one.
    ///
    /// A duplicate packet id is a programming error: callers must mutate
    /// existing states in place.
    pub fn put(&mut self, state: MessageState) {
        assert!(
            !self.by_packet.contains_key(&state.packet_id),
            "duplicate message state for packet {}",
            state.packet_id
        );
        if let Some(event_id) = &state.matrix_event_id {
            self.by_event.insert(event_id.clone(), state.packet_id);
        }
        self.by_packet.insert(state.packet_id, state);
    }

    /// Apply a mutation to one state, returning its result
    pub fn mutate<R>(
        &mut self,
        packet_id: PacketId,
        f: impl FnOnce(&mut MessageState) -> R,
    ) -> Option<R> {
        self.by_packet.get_mut(&packet_id).map(f)
    }

    /// Record the Matrix event a state converged to and index it.
    ///
    /// The assignment is first-wins, matching [`MessageState::set_matrix_event`].
    pub fn assign_event(&mut self, packet_id: PacketId, event_id: &str) {
        if let Some(state) = self.by_packet.get_mut(&packet_id) {
            if state.matrix_event_id.is_none() {
                state.set_matrix_event(event_id);
                self.by_event.insert(event_id.to_string(), packet_id);
            }
        }
    }

    /// Remove a state from both indexes.
    ///
    /// Children are not cascaded: a child whose parent is evicted keeps its
    /// dangling `parent_packet_id` and renders standalone from then on.
    pub fn evict(&mut self, packet_id: PacketId) -> Option<MessageState> {
        let state = self.by_packet.remove(&packet_id)?;
        if let Some(event_id) = &state.matrix_event_id {
            self.by_event.remove(event_id);
        }
        Some(state)
    }

    /// Record the packet most recently surfaced on a channel
    pub fn note_seen(&mut self, channel: u32, packet_id: PacketId, at: DateTime<Utc>) {
        self.last_seen.insert(channel, (packet_id, at));
    }

    /// The packet most recently surfaced on a channel
    pub fn last_seen(&self, channel: u32) -> Option<(PacketId, DateTime<Utc>)> {
        self.last_seen.get(&channel).copied()
    }

    /// Iterate over all states
    pub fn iter(&self) -> impl Iterator<Item = &MessageState> {
        self.by_packet.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::{GatewayId, NodeId, ReceptionStats};

    fn state(packet: u32, channel: u32) -> MessageState {
        MessageState::new_mesh(
            PacketId(packet),
            NodeId(7),
            channel,
            "hi",
            ReceptionStats::observed(GatewayId::Lan, -40, 8.0, 0),
        )
    }

    #[test]
    fn test_put_get() {
        let mut store = MessageStore::new();
        store.put(state(1, 0));
        assert!(store.contains(PacketId(1)));
        assert_eq!(store.get(PacketId(1)).unwrap().packet_id, PacketId(1));
        assert!(store.get(PacketId(2)).is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate message state")]
    fn test_duplicate_put_panics() {
        let mut store = MessageStore::new();
        store.put(state(1, 0));
        store.put(state(1, 0));
    }

    #[test]
    fn test_event_index() {
        let mut store = MessageStore::new();
        store.put(state(1, 0));
        store.assign_event(PacketId(1), "$evt");
        assert_eq!(
            store.get_by_event("$evt").unwrap().packet_id,
            PacketId(1)
        );
        // First assignment wins
        store.assign_event(PacketId(1), "$other");
        assert!(store.get_by_event("$other").is_none());
    }

    #[test]
    fn test_evict_clears_both_indexes() {
        let mut store = MessageStore::new();
        store.put(state(1, 0));
        store.assign_event(PacketId(1), "$evt");
        let evicted = store.evict(PacketId(1)).unwrap();
        assert_eq!(evicted.packet_id, PacketId(1));
        assert!(!store.contains(PacketId(1)));
        assert!(store.get_by_event("$evt").is_none());
    }

    #[test]
    fn test_rehydrate_restores_indexes_and_last_seen() {
        let mut a = state(1, 0);
        a.set_matrix_event("$a");
        let mut b = state(2, 0);
        b.set_matrix_event("$b");
        // b is newer than a on channel 0
        b.created_at = a.created_at + chrono::Duration::seconds(5);
        let c = state(3, 2);

        let store = MessageStore::rehydrate(vec![a, b, c]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get_by_event("$b").unwrap().packet_id, PacketId(2));
        assert_eq!(store.last_seen(0).unwrap().0, PacketId(2));
        assert_eq!(store.last_seen(2).unwrap().0, PacketId(3));
        assert!(store.last_seen(1).is_none());
    }
}
