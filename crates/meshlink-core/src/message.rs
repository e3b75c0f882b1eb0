//! Message state
//!
//! One `MessageState` exists per logical mesh packet the bridge has surfaced.
//! It accumulates per-gateway receptions, remembers the Matrix event the
//! packet converged to, and cross-references replies and reactions by packet
//! id. The struct is the unit of persistence: it serializes to JSON and is
//! snapshotted after every mutation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{NodeId, PacketId};
use crate::stats::ReceptionStats;

/// Correlation state for one logical mesh packet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageState {
    /// The mesh packet this state tracks
    pub packet_id: PacketId,
    /// Matrix event the packet is rendered into. Set exactly once; every
    /// later observation edits this event instead of posting a new one.
    pub matrix_event_id: Option<String>,
    /// Original originator on the mesh
    pub sender_node: NodeId,
    /// Channel index the packet belongs to
    pub channel: u32,
    /// Text as decoded from the first observation
    pub original_text: String,
    /// Per-gateway receptions, insertion order preserved for rendering
    pub reception_list: Vec<ReceptionStats>,
    /// True iff this packet was injected by the bridge from a Matrix event
    pub is_matrix_origin: bool,
    /// The Matrix event that caused the injection, if `is_matrix_origin`
    pub matrix_origin_event_id: Option<String>,
    /// Target packet, if this packet is a reply or reaction
    pub parent_packet_id: Option<PacketId>,
    /// Child packets (replies and reactions), in arrival order
    pub replies: Vec<PacketId>,
    /// When the state was created
    pub created_at: DateTime<Utc>,
    /// Last mutation time, drives eviction
    pub last_update_at: DateTime<Utc>,

    /// Gateway membership index over `reception_list`. Rebuilt after
    /// deserialization; never persisted.
    #[serde(skip)]
    seen_gateways: HashSet<String>,
}

impl MessageState {
    /// State for a packet first observed on the mesh
    pub fn new_mesh(
        packet_id: PacketId,
        sender_node: NodeId,
        channel: u32,
        original_text: impl Into<String>,
        first_reception: ReceptionStats,
    ) -> Self {
        let now = Utc::now();
        let mut seen_gateways = HashSet::new();
        seen_gateways.insert(first_reception.gateway.key());
        Self {
            packet_id,
            matrix_event_id: None,
            sender_node,
            channel,
            original_text: original_text.into(),
            reception_list: vec![first_reception],
            is_matrix_origin: false,
            matrix_origin_event_id: None,
            parent_packet_id: None,
            replies: Vec::new(),
            created_at: now,
            last_update_at: now,
            seen_gateways,
        }
    }

    /// State for a packet the bridge itself injected from a Matrix event.
    ///
    /// Created eagerly when the mesh send succeeds, before the first MQTT
    /// echo arrives; echoes then merge reception stats into it.
    pub fn new_matrix_origin(
        packet_id: PacketId,
        sender_node: NodeId,
        channel: u32,
        original_text: impl Into<String>,
        origin_event_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            packet_id,
            matrix_event_id: None,
            sender_node,
            channel,
            original_text: original_text.into(),
            reception_list: Vec::new(),
            is_matrix_origin: true,
            matrix_origin_event_id: Some(origin_event_id.into()),
            parent_packet_id: None,
            replies: Vec::new(),
            created_at: now,
            last_update_at: now,
            seen_gateways: HashSet::new(),
        }
    }

    /// Rebuild the gateway membership index from `reception_list`.
    ///
    /// Must be called after deserializing a persisted snapshot.
    pub fn rebuild_index(&mut self) {
        self.seen_gateways = self
            .reception_list
            .iter()
            .map(|s| s.gateway.key())
            .collect();
    }

    /// Merge one gateway's reception into the list.
    ///
    /// Returns `true` if the gateway was new and the list changed; a repeat
    /// delivery from an already-known gateway leaves the state untouched.
    pub fn merge_reception(&mut self, stats: ReceptionStats) -> bool {
        let key = stats.gateway.key();
        if self.seen_gateways.contains(&key) {
            return false;
        }
        self.seen_gateways.insert(key);
        self.reception_list.push(stats);
        self.touch();
        true
    }

    /// Link a child reply/reaction, preserving arrival order
    pub fn add_reply(&mut self, child: PacketId) {
        if !self.replies.contains(&child) {
            self.replies.push(child);
            self.touch();
        }
    }

    /// Record the Matrix event this state converged to.
    ///
    /// The id is immutable once set; a second assignment is ignored.
    pub fn set_matrix_event(&mut self, event_id: impl Into<String>) {
        if self.matrix_event_id.is_none() {
            self.matrix_event_id = Some(event_id.into());
            self.touch();
        }
    }

    /// A reaction state tracks bookkeeping for a tapback: it has a parent but
    /// never its own Matrix event.
    pub fn is_reaction(&self) -> bool {
        self.parent_packet_id.is_some() && self.matrix_event_id.is_none() && !self.is_matrix_origin
    }

    /// Bump the mutation timestamp
    pub fn touch(&mut self) {
        self.last_update_at = Utc::now();
    }

    /// Age of the state relative to `now`, measured from the last mutation
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_update_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::GatewayId;

    fn stats(gateway: GatewayId) -> ReceptionStats {
        ReceptionStats::observed(gateway, -40, 8.0, 0)
    }

    #[test]
    fn test_merge_is_set_semantics() {
        let mut state = MessageState::new_mesh(
            PacketId(1),
            NodeId(2),
            0,
            "hello",
            stats(GatewayId::Node(NodeId(0xAE61))),
        );
        assert!(state.merge_reception(stats(GatewayId::Lan)));
        assert!(!state.merge_reception(stats(GatewayId::Lan)));
        assert!(!state.merge_reception(stats(GatewayId::Node(NodeId(0xAE61)))));
        assert_eq!(state.reception_list.len(), 2);
    }

    #[test]
    fn test_merge_preserves_insertion_order() {
        let mut state = MessageState::new_mesh(
            PacketId(1),
            NodeId(2),
            0,
            "hello",
            stats(GatewayId::Node(NodeId(0xAE61))),
        );
        state.merge_reception(stats(GatewayId::Lan));
        state.merge_reception(stats(GatewayId::Node(NodeId(3))));
        let order: Vec<String> = state
            .reception_list
            .iter()
            .map(|s| s.gateway.key())
            .collect();
        assert_eq!(order, vec!["!0000ae61", "lan", "!00000003"]);
    }

    #[test]
    fn test_matrix_event_set_once() {
        let mut state =
            MessageState::new_mesh(PacketId(1), NodeId(2), 0, "hi", stats(GatewayId::Lan));
        state.set_matrix_event("$first");
        state.set_matrix_event("$second");
        assert_eq!(state.matrix_event_id.as_deref(), Some("$first"));
    }

    #[test]
    fn test_index_rebuild_after_serde() {
        let mut state =
            MessageState::new_mesh(PacketId(1), NodeId(2), 0, "hi", stats(GatewayId::Lan));
        let json = serde_json::to_string(&state).unwrap();
        let mut back: MessageState = serde_json::from_str(&json).unwrap();
        back.rebuild_index();
        // The restored index still deduplicates
        assert!(!back.merge_reception(stats(GatewayId::Lan)));
        state.rebuild_index();
        assert_eq!(back.reception_list.len(), 1);
    }

    #[test]
    fn test_reaction_shape() {
        let mut state =
            MessageState::new_mesh(PacketId(5), NodeId(2), 0, "👍", stats(GatewayId::Lan));
        state.parent_packet_id = Some(PacketId(1));
        assert!(state.is_reaction());
        state.set_matrix_event("$evt");
        assert!(!state.is_reaction());
    }

    #[test]
    fn test_matrix_origin_shape() {
        let state = MessageState::new_matrix_origin(PacketId(9), NodeId(1), 0, "hi", "$origin");
        assert!(state.is_matrix_origin);
        assert!(state.matrix_event_id.is_none());
        assert_eq!(state.matrix_origin_event_id.as_deref(), Some("$origin"));
        assert!(!state.is_reaction());
    }
}
