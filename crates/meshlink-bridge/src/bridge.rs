//! Bridge coordinator
//!
//! Owns all correlation state and mediates between the mesh transports and
//! the Matrix room:
//!
//! - inbound mesh observations are admitted, classified, deduplicated, and
//!   converge to exactly one progressively edited Matrix event per packet
//! - inbound Matrix events are routed back onto the mesh as (possibly
//!   split) text sends or tapback reactions, and the sent packet ids are
//!   registered so their MQTT echoes merge instead of duplicating
//!
//! [`BridgeCore`] holds the state and the handlers; [`Bridge`] is the event
//! loop that feeds it. Handlers for different packets run concurrently,
//! serialised per packet id through [`PacketLocks`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use meshlink_core::{
    BridgeOptions, MeshEvent, MeshObservation, MeshPacket, MessageState, NodeId, PacketId,
    PortNum, StateStore,
};
use meshlink_matrix::{MatrixEvent, MatrixRoom};
use meshlink_meshtastic::{MeshSender, MAX_TEXT_PAYLOAD};

use crate::lifecycle;
use crate::locks::PacketLocks;
use crate::names::NameDirectory;
use crate::render;
use crate::resolver::{Classification, Resolver};
use crate::split;
use crate::store::MessageStore;

/// Pause between the parts of a split message, so the radio's transmit
/// queue is not flooded
const PART_PACING: Duration = Duration::from_millis(500);

/// Drain budget for in-flight handlers at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Correlation state and handlers, shared by all in-flight handler tasks
pub struct BridgeCore {
    matrix: Arc<dyn MatrixRoom>,
    mesh: Arc<dyn MeshSender>,
    persist: Arc<dyn StateStore>,
    options: BridgeOptions,
    resolver: Resolver,
    store: RwLock<MessageStore>,
    names: RwLock<NameDirectory>,
    locks: PacketLocks,
    /// Packet ids of tapbacks the bridge itself sent; their mesh echoes are
    /// invisible because Matrix already shows the user's native reaction
    own_tapbacks: RwLock<HashSet<PacketId>>,
}

impl BridgeCore {
    /// Assemble the coordinator around its collaborators and (possibly
    /// rehydrated) state
    pub fn new(
        matrix: Arc<dyn MatrixRoom>,
        mesh: Arc<dyn MeshSender>,
        persist: Arc<dyn StateStore>,
        options: BridgeOptions,
        store: MessageStore,
        names: NameDirectory,
    ) -> Arc<Self> {
        let resolver = Resolver::new(options.correlation_window);
        Arc::new(Self {
            matrix,
            mesh,
            persist,
            options,
            resolver,
            store: RwLock::new(store),
            names: RwLock::new(names),
            locks: PacketLocks::new(),
            own_tapbacks: RwLock::new(HashSet::new()),
        })
    }

    // ========================================================================
    // Inbound mesh path
    // ========================================================================

    /// Entry point for everything a mesh source submits
    pub async fn handle_mesh_event(&self, event: MeshEvent) {
        match event {
            MeshEvent::Observation(obs) => self.handle_mesh_packet(obs).await,
            MeshEvent::NodeName {
                node,
                short_name,
                long_name,
            } => self.handle_node_name(node, short_name, long_name).await,
        }
    }

    /// Correlate one packet observation into the Matrix room
    pub async fn handle_mesh_packet(&self, obs: MeshObservation) {
        let packet = &obs.packet;

        if !self
            .options
            .channels
            .permits(packet.channel, packet.channel_name.as_deref())
        {
            debug!(
                packet = %packet.id,
                channel = packet.channel,
                "Packet outside the channel allow-list"
            );
            return;
        }

        // NODEINFO feeds the name directory and produces no Matrix event
        if packet.port() == PortNum::NodeInfo {
            if let Some(user) = packet.decoded.user.clone() {
                self.handle_node_name(packet.from, user.short_name, user.long_name)
                    .await;
            }
            return;
        }

        if self.own_tapbacks.read().contains(&packet.id) {
            debug!(packet = %packet.id, "Echo of our own tapback");
            return;
        }

        // One handler per packet id at a time; a concurrent observation of
        // the same packet waits here and then sees up-to-date state
        let _guard = self.locks.acquire(packet.id).await;

        let Some(text) = extract_text(packet) else {
            debug!(packet = %packet.id, port = ?packet.port(), "Dropping packet without usable text");
            return;
        };

        info!(
            packet = %packet.id,
            from = %packet.from,
            channel = packet.channel,
            source = %obs.source,
            "Processing mesh packet"
        );

        let known = self.store.read().contains(packet.id);
        if known {
            self.merge_observation(obs).await;
        } else {
            self.first_sight(obs, text).await;
        }
    }

    async fn first_sight(&self, obs: MeshObservation, text: String) {
        let classification = {
            let store = self.store.read();
            self.resolver.classify(&obs.packet, &text, &store, Utc::now())
        };
        match classification {
            Classification::New => self.create_new(obs, text).await,
            Classification::Reply { parent } => self.create_reply(obs, text, parent).await,
            Classification::Reaction { parent } => self.create_reaction(obs, text, parent).await,
            Classification::OwnEcho => {
                debug!(packet = %obs.packet.id, "Suppressing echo of our own reaction")
            }
        }
    }

    async fn create_new(&self, obs: MeshObservation, text: String) {
        let MeshObservation { packet, stats, .. } = obs;
        let state = MessageState::new_mesh(packet.id, packet.from, packet.channel, text, stats);
        {
            let mut store = self.store.write();
            store.note_seen(packet.channel, packet.id, Utc::now());
            store.put(state);
        }
        self.refresh_event(packet.id).await;
        self.persist_snapshot(packet.id).await;
    }

    async fn create_reply(&self, obs: MeshObservation, text: String, parent: PacketId) {
        if !self.store.read().contains(parent) {
            debug!(
                packet = %obs.packet.id,
                parent = %parent,
                "Reply to an untracked packet, bridging standalone"
            );
            return self.create_new(obs, text).await;
        }

        let MeshObservation { packet, stats, .. } = obs;
        let mut state =
            MessageState::new_mesh(packet.id, packet.from, packet.channel, text, stats);
        state.parent_packet_id = Some(parent);
        {
            let mut store = self.store.write();
            store.put(state);
            store.mutate(parent, |p| p.add_reply(packet.id));
        }
        // The reply gets its own threaded event; the parent's body gains the
        // indented reply line
        self.refresh_event(packet.id).await;
        self.refresh_event(parent).await;
        self.persist_snapshot(packet.id).await;
        self.persist_snapshot(parent).await;
    }

    async fn create_reaction(&self, obs: MeshObservation, text: String, parent: PacketId) {
        if !self.store.read().contains(parent) {
            debug!(
                packet = %obs.packet.id,
                parent = %parent,
                "Reaction to an untracked packet, dropping"
            );
            return;
        }

        let MeshObservation { packet, stats, .. } = obs;
        let mut state = MessageState::new_mesh(
            packet.id,
            packet.from,
            packet.channel,
            text.trim().to_string(),
            stats,
        );
        state.parent_packet_id = Some(parent);
        {
            let mut store = self.store.write();
            store.put(state);
            store.mutate(parent, |p| p.add_reply(packet.id));
        }
        // The reaction never gets its own event; it surfaces on the parent
        self.refresh_event(parent).await;
        self.persist_snapshot(packet.id).await;
        self.persist_snapshot(parent).await;
    }

    /// A later observation of a known packet: merge the gateway's stats and
    /// refresh the affected event
    async fn merge_observation(&self, obs: MeshObservation) {
        let packet_id = obs.packet.id;
        let (changed, refresh_target) = {
            let mut store = self.store.write();
            let changed = store
                .mutate(packet_id, |state| state.merge_reception(obs.stats))
                .unwrap_or(false);
            let target = store.get(packet_id).and_then(|state| {
                if state.is_reaction() {
                    state.parent_packet_id
                } else {
                    Some(packet_id)
                }
            });
            (changed, target)
        };

        if !changed {
            debug!(packet = %packet_id, "Repeat delivery from a known gateway");
            return;
        }
        if let Some(target) = refresh_target {
            self.refresh_event(target).await;
        }
        self.persist_snapshot(packet_id).await;
    }

    /// Render a state and create or edit its Matrix event.
    ///
    /// Creation happens at most once per packet; afterwards every refresh is
    /// an edit of the same event. A failed call is only logged: the state
    /// already holds the merged data and the next observation retries
    /// naturally.
    async fn refresh_event(&self, packet_id: PacketId) {
        let plan = {
            let store = self.store.read();
            let Some(state) = store.get(packet_id) else {
                debug!(packet = %packet_id, "Refresh for an untracked packet");
                return;
            };
            if state.is_reaction() {
                warn!(packet = %packet_id, "Refusing to render a reaction as its own event");
                return;
            }
            let names = self.names.read();
            let parent = state.parent_packet_id.and_then(|p| store.get(p));
            let children: Vec<&MessageState> = state
                .replies
                .iter()
                .filter_map(|child| store.get(*child))
                .collect();
            let body = render::render_message(state, parent, &children, &names);
            let existing = state.matrix_event_id.clone();
            // A new reply threads under its parent's event; compact stats
            // messages stand alone next to the user's own message
            let reply_anchor = if existing.is_none() && !state.is_matrix_origin {
                parent.and_then(|p| p.matrix_event_id.clone())
            } else {
                None
            };
            (body, existing, reply_anchor)
        };
        let (body, existing, reply_anchor) = plan;

        match existing {
            Some(event_id) => {
                if let Err(e) = self
                    .matrix
                    .edit_message(&event_id, &body.plain, &body.html)
                    .await
                {
                    warn!(packet = %packet_id, event = %event_id, error = %e, "Matrix edit failed");
                }
            }
            None => match self
                .matrix
                .post_message(&body.plain, &body.html, reply_anchor.as_deref())
                .await
            {
                Ok(event_id) => {
                    info!(packet = %packet_id, event = %event_id, "Posted Matrix event");
                    self.store.write().assign_event(packet_id, &event_id);
                }
                Err(e) => {
                    warn!(packet = %packet_id, error = %e, "Matrix post failed, will retry on the next observation");
                }
            },
        }
    }

    async fn handle_node_name(
        &self,
        node: NodeId,
        short_name: Option<String>,
        long_name: Option<String>,
    ) {
        debug!(node = %node, short = ?short_name, long = ?long_name, "Updating name directory");
        self.names
            .write()
            .update(node, short_name.clone(), long_name.clone());
        if let Err(e) = self
            .persist
            .upsert_node_name(node, short_name.as_deref(), long_name.as_deref())
            .await
        {
            warn!(node = %node, error = %e, "Node name write failed");
        }
    }

    // ========================================================================
    // Outbound path (Matrix → mesh)
    // ========================================================================

    /// Entry point for room events delivered by the Matrix sync loop
    pub async fn handle_matrix_event(&self, event: MatrixEvent) {
        match event {
            MatrixEvent::Text {
                event_id,
                sender,
                body,
                in_reply_to,
            } => self.relay_text(event_id, sender, body, in_reply_to).await,
            MatrixEvent::Reaction {
                target_event_id,
                key,
                ..
            } => self.relay_reaction(target_event_id, key).await,
            MatrixEvent::Edit { event_id, .. } => {
                debug!(event = %event_id, "Ignoring edit; the mesh has no edit primitive")
            }
        }
    }

    async fn relay_text(
        &self,
        event_id: String,
        sender: String,
        body: String,
        in_reply_to: Option<String>,
    ) {
        let display = self.matrix.display_name(&sender).await;

        let mut content = body;
        let mut reply_target: Option<(PacketId, u32)> = None;
        if let Some(parent_event) = in_reply_to {
            content = strip_reply_fallback(&content).to_string();
            reply_target = self
                .store
                .read()
                .get_by_event(&parent_event)
                .map(|state| (state.packet_id, state.channel));
            if let Some((packet, _)) = reply_target {
                info!(packet = %packet, "Matrix reply targets a mesh packet");
            }
        }

        let full = format!("[{}]: {}", display, content);
        // Replies follow the parent's channel so a reply to channel-2
        // traffic does not land on the default channel
        let channel = reply_target
            .map(|(_, channel)| channel)
            .unwrap_or(self.options.outbound_channel);
        let parts = split::split_for_mesh(&full, MAX_TEXT_PAYLOAD);
        let total = parts.len();
        let local = self.mesh.local_node().unwrap_or(NodeId(0));

        for (index, part) in parts.iter().enumerate() {
            // Only part 1 carries the reply linkage
            let reply_id = if index == 0 {
                reply_target.map(|(packet, _)| packet)
            } else {
                None
            };
            match self.mesh.send_text(part, channel, reply_id).await {
                Ok(packet_id) => {
                    info!(
                        packet = %packet_id,
                        part = index + 1,
                        total,
                        "Tracking Matrix-originated packet"
                    );
                    let mut state = MessageState::new_matrix_origin(
                        packet_id,
                        local,
                        channel,
                        part.clone(),
                        event_id.clone(),
                    );
                    state.parent_packet_id = reply_id;
                    {
                        let mut store = self.store.write();
                        if !store.contains(packet_id) {
                            store.put(state);
                        }
                    }
                    self.persist_snapshot(packet_id).await;
                }
                Err(e) => {
                    warn!(error = %e, part = index + 1, "Mesh send failed, dropping message");
                    break;
                }
            }
            if index + 1 < total {
                tokio::time::sleep(PART_PACING).await;
            }
        }
    }

    async fn relay_reaction(&self, target_event_id: String, key: String) {
        let target = self
            .store
            .read()
            .get_by_event(&target_event_id)
            .map(|state| (state.packet_id, state.channel));
        let Some((packet, channel)) = target else {
            debug!(event = %target_event_id, "Reaction target is not a bridged packet");
            return;
        };
        match self.mesh.send_tapback(packet, &key, channel).await {
            Ok(sent) => {
                self.own_tapbacks.write().insert(sent);
                info!(target = %packet, emoji = %key, "Forwarded reaction to the mesh");
            }
            Err(e) => warn!(target = %packet, error = %e, "Tapback send failed"),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run one retention sweep and delete evicted snapshots
    pub async fn sweep_expired(&self) {
        let evicted = {
            let mut store = self.store.write();
            lifecycle::sweep(&mut store, &self.options.retention, Utc::now())
        };
        {
            // Tapback echoes arrive within seconds; anything still here by
            // sweep time is stale
            let mut tapbacks = self.own_tapbacks.write();
            if tapbacks.len() > 1024 {
                tapbacks.clear();
            }
        }
        for packet_id in evicted {
            if let Err(e) = self.persist.delete_message_state(packet_id).await {
                warn!(packet = %packet_id, error = %e, "Snapshot delete failed");
            }
        }
    }

    async fn persist_snapshot(&self, packet_id: PacketId) {
        let snapshot = self.store.read().get(packet_id).cloned();
        let Some(state) = snapshot else { return };
        if let Err(e) = self.persist.save_message_state(&state).await {
            warn!(packet = %packet_id, error = %e, "Snapshot write failed; state retained in memory");
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Snapshot of one tracked state
    pub fn state(&self, packet_id: PacketId) -> Option<MessageState> {
        self.store.read().get(packet_id).cloned()
    }

    /// Snapshot of the state behind a Matrix event
    pub fn state_by_event(&self, event_id: &str) -> Option<MessageState> {
        self.store.read().get_by_event(event_id).cloned()
    }

    /// Number of tracked packets
    pub fn message_count(&self) -> usize {
        self.store.read().len()
    }
}

/// Payload text in priority order: decoded text, decoded emoji, raw bytes
/// as UTF-8. Empty text drops the packet except on the reaction port.
fn extract_text(packet: &MeshPacket) -> Option<String> {
    let decoded = &packet.decoded;
    let text = decoded
        .text
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| decoded.emoji.clone().filter(|t| !t.is_empty()))
        .or_else(|| {
            decoded
                .payload
                .as_ref()
                .and_then(|bytes| String::from_utf8(bytes.clone()).ok())
                .filter(|t| !t.is_empty())
        });
    match text {
        Some(text) => Some(text),
        None if packet.port() == PortNum::Reaction => Some(String::new()),
        None => None,
    }
}

/// Strip Matrix's quoted-reply fallback (leading `>` lines up to the first
/// blank line) from a reply body
fn strip_reply_fallback(body: &str) -> &str {
    if !body.starts_with('>') {
        return body;
    }
    match body.split_once("\n\n") {
        Some((_, rest)) => rest,
        None => body,
    }
}

/// The coordinator event loop
///
/// Feeds [`BridgeCore`] from the mesh and Matrix channels, runs the
/// retention sweep on its interval, and drains in-flight handlers at
/// shutdown.
pub struct Bridge {
    core: Arc<BridgeCore>,
    mesh_rx: mpsc::Receiver<MeshEvent>,
    matrix_rx: mpsc::Receiver<MatrixEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Bridge {
    /// Wire the loop to its input channels
    pub fn new(
        core: Arc<BridgeCore>,
        mesh_rx: mpsc::Receiver<MeshEvent>,
        matrix_rx: mpsc::Receiver<MatrixEvent>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            core,
            mesh_rx,
            matrix_rx,
            shutdown_rx,
        }
    }

    /// Run until shutdown is signalled or every input closes
    pub async fn run(mut self) {
        let mut handlers: JoinSet<()> = JoinSet::new();
        let mut sweep = tokio::time::interval(self.core.options.retention.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        sweep.tick().await;

        info!("Bridge coordinator running");
        loop {
            tokio::select! {
                event = self.mesh_rx.recv() => match event {
                    Some(event) => {
                        let core = Arc::clone(&self.core);
                        handlers.spawn(async move { core.handle_mesh_event(event).await });
                    }
                    None => {
                        warn!("All mesh sources disconnected");
                        break;
                    }
                },
                event = self.matrix_rx.recv() => match event {
                    Some(event) => {
                        let core = Arc::clone(&self.core);
                        handlers.spawn(async move { core.handle_matrix_event(event).await });
                    }
                    None => {
                        warn!("Matrix event stream closed");
                        break;
                    }
                },
                _ = sweep.tick() => self.core.sweep_expired().await,
                changed = self.shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown requested");
                        break;
                    }
                }
            }

            // Reap finished handlers without blocking the loop
            while let Some(finished) = handlers.try_join_next() {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!(error = %e, "Packet handler panicked");
                    }
                }
            }
        }

        drain(handlers).await;
        info!("Bridge coordinator stopped");
    }
}

/// Wait for in-flight handlers, aborting whatever outlives the deadline
async fn drain(mut handlers: JoinSet<()>) {
    if handlers.is_empty() {
        return;
    }
    info!(in_flight = handlers.len(), "Draining in-flight handlers");
    let all_done = async {
        while handlers.join_next().await.is_some() {}
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, all_done).await.is_err() {
        warn!("Drain deadline passed, aborting remaining handlers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::Decoded;
    use serde_json::Map;

    fn packet(port: u32, text: Option<&str>, payload: Option<&[u8]>) -> MeshPacket {
        MeshPacket {
            id: PacketId(1),
            from: NodeId(2),
            to: NodeId::BROADCAST,
            channel: 0,
            channel_name: None,
            hop_start: 0,
            hop_limit: 0,
            reply_id: None,
            decoded: Decoded {
                port: Some(port),
                text: text.map(str::to_string),
                payload: payload.map(<[u8]>::to_vec),
                ..Default::default()
            },
            extra: Map::new(),
        }
    }

    #[test]
    fn test_extract_text_priority() {
        assert_eq!(
            extract_text(&packet(1, Some("hi"), Some(b"raw"))),
            Some("hi".to_string())
        );
        assert_eq!(
            extract_text(&packet(1, None, Some(b"raw"))),
            Some("raw".to_string())
        );
        assert_eq!(extract_text(&packet(1, None, None)), None);
        // Reaction-port packets survive empty extraction
        assert_eq!(extract_text(&packet(68, None, None)), Some(String::new()));
    }

    #[test]
    fn test_extract_text_rejects_invalid_utf8() {
        assert_eq!(extract_text(&packet(1, None, Some(&[0xFF, 0xFE]))), None);
    }

    #[test]
    fn test_strip_reply_fallback() {
        let body = "> <@bob:example.org> original text\n\nactual reply";
        assert_eq!(strip_reply_fallback(body), "actual reply");
        assert_eq!(strip_reply_fallback("no quote here"), "no quote here");
        assert_eq!(strip_reply_fallback("> dangling quote"), "> dangling quote");
    }
}
