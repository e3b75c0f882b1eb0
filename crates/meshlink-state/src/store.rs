//! SQLite-backed storage
//!
//! Two tables back the bridge: `nodes` is the NODEINFO-derived name
//! directory, `message_states` holds one JSON snapshot per correlated packet.
//! Snapshots are whole-row replacements; the in-memory store is authoritative
//! between writes.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use meshlink_core::{MessageState, NodeId, PacketId, StateStore};

use crate::error::{Result, StateError};

/// SQLite persistence for node names and message-state snapshots
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) the database at `path` and run migrations
    pub async fn open(path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);
        Self::connect(&url).await
    }

    /// Connect to an explicit sqlx database URL
    pub async fn connect(url: &str) -> Result<Self> {
        // A single connection serializes writers and keeps `sqlite::memory:`
        // databases coherent under test.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        let store = Self { pool };
        store.run_migrations().await?;
        info!(url = %url, "State store initialised");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                node_id INTEGER PRIMARY KEY,
                short_name TEXT,
                long_name TEXT,
                last_seen INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_states (
                packet_id INTEGER PRIMARY KEY,
                snapshot TEXT NOT NULL,
                last_update INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Migration(e.to_string()))?;

        Ok(())
    }

    /// Persist one message state, replacing any previous snapshot
    pub async fn save_state(&self, state: &MessageState) -> Result<()> {
        let snapshot = serde_json::to_string(state)?;
        sqlx::query(
            r#"
            INSERT INTO message_states (packet_id, snapshot, last_update)
            VALUES (?, ?, ?)
            ON CONFLICT(packet_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                last_update = excluded.last_update
            "#,
        )
        .bind(state.packet_id.0 as i64)
        .bind(snapshot)
        .bind(state.last_update_at.timestamp())
        .execute(&self.pool)
        .await?;
        debug!(packet = %state.packet_id, "Snapshot persisted");
        Ok(())
    }

    /// Load every snapshot, oldest first
    ///
    /// A snapshot that no longer decodes is store corruption and fails the
    /// load with the offending packet id.
    pub async fn load_states(&self) -> Result<Vec<MessageState>> {
        let rows = sqlx::query(
            "SELECT packet_id, snapshot FROM message_states ORDER BY last_update ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let packet_id: i64 = row.get("packet_id");
            let snapshot: String = row.get("snapshot");
            let mut state: MessageState =
                serde_json::from_str(&snapshot).map_err(|e| StateError::CorruptSnapshot {
                    packet_id,
                    reason: e.to_string(),
                })?;
            state.rebuild_index();
            states.push(state);
        }
        Ok(states)
    }

    /// Remove the snapshot for one packet
    pub async fn delete_state(&self, packet_id: PacketId) -> Result<()> {
        sqlx::query("DELETE FROM message_states WHERE packet_id = ?")
            .bind(packet_id.0 as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record or refresh a node's advertised names, keeping the previous
    /// value for any name the update omits
    pub async fn upsert_node(
        &self,
        node_id: NodeId,
        short_name: Option<&str>,
        long_name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (node_id, short_name, long_name, last_seen)
            VALUES (?, ?, ?, strftime('%s', 'now'))
            ON CONFLICT(node_id) DO UPDATE SET
                short_name = COALESCE(excluded.short_name, short_name),
                long_name = COALESCE(excluded.long_name, long_name),
                last_seen = excluded.last_seen
            "#,
        )
        .bind(node_id.0 as i64)
        .bind(short_name)
        .bind(long_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the full name directory
    pub async fn load_nodes(&self) -> Result<Vec<(NodeId, Option<String>, Option<String>)>> {
        let rows = sqlx::query("SELECT node_id, short_name, long_name FROM nodes")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.get("node_id");
                (
                    NodeId(id as u32),
                    row.get::<Option<String>, _>("short_name"),
                    row.get::<Option<String>, _>("long_name"),
                )
            })
            .collect())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn save_message_state(&self, state: &MessageState) -> meshlink_core::Result<()> {
        self.save_state(state).await.map_err(Into::into)
    }

    async fn load_message_states(&self) -> meshlink_core::Result<Vec<MessageState>> {
        self.load_states().await.map_err(Into::into)
    }

    async fn delete_message_state(&self, packet_id: PacketId) -> meshlink_core::Result<()> {
        self.delete_state(packet_id).await.map_err(Into::into)
    }

    async fn upsert_node_name(
        &self,
        node_id: NodeId,
        short_name: Option<&str>,
        long_name: Option<&str>,
    ) -> meshlink_core::Result<()> {
        self.upsert_node(node_id, short_name, long_name)
            .await
            .map_err(Into::into)
    }

    async fn load_node_names(
        &self,
    ) -> meshlink_core::Result<Vec<(NodeId, Option<String>, Option<String>)>> {
        self.load_nodes().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::{GatewayId, ReceptionStats};

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn state(packet: u32) -> MessageState {
        let mut s = MessageState::new_mesh(
            PacketId(packet),
            NodeId(0xAE614908),
            0,
            "hello",
            ReceptionStats::observed(GatewayId::Lan, -40, 8.0, 0),
        );
        s.set_matrix_event(format!("$evt{}", packet));
        s
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let store = memory_store().await;
        store.save_state(&state(1)).await.unwrap();
        store.save_state(&state(2)).await.unwrap();

        let loaded = store.load_states().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let first = loaded.iter().find(|s| s.packet_id == PacketId(1)).unwrap();
        assert_eq!(first.matrix_event_id.as_deref(), Some("$evt1"));
        assert_eq!(first.reception_list.len(), 1);
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = memory_store().await;
        let mut s = state(1);
        store.save_state(&s).await.unwrap();
        s.merge_reception(ReceptionStats::observed(
            GatewayId::Node(NodeId(0xAE61)),
            -70,
            3.0,
            1,
        ));
        store.save_state(&s).await.unwrap();

        let loaded = store.load_states().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].reception_list.len(), 2);
    }

    #[tokio::test]
    async fn test_loaded_state_deduplicates_gateways() {
        let store = memory_store().await;
        store.save_state(&state(1)).await.unwrap();
        let mut loaded = store.load_states().await.unwrap().remove(0);
        // Index was rebuilt on load; the lan gateway is already known
        assert!(!loaded.merge_reception(ReceptionStats::observed(GatewayId::Lan, -30, 9.5, 0)));
    }

    #[tokio::test]
    async fn test_delete_state() {
        let store = memory_store().await;
        store.save_state(&state(1)).await.unwrap();
        store.delete_state(PacketId(1)).await.unwrap();
        assert!(store.load_states().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_node_upsert_keeps_known_names() {
        let store = memory_store().await;
        let node = NodeId(0xAE61);
        store
            .upsert_node(node, Some("AE61"), Some("Alice's Node"))
            .await
            .unwrap();
        // A later NODEINFO without a long name must not erase it
        store.upsert_node(node, Some("AE61"), None).await.unwrap();

        let nodes = store.load_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].1.as_deref(), Some("AE61"));
        assert_eq!(nodes[0].2.as_deref(), Some("Alice's Node"));
    }
}
