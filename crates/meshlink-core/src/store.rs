//! Persistence seam
//!
//! The bridge snapshots message states and node names through this trait;
//! the SQLite implementation lives in `meshlink-state`, and tests substitute
//! in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::id::{NodeId, PacketId};
use crate::message::MessageState;

/// Durable storage for bridge state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist one message state snapshot (insert or replace)
    async fn save_message_state(&self, state: &MessageState) -> Result<()>;

    /// Load every persisted message state
    async fn load_message_states(&self) -> Result<Vec<MessageState>>;

    /// Delete the snapshot for a packet
    async fn delete_message_state(&self, packet_id: PacketId) -> Result<()>;

    /// Record or refresh a node's advertised names
    async fn upsert_node_name(
        &self,
        node_id: NodeId,
        short_name: Option<&str>,
        long_name: Option<&str>,
    ) -> Result<()>;

    /// Load the full name directory
    async fn load_node_names(&self) -> Result<Vec<(NodeId, Option<String>, Option<String>)>>;
}
