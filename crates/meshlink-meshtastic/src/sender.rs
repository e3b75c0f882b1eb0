//! The mesh sink seam
//!
//! The bridge routes Matrix traffic onto the mesh through this trait. The
//! real implementation is [`crate::radio::RadioHandle`]; tests substitute
//! recording mocks, and a bridge configured without a radio gets
//! [`DisabledSender`].

use async_trait::async_trait;

use meshlink_core::{NodeId, PacketId};

use crate::error::{MeshtasticError, Result};

/// Outbound operations on the mesh
#[async_trait]
pub trait MeshSender: Send + Sync {
    /// Broadcast a text message, returning the assigned packet id.
    ///
    /// `reply_id` threads the packet as a reply to a prior mesh packet.
    async fn send_text(
        &self,
        text: &str,
        channel: u32,
        reply_id: Option<PacketId>,
    ) -> Result<PacketId>;

    /// Send a tapback reaction targeting a prior packet
    async fn send_tapback(&self, target: PacketId, emoji: &str, channel: u32)
        -> Result<PacketId>;

    /// The sending radio's own node id, when known
    fn local_node(&self) -> Option<NodeId> {
        None
    }
}

/// Sink used when no radio is configured (MQTT-only deployments).
///
/// Every send fails as not-connected; the bridge logs and drops the
/// Matrix-side message.
pub struct DisabledSender;

#[async_trait]
impl MeshSender for DisabledSender {
    async fn send_text(
        &self,
        _text: &str,
        _channel: u32,
        _reply_id: Option<PacketId>,
    ) -> Result<PacketId> {
        Err(MeshtasticError::NotConnected)
    }

    async fn send_tapback(
        &self,
        _target: PacketId,
        _emoji: &str,
        _channel: u32,
    ) -> Result<PacketId> {
        Err(MeshtasticError::NotConnected)
    }
}
