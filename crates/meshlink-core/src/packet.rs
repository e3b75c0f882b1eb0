//! Decoded mesh packet model
//!
//! The decoded part of a Meshtastic packet is a moving target: protocol
//! revisions keep adding fields, and the MQTT and LAN paths surface slightly
//! different shapes. The model here is a tagged core (the fields every
//! revision agrees on) plus untyped `extra` maps that preserve whatever else
//! a source decoded, so the reply-linkage scan can look at fields this crate
//! has never heard of.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{NodeId, PacketId};

/// Application port numbers carried in the decoded payload
///
/// Subset of the Meshtastic PortNum enum that the bridge cares about.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortNum {
    /// Unknown/invalid port
    Unknown = 0,
    /// UTF-8 text messages
    TextMessage = 1,
    /// GPS position broadcasts
    Position = 3,
    /// Node name/identity broadcasts
    NodeInfo = 4,
    /// Routing control traffic
    Routing = 5,
    /// Admin messages
    Admin = 6,
    /// Device telemetry
    Telemetry = 67,
    /// Tapback reactions (emoji referring to a prior packet)
    Reaction = 68,
}

impl From<u32> for PortNum {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::TextMessage,
            3 => Self::Position,
            4 => Self::NodeInfo,
            5 => Self::Routing,
            6 => Self::Admin,
            67 => Self::Telemetry,
            68 => Self::Reaction,
            _ => Self::Unknown,
        }
    }
}

impl From<PortNum> for u32 {
    fn from(port: PortNum) -> Self {
        port as u32
    }
}

/// NODEINFO user record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUser {
    /// Short display name (up to 4 characters on most firmware)
    pub short_name: Option<String>,
    /// Long display name
    pub long_name: Option<String>,
}

/// The decoded payload of a mesh packet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decoded {
    /// Application port
    pub port: Option<u32>,
    /// Text payload, when the source already decoded one
    pub text: Option<String>,
    /// Emoji payload used by some firmware revisions for tapbacks
    pub emoji: Option<String>,
    /// Raw payload bytes
    pub payload: Option<Vec<u8>>,
    /// NODEINFO user record, when present
    pub user: Option<NodeUser>,
    /// Fields this revision of the bridge does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One mesh packet as handed to the bridge by a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshPacket {
    /// Packet identifier
    pub id: PacketId,
    /// Originating node
    pub from: NodeId,
    /// Destination node (broadcast for most bridged traffic)
    pub to: NodeId,
    /// Channel index the packet was heard on
    pub channel: u32,
    /// Channel name, when the source knows it (LAN path)
    pub channel_name: Option<String>,
    /// Hop budget the sender started with
    pub hop_start: u32,
    /// Remaining hop budget at the receiving node
    pub hop_limit: u32,
    /// Standard reply-id field, when present and non-zero
    pub reply_id: Option<PacketId>,
    /// Decoded payload
    pub decoded: Decoded,
    /// Packet-level fields outside the modelled core
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl MeshPacket {
    /// Number of intermediate radios this packet travelled through before the
    /// reporting gateway heard it. Zero means direct reception.
    pub fn hop_count(&self) -> u32 {
        self.hop_start.saturating_sub(self.hop_limit)
    }

    /// Application port of the decoded payload
    pub fn port(&self) -> PortNum {
        PortNum::from(self.decoded.port.unwrap_or(0))
    }

    /// Whether this packet is addressed to everyone
    pub fn is_broadcast(&self) -> bool {
        self.to == NodeId::BROADCAST
    }
}

/// Which transport delivered an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketSource {
    /// Shared MQTT broker
    Mqtt,
    /// Locally attached radio over TCP
    Lan,
}

impl std::fmt::Display for PacketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketSource::Mqtt => write!(f, "mqtt"),
            PacketSource::Lan => write!(f, "lan"),
        }
    }
}
