//! Per-gateway reception statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::GatewayId;
use crate::packet::MeshPacket;

/// One gateway's observation of a packet
///
/// Every gateway that hears a packet reports its own link metrics; the bridge
/// aggregates one `ReceptionStats` per gateway into the evolving Matrix event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionStats {
    /// The radio that reported this reception
    pub gateway: GatewayId,
    /// Received signal strength in dBm, 0 if unknown
    pub rssi: i32,
    /// Signal-to-noise ratio in dB, 0.0 if unknown
    pub snr: f32,
    /// `hop_start - hop_limit` at the receiving node
    pub hop_count: u32,
    /// When the bridge observed this reception
    pub observed_at: DateTime<Utc>,
}

impl ReceptionStats {
    /// Build stats for a packet as heard by `gateway`
    pub fn observed(gateway: GatewayId, rssi: i32, snr: f32, hop_count: u32) -> Self {
        Self {
            gateway,
            rssi,
            snr,
            hop_count,
            observed_at: Utc::now(),
        }
    }

    /// Whether the gateway heard the packet directly off the air
    pub fn is_direct(&self) -> bool {
        self.hop_count == 0
    }
}

/// A packet observation as submitted by a mesh source
///
/// This is the payload of the single thread-safe submission channel between
/// the I/O tasks and the bridge coordinator.
#[derive(Debug, Clone)]
pub struct MeshObservation {
    /// The decoded packet
    pub packet: MeshPacket,
    /// Which transport delivered it
    pub source: crate::packet::PacketSource,
    /// The reporting gateway's link metrics
    pub stats: ReceptionStats,
}

/// Everything a mesh source can hand to the coordinator
///
/// Name records arrive both inside NODEINFO packets and, on the LAN path,
/// from the radio's node-database dump; sources normalise the latter into
/// `NodeName` events.
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// A packet observation
    Observation(MeshObservation),
    /// A node-name record for the name directory
    NodeName {
        /// The advertising node
        node: crate::id::NodeId,
        /// Short display name
        short_name: Option<String>,
        /// Long display name
        long_name: Option<String>,
    },
}
