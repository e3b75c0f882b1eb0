//! Mesh identifiers
//!
//! Meshtastic assigns 32-bit identifiers to both radios and packets. Node ids
//! are stable per device; packet ids are unique only within a rolling window.
//! Both render in the conventional `!hex` form used across the Meshtastic
//! ecosystem (8 lowercase hex digits prefixed with `!`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MeshlinkError;

/// Identifier of a radio on the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Broadcast destination used by the mesh
    pub const BROADCAST: NodeId = NodeId(0xFFFFFFFF);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

impl FromStr for NodeId {
    type Err = MeshlinkError;

    /// Accepts both the `!hex` wire form and a bare decimal id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix('!') {
            let value = u32::from_str_radix(hex, 16)
                .map_err(|_| MeshlinkError::InvalidNodeId(s.to_string()))?;
            return Ok(NodeId(value));
        }
        s.parse::<u32>()
            .map(NodeId)
            .map_err(|_| MeshlinkError::InvalidNodeId(s.to_string()))
    }
}

/// Identifier of a packet on the mesh
///
/// Unique within a rolling window only; the bridge treats a recurrence of the
/// same id as another observation of the same logical packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(pub u32);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}", self.0)
    }
}

impl From<u32> for PacketId {
    fn from(value: u32) -> Self {
        PacketId(value)
    }
}

impl FromStr for PacketId {
    type Err = MeshlinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix('!') {
            let value = u32::from_str_radix(hex, 16)
                .map_err(|_| MeshlinkError::InvalidPacketId(s.to_string()))?;
            return Ok(PacketId(value));
        }
        s.parse::<u32>()
            .map(PacketId)
            .map_err(|_| MeshlinkError::InvalidPacketId(s.to_string()))
    }
}

/// The radio that reported a reception
///
/// MQTT gateways identify themselves with their node id; the locally attached
/// radio reports as the synthetic `"lan"` gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GatewayId {
    /// An MQTT gateway node
    Node(NodeId),
    /// The radio attached over TCP
    Lan,
}

impl GatewayId {
    /// Stable key used for reception-set membership
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayId::Node(id) => write!(f, "{}", id),
            GatewayId::Lan => write!(f, "lan"),
        }
    }
}

impl FromStr for GatewayId {
    type Err = MeshlinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "lan" {
            return Ok(GatewayId::Lan);
        }
        s.parse::<NodeId>().map(GatewayId::Node)
    }
}

impl Serialize for GatewayId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GatewayId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(0xAE614908).to_string(), "!ae614908");
        assert_eq!(NodeId(0xAE61).to_string(), "!0000ae61");
    }

    #[test]
    fn test_node_id_parse() {
        assert_eq!("!ae614908".parse::<NodeId>().unwrap(), NodeId(0xAE614908));
        assert_eq!("42".parse::<NodeId>().unwrap(), NodeId(42));
        assert!("!zzzz".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_packet_id_roundtrip() {
        let id = PacketId(0x1111);
        assert_eq!(id.to_string().parse::<PacketId>().unwrap(), id);
    }

    #[test]
    fn test_gateway_id_forms() {
        assert_eq!(GatewayId::Lan.to_string(), "lan");
        assert_eq!(GatewayId::Node(NodeId(0xAE61)).to_string(), "!0000ae61");
        assert_eq!("lan".parse::<GatewayId>().unwrap(), GatewayId::Lan);
        assert_eq!(
            "!0000ae61".parse::<GatewayId>().unwrap(),
            GatewayId::Node(NodeId(0xAE61))
        );
    }

    #[test]
    fn test_gateway_id_serde() {
        let json = serde_json::to_string(&GatewayId::Lan).unwrap();
        assert_eq!(json, "\"lan\"");
        let back: GatewayId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GatewayId::Lan);
    }
}
