//! In-memory name directory
//!
//! NODEINFO broadcasts advertise each node's short and long names. The
//! directory caches them so rendering stays synchronous; updates are written
//! through to the state store by the coordinator. Unknown nodes render as
//! `Node!hex`.

use std::collections::HashMap;

use meshlink_core::{GatewayId, NodeId};

#[derive(Debug, Clone, Default)]
struct NodeNames {
    short: Option<String>,
    long: Option<String>,
}

/// NODEINFO-derived node name cache
#[derive(Debug, Default)]
pub struct NameDirectory {
    nodes: HashMap<NodeId, NodeNames>,
}

impl NameDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted `(node, short, long)` rows
    pub fn from_entries(
        entries: impl IntoIterator<Item = (NodeId, Option<String>, Option<String>)>,
    ) -> Self {
        let mut dir = Self::new();
        for (node, short, long) in entries {
            dir.update(node, short, long);
        }
        dir
    }

    /// Record advertised names, keeping any name the update omits
    pub fn update(&mut self, node: NodeId, short: Option<String>, long: Option<String>) {
        let entry = self.nodes.entry(node).or_default();
        if short.is_some() {
            entry.short = short;
        }
        if long.is_some() {
            entry.long = long;
        }
    }

    /// Display name for a node: short name, then long name, then `Node!hex`
    pub fn node_name(&self, node: NodeId) -> String {
        match self.nodes.get(&node) {
            Some(names) => names
                .short
                .clone()
                .or_else(|| names.long.clone())
                .unwrap_or_else(|| format!("Node{}", node)),
            None => format!("Node{}", node),
        }
    }

    /// Display name for a reporting gateway
    pub fn gateway_name(&self, gateway: &GatewayId) -> String {
        match gateway {
            GatewayId::Node(node) => self.node_name(*node),
            GatewayId::Lan => "lan".to_string(),
        }
    }

    /// Number of known nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_hex_form() {
        let dir = NameDirectory::new();
        assert_eq!(dir.node_name(NodeId(0xAE614908)), "Node!ae614908");
        assert_eq!(dir.gateway_name(&GatewayId::Lan), "lan");
    }

    #[test]
    fn test_short_name_wins() {
        let mut dir = NameDirectory::new();
        dir.update(
            NodeId(1),
            Some("ALCE".to_string()),
            Some("Alice's Node".to_string()),
        );
        assert_eq!(dir.node_name(NodeId(1)), "ALCE");
    }

    #[test]
    fn test_partial_update_keeps_other_name() {
        let mut dir = NameDirectory::new();
        dir.update(NodeId(1), None, Some("Alice's Node".to_string()));
        assert_eq!(dir.node_name(NodeId(1)), "Alice's Node");
        dir.update(NodeId(1), Some("ALCE".to_string()), None);
        assert_eq!(dir.node_name(NodeId(1)), "ALCE");
        // The long name is still there behind the short one
        dir.update(NodeId(1), None, None);
        assert_eq!(dir.node_name(NodeId(1)), "ALCE");
    }
}
