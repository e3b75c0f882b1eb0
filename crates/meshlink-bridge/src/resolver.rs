//! Reply and reaction classification
//!
//! Decides what an inbound packet *is*: a fresh message, a reply to a known
//! packet, or a tapback reaction. Linkage hides in several places across
//! firmware revisions, so resolution walks a fixed priority order and the
//! first rule that applies wins:
//!
//! 1. an explicit reply-id field (standard, top-level, or inside a
//!    `reaction` substructure)
//! 2. a bounded deep scan of the untyped decoded fields for a
//!    reply-id/reference-id shaped key
//! 3. the legacy textual form `[Reaction to !<hex>]: <emoji>`
//! 4. the emoji-only heuristic against the last packet seen on the channel
//!
//! Explicit linkage always beats heuristics, even when it points at a packet
//! the bridge has never seen.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use meshlink_core::{MeshPacket, PacketId, PortNum};

use crate::store::MessageStore;

/// Bound on the deep linkage scan, to keep pathological payloads cheap
const MAX_SCAN_DEPTH: usize = 4;

/// Field names that carry reply linkage across protocol revisions
const REPLY_KEYS: &[&str] = &[
    "reply_id",
    "replyId",
    "reply_to",
    "replyTo",
    "request_id",
    "requestId",
];

/// What an inbound packet turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A fresh message; render a new Matrix event
    New,
    /// A reply; thread under the parent's Matrix event
    Reply {
        /// The packet being replied to
        parent: PacketId,
    },
    /// A tapback; mutate the parent's Matrix event
    Reaction {
        /// The packet being reacted to
        parent: PacketId,
    },
    /// The bridge's own tapback coming back around in legacy textual form;
    /// dropped without side effects
    OwnEcho,
}

/// Packet classifier
#[derive(Debug)]
pub struct Resolver {
    window: Duration,
}

impl Resolver {
    /// Resolver with the given emoji-only correlation window
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(600)),
        }
    }

    /// Classify a packet given its extracted text and the current store
    pub fn classify(
        &self,
        packet: &MeshPacket,
        text: &str,
        store: &MessageStore,
        now: DateTime<Utc>,
    ) -> Classification {
        let is_reaction_port = packet.port() == PortNum::Reaction;

        if let Some(parent) = explicit_reply(packet).or_else(|| deep_scan(packet)) {
            return if is_reaction_port {
                Classification::Reaction { parent }
            } else {
                Classification::Reply { parent }
            };
        }

        if let Some(parent) = parse_legacy_reaction(text) {
            if store.get(parent).is_some_and(|s| s.is_matrix_origin) {
                return Classification::OwnEcho;
            }
            return Classification::Reaction { parent };
        }

        if is_emoji_only(text) || is_reaction_port {
            if let Some((parent, seen_at)) = store.last_seen(packet.channel) {
                if parent != packet.id && now - seen_at <= self.window {
                    return Classification::Reaction { parent };
                }
            }
        }

        Classification::New
    }
}

/// Rule 1: conventional reply-id fields
fn explicit_reply(packet: &MeshPacket) -> Option<PacketId> {
    if let Some(parent) = packet.reply_id {
        return Some(parent);
    }
    for map in [&packet.decoded.extra, &packet.extra] {
        for key in REPLY_KEYS {
            if let Some(parent) = map.get(*key).and_then(as_packet_id) {
                return Some(parent);
            }
        }
        if let Some(Value::Object(reaction)) = map.get("reaction") {
            for key in REPLY_KEYS {
                if let Some(parent) = reaction.get(*key).and_then(as_packet_id) {
                    return Some(parent);
                }
            }
        }
    }
    None
}

/// Rule 2: bounded recursive scan for reply-id/reference-id shaped fields
fn deep_scan(packet: &MeshPacket) -> Option<PacketId> {
    scan_map(&packet.decoded.extra, 1).or_else(|| scan_map(&packet.extra, 1))
}

fn scan_map(map: &Map<String, Value>, depth: usize) -> Option<PacketId> {
    for (key, value) in map {
        if is_linkage_key(key) {
            if let Some(parent) = as_packet_id(value) {
                return Some(parent);
            }
        }
        if depth < MAX_SCAN_DEPTH {
            let nested = match value {
                Value::Object(inner) => scan_map(inner, depth + 1),
                Value::Array(items) => items.iter().find_map(|item| match item {
                    Value::Object(inner) => scan_map(inner, depth + 1),
                    _ => None,
                }),
                _ => None,
            };
            if nested.is_some() {
                return nested;
            }
        }
    }
    None
}

/// Matches `reply_id`/`replyId`/`reference-id`-shaped field names
fn is_linkage_key(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    normalized == "replyid" || normalized == "referenceid"
}

/// A non-zero packet id carried as an integer or `!hex` string
fn as_packet_id(value: &Value) -> Option<PacketId> {
    match value {
        Value::Number(n) => {
            let id = n.as_u64().filter(|&v| v != 0 && v <= u32::MAX as u64)?;
            Some(PacketId(id as u32))
        }
        Value::String(s) => s.parse::<PacketId>().ok().filter(|id| id.0 != 0),
        _ => None,
    }
}

/// Rule 3: the legacy textual reaction form
fn parse_legacy_reaction(text: &str) -> Option<PacketId> {
    let rest = text.strip_prefix("[Reaction to !")?;
    let (hex, emoji) = rest.split_once("]: ")?;
    if emoji.is_empty() {
        return None;
    }
    let id = u32::from_str_radix(hex, 16).ok()?;
    (id != 0).then_some(PacketId(id))
}

/// Short, letter-free text is treated as an emoji candidate
fn is_emoji_only(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.len() < 12 && !trimmed.chars().any(|c| c.is_ascii_alphabetic())
}
