//! Meshlink Bridge - Bidirectional Meshtastic ↔ Matrix message bridge
//!
//! The core of the bridge is the state manager in [`bridge`]: it correlates
//! packets observed from multiple independent sources (MQTT gateways and a
//! locally attached radio), deduplicates them, aggregates per-gateway
//! reception stats into a single progressively edited Matrix event, threads
//! replies, and mirrors reactions in both directions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Bridge                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  MQTT source ──┐                          ┌── Matrix sync    │
//! │                ├─► BridgeCore ◄───────────┤                  │
//! │  Radio TCP  ───┘   │ Resolver │           └── Matrix client  │
//! │        ▲           │ Renderer │                    ▲         │
//! │        │           │ Store    │────────────────────┘         │
//! │        └───────────│ Locks    │                              │
//! │     (text/tapback) └─ SQLite snapshots                       │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`bridge`] - The coordinator: inbound mesh pipeline, outbound Matrix
//!   routing, event loop
//! - [`resolver`] - Classifies packets as new messages, replies, or
//!   reactions and locates their targets
//! - [`render`] - Pure rendering of message state into Matrix bodies
//! - [`store`] - In-memory two-way message-state index
//! - [`locks`] - Per-packet-id handler serialisation
//! - [`names`] - NODEINFO-derived display-name cache
//! - [`split`] - Grapheme-safe outbound message splitting
//! - [`lifecycle`] - Retention sweeps
//! - [`config`] - Environment-sourced settings

pub mod bridge;
pub mod config;
pub mod lifecycle;
pub mod locks;
pub mod names;
pub mod render;
pub mod resolver;
pub mod split;
pub mod store;

pub use bridge::{Bridge, BridgeCore};
pub use config::Settings;
pub use names::NameDirectory;
pub use store::MessageStore;
