//! Meshlink Meshtastic - Mesh transports for the Meshtastic-Matrix bridge
//!
//! Two independent paths deliver mesh packets to the bridge:
//!
//! 1. **MQTT** - gateway radios publish `ServiceEnvelope` protobufs to a
//!    shared broker; payloads may still carry channel encryption
//! 2. **Radio TCP** - a locally attached radio streams framed
//!    `FromRadio`/`ToRadio` protobufs; this path is also the sink for
//!    Matrix-originated sends
//!
//! Both normalise wire packets into the [`meshlink_core`] packet model and
//! submit them over a single channel, so the bridge never cares which
//! transport heard a packet first.
//!
//! # Message Flow
//!
//! ## Mesh → bridge
//!
//! 1. Transport decodes (and, for MQTT, decrypts) the wire packet
//! 2. [`translate`] lifts it into a `MeshPacket` + `ReceptionStats`
//! 3. The observation is submitted on the bridge channel
//!
//! ## Bridge → mesh
//!
//! 1. The bridge calls [`MeshSender::send_text`] / [`MeshSender::send_tapback`]
//! 2. [`radio::RadioHandle`] assigns a fresh packet id and frames a `ToRadio`
//! 3. The returned id registers the packet for MQTT echo suppression

#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod mqtt;
pub mod proto;
pub mod radio;
pub mod sender;
pub mod translate;

pub use config::{MqttConfig, RadioConfig, LORA_MAX_PAYLOAD, MAX_TEXT_PAYLOAD};
pub use crypto::ChannelKey;
pub use error::{MeshtasticError, Result};
pub use mqtt::MqttSource;
pub use radio::{RadioHandle, RadioLink};
pub use sender::{DisabledSender, MeshSender};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
