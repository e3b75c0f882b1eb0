//! Meshtastic protobuf wire messages
//!
//! Hand-declared prost messages covering the subset of the Meshtastic
//! protocol the bridge speaks: the `ServiceEnvelope` that gateways publish to
//! MQTT, the `FromRadio`/`ToRadio` stream exchanged with a radio over TCP,
//! and the `Data` payload carried inside packets. Field numbers follow the
//! upstream `.proto` definitions; fields the bridge never reads are simply
//! left undeclared and skip harmlessly on decode.

/// Decoded application payload of a mesh packet
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    /// Application port number
    #[prost(uint32, tag = "1")]
    pub portnum: u32,
    /// Opaque payload bytes (UTF-8 text on the text and reaction ports)
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    /// Sender requests a response
    #[prost(bool, tag = "3")]
    pub want_response: bool,
    /// Original destination for tunnelled packets
    #[prost(fixed32, tag = "4")]
    pub dest: u32,
    /// Original source for tunnelled packets
    #[prost(fixed32, tag = "5")]
    pub source: u32,
    /// Request this payload responds to
    #[prost(fixed32, tag = "6")]
    pub request_id: u32,
    /// Packet this payload replies or reacts to
    #[prost(fixed32, tag = "7")]
    pub reply_id: u32,
    /// Non-zero when the payload is a tapback emoji
    #[prost(fixed32, tag = "8")]
    pub emoji: u32,
}

/// A packet as routed on the mesh
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshPacket {
    /// Originating node
    #[prost(fixed32, tag = "1")]
    pub from: u32,
    /// Destination node (0xFFFFFFFF for broadcast)
    #[prost(fixed32, tag = "2")]
    pub to: u32,
    /// Channel index
    #[prost(uint32, tag = "3")]
    pub channel: u32,
    /// Cleartext or encrypted payload
    #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
    pub payload_variant: Option<mesh_packet::PayloadVariant>,
    /// Packet identifier
    #[prost(fixed32, tag = "6")]
    pub id: u32,
    /// Reception time at the reporting node (unix seconds)
    #[prost(fixed32, tag = "7")]
    pub rx_time: u32,
    /// Signal-to-noise ratio at the reporting node
    #[prost(float, tag = "8")]
    pub rx_snr: f32,
    /// Remaining hop budget
    #[prost(uint32, tag = "9")]
    pub hop_limit: u32,
    /// Sender requested an acknowledgement
    #[prost(bool, tag = "10")]
    pub want_ack: bool,
    /// Signal strength at the reporting node
    #[prost(int32, tag = "12")]
    pub rx_rssi: i32,
    /// Hop budget the sender started with
    #[prost(uint32, tag = "15")]
    pub hop_start: u32,
}

/// Nested types for [`MeshPacket`]
pub mod mesh_packet {
    /// Payload of a mesh packet
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Payload already decoded by the reporting node
        #[prost(message, tag = "4")]
        Decoded(super::Data),
        /// AES-CTR encrypted payload (channel PSK)
        #[prost(bytes, tag = "5")]
        Encrypted(Vec<u8>),
    }
}

/// Wrapper gateways publish to the MQTT broker
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceEnvelope {
    /// The observed packet
    #[prost(message, optional, tag = "1")]
    pub packet: Option<MeshPacket>,
    /// Channel name the gateway heard the packet on
    #[prost(string, tag = "2")]
    pub channel_id: String,
    /// Reporting gateway in `!hex` form
    #[prost(string, tag = "3")]
    pub gateway_id: String,
}

/// NODEINFO user record
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    /// Node id in `!hex` form
    #[prost(string, tag = "1")]
    pub id: String,
    /// Long display name
    #[prost(string, tag = "2")]
    pub long_name: String,
    /// Short display name
    #[prost(string, tag = "3")]
    pub short_name: String,
}

/// One entry of the radio's node database
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeInfo {
    /// Node id
    #[prost(uint32, tag = "1")]
    pub num: u32,
    /// Advertised names
    #[prost(message, optional, tag = "2")]
    pub user: Option<User>,
}

/// Identity of the locally attached radio
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MyNodeInfo {
    /// The radio's own node id
    #[prost(uint32, tag = "1")]
    pub my_node_num: u32,
}

/// Channel settings subset
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChannelSettings {
    /// Channel name ("" for the default name)
    #[prost(string, tag = "3")]
    pub name: String,
}

/// One configured channel slot on the radio
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Channel {
    /// Channel index
    #[prost(int32, tag = "1")]
    pub index: i32,
    /// Settings, absent for disabled slots
    #[prost(message, optional, tag = "2")]
    pub settings: Option<ChannelSettings>,
}

/// Messages the radio streams to the client
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FromRadio {
    /// Monotonic message id
    #[prost(uint32, tag = "1")]
    pub id: u32,
    /// Message body
    #[prost(oneof = "from_radio::PayloadVariant", tags = "2, 3, 4, 7, 10")]
    pub payload_variant: Option<from_radio::PayloadVariant>,
}

/// Nested types for [`FromRadio`]
pub mod from_radio {
    /// Body of a radio-to-client message
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// A mesh packet heard by the radio
        #[prost(message, tag = "2")]
        Packet(super::MeshPacket),
        /// The radio's own identity
        #[prost(message, tag = "3")]
        MyInfo(super::MyNodeInfo),
        /// One node-database entry (sent during the config dump)
        #[prost(message, tag = "4")]
        NodeInfo(super::NodeInfo),
        /// End of the config dump requested with `want_config_id`
        #[prost(uint32, tag = "7")]
        ConfigCompleteId(u32),
        /// One configured channel (sent during the config dump)
        #[prost(message, tag = "10")]
        Channel(super::Channel),
    }
}

/// Messages the client streams to the radio
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ToRadio {
    /// Message body
    #[prost(oneof = "to_radio::PayloadVariant", tags = "1, 3")]
    pub payload_variant: Option<to_radio::PayloadVariant>,
}

/// Nested types for [`ToRadio`]
pub mod to_radio {
    /// Body of a client-to-radio message
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// A packet to transmit on the mesh
        #[prost(message, tag = "1")]
        Packet(super::MeshPacket),
        /// Request the config dump; the radio answers with node/channel
        /// records and finishes with `ConfigCompleteId`
        #[prost(uint32, tag = "3")]
        WantConfigId(u32),
    }
}
