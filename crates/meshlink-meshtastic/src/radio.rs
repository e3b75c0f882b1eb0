//! Radio TCP source and sink
//!
//! Connects to a locally attached radio's TCP interface, requests the config
//! dump (node database, channel table, our own node id), then streams
//! packets both ways. Inbound packets are submitted to the bridge with
//! synthetic `"lan"` gateway stats; outbound sends assign a fresh packet id
//! so the bridge can register Matrix-originated packets before their MQTT
//! echoes arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use meshlink_core::{
    Backoff, GatewayId, MeshEvent, MeshObservation, NodeId, PacketId, PacketSource, PortNum,
    ReceptionStats,
};

use crate::config::RadioConfig;
use crate::error::{MeshtasticError, Result};
use crate::frame::{encode_frame, StreamFramer};
use crate::proto;
use crate::sender::MeshSender;
use crate::translate;

/// Default hop budget for packets the bridge originates
const OUTBOUND_HOP_LIMIT: u32 = 3;

struct RadioShared {
    connected: AtomicBool,
    local_node: RwLock<Option<NodeId>>,
    channels: RwLock<HashMap<u32, String>>,
    out_tx: mpsc::Sender<proto::MeshPacket>,
}

/// Cloneable handle for sending onto the mesh through the radio
#[derive(Clone)]
pub struct RadioHandle {
    shared: Arc<RadioShared>,
}

impl RadioHandle {
    /// Whether the TCP session is currently up
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    /// The attached radio's own node id, once learned from the config dump
    pub fn local_node(&self) -> Option<NodeId> {
        *self.shared.local_node.read()
    }

    async fn send_data(&self, data: proto::Data, channel: u32) -> Result<PacketId> {
        if !self.is_connected() {
            return Err(MeshtasticError::NotConnected);
        }
        let id = new_packet_id();
        let from = self.local_node().unwrap_or(NodeId(0));
        let packet = proto::MeshPacket {
            from: from.0,
            to: NodeId::BROADCAST.0,
            channel,
            id,
            hop_limit: OUTBOUND_HOP_LIMIT,
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(data)),
            ..Default::default()
        };
        self.shared
            .out_tx
            .send(packet)
            .await
            .map_err(|_| MeshtasticError::ChannelClosed)?;
        Ok(PacketId(id))
    }
}

#[async_trait]
impl MeshSender for RadioHandle {
    async fn send_text(
        &self,
        text: &str,
        channel: u32,
        reply_id: Option<PacketId>,
    ) -> Result<PacketId> {
        let data = proto::Data {
            portnum: PortNum::TextMessage.into(),
            payload: text.as_bytes().to_vec(),
            reply_id: reply_id.map(|id| id.0).unwrap_or(0),
            ..Default::default()
        };
        let id = self.send_data(data, channel).await?;
        info!(packet = %id, channel, "Queued text for the mesh");
        Ok(id)
    }

    async fn send_tapback(
        &self,
        target: PacketId,
        emoji: &str,
        channel: u32,
    ) -> Result<PacketId> {
        let data = proto::Data {
            portnum: PortNum::Reaction.into(),
            payload: emoji.as_bytes().to_vec(),
            reply_id: target.0,
            emoji: 1,
            ..Default::default()
        };
        let id = self.send_data(data, channel).await?;
        info!(packet = %id, target = %target, "Queued tapback for the mesh");
        Ok(id)
    }

    fn local_node(&self) -> Option<NodeId> {
        RadioHandle::local_node(self)
    }
}

/// The radio link task
pub struct RadioLink {
    config: RadioConfig,
    shared: Arc<RadioShared>,
    out_rx: mpsc::Receiver<proto::MeshPacket>,
    events: mpsc::Sender<MeshEvent>,
}

impl RadioLink {
    /// Build the link and its send handle
    pub fn new(config: RadioConfig, events: mpsc::Sender<MeshEvent>) -> (Self, RadioHandle) {
        let (out_tx, out_rx) = mpsc::channel(64);
        let shared = Arc::new(RadioShared {
            connected: AtomicBool::new(false),
            local_node: RwLock::new(None),
            channels: RwLock::new(HashMap::new()),
            out_tx,
        });
        let handle = RadioHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                config,
                shared,
                out_rx,
                events,
            },
            handle,
        )
    }

    /// Spawn the connect/reconnect loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut backoff = Backoff::default();
        loop {
            let addr = self.config.addr();
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    info!(addr = %addr, "Connected to radio");
                    self.shared.connected.store(true, Ordering::Relaxed);
                    backoff.reset();
                    if let Err(e) = self.session(stream).await {
                        warn!(addr = %addr, error = %e, "Radio session ended");
                    }
                    self.shared.connected.store(false, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Radio connection failed");
                }
            }

            if self.events.is_closed() {
                return;
            }
            let delay = backoff.next();
            debug!(delay_secs = delay.as_secs(), "Reconnecting to radio");
            tokio::time::sleep(delay).await;
        }
    }

    async fn session(&mut self, mut stream: TcpStream) -> Result<()> {
        // Request the config dump so we learn our node id, the node
        // database, and the channel table before traffic starts
        let want_config = proto::ToRadio {
            payload_variant: Some(proto::to_radio::PayloadVariant::WantConfigId(
                rand::random(),
            )),
        };
        stream
            .write_all(&encode_frame(&want_config.encode_to_vec()))
            .await?;

        let mut framer = StreamFramer::new();
        let mut read_buf = [0u8; 4096];
        loop {
            tokio::select! {
                read = stream.read(&mut read_buf) => {
                    match read {
                        Ok(0) => return Err(MeshtasticError::Disconnected),
                        Ok(n) => {
                            framer.push(&read_buf[..n]);
                            while let Some(frame) = framer.next_frame() {
                                self.handle_frame(&frame).await;
                            }
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                outbound = self.out_rx.recv() => {
                    let Some(packet) = outbound else {
                        return Err(MeshtasticError::ChannelClosed);
                    };
                    let message = proto::ToRadio {
                        payload_variant: Some(proto::to_radio::PayloadVariant::Packet(packet)),
                    };
                    stream.write_all(&encode_frame(&message.encode_to_vec())).await?;
                }
            }
        }
    }

    async fn handle_frame(&self, frame: &[u8]) {
        let message = match proto::FromRadio::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Undecodable frame from radio");
                return;
            }
        };
        use proto::from_radio::PayloadVariant;
        match message.payload_variant {
            Some(PayloadVariant::Packet(packet)) => self.handle_packet(packet).await,
            Some(PayloadVariant::MyInfo(info)) => {
                let node = NodeId(info.my_node_num);
                info!(node = %node, "Learned local radio node id");
                *self.shared.local_node.write() = Some(node);
            }
            Some(PayloadVariant::NodeInfo(node_info)) => {
                if let Some(user) = node_info.user {
                    let _ = self
                        .events
                        .send(MeshEvent::NodeName {
                            node: NodeId(node_info.num),
                            short_name: translate::none_if_empty(user.short_name),
                            long_name: translate::none_if_empty(user.long_name),
                        })
                        .await;
                }
            }
            Some(PayloadVariant::Channel(channel)) => {
                if let Some(settings) = channel.settings {
                    if !settings.name.is_empty() {
                        self.shared
                            .channels
                            .write()
                            .insert(channel.index as u32, settings.name);
                    }
                }
            }
            Some(PayloadVariant::ConfigCompleteId(_)) => {
                debug!("Radio config dump complete");
            }
            None => {}
        }
    }

    async fn handle_packet(&self, packet: proto::MeshPacket) {
        if packet.id == 0 {
            return;
        }
        let data = match &packet.payload_variant {
            Some(proto::mesh_packet::PayloadVariant::Decoded(data)) => data.clone(),
            _ => {
                // The radio decrypts channels it is a member of; anything
                // still encrypted here is foreign traffic
                trace!(packet = packet.id, "Skipping undecoded LAN packet");
                return;
            }
        };

        let channel_name = self.shared.channels.read().get(&packet.channel).cloned();
        let core_packet = translate::to_core_packet(&packet, &data, channel_name);
        let stats = ReceptionStats::observed(
            GatewayId::Lan,
            packet.rx_rssi,
            packet.rx_snr,
            core_packet.hop_count(),
        );
        let _ = self
            .events
            .send(MeshEvent::Observation(MeshObservation {
                packet: core_packet,
                source: PacketSource::Lan,
                stats,
            }))
            .await;
    }
}

/// Fresh non-zero packet id for an outbound send
fn new_packet_id() -> u32 {
    loop {
        let id: u32 = rand::random();
        if id != 0 {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_packet_id_nonzero() {
        for _ in 0..64 {
            assert_ne!(new_packet_id(), 0);
        }
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (_link, handle) = RadioLink::new(RadioConfig::new("127.0.0.1"), events_tx);
        let result = handle.send_text("hello", 0, None).await;
        assert!(matches!(result, Err(MeshtasticError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_assigns_distinct_ids() {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (link, handle) = RadioLink::new(RadioConfig::new("127.0.0.1"), events_tx);
        link.shared.connected.store(true, Ordering::Relaxed);

        let a = handle.send_text("one", 0, None).await.unwrap();
        let b = handle
            .send_tapback(a, "👍", 0)
            .await
            .unwrap();
        assert_ne!(a, b);

        // Both packets were queued for the writer
        let mut rx = link.out_rx;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.id, a.0);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.id, b.0);
        match second.payload_variant {
            Some(proto::mesh_packet::PayloadVariant::Decoded(data)) => {
                assert_eq!(data.reply_id, a.0);
                assert_eq!(data.emoji, 1);
                assert_eq!(data.payload, "👍".as_bytes());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
