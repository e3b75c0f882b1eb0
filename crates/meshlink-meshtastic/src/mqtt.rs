//! MQTT gateway source
//!
//! Multiple gateway radios publish every packet they hear to a shared broker,
//! wrapped in `ServiceEnvelope` protobufs. This source subscribes to the
//! configured root topic, decrypts channel payloads where a PSK is
//! configured, and submits one observation per envelope to the bridge with
//! the reporting gateway's link metrics attached.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use meshlink_core::{
    Backoff, GatewayId, MeshEvent, MeshObservation, PacketSource, ReceptionStats,
};
use prost::Message;

use crate::config::MqttConfig;
use crate::proto;
use crate::translate;

/// Source task consuming a shared gateway broker
pub struct MqttSource;

impl MqttSource {
    /// Spawn the source; it reconnects forever until the bridge channel
    /// closes.
    pub fn spawn(config: MqttConfig, events: mpsc::Sender<MeshEvent>) -> JoinHandle<()> {
        tokio::spawn(run(config, events))
    }
}

async fn run(config: MqttConfig, events: mpsc::Sender<MeshEvent>) {
    let mut backoff = Backoff::default();
    loop {
        let client_id = format!("meshlink-{:08x}", rand::random::<u32>());
        let mut options = MqttOptions::new(client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }
        if config.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        info!(broker = %config.broker, port = config.port, "Connecting to MQTT broker");
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    backoff.reset();
                    let topic = subscribe_topic(&config.topic);
                    info!(topic = %topic, "Connected to MQTT broker, subscribing");
                    if let Err(e) = client.subscribe(topic.clone(), QoS::AtMostOnce).await {
                        warn!(error = %e, "MQTT subscribe failed");
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some(event) = process_publish(&config, &publish.payload) {
                        if events.send(event).await.is_err() {
                            info!("Bridge channel closed, stopping MQTT source");
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error");
                    break;
                }
            }
        }

        if events.is_closed() {
            return;
        }
        let delay = backoff.next();
        debug!(delay_secs = delay.as_secs(), "Reconnecting to MQTT broker");
        tokio::time::sleep(delay).await;
    }
}

/// Normalise the configured root topic into a wildcard subscription
fn subscribe_topic(topic: &str) -> String {
    if topic.ends_with('#') {
        topic.to_string()
    } else if topic.ends_with('/') {
        format!("{}#", topic)
    } else {
        format!("{}/#", topic)
    }
}

/// Decode one broker publish into a bridge event.
///
/// Anything that does not parse as a usable envelope is dropped with a debug
/// log; gateways also publish JSON and map telemetry on nearby topics.
fn process_publish(config: &MqttConfig, payload: &[u8]) -> Option<MeshEvent> {
    let envelope = match proto::ServiceEnvelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            trace!(error = %e, "Ignoring non-envelope MQTT payload");
            return None;
        }
    };
    let packet = envelope.packet?;
    if packet.id == 0 {
        return None;
    }

    let gateway: GatewayId = match envelope.gateway_id.parse() {
        Ok(gateway) => gateway,
        Err(_) => {
            debug!(gateway = %envelope.gateway_id, "Envelope with unparseable gateway id");
            return None;
        }
    };

    let data = match &packet.payload_variant {
        Some(proto::mesh_packet::PayloadVariant::Decoded(data)) => data.clone(),
        Some(proto::mesh_packet::PayloadVariant::Encrypted(ciphertext)) => {
            let key = match &config.psk {
                Some(key) => key,
                None => {
                    trace!(packet = packet.id, "Encrypted packet and no PSK configured");
                    return None;
                }
            };
            let cleartext = match key.decrypt(packet.id, packet.from, ciphertext) {
                Ok(cleartext) => cleartext,
                Err(e) => {
                    debug!(packet = packet.id, error = %e, "Decryption failed");
                    return None;
                }
            };
            match proto::Data::decode(cleartext.as_slice()) {
                Ok(data) => data,
                Err(e) => {
                    debug!(packet = packet.id, error = %e, "Decrypted payload is not a Data protobuf");
                    return None;
                }
            }
        }
        None => return None,
    };

    let channel_name = translate::none_if_empty(envelope.channel_id);
    let core_packet = translate::to_core_packet(&packet, &data, channel_name);
    let stats = ReceptionStats::observed(
        gateway,
        packet.rx_rssi,
        packet.rx_snr,
        core_packet.hop_count(),
    );

    Some(MeshEvent::Observation(MeshObservation {
        packet: core_packet,
        source: PacketSource::Mqtt,
        stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ChannelKey;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use meshlink_core::{NodeId, PacketId};

    fn config(psk: Option<ChannelKey>) -> MqttConfig {
        MqttConfig {
            broker: "broker.example".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic: "msh/EU_868/2/e".to_string(),
            use_tls: false,
            psk,
        }
    }

    fn envelope(packet: proto::MeshPacket) -> Vec<u8> {
        proto::ServiceEnvelope {
            packet: Some(packet),
            channel_id: "LongFast".to_string(),
            gateway_id: "!0000ae61".to_string(),
        }
        .encode_to_vec()
    }

    fn text_packet() -> proto::MeshPacket {
        proto::MeshPacket {
            from: 0xAE614908,
            to: 0xFFFFFFFF,
            id: 0x1111,
            rx_rssi: -40,
            rx_snr: 8.0,
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(proto::Data {
                portnum: 1,
                payload: b"hello".to_vec(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    #[test]
    fn test_subscribe_topic_normalisation() {
        assert_eq!(subscribe_topic("msh/EU_868/2/e"), "msh/EU_868/2/e/#");
        assert_eq!(subscribe_topic("msh/EU_868/2/e/"), "msh/EU_868/2/e/#");
        assert_eq!(subscribe_topic("msh/#"), "msh/#");
    }

    #[test]
    fn test_process_text_envelope() {
        let event = process_publish(&config(None), &envelope(text_packet())).unwrap();
        let MeshEvent::Observation(obs) = event else {
            panic!("expected an observation");
        };
        assert_eq!(obs.packet.id, PacketId(0x1111));
        assert_eq!(obs.packet.decoded.text.as_deref(), Some("hello"));
        assert_eq!(obs.source, PacketSource::Mqtt);
        assert_eq!(obs.stats.gateway, GatewayId::Node(NodeId(0xAE61)));
        assert_eq!(obs.stats.rssi, -40);
    }

    #[test]
    fn test_garbage_payload_is_dropped() {
        // JSON published by gateways on the /json topics must not crash
        assert!(process_publish(&config(None), b"{\"from\": 1}").is_none());
    }

    #[test]
    fn test_zero_packet_id_is_dropped() {
        let mut packet = text_packet();
        packet.id = 0;
        assert!(process_publish(&config(None), &envelope(packet)).is_none());
    }

    #[test]
    fn test_encrypted_without_psk_is_dropped() {
        let mut packet = text_packet();
        packet.payload_variant = Some(proto::mesh_packet::PayloadVariant::Encrypted(vec![1, 2]));
        assert!(process_publish(&config(None), &envelope(packet)).is_none());
    }

    #[test]
    fn test_encrypted_roundtrip_with_psk() {
        let key = ChannelKey::from_base64(&STANDARD.encode([9u8; 16])).unwrap();
        let data = proto::Data {
            portnum: 1,
            payload: b"secret hello".to_vec(),
            ..Default::default()
        };
        let mut packet = text_packet();
        // CTR encryption is its own inverse, so "decrypt" doubles as encrypt
        let ciphertext = key
            .decrypt(packet.id, packet.from, &data.encode_to_vec())
            .unwrap();
        packet.payload_variant = Some(proto::mesh_packet::PayloadVariant::Encrypted(ciphertext));

        let event = process_publish(&config(Some(key)), &envelope(packet)).unwrap();
        let MeshEvent::Observation(obs) = event else {
            panic!("expected an observation");
        };
        assert_eq!(obs.packet.decoded.text.as_deref(), Some("secret hello"));
    }
}
