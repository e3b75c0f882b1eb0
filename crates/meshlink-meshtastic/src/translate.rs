//! Wire packet to core packet translation
//!
//! Both transports decode the same `MeshPacket`/`Data` protobufs; this module
//! lifts them into the bridge's packet model. Typed fields cover what every
//! firmware revision agrees on, and secondary linkage fields land in the
//! untyped `extra` map so the resolver's deep scan can still see them.

use serde_json::Value;

use meshlink_core::{Decoded, MeshPacket, NodeId, NodeUser, PacketId, PortNum};

use crate::proto;

/// Turn an empty protobuf string into `None`
pub fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Lift a decoded wire packet into the core packet model
pub fn to_core_packet(
    pkt: &proto::MeshPacket,
    data: &proto::Data,
    channel_name: Option<String>,
) -> MeshPacket {
    let port = PortNum::from(data.portnum);

    let text = match port {
        PortNum::TextMessage => String::from_utf8(data.payload.clone()).ok(),
        _ => None,
    };
    // Tapbacks flag their payload as an emoji; some revisions use the flag on
    // the text port as well
    let emoji = if data.emoji != 0 || port == PortNum::Reaction {
        String::from_utf8(data.payload.clone()).ok()
    } else {
        None
    };
    let user = match port {
        PortNum::NodeInfo => {
            use prost::Message;
            proto::User::decode(data.payload.as_slice())
                .ok()
                .map(|u| NodeUser {
                    short_name: none_if_empty(u.short_name),
                    long_name: none_if_empty(u.long_name),
                })
        }
        _ => None,
    };

    let mut decoded = Decoded {
        port: Some(data.portnum),
        text,
        emoji,
        payload: Some(data.payload.clone()),
        user,
        ..Default::default()
    };
    if data.request_id != 0 {
        decoded
            .extra
            .insert("request_id".to_string(), Value::from(data.request_id));
    }

    MeshPacket {
        id: PacketId(pkt.id),
        from: NodeId(pkt.from),
        to: NodeId(pkt.to),
        channel: pkt.channel,
        channel_name,
        hop_start: pkt.hop_start,
        hop_limit: pkt.hop_limit,
        reply_id: (data.reply_id != 0).then_some(PacketId(data.reply_id)),
        decoded,
        extra: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn wire_packet(data: proto::Data) -> proto::MeshPacket {
        proto::MeshPacket {
            from: 0xAE614908,
            to: 0xFFFFFFFF,
            id: 0x1111,
            channel: 2,
            hop_start: 3,
            hop_limit: 1,
            rx_rssi: -40,
            rx_snr: 8.0,
            payload_variant: Some(proto::mesh_packet::PayloadVariant::Decoded(data.clone())),
            ..Default::default()
        }
    }

    #[test]
    fn test_text_packet() {
        let data = proto::Data {
            portnum: 1,
            payload: b"hello".to_vec(),
            ..Default::default()
        };
        let packet = to_core_packet(&wire_packet(data.clone()), &data, Some("LongFast".into()));
        assert_eq!(packet.id, PacketId(0x1111));
        assert_eq!(packet.decoded.text.as_deref(), Some("hello"));
        assert_eq!(packet.channel, 2);
        assert_eq!(packet.channel_name.as_deref(), Some("LongFast"));
        assert_eq!(packet.hop_count(), 2);
        assert!(packet.reply_id.is_none());
    }

    #[test]
    fn test_tapback_packet() {
        let data = proto::Data {
            portnum: 68,
            payload: "👍".as_bytes().to_vec(),
            reply_id: 0x2222,
            emoji: 1,
            ..Default::default()
        };
        let packet = to_core_packet(&wire_packet(data.clone()), &data, None);
        assert_eq!(packet.port(), PortNum::Reaction);
        assert_eq!(packet.decoded.emoji.as_deref(), Some("👍"));
        assert_eq!(packet.reply_id, Some(PacketId(0x2222)));
    }

    #[test]
    fn test_nodeinfo_packet() {
        let user = proto::User {
            id: "!ae614908".to_string(),
            long_name: "Alice's Node".to_string(),
            short_name: "ALCE".to_string(),
        };
        let data = proto::Data {
            portnum: 4,
            payload: user.encode_to_vec(),
            ..Default::default()
        };
        let packet = to_core_packet(&wire_packet(data.clone()), &data, None);
        let parsed = packet.decoded.user.unwrap();
        assert_eq!(parsed.short_name.as_deref(), Some("ALCE"));
        assert_eq!(parsed.long_name.as_deref(), Some("Alice's Node"));
    }

    #[test]
    fn test_request_id_lands_in_extra() {
        let data = proto::Data {
            portnum: 1,
            payload: b"ok".to_vec(),
            request_id: 0x3333,
            ..Default::default()
        };
        let packet = to_core_packet(&wire_packet(data.clone()), &data, None);
        assert_eq!(
            packet.decoded.extra.get("request_id"),
            Some(&Value::from(0x3333))
        );
    }
}
