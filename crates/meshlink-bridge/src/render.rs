//! Matrix body rendering
//!
//! Rendering is pure: the same message state always produces the same body,
//! so repeated edits converge regardless of which observation triggered
//! them. Plain-text and HTML variants are produced together.
//!
//! Mesh-originated messages render as
//!
//! ```text
//! <sender>: <text>
//! (Received by: <gateway> (<metric>), ...)
//!   ↳ <child_sender>: <child_text> (<child_stats>)
//!   ↳ <emoji> — <reactor>, <reactor>
//! ```
//!
//! Matrix-originated messages render in compact mode: the stats line only,
//! since the text is already in the user's own Matrix message.

use meshlink_core::{MessageState, ReceptionStats};

use crate::names::NameDirectory;

/// Plain and HTML body pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    /// Plain-text body
    pub plain: String,
    /// HTML formatted body
    pub html: String,
}

/// Render the Matrix body for `state`.
///
/// `parent` is the state this message replies to, when known and when this
/// state has (or will get) its own event. `children` are the resolved states
/// of `state.replies`, in linkage order; unresolved children are simply
/// omitted by the caller.
pub fn render_message(
    state: &MessageState,
    parent: Option<&MessageState>,
    children: &[&MessageState],
    names: &NameDirectory,
) -> RenderedBody {
    let stats = stats_line(&state.reception_list, names);
    let (replies_plain, replies_html) = reply_block(children, names);

    if state.is_matrix_origin {
        // Compact mode
        return RenderedBody {
            plain: format!("{}{}", stats.0, replies_plain),
            html: format!("{}{}", stats.1, replies_html),
        };
    }

    let sender = names.node_name(state.sender_node);
    let (quote_plain, quote_html) = parent
        .map(|parent| quote_block(parent, names))
        .unwrap_or_default();

    RenderedBody {
        plain: format!(
            "{}{}: {}\n{}{}",
            quote_plain, sender, state.original_text, stats.0, replies_plain
        ),
        html: format!(
            "{}<b>{}</b>: {}<br>{}{}",
            quote_html,
            escape_html(&sender),
            escape_html(&state.original_text),
            stats.1,
            replies_html
        ),
    }
}

/// Render the `(Received by: ...)` line in both variants
fn stats_line(receptions: &[ReceptionStats], names: &NameDirectory) -> (String, String) {
    let joined = receptions
        .iter()
        .map(|stats| format!("{} ({})", names.gateway_name(&stats.gateway), metric(stats)))
        .collect::<Vec<_>>()
        .join(", ");
    (
        format!("(Received by: {})", joined),
        format!("<small>(Received by: {})</small>", escape_html(&joined)),
    )
}

/// One gateway's metric: signal strength for direct reception, hop count
/// otherwise
fn metric(stats: &ReceptionStats) -> String {
    if stats.is_direct() {
        format!("{}dB", stats.rssi)
    } else {
        format!("{} hops", stats.hop_count)
    }
}

/// Render the indented reply/reaction block under a message
fn reply_block(children: &[&MessageState], names: &NameDirectory) -> (String, String) {
    let mut lines_plain = Vec::new();
    let mut lines_html = Vec::new();
    // (emoji, reactor names) aggregated in first-appearance order
    let mut reactions: Vec<(String, Vec<String>)> = Vec::new();

    for child in children {
        if child.is_reaction() {
            let reactor = names.node_name(child.sender_node);
            let emoji = child.original_text.trim().to_string();
            if emoji.is_empty() {
                continue;
            }
            match reactions.iter_mut().find(|(e, _)| *e == emoji) {
                Some((_, reactors)) => {
                    if !reactors.contains(&reactor) {
                        reactors.push(reactor);
                    }
                }
                None => reactions.push((emoji, vec![reactor])),
            }
        } else {
            let sender = names.node_name(child.sender_node);
            let stats = child
                .reception_list
                .iter()
                .map(|s| format!("{} ({})", names.gateway_name(&s.gateway), metric(s)))
                .collect::<Vec<_>>()
                .join(", ");
            lines_plain.push(format!(
                "  ↳ {}: {} ({})",
                sender, child.original_text, stats
            ));
            lines_html.push(format!(
                "&nbsp;&nbsp;↳ <b>{}</b>: {} ({})",
                escape_html(&sender),
                escape_html(&child.original_text),
                escape_html(&stats)
            ));
        }
    }

    for (emoji, reactors) in reactions {
        lines_plain.push(format!("  ↳ {} — {}", emoji, reactors.join(", ")));
        lines_html.push(format!(
            "&nbsp;&nbsp;↳ {} — {}",
            escape_html(&emoji),
            escape_html(&reactors.join(", "))
        ));
    }

    if lines_plain.is_empty() {
        (String::new(), String::new())
    } else {
        (
            format!("\n{}", lines_plain.join("\n")),
            format!("<br>{}", lines_html.join("<br>")),
        )
    }
}

/// Quote header shown above a bridged reply
fn quote_block(parent: &MessageState, names: &NameDirectory) -> (String, String) {
    let sender = names.node_name(parent.sender_node);
    let short = truncate(&parent.original_text, 50);
    (
        format!("> <{}> {}\n\n", sender, short),
        format!(
            "<mx-reply><blockquote>In reply to <b>{}</b><br>{}</blockquote></mx-reply>",
            escape_html(&sender),
            escape_html(&short)
        ),
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshlink_core::{GatewayId, NodeId, PacketId};

    fn names() -> NameDirectory {
        NameDirectory::new()
    }

    fn stats(gateway: GatewayId, rssi: i32, hops: u32) -> ReceptionStats {
        ReceptionStats::observed(gateway, rssi, 8.0, hops)
    }

    fn mesh_state(packet: u32, text: &str, first: ReceptionStats) -> MessageState {
        MessageState::new_mesh(PacketId(packet), NodeId(0xAE614908), 0, text, first)
    }

    #[test]
    fn test_single_reception() {
        let state = mesh_state(
            0x1111,
            "hello",
            stats(GatewayId::Node(NodeId(0xAE61)), -40, 0),
        );
        let body = render_message(&state, None, &[], &names());
        assert_eq!(
            body.plain,
            "Node!ae614908: hello\n(Received by: Node!0000ae61 (-40dB))"
        );
        assert!(body.html.contains("<b>Node!ae614908</b>: hello"));
        assert!(body.html.contains("(Received by: Node!0000ae61 (-40dB))"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let state = mesh_state(0x1111, "hello", stats(GatewayId::Lan, -30, 0));
        let a = render_message(&state, None, &[], &names());
        let b = render_message(&state, None, &[], &names());
        assert_eq!(a, b);
    }

    #[test]
    fn test_reception_order_tracks_arrival() {
        let mut state = mesh_state(
            0x1111,
            "hello",
            stats(GatewayId::Node(NodeId(0xAE61)), -40, 0),
        );
        state.merge_reception(stats(GatewayId::Lan, -30, 0));
        let body = render_message(&state, None, &[], &names());
        assert!(body
            .plain
            .ends_with("(Received by: Node!0000ae61 (-40dB), lan (-30dB))"));
    }

    #[test]
    fn test_hop_metric_for_forwarded_reception() {
        let state = mesh_state(0x1111, "hi", stats(GatewayId::Node(NodeId(3)), 0, 2));
        let body = render_message(&state, None, &[], &names());
        assert!(body.plain.contains("Node!00000003 (2 hops)"));
    }

    #[test]
    fn test_compact_mode_for_matrix_origin() {
        let mut state = MessageState::new_matrix_origin(
            PacketId(0x2222),
            NodeId(1),
            0,
            "from matrix",
            "$origin",
        );
        state.merge_reception(stats(GatewayId::Node(NodeId(0xAE61)), -70, 0));
        let body = render_message(&state, None, &[], &names());
        // No sender, no text repetition
        assert_eq!(body.plain, "(Received by: Node!0000ae61 (-70dB))");
        assert!(!body.html.contains("from matrix"));
    }

    #[test]
    fn test_reaction_summary_aggregates_by_emoji() {
        let state = mesh_state(0x1111, "hello", stats(GatewayId::Lan, -40, 0));
        let mut up_a = mesh_state(0x2222, "👍", stats(GatewayId::Lan, -50, 0));
        up_a.parent_packet_id = Some(PacketId(0x1111));
        up_a.sender_node = NodeId(0xB0B);
        let mut up_b = mesh_state(0x3333, "👍", stats(GatewayId::Lan, -60, 0));
        up_b.parent_packet_id = Some(PacketId(0x1111));
        up_b.sender_node = NodeId(0xCAfE);
        let mut party = mesh_state(0x4444, "🎉", stats(GatewayId::Lan, -60, 0));
        party.parent_packet_id = Some(PacketId(0x1111));
        party.sender_node = NodeId(0xB0B);

        let body = render_message(&state, None, &[&up_a, &up_b, &party], &names());
        assert!(body
            .plain
            .contains("  ↳ 👍 — Node!00000b0b, Node!0000cafe"));
        assert!(body.plain.contains("  ↳ 🎉 — Node!00000b0b"));
    }

    #[test]
    fn test_text_reply_child_renders_inline_line() {
        let state = mesh_state(0x1111, "hello", stats(GatewayId::Lan, -40, 0));
        let mut child = mesh_state(0x2222, "on my way", stats(GatewayId::Lan, -48, 0));
        child.parent_packet_id = Some(PacketId(0x1111));
        child.sender_node = NodeId(0xB0B);
        child.set_matrix_event("$child");

        let body = render_message(&state, None, &[&child], &names());
        assert!(body
            .plain
            .contains("  ↳ Node!00000b0b: on my way (lan (-48dB))"));
    }

    #[test]
    fn test_reply_quote_header() {
        let parent = mesh_state(0x1111, "hello", stats(GatewayId::Lan, -40, 0));
        let mut child = mesh_state(0x2222, "hi back", stats(GatewayId::Lan, -50, 0));
        child.parent_packet_id = Some(PacketId(0x1111));
        let body = render_message(&child, Some(&parent), &[], &names());
        assert!(body.plain.starts_with("> <Node!ae614908> hello\n\n"));
        assert!(body.html.starts_with("<mx-reply><blockquote>"));
    }

    #[test]
    fn test_quote_truncates_long_parent_text() {
        let long_text = "x".repeat(80);
        let parent = mesh_state(0x1111, &long_text, stats(GatewayId::Lan, -40, 0));
        let mut child = mesh_state(0x2222, "reply", stats(GatewayId::Lan, -50, 0));
        child.parent_packet_id = Some(PacketId(0x1111));
        let body = render_message(&child, Some(&parent), &[], &names());
        assert!(body.plain.contains(&format!("{}...", "x".repeat(50))));
    }

    #[test]
    fn test_html_is_escaped() {
        let state = mesh_state(
            0x1111,
            "<script>alert(1)</script>",
            stats(GatewayId::Lan, -40, 0),
        );
        let body = render_message(&state, None, &[], &names());
        assert!(!body.html.contains("<script>"));
        assert!(body.html.contains("&lt;script&gt;"));
    }
}
