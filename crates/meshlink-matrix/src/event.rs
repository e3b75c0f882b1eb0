//! Inbound room events
//!
//! The sync loop reduces raw timeline events to the three shapes the bridge
//! reacts to. Parsing lives here so it can be tested against fixture JSON
//! without a homeserver.

use serde_json::Value;

/// A room event the bridge cares about
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixEvent {
    /// A plain text message
    Text {
        /// Event id
        event_id: String,
        /// Sending user id
        sender: String,
        /// Message body
        body: String,
        /// Event this message replies to, if any
        in_reply_to: Option<String>,
    },
    /// An emoji reaction
    Reaction {
        /// Event id
        event_id: String,
        /// Sending user id
        sender: String,
        /// The event being reacted to
        target_event_id: String,
        /// The reaction emoji
        key: String,
    },
    /// An edit of an earlier message
    Edit {
        /// Event id of the edit itself
        event_id: String,
        /// Sending user id
        sender: String,
        /// The event being replaced
        target_event_id: String,
        /// Replacement body
        new_body: String,
    },
}

impl MatrixEvent {
    /// The user who sent the event
    pub fn sender(&self) -> &str {
        match self {
            MatrixEvent::Text { sender, .. }
            | MatrixEvent::Reaction { sender, .. }
            | MatrixEvent::Edit { sender, .. } => sender,
        }
    }

    /// Reduce one raw timeline event to a bridge event, if it is one of the
    /// shapes the bridge handles
    pub fn from_timeline(raw: &Value) -> Option<MatrixEvent> {
        let event_type = raw.get("type")?.as_str()?;
        let event_id = raw.get("event_id")?.as_str()?.to_string();
        let sender = raw.get("sender")?.as_str()?.to_string();
        let content = raw.get("content")?;

        match event_type {
            "m.reaction" => {
                let relates = content.get("m.relates_to")?;
                if relates.get("rel_type")?.as_str()? != "m.annotation" {
                    return None;
                }
                Some(MatrixEvent::Reaction {
                    event_id,
                    sender,
                    target_event_id: relates.get("event_id")?.as_str()?.to_string(),
                    key: relates.get("key")?.as_str()?.to_string(),
                })
            }
            "m.room.message" => {
                let msgtype = content.get("msgtype").and_then(Value::as_str)?;
                if msgtype != "m.text" && msgtype != "m.notice" {
                    return None;
                }
                let relates = content.get("m.relates_to");
                let rel_type = relates
                    .and_then(|r| r.get("rel_type"))
                    .and_then(Value::as_str);
                if rel_type == Some("m.replace") {
                    let new_body = content
                        .get("m.new_content")
                        .and_then(|c| c.get("body"))
                        .and_then(Value::as_str)?
                        .to_string();
                    return Some(MatrixEvent::Edit {
                        event_id,
                        sender,
                        target_event_id: relates?.get("event_id")?.as_str()?.to_string(),
                        new_body,
                    });
                }
                let in_reply_to = relates
                    .and_then(|r| r.get("m.in_reply_to"))
                    .and_then(|r| r.get("event_id"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(MatrixEvent::Text {
                    event_id,
                    sender,
                    body: content.get("body")?.as_str()?.to_string(),
                    in_reply_to,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_text() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$abc",
            "sender": "@alice:example.org",
            "content": {"msgtype": "m.text", "body": "hello mesh"}
        });
        assert_eq!(
            MatrixEvent::from_timeline(&raw),
            Some(MatrixEvent::Text {
                event_id: "$abc".to_string(),
                sender: "@alice:example.org".to_string(),
                body: "hello mesh".to_string(),
                in_reply_to: None,
            })
        );
    }

    #[test]
    fn test_parse_reply() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$abc",
            "sender": "@alice:example.org",
            "content": {
                "msgtype": "m.text",
                "body": "> <@bob:example.org> hi\n\nhello back",
                "m.relates_to": {"m.in_reply_to": {"event_id": "$parent"}}
            }
        });
        match MatrixEvent::from_timeline(&raw).unwrap() {
            MatrixEvent::Text { in_reply_to, .. } => {
                assert_eq!(in_reply_to.as_deref(), Some("$parent"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_reaction() {
        let raw = json!({
            "type": "m.reaction",
            "event_id": "$r",
            "sender": "@alice:example.org",
            "content": {
                "m.relates_to": {"rel_type": "m.annotation", "event_id": "$target", "key": "🎉"}
            }
        });
        assert_eq!(
            MatrixEvent::from_timeline(&raw),
            Some(MatrixEvent::Reaction {
                event_id: "$r".to_string(),
                sender: "@alice:example.org".to_string(),
                target_event_id: "$target".to_string(),
                key: "🎉".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_edit() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$e",
            "sender": "@alice:example.org",
            "content": {
                "msgtype": "m.text",
                "body": "* fixed",
                "m.new_content": {"msgtype": "m.text", "body": "fixed"},
                "m.relates_to": {"rel_type": "m.replace", "event_id": "$orig"}
            }
        });
        match MatrixEvent::from_timeline(&raw).unwrap() {
            MatrixEvent::Edit {
                target_event_id,
                new_body,
                ..
            } => {
                assert_eq!(target_event_id, "$orig");
                assert_eq!(new_body, "fixed");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_ignores_other_event_types() {
        let raw = json!({
            "type": "m.room.member",
            "event_id": "$m",
            "sender": "@alice:example.org",
            "content": {"membership": "join"}
        });
        assert_eq!(MatrixEvent::from_timeline(&raw), None);
    }

    #[test]
    fn test_ignores_image_messages() {
        let raw = json!({
            "type": "m.room.message",
            "event_id": "$img",
            "sender": "@alice:example.org",
            "content": {"msgtype": "m.image", "body": "cat.png"}
        });
        assert_eq!(MatrixEvent::from_timeline(&raw), None);
    }
}
