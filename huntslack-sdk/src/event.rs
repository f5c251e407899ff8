//! Wire events from the RTM stream and connection-state notifications.

use serde::Deserialize;

use crate::channel::Channel;

/// An RTM event, discriminated by its `type` field.
///
/// Only the kinds that touch channel state are modelled; everything else
/// decodes to [`RtmEvent::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RtmEvent {
    ChannelCreated {
        channel: Channel,
    },
    ChannelJoined {
        channel: Channel,
    },
    /// `channel` is the bare channel id.
    ChannelLeft {
        channel: String,
    },
    ChannelMarked {
        channel: String,
        #[serde(default)]
        unread_count: u64,
        /// Falls back to `unread_count` when absent.
        #[serde(default)]
        unread_count_display: Option<u64>,
    },
    Message {
        #[serde(default)]
        channel: Option<String>,
        /// Sender user id.
        #[serde(default)]
        user: Option<String>,
        /// Set on system/meta messages (joins, edits, bot posts...).
        #[serde(default)]
        subtype: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl RtmEvent {
    /// Decode one text frame. Malformed frames are logged and dropped.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping undecodable RTM frame");
                None
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RtmEvent::ChannelCreated { .. } => "channel_created",
            RtmEvent::ChannelJoined { .. } => "channel_joined",
            RtmEvent::ChannelLeft { .. } => "channel_left",
            RtmEvent::ChannelMarked { .. } => "channel_marked",
            RtmEvent::Message { .. } => "message",
            RtmEvent::Unknown => "unknown",
        }
    }
}

/// Lifecycle of the session's single connection, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Token acquisition, `rtm.start` or the WebSocket handshake is in flight.
    Connecting,
    /// Snapshot applied; `self_id` is the session's own user id.
    Connected {
        self_id: String,
    },
    /// The last connect attempt failed. The session is disconnected and a
    /// later `connect()` may retry.
    Failed {
        reason: String,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_created() {
        let ev = RtmEvent::parse(
            r#"{"type":"channel_created","channel":{"id":"C9","name":"meta-1","created":1,"creator":"U2"}}"#,
        )
        .unwrap();
        match ev {
            RtmEvent::ChannelCreated { channel } => {
                assert_eq!(channel.id, "C9");
                assert_eq!(channel.name, "meta-1");
                assert!(!channel.is_member);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_channel_marked_without_display_count() {
        let ev = RtmEvent::parse(
            r#"{"type":"channel_marked","channel":"C1","ts":"1.0","unread_count":3}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            RtmEvent::ChannelMarked {
                channel: "C1".into(),
                unread_count: 3,
                unread_count_display: None,
            }
        );
    }

    #[test]
    fn parses_message_with_subtype() {
        let ev = RtmEvent::parse(
            r#"{"type":"message","subtype":"channel_join","channel":"C1","user":"U1","text":"joined"}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            RtmEvent::Message {
                channel: Some("C1".into()),
                user: Some("U1".into()),
                subtype: Some("channel_join".into()),
            }
        );
    }

    #[test]
    fn unknown_type_is_explicit_variant() {
        let ev =
            RtmEvent::parse(r#"{"type":"presence_change","user":"U1","presence":"away"}"#).unwrap();
        assert_eq!(ev, RtmEvent::Unknown);
        assert_eq!(ev.kind(), "unknown");
    }

    #[test]
    fn malformed_frames_are_dropped() {
        assert!(RtmEvent::parse("not json").is_none());
        // Reply acks carry no type.
        assert!(RtmEvent::parse(r#"{"ok":true,"reply_to":1,"ts":"1.0"}"#).is_none());
        // Known kind with a missing required field.
        assert!(RtmEvent::parse(r#"{"type":"channel_left"}"#).is_none());
    }
}
