//! Applies RTM events to the channel registry.
//!
//! | event            | registry effect                         | notify |
//! |------------------|-----------------------------------------|--------|
//! | channel_created  | insert, not a member                    | no     |
//! | channel_joined   | upsert, member                          | yes    |
//! | channel_left     | member = false (record kept)            | yes    |
//! | channel_marked   | set unread counters                     | yes    |
//! | message          | +1 unread unless own or subtyped        | yes    |
//!
//! Events naming a channel id the registry does not know are dropped; no
//! placeholder record is ever built from a partial event.

use crate::channel::{Channel, ChannelRegistry};
use crate::event::RtmEvent;

/// Apply `event` and return the record subscribers should be told about.
///
/// `self_id` is the session's own user id; messages it sent never count as
/// unread.
pub fn apply_event(
    registry: &mut ChannelRegistry,
    self_id: Option<&str>,
    event: &RtmEvent,
) -> Option<Channel> {
    match event {
        RtmEvent::ChannelCreated { channel } => {
            let mut record = channel.clone();
            record.is_member = false;
            registry.upsert(record);
            None
        }
        RtmEvent::ChannelJoined { channel } => {
            let mut record = channel.clone();
            record.is_member = true;
            Some(registry.upsert(record).clone())
        }
        RtmEvent::ChannelLeft { channel } => registry
            .update(channel, |c| c.is_member = false)
            .cloned(),
        RtmEvent::ChannelMarked {
            channel,
            unread_count,
            unread_count_display,
        } => registry
            .update(channel, |c| {
                c.unread_count = *unread_count;
                c.unread_count_display = unread_count_display.unwrap_or(*unread_count);
            })
            .cloned(),
        RtmEvent::Message {
            channel,
            user,
            subtype,
        } => {
            if subtype.is_some() {
                return None;
            }
            let channel = channel.as_deref()?;
            if user.is_some() && user.as_deref() == self_id {
                return None;
            }
            registry
                .update(channel, |c| {
                    c.unread_count += 1;
                    c.unread_count_display += 1;
                })
                .cloned()
        }
        RtmEvent::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(channel: Channel) -> ChannelRegistry {
        let mut reg = ChannelRegistry::new();
        reg.upsert(channel);
        reg
    }

    fn message(channel: &str, user: &str, subtype: Option<&str>) -> RtmEvent {
        RtmEvent::Message {
            channel: Some(channel.into()),
            user: Some(user.into()),
            subtype: subtype.map(Into::into),
        }
    }

    #[test]
    fn created_then_joined_marks_member_in_both_indices() {
        let mut reg = ChannelRegistry::new();
        let created = RtmEvent::ChannelCreated {
            channel: Channel::new("C5", "puzzle-5"),
        };
        assert!(apply_event(&mut reg, Some("U1"), &created).is_none());
        assert!(!reg.get("C5").unwrap().is_member);

        let joined = RtmEvent::ChannelJoined {
            channel: Channel::new("C5", "puzzle-5"),
        };
        let notified = apply_event(&mut reg, Some("U1"), &joined).unwrap();
        assert!(notified.is_member);
        assert_eq!(reg.get("C5"), reg.by_name("puzzle-5"));
        assert!(reg.by_name("puzzle-5").unwrap().is_member);
    }

    #[test]
    fn created_is_never_a_member() {
        let mut reg = ChannelRegistry::new();
        let mut ch = Channel::new("C5", "puzzle-5");
        ch.is_member = true;
        apply_event(&mut reg, None, &RtmEvent::ChannelCreated { channel: ch });
        assert!(!reg.get("C5").unwrap().is_member);
    }

    #[test]
    fn joined_unknown_channel_is_indexed_by_name() {
        let mut reg = ChannelRegistry::new();
        let joined = RtmEvent::ChannelJoined {
            channel: Channel::new("C7", "logistics"),
        };
        apply_event(&mut reg, None, &joined);
        assert_eq!(reg.by_name("logistics").unwrap().id, "C7");
    }

    #[test]
    fn left_keeps_record_and_clears_membership() {
        let mut ch = Channel::new("C1", "general");
        ch.is_member = true;
        let mut reg = registry_with(ch);

        let left = RtmEvent::ChannelLeft {
            channel: "C1".into(),
        };
        let out = apply_event(&mut reg, None, &left).unwrap();
        assert!(!out.is_member);
        assert_eq!(reg.len(), 1);
        assert!(!reg.by_name("general").unwrap().is_member);
    }

    #[test]
    fn marked_sets_both_counters() {
        let mut reg = registry_with(Channel::new("C1", "general"));
        let marked = RtmEvent::ChannelMarked {
            channel: "C1".into(),
            unread_count: 3,
            unread_count_display: Some(2),
        };
        let out = apply_event(&mut reg, None, &marked).unwrap();
        assert_eq!(out.unread_count, 3);
        assert_eq!(out.unread_count_display, 2);
    }

    #[test]
    fn others_message_increments_unread() {
        let mut reg = registry_with(Channel::new("C1", "general"));
        let out = apply_event(&mut reg, Some("U_ME"), &message("C1", "U_OTHER", None)).unwrap();
        assert_eq!(out.unread_count, 1);
        assert_eq!(out.unread_count_display, 1);
    }

    #[test]
    fn own_message_does_not_increment() {
        let mut reg = registry_with(Channel::new("C1", "general"));
        let out = apply_event(&mut reg, Some("U_ME"), &message("C1", "U_ME", None));
        assert!(out.is_none());
        assert_eq!(reg.get("C1").unwrap().unread_count, 0);
    }

    #[test]
    fn subtyped_message_is_ignored() {
        let mut reg = registry_with(Channel::new("C1", "general"));
        let out = apply_event(
            &mut reg,
            Some("U_ME"),
            &message("C1", "U_OTHER", Some("bot_message")),
        );
        assert!(out.is_none());
        assert_eq!(reg.get("C1").unwrap().unread_count, 0);
    }

    #[test]
    fn stale_ids_are_dropped_without_placeholder() {
        let mut reg = ChannelRegistry::new();
        assert!(apply_event(&mut reg, Some("U_ME"), &message("C9", "U_OTHER", None)).is_none());
        let left = RtmEvent::ChannelLeft {
            channel: "C9".into(),
        };
        assert!(apply_event(&mut reg, None, &left).is_none());
        let marked = RtmEvent::ChannelMarked {
            channel: "C9".into(),
            unread_count: 1,
            unread_count_display: None,
        };
        assert!(apply_event(&mut reg, None, &marked).is_none());
        assert!(reg.is_empty());

        let created = RtmEvent::ChannelCreated {
            channel: Channel::new("C9", "late"),
        };
        apply_event(&mut reg, None, &created);
        assert_eq!(reg.by_name("late").unwrap().id, "C9");
        assert_eq!(reg.get("C9").unwrap().unread_count, 0);
    }

    #[test]
    fn unknown_event_changes_nothing() {
        let mut reg = registry_with(Channel::new("C1", "general"));
        assert!(apply_event(&mut reg, None, &RtmEvent::Unknown).is_none());
        assert_eq!(reg.get("C1"), Some(&Channel::new("C1", "general")));
    }
}
