//! Puzzle announcements: follows the hunt event log and posts to Slack.
//!
//! Only events newer than the notifier's start time are announced, so a
//! restart doesn't replay the whole hunt into the channel.

use std::sync::Arc;

use anyhow::Result;
use huntslack_sdk::api::{PostOptions, SlackApi};

use crate::format;
use crate::model::HuntEvent;
use crate::store::HuntStore;

const UNLOCKED_EMOJI: &str = ":callitin:";
const SOLVED_EMOJI: &str = ":pikadance:";
/// Log entries read per poll.
const BATCH: usize = 100;

/// A message ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub text: String,
    pub icon_emoji: &'static str,
}

pub struct Notifier {
    api: Arc<dyn SlackApi>,
    token: String,
    channel: String,
    username: String,
    start_ms: i64,
}

impl Notifier {
    pub fn new(
        api: Arc<dyn SlackApi>,
        token: String,
        channel: String,
        username: String,
        start_ms: i64,
    ) -> Self {
        Self {
            api,
            token,
            channel,
            username,
            start_ms,
        }
    }

    /// The announcement for `event`, if it deserves one.
    ///
    /// Old events, unknown event kinds, and events whose puzzle or user
    /// can't be resolved produce nothing.
    pub fn announcement(
        &self,
        store: &HuntStore,
        event: &HuntEvent,
    ) -> Result<Option<Announcement>> {
        if event.timestamp_ms().is_none_or(|ts| ts <= self.start_ms) {
            return Ok(None);
        }
        match event {
            HuntEvent::PuzzleCreated { puzzle_id, .. } => {
                let Some(puzzle) = store.puzzle(puzzle_id)? else {
                    tracing::warn!(%puzzle_id, "Unlocked puzzle not found");
                    return Ok(None);
                };
                Ok(Some(Announcement {
                    text: format::new_puzzle_message(&puzzle),
                    icon_emoji: UNLOCKED_EMOJI,
                }))
            }
            HuntEvent::PuzzleSolutionChanged {
                puzzle_id, user_id, ..
            } => {
                let (Some(puzzle), Some(user)) = (store.puzzle(puzzle_id)?, store.user(user_id)?)
                else {
                    tracing::warn!(%puzzle_id, %user_id, "Solved puzzle or solver not found");
                    return Ok(None);
                };
                Ok(Some(Announcement {
                    text: format::solved_message(&puzzle, &user),
                    icon_emoji: SOLVED_EMOJI,
                }))
            }
            HuntEvent::Other => Ok(None),
        }
    }

    /// Announce `event` if it deserves it. Returns whether anything was posted.
    pub async fn handle(&self, store: &HuntStore, event: &HuntEvent) -> Result<bool> {
        let Some(announcement) = self.announcement(store, event)? else {
            return Ok(false);
        };
        let options = PostOptions {
            username: Some(self.username.clone()),
            icon_emoji: Some(announcement.icon_emoji.to_string()),
        };
        self.api
            .post_message(&self.token, &self.channel, &announcement.text, &options)
            .await?;
        tracing::info!(channel = %self.channel, "Posted: {}", announcement.text);
        Ok(true)
    }

    /// Process log entries past `cursor`, advancing it. Returns the number of
    /// messages posted.
    ///
    /// A failed post stops the batch with the cursor left before the failed entry,
    /// so the next poll retries it.
    pub async fn poll(&self, store: &HuntStore, cursor: &mut i64) -> Result<usize> {
        let mut posted = 0;
        loop {
            let entries = store.events_after(*cursor, BATCH)?;
            if entries.is_empty() {
                return Ok(posted);
            }
            for entry in entries {
                if let Some(event) = &entry.event {
                    if self.handle(store, event).await? {
                        posted += 1;
                    }
                }
                *cursor = entry.id;
            }
        }
    }
}
