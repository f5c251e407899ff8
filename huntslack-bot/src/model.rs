//! Hunt documents as stored by the admin app.

use serde::{Deserialize, Serialize};

/// An entry of the hunt event log, discriminated by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum HuntEvent {
    #[serde(rename_all = "camelCase")]
    PuzzleCreated { puzzle_id: String, timestamp_ms: i64 },
    #[serde(rename_all = "camelCase")]
    PuzzleSolutionChanged {
        puzzle_id: String,
        user_id: String,
        timestamp_ms: i64,
    },
    /// Any other event name; never announced.
    #[serde(other)]
    Other,
}

impl HuntEvent {
    pub fn timestamp_ms(&self) -> Option<i64> {
        match self {
            HuntEvent::PuzzleCreated { timestamp_ms, .. }
            | HuntEvent::PuzzleSolutionChanged { timestamp_ms, .. } => Some(*timestamp_ms),
            HuntEvent::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Puzzle {
    pub name: String,
    pub host: String,
    pub path: String,
    #[serde(default)]
    pub is_meta: bool,
    #[serde(default)]
    pub solution: Option<String>,
    /// Slack channel name.
    #[serde(default)]
    pub slack_channel: Option<String>,
    #[serde(default)]
    pub slack_channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub display_name: String,
    #[serde(default)]
    pub slack_user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_event_log_entries() {
        let created: HuntEvent =
            serde_json::from_str(r#"{"name":"PuzzleCreated","puzzleId":"p1","timestampMs":10}"#)
                .unwrap();
        assert_eq!(
            created,
            HuntEvent::PuzzleCreated {
                puzzle_id: "p1".into(),
                timestamp_ms: 10
            }
        );

        let solved: HuntEvent = serde_json::from_str(
            r#"{"name":"PuzzleSolutionChanged","puzzleId":"p1","userId":"u1","timestampMs":11}"#,
        )
        .unwrap();
        assert_eq!(solved.timestamp_ms(), Some(11));

        let other: HuntEvent = serde_json::from_str(
            r#"{"name":"PuzzleStatusChanged","puzzleId":"p1","timestampMs":12}"#,
        )
        .unwrap();
        assert_eq!(other, HuntEvent::Other);
        assert_eq!(other.timestamp_ms(), None);
    }

    #[test]
    fn decodes_puzzle_with_optional_fields() {
        let p: Puzzle = serde_json::from_str(
            r#"{"name":"Crossword","host":"hunt.example.com","path":"/puzzles/crossword","status":"new"}"#,
        )
        .unwrap();
        assert!(!p.is_meta);
        assert!(p.solution.is_none());
        assert!(p.slack_channel_id.is_none());
    }
}
