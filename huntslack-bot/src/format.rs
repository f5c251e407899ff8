//! Slack message text for hunt announcements.

use crate::model::{Puzzle, User};

/// `http://<host><path>`
pub fn puzzle_address(puzzle: &Puzzle) -> String {
    format!("http://{}{}", puzzle.host, puzzle.path)
}

/// Mention for a hunt user: a Slack mention when linked, else the display name.
pub fn user_tag(user: &User) -> String {
    match &user.slack_user_id {
        Some(id) if !id.is_empty() => format!("<@{id}>"),
        _ => user.display_name.clone(),
    }
}

/// Clickable channel reference, falling back to plain `#name`.
pub fn channel_link(puzzle: &Puzzle) -> String {
    let name = puzzle.slack_channel.as_deref().unwrap_or_default();
    match puzzle.slack_channel_id.as_deref() {
        Some(id) if !id.is_empty() => format!("<#{id}|{name}>"),
        _ => format!("#{name}"),
    }
}

pub fn new_puzzle_message(puzzle: &Puzzle) -> String {
    let meta = if puzzle.is_meta { " META" } else { "" };
    format!(
        "{}{meta} has been unlocked!\n{}\nJoin the slack channel {}",
        puzzle.name,
        puzzle_address(puzzle),
        channel_link(puzzle)
    )
}

pub fn solved_message(puzzle: &Puzzle, user: &User) -> String {
    let mut text = format!(
        "{} has solved {} ({}) :correct:",
        user_tag(user),
        puzzle.name,
        puzzle_address(puzzle)
    );
    if let Some(solution) = puzzle.solution.as_deref().filter(|s| !s.is_empty()) {
        text.push_str(&format!("\n Solution: `{solution}`"));
    }
    text
}
