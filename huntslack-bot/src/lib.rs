//! huntslack-bot: Slack-side helpers for running the hunt.
//!
//! - [`notifier`] announces unlocked and solved puzzles from the hunt event log
//! - [`config`] merges CLI flags, the config file and defaults for both binaries

pub mod config;
pub mod format;
pub mod model;
pub mod notifier;
pub mod store;
