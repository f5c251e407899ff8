//! Persistent configuration for the huntslack binaries.
//!
//! Config file lives at `~/.config/huntslack/config.toml`:
//!
//! ```toml
//! [slack]
//! client_id = "1234.5678"
//! client_secret = "..."
//! token_db = "/var/lib/huntslack/tokens.db"
//!
//! [bot]
//! channel = "site-dev"
//! hunt_db = "/var/lib/huntslack/hunt.db"
//! poll_interval_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use huntslack_sdk::auth::OAuthConfig;
use serde::{Deserialize, Serialize};

/// Channel puzzle announcements go to.
pub const DEFAULT_CHANNEL: &str = "site-dev";
/// Name the notifier posts under.
pub const DEFAULT_USERNAME: &str = "SuperTeamAwesomeBot";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub slack: SlackSection,
    pub bot: BotSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SlackSection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Loopback redirect registered for the Slack app.
    pub redirect_uri: Option<String>,
    /// SQLite file holding per-user access tokens.
    pub token_db: Option<PathBuf>,
    /// Token the notifier posts with.
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BotSection {
    pub channel: Option<String>,
    pub username: Option<String>,
    /// SQLite file with the hunt event log, puzzles and users.
    pub hunt_db: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huntslack")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("huntslack")
}

impl Config {
    /// Load from the default location. A missing or broken file yields the
    /// defaults with a warning.
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring config file: {e:#}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("bad config file {}", path.display()))
    }
}

/// Command-line values for the notifier; `None` means not given.
#[derive(Debug, Clone, Default)]
pub struct BotOverrides {
    pub token: Option<String>,
    pub channel: Option<String>,
    pub username: Option<String>,
    pub hunt_db: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
}

/// Effective notifier settings.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub token: String,
    pub channel: String,
    pub username: String,
    pub hunt_db: PathBuf,
    pub poll_interval: Duration,
}

impl BotSettings {
    /// Merge: CLI overrides > config file > defaults.
    pub fn merge(cli: BotOverrides, config: &Config) -> anyhow::Result<Self> {
        let Some(token) = cli.token.or_else(|| config.slack.bot_token.clone()) else {
            bail!("no Slack bot token: pass --token, set SLACK_BOT_TOKEN or slack.bot_token");
        };
        let channel = cli
            .channel
            .or_else(|| config.bot.channel.clone())
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let username = cli
            .username
            .or_else(|| config.bot.username.clone())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let hunt_db = cli
            .hunt_db
            .or_else(|| config.bot.hunt_db.clone())
            .unwrap_or_else(|| data_dir().join("hunt.db"));
        let poll_ms = cli
            .poll_interval_ms
            .or(config.bot.poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(1);

        Ok(Self {
            token,
            channel,
            username,
            hunt_db,
            poll_interval: Duration::from_millis(poll_ms),
        })
    }
}

/// Command-line values for the channel watcher.
#[derive(Debug, Clone, Default)]
pub struct WatchOverrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_db: Option<PathBuf>,
}

/// Effective channel watcher settings.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub oauth: OAuthConfig,
    pub token_db: PathBuf,
}

impl WatchSettings {
    /// Merge: CLI overrides > config file > defaults.
    pub fn merge(cli: WatchOverrides, config: &Config) -> anyhow::Result<Self> {
        let client_id = cli
            .client_id
            .or_else(|| config.slack.client_id.clone())
            .context("no Slack client id: pass --client-id or set SLACK_CLIENT_ID")?;
        let client_secret = cli
            .client_secret
            .or_else(|| config.slack.client_secret.clone())
            .context("no Slack client secret: pass --client-secret or set SLACK_CLIENT_SECRET")?;

        let mut oauth = OAuthConfig::new(client_id, client_secret);
        if let Some(uri) = cli.redirect_uri.or_else(|| config.slack.redirect_uri.clone()) {
            oauth = oauth.with_redirect_uri(uri);
        }
        let token_db = cli
            .token_db
            .or_else(|| config.slack.token_db.clone())
            .unwrap_or_else(|| data_dir().join("tokens.db"));

        Ok(Self { oauth, token_db })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        toml::from_str(
            r#"
            [slack]
            client_id = "file-id"
            client_secret = "file-secret"
            bot_token = "xoxb-file"

            [bot]
            channel = "hunt-hq"
            poll_interval_ms = 250
            "#,
        )
        .unwrap()
    }

    #[test]
    fn bot_settings_prefer_cli_then_file() {
        let s = BotSettings::merge(
            BotOverrides {
                token: Some("xoxb-cli".into()),
                ..Default::default()
            },
            &sample(),
        )
        .unwrap();
        assert_eq!(s.token, "xoxb-cli");
        assert_eq!(s.channel, "hunt-hq");
        assert_eq!(s.username, DEFAULT_USERNAME);
        assert_eq!(s.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn bot_settings_fall_back_to_defaults() {
        let s = BotSettings::merge(
            BotOverrides {
                token: Some("xoxb".into()),
                ..Default::default()
            },
            &Config::default(),
        )
        .unwrap();
        assert_eq!(s.channel, DEFAULT_CHANNEL);
        assert_eq!(s.poll_interval, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert!(s.hunt_db.ends_with("hunt.db"));
    }

    #[test]
    fn bot_settings_require_token() {
        assert!(BotSettings::merge(BotOverrides::default(), &Config::default()).is_err());
    }

    #[test]
    fn watch_settings_merge_credentials() {
        let s = WatchSettings::merge(
            WatchOverrides {
                client_secret: Some("cli-secret".into()),
                redirect_uri: Some("http://127.0.0.1:9000/cb".into()),
                ..Default::default()
            },
            &sample(),
        )
        .unwrap();
        assert_eq!(s.oauth.client_id, "file-id");
        assert_eq!(s.oauth.client_secret, "cli-secret");
        assert_eq!(s.oauth.redirect_uri.as_deref(), Some("http://127.0.0.1:9000/cb"));
        assert!(s.token_db.ends_with("tokens.db"));
    }

    #[test]
    fn watch_settings_require_client_id() {
        let err = WatchSettings::merge(WatchOverrides::default(), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("client id"));
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[bot]\nchannel = \"ops\"\n").unwrap();
        let c = Config::load_from(&path).unwrap();
        assert_eq!(c.bot.channel.as_deref(), Some("ops"));
        assert!(c.slack.client_id.is_none());

        std::fs::write(&path, "[bot\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
