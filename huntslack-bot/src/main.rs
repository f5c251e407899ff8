//! huntslack-bot: announces hunt progress in Slack.
//!
//! Follows the hunt event log and posts to the dev channel when a puzzle is
//! unlocked or solved. Events older than the bot's start time are skipped.
//!
//! Requires a bot token (`--token`, SLACK_BOT_TOKEN or `slack.bot_token` in
//! the config file).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use huntslack_sdk::api::HttpSlackApi;

use huntslack_bot::config::{BotOverrides, BotSettings, Config};
use huntslack_bot::notifier::Notifier;
use huntslack_bot::store::HuntStore;

#[derive(Parser)]
#[command(name = "huntslack-bot", about = "Announce puzzle unlocks and solves in Slack")]
struct Args {
    /// Slack bot token (or set SLACK_BOT_TOKEN env var)
    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Channel to post to [default: site-dev]
    #[arg(long)]
    channel: Option<String>,

    /// Name to post as [default: SuperTeamAwesomeBot]
    #[arg(long)]
    username: Option<String>,

    /// Hunt database path
    #[arg(long)]
    hunt_db: Option<PathBuf>,

    /// How often to check the event log, in milliseconds [default: 1000]
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Config file [default: ~/.config/huntslack/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huntslack=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    let settings = BotSettings::merge(
        BotOverrides {
            token: args.token,
            channel: args.channel,
            username: args.username,
            hunt_db: args.hunt_db,
            poll_interval_ms: args.poll_interval_ms,
        },
        &config,
    )?;

    if let Some(parent) = settings.hunt_db.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let store = HuntStore::open(&settings.hunt_db)?;

    let start_ms = chrono::Utc::now().timestamp_millis();
    let notifier = Notifier::new(
        Arc::new(HttpSlackApi::new()),
        settings.token.clone(),
        settings.channel.clone(),
        settings.username.clone(),
        start_ms,
    );

    tracing::info!(
        channel = %settings.channel,
        hunt_db = %settings.hunt_db.display(),
        "Starting huntslack-bot"
    );
    tracing::info!("Bot running. Ctrl+C to stop.");

    let mut cursor = 0;
    let mut ticker = tokio::time::interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                match notifier.poll(&store, &mut cursor).await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(posted = n, cursor, "Poll done"),
                    Err(e) => tracing::error!(cursor, "Poll failed: {e:#}"),
                }
            }
        }
    }

    Ok(())
}
