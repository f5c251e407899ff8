//! channel-watch: follow Slack channel membership and unread counts live.
//!
//! Authorizes through the browser on first use, then keeps the RTM session
//! open and prints every change to the watched channels.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use huntslack_sdk::token::SqliteTokenStore;
use huntslack_sdk::{Channel, ConnectionState, SessionConfig, SlackSession};

use huntslack_bot::config::{Config, WatchOverrides, WatchSettings};

#[derive(Parser)]
#[command(name = "channel-watch", about = "Watch Slack channel unread counts")]
struct Args {
    /// Channels to watch (names without '#')
    #[arg(required = true)]
    channels: Vec<String>,

    /// Hunt user the Slack token is stored under
    #[arg(long, default_value = "local")]
    user: String,

    /// Join the channels once connected
    #[arg(long)]
    join: bool,

    /// Slack app client id (or set SLACK_CLIENT_ID env var)
    #[arg(long, env = "SLACK_CLIENT_ID")]
    client_id: Option<String>,

    /// Slack app client secret (or set SLACK_CLIENT_SECRET env var)
    #[arg(long, env = "SLACK_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// OAuth redirect URI registered for the app
    #[arg(long)]
    redirect_uri: Option<String>,

    /// Token database path
    #[arg(long)]
    token_db: Option<PathBuf>,

    /// Config file [default: ~/.config/huntslack/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,
}

fn print_channel(channel: &Channel) {
    let member = if channel.is_member { "member" } else { "not a member" };
    println!(
        "#{:<24} unread {:>4} (display {:>4})  {member}",
        channel.name, channel.unread_count, channel.unread_count_display
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huntslack=info,channel_watch=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    let settings = WatchSettings::merge(
        WatchOverrides {
            client_id: args.client_id,
            client_secret: args.client_secret,
            redirect_uri: args.redirect_uri,
            token_db: args.token_db,
        },
        &config,
    )?;

    if let Some(parent) = settings.token_db.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tokens = Arc::new(SqliteTokenStore::open(&settings.token_db)?);
    let session = SlackSession::over_http(
        SessionConfig {
            user_id: args.user.clone(),
            oauth: settings.oauth,
        },
        tokens,
    );

    let mut state = session.watch_state();
    let subscriptions: Vec<_> = args
        .channels
        .iter()
        .map(|name| {
            session.subscribe(name, "channel-watch", |c| {
                print_channel(c);
                Ok(())
            })
        })
        .collect();
    tracing::info!(channels = ?args.channels, user = %args.user, "Watching");

    let mut joined = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                match &current {
                    ConnectionState::Connected { self_id } => {
                        tracing::info!(%self_id, "Connected");
                        if args.join && !joined {
                            joined = true;
                            for name in &args.channels {
                                if let Err(e) = session.join_channel(name).await {
                                    tracing::warn!(channel = %name, "Join failed: {e}");
                                }
                            }
                        }
                    }
                    ConnectionState::Failed { reason } => {
                        tracing::error!("Connection failed: {reason}");
                        break;
                    }
                    ConnectionState::Disconnected => {
                        tracing::warn!("Disconnected by Slack");
                        break;
                    }
                    ConnectionState::Connecting => tracing::debug!("Connecting"),
                }
            }
        }
    }

    for sub in subscriptions {
        sub.unsubscribe();
    }
    session.disconnect();
    Ok(())
}
