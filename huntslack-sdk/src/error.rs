//! Error type shared by the SDK.

/// Errors surfaced by the Slack client.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Slack answered with `ok: false`.
    #[error("Slack API {method} failed: {error}")]
    Api { method: String, error: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The interactive authorization was declined or returned no code.
    #[error("authorization declined: {0}")]
    AuthorizationDeclined(String),

    /// An operation needed a token before one was obtained.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The connection was torn down while the operation was in flight.
    #[error("connection cancelled")]
    Cancelled,
}

pub type Result<T, E = SlackError> = std::result::Result<T, E>;
