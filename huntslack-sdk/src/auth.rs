//! Slack OAuth: authorize URL, redirect parsing, interactive authorization.
//!
//! The code-for-token exchange itself lives in [`crate::api::SlackApi::oauth_access`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

use crate::error::{Result, SlackError};

/// Slack's user-facing authorization page.
pub const AUTHORIZE_URL: &str = "https://slack.com/oauth/authorize";

/// Loopback redirect used when the app config does not name one.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/slack_oauth";

/// OAuth client credentials for the Slack app.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Must match a redirect URL registered for the app.
    pub redirect_uri: Option<String>,
    pub scope: String,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            scope: "client".to_string(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// The URL the user is sent to for granting access.
    pub fn authorize_url(&self) -> Result<String> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
        ];
        if let Some(redirect_uri) = self.redirect_uri.as_deref() {
            params.push(("redirect_uri", redirect_uri));
        }
        Ok(Url::parse_with_params(AUTHORIZE_URL, &params)?.to_string())
    }
}

/// Pull the `code` query parameter out of an OAuth redirect URL.
///
/// Returns `None` when the user declined (`error=access_denied`) or the URL
/// carries no code.
pub fn extract_code(redirect_url: &str) -> Option<String> {
    let url = Url::parse(redirect_url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|code| !code.is_empty())
}

/// Runs the interactive part of the OAuth flow.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Send the user to `authorize_url` and return the redirect URL Slack
    /// sent them back to, or `None` if the flow was abandoned.
    async fn authorize(&self, authorize_url: &str) -> Result<Option<String>>;
}

/// Opens the system browser and waits for the redirect on a loopback port.
///
/// The app's redirect URL must point at `http://127.0.0.1:<port>/<path>`.
#[derive(Debug, Clone)]
pub struct LoopbackAuthorizer {
    redirect_uri: String,
    timeout: Duration,
}

impl LoopbackAuthorizer {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serve the redirect path on `listener` until Slack's redirect arrives
    /// or the timeout passes. Other paths get a 404.
    async fn wait_for_redirect(
        &self,
        listener: TcpListener,
        redirect: &Url,
    ) -> Result<Option<String>> {
        let (redirect_tx, redirect_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let app = Router::new()
            .route(redirect.path(), get(oauth_redirect))
            .with_state(Arc::new(Mutex::new(Some(redirect_tx))));
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    stop_rx.await.ok();
                })
                .await
        });

        let received = tokio::time::timeout(self.timeout, redirect_rx).await;
        if stop_tx.send(()).is_err() {
            tracing::debug!("Loopback server already stopped");
        }
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Loopback server failed"),
            Err(e) => tracing::warn!(error = %e, "Loopback server task failed"),
        }

        match received {
            Ok(Ok(query)) => Ok(Some(query.redirect_url(redirect))),
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Slack authorization timed out");
                Ok(None)
            }
        }
    }
}

/// Query Slack appends to the redirect URL.
#[derive(Debug, Deserialize)]
struct RedirectQuery {
    code: Option<String>,
    error: Option<String>,
}

impl RedirectQuery {
    /// The redirect URL as the browser saw it, reduced to `code` / `error`.
    fn redirect_url(&self, redirect: &Url) -> String {
        let mut url = redirect.clone();
        url.set_query(None);
        let params = [("code", &self.code), ("error", &self.error)];
        let present: Vec<_> = params
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (*k, v)))
            .collect();
        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }
        url.to_string()
    }
}

type RedirectSlot = Arc<Mutex<Option<oneshot::Sender<RedirectQuery>>>>;

async fn oauth_redirect(
    State(slot): State<RedirectSlot>,
    Query(query): Query<RedirectQuery>,
) -> Html<&'static str> {
    let page = if query.code.is_some() {
        "<html><body>Slack authorization received. You can close this tab.</body></html>"
    } else {
        "<html><body>Slack authorization was not granted. You can close this tab.</body></html>"
    };
    match slot.lock().take() {
        Some(tx) => {
            if tx.send(query).is_err() {
                tracing::debug!("OAuth redirect arrived after the wait ended");
            }
        }
        None => tracing::debug!("Ignoring repeated OAuth redirect"),
    }
    Html(page)
}

#[async_trait]
impl Authorizer for LoopbackAuthorizer {
    async fn authorize(&self, authorize_url: &str) -> Result<Option<String>> {
        let redirect = Url::parse(&self.redirect_uri)?;
        let host = redirect.host_str().unwrap_or("127.0.0.1");
        let port = redirect.port_or_known_default().unwrap_or(80);

        let listener = TcpListener::bind((host, port)).await?;
        tracing::info!(%authorize_url, "Opening browser for Slack authorization");
        if let Err(e) = open::that(authorize_url) {
            tracing::warn!(error = %e, "Could not open a browser; visit the URL above manually");
        }

        self.wait_for_redirect(listener, &redirect).await
    }
}

/// Turn an authorizer result into a code, treating a missing code as declined.
pub fn code_from_redirect(redirect: Option<String>) -> Result<String> {
    let Some(redirect) = redirect else {
        return Err(SlackError::AuthorizationDeclined("flow abandoned".into()));
    };
    extract_code(&redirect).ok_or_else(|| {
        SlackError::AuthorizationDeclined("redirect carried no authorization code".into())
    })
}
