//! Slack Web API calls used by the session and the bots.
//!
//! Only the handful of methods this workspace needs. Every response is
//! checked for `"ok": true`; anything else becomes [`SlackError::Api`].

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::auth::OAuthConfig;
use crate::channel::Channel;
use crate::error::{Result, SlackError};

/// Default Web API base.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Response of `rtm.start`.
#[derive(Debug, Clone, Deserialize)]
pub struct RtmStart {
    /// WebSocket URL for the realtime stream.
    pub url: String,
    #[serde(rename = "self")]
    pub self_info: SelfInfo,
    /// Initial channel snapshot.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// The authenticated user, as reported by `rtm.start`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelfInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: String,
}

/// Presentation overrides for `chat.postMessage`.
#[derive(Debug, Clone, Default)]
pub struct PostOptions {
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
}

/// The Slack Web API surface the rest of the crate talks to.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Exchange an OAuth authorization code for an access token.
    async fn oauth_access(&self, oauth: &OAuthConfig, code: &str) -> Result<String>;

    /// Start an RTM session: WebSocket URL, own identity, channel snapshot.
    async fn rtm_start(&self, token: &str) -> Result<RtmStart>;

    async fn join_channel(&self, token: &str, name: &str) -> Result<()>;

    async fn team_info(&self, token: &str) -> Result<Team>;

    async fn post_message(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        options: &PostOptions,
    ) -> Result<()>;
}

/// [`SlackApi`] over HTTPS with reqwest.
#[derive(Debug, Clone)]
pub struct HttpSlackApi {
    base_url: String,
    http: reqwest::Client,
}

impl Default for HttpSlackApi {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSlackApi {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        tracing::debug!(method, "Slack API GET");
        let body: serde_json::Value = self
            .http
            .get(self.method_url(method))
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode_response(method, body)
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        tracing::debug!(method, "Slack API POST");
        let body: serde_json::Value = self
            .http
            .post(self.method_url(method))
            .form(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode_response(method, body)
    }
}

/// Check Slack's `ok` flag, then decode the rest of the body.
fn decode_response<T: DeserializeOwned>(method: &str, body: serde_json::Value) -> Result<T> {
    if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        let error = body
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown_error")
            .to_string();
        return Err(SlackError::Api {
            method: method.to_string(),
            error,
        });
    }
    Ok(serde_json::from_value(body)?)
}

#[derive(Deserialize)]
struct OAuthAccess {
    access_token: String,
}

#[derive(Deserialize)]
struct TeamInfo {
    team: Team,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[async_trait]
impl SlackApi for HttpSlackApi {
    async fn oauth_access(&self, oauth: &OAuthConfig, code: &str) -> Result<String> {
        let mut params = vec![
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("code", code),
        ];
        if let Some(redirect_uri) = oauth.redirect_uri.as_deref() {
            params.push(("redirect_uri", redirect_uri));
        }
        let resp: OAuthAccess = self.get("oauth.access", &params).await?;
        Ok(resp.access_token)
    }

    async fn rtm_start(&self, token: &str) -> Result<RtmStart> {
        self.get("rtm.start", &[("token", token), ("simple_latest", "true")])
            .await
    }

    async fn join_channel(&self, token: &str, name: &str) -> Result<()> {
        let _: Empty = self
            .get("channels.join", &[("token", token), ("name", name)])
            .await?;
        Ok(())
    }

    async fn team_info(&self, token: &str) -> Result<Team> {
        let resp: TeamInfo = self.get("team.info", &[("token", token)]).await?;
        Ok(resp.team)
    }

    async fn post_message(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        options: &PostOptions,
    ) -> Result<()> {
        let mut params = vec![("token", token), ("channel", channel), ("text", text)];
        if let Some(username) = options.username.as_deref() {
            params.push(("username", username));
        }
        if let Some(emoji) = options.icon_emoji.as_deref() {
            params.push(("icon_emoji", emoji));
        }
        let _: Empty = self.post("chat.postMessage", &params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_rtm_start() {
        let body = json!({
            "ok": true,
            "url": "wss://ms1.slack-msgs.com/websocket/abc",
            "self": {"id": "U_ME", "name": "hunter"},
            "team": {"id": "T1"},
            "channels": [
                {"id": "C1", "name": "general", "is_member": true, "unread_count": 0},
                {"id": "C2", "name": "random"}
            ]
        });
        let start: RtmStart = decode_response("rtm.start", body).unwrap();
        assert_eq!(start.self_info.id, "U_ME");
        assert_eq!(start.channels.len(), 2);
        assert!(start.channels[0].is_member);
        assert!(!start.channels[1].is_member);
    }

    #[test]
    fn not_ok_becomes_api_error() {
        let body = json!({"ok": false, "error": "invalid_auth"});
        let err = decode_response::<Empty>("rtm.start", body).unwrap_err();
        match err {
            SlackError::Api { method, error } => {
                assert_eq!(method, "rtm.start");
                assert_eq!(error, "invalid_auth");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_ok_is_an_error() {
        let err = decode_response::<Empty>("team.info", json!({"team": {}})).unwrap_err();
        assert!(matches!(err, SlackError::Api { ref error, .. } if error == "unknown_error"));
    }

    #[test]
    fn base_url_is_trimmed() {
        let api = HttpSlackApi::new().with_base_url("http://127.0.0.1:9999/api/");
        assert_eq!(api.method_url("rtm.start"), "http://127.0.0.1:9999/api/rtm.start");
    }
}
