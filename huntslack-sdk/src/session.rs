//! The Slack session: token acquisition, the single RTM connection, and the
//! channel state + subscriptions it feeds.
//!
//! ## Lifecycle
//!
//! `connect()` reserves the connection slot, obtains a token (memory cache,
//! then the [`TokenStore`], then the interactive OAuth flow), calls
//! `rtm.start`, opens the WebSocket and applies the channel snapshot. A reader
//! task then applies each RTM frame to the registry and notifies subscribers
//! of the affected channel name.
//!
//! `disconnect()` and an unsolicited close both release the slot and clear the
//! registry. The cached token and the subscription table survive, so the next
//! `connect()` re-notifies every subscriber from the fresh snapshot. There is
//! no automatic reconnect.
//!
//! Each connection attempt gets a generation number and a
//! [`CancellationToken`]. Work belonging to a generation that no longer owns
//! the slot (a late snapshot, a frame read just before cancellation) is
//! discarded.
//!
//! Lock order is `delivery`, `connection`, `channels`. Only `delivery` is held
//! while subscriber callbacks run, so notifications reach each subscriber in
//! registry order; it is reentrant, so a callback may subscribe. No lock is
//! held across an `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{HttpSlackApi, RtmStart, SlackApi, Team};
use crate::auth::{self, Authorizer, DEFAULT_REDIRECT_URI, LoopbackAuthorizer, OAuthConfig};
use crate::channel::{Channel, ChannelRegistry};
use crate::dispatch::apply_event;
use crate::error::{Result, SlackError};
use crate::event::{ConnectionState, RtmEvent};
use crate::subscription::{ChannelCallback, SubscriptionTable, deliver};
use crate::token::TokenStore;
use crate::transport::{RtmSocket, Transport, WsTransport};

/// Static configuration of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hunt user id the Slack token is stored under.
    pub user_id: String,
    pub oauth: OAuthConfig,
}

/// A Slack realtime session. Clones share the same state.
#[derive(Clone)]
pub struct SlackSession {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    api: Arc<dyn SlackApi>,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    authorizer: Arc<dyn Authorizer>,
    token: Mutex<Option<String>>,
    connection: Mutex<Option<ConnectionSlot>>,
    channels: Mutex<ChannelState>,
    delivery: ReentrantMutex<()>,
    generations: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
}

/// Owner of the single logical connection.
struct ConnectionSlot {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ChannelState {
    registry: ChannelRegistry,
    subscriptions: SubscriptionTable,
    self_id: Option<String>,
}

type Pending = Vec<(Vec<ChannelCallback>, Channel)>;

impl SlackSession {
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn SlackApi>,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                api,
                transport,
                tokens,
                authorizer,
                token: Mutex::new(None),
                connection: Mutex::new(None),
                channels: Mutex::new(ChannelState::default()),
                delivery: ReentrantMutex::new(()),
                generations: AtomicU64::new(0),
                state_tx,
            }),
        }
    }

    /// Session against the real Slack endpoints, authorizing through the
    /// browser with a loopback redirect.
    pub fn over_http(config: SessionConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let redirect_uri = config
            .oauth
            .redirect_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        Self::new(
            config,
            Arc::new(HttpSlackApi::new()),
            Arc::new(WsTransport),
            tokens,
            Arc::new(LoopbackAuthorizer::new(redirect_uri)),
        )
    }

    // ── Connection lifecycle ──

    /// Establish the RTM connection unless one exists or is being set up.
    ///
    /// Returns [`SlackError::Cancelled`] if `disconnect()` ran while this call
    /// was in flight. Other failures release the slot and publish
    /// [`ConnectionState::Failed`].
    pub async fn connect(&self) -> Result<()> {
        let (generation, cancel) = {
            let mut slot = self.inner.connection.lock();
            if slot.is_some() {
                tracing::debug!("connect: connection already present");
                return Ok(());
            }
            let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
            let cancel = CancellationToken::new();
            *slot = Some(ConnectionSlot {
                generation,
                cancel: cancel.clone(),
            });
            (generation, cancel)
        };
        self.set_state(ConnectionState::Connecting);

        match self.establish(generation, cancel).await {
            Ok(()) => Ok(()),
            Err(SlackError::Cancelled) => {
                tracing::debug!(generation, "Connect abandoned after disconnect");
                Err(SlackError::Cancelled)
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "Slack connect failed");
                self.teardown(
                    generation,
                    ConnectionState::Failed {
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn establish(&self, generation: u64, cancel: CancellationToken) -> Result<()> {
        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SlackError::Cancelled),
            token = self.acquire_token() => token?,
        };

        let start: RtmStart = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SlackError::Cancelled),
            start = self.inner.api.rtm_start(&token) => start?,
        };
        tracing::info!(
            self_id = %start.self_info.id,
            channels = start.channels.len(),
            "rtm.start ok"
        );

        let mut socket = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SlackError::Cancelled),
            socket = self.inner.transport.open(&start.url) => socket?,
        };

        let self_id = start.self_info.id.clone();
        if !self.load_snapshot(generation, start) || !self.publish_connected(generation, self_id) {
            // Disconnected after the handshake, possibly by a subscriber.
            if let Err(e) = socket.close().await {
                tracing::debug!(error = %e, "Closing abandoned RTM socket failed");
            }
            return Err(SlackError::Cancelled);
        }
        tracing::info!(generation, "Connected to Slack RTM");

        let session = self.clone();
        tokio::spawn(async move { session.read_loop(generation, cancel, socket).await });
        Ok(())
    }

    /// Cached token, else the store, else the interactive flow.
    async fn acquire_token(&self) -> Result<String> {
        let cached = self.inner.token.lock().clone();
        if let Some(token) = cached {
            return Ok(token);
        }

        let user_id = &self.inner.config.user_id;
        if let Some(token) = self.inner.tokens.load(user_id)? {
            tracing::debug!(%user_id, "Loaded stored Slack token");
            *self.inner.token.lock() = Some(token.clone());
            return Ok(token);
        }

        let authorize_url = self.inner.config.oauth.authorize_url()?;
        let redirect = self.inner.authorizer.authorize(&authorize_url).await?;
        let code = auth::code_from_redirect(redirect)?;
        let token = self
            .inner
            .api
            .oauth_access(&self.inner.config.oauth, &code)
            .await?;
        self.inner.tokens.save(user_id, &token)?;
        *self.inner.token.lock() = Some(token.clone());
        tracing::info!(%user_id, "Obtained Slack access token");
        Ok(token)
    }

    /// Apply the snapshot and notify its subscribers. Returns false if
    /// `generation` no longer owns the slot.
    fn load_snapshot(&self, generation: u64, start: RtmStart) -> bool {
        let _delivery = self.inner.delivery.lock();
        let Some(pending) = self.apply_snapshot(generation, start) else {
            return false;
        };
        for (callbacks, channel) in &pending {
            deliver(callbacks, channel);
        }
        true
    }

    /// Publish `Connected` unless a disconnect ran since the snapshot.
    fn publish_connected(&self, generation: u64, self_id: String) -> bool {
        let conn = self.inner.connection.lock();
        if current_generation(&conn) != Some(generation) {
            return false;
        }
        self.set_state(ConnectionState::Connected { self_id });
        true
    }

    /// Registry half of [`Self::load_snapshot`]: the notifications to
    /// deliver, or `None` if stale.
    fn apply_snapshot(&self, generation: u64, start: RtmStart) -> Option<Pending> {
        let conn = self.inner.connection.lock();
        if current_generation(&conn) != Some(generation) {
            return None;
        }
        let mut state = self.inner.channels.lock();
        state.self_id = Some(start.self_info.id);
        let mut pending = Vec::new();
        for channel in start.channels {
            let record = state.registry.upsert(channel).clone();
            let callbacks = state.subscriptions.callbacks_for(&record.name);
            if !callbacks.is_empty() {
                pending.push((callbacks, record));
            }
        }
        Some(pending)
    }

    async fn read_loop(
        self,
        generation: u64,
        cancel: CancellationToken,
        mut socket: Box<dyn RtmSocket>,
    ) {
        let end_state = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = socket.close().await {
                        tracing::debug!(error = %e, "Closing RTM socket failed");
                    }
                    return;
                }
                frame = socket.recv() => match frame {
                    Some(Ok(text)) => self.handle_frame(generation, &text),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "RTM stream failed");
                        break ConnectionState::Failed { reason: e.to_string() };
                    }
                    None => {
                        tracing::info!("RTM connection closed by Slack");
                        break ConnectionState::Disconnected;
                    }
                },
            }
        };
        self.teardown(generation, end_state);
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        let Some(event) = RtmEvent::parse(text) else {
            return;
        };
        tracing::debug!(kind = event.kind(), "RTM event");

        let _delivery = self.inner.delivery.lock();
        let notification = {
            let conn = self.inner.connection.lock();
            if current_generation(&conn) != Some(generation) {
                return;
            }
            let mut state = self.inner.channels.lock();
            let ChannelState {
                registry,
                subscriptions,
                self_id,
            } = &mut *state;
            apply_event(registry, self_id.as_deref(), &event)
                .map(|channel| (subscriptions.callbacks_for(&channel.name), channel))
        };
        if let Some((callbacks, channel)) = notification {
            deliver(&callbacks, &channel);
        }
    }

    /// Close the connection, if any, and clear the channel registry.
    ///
    /// The cached token and all subscriptions are kept.
    pub fn disconnect(&self) {
        let slot = {
            let mut conn = self.inner.connection.lock();
            let slot = conn.take();
            self.clear_channels();
            slot
        };
        if let Some(slot) = slot {
            slot.cancel.cancel();
            tracing::info!(generation = slot.generation, "Disconnected from Slack");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Same cleanup as `disconnect()`, but only if `generation` still owns
    /// the slot.
    fn teardown(&self, generation: u64, state: ConnectionState) {
        let slot = {
            let mut conn = self.inner.connection.lock();
            if current_generation(&conn) != Some(generation) {
                return;
            }
            let slot = conn.take();
            self.clear_channels();
            slot
        };
        if let Some(slot) = slot {
            slot.cancel.cancel();
        }
        self.set_state(state);
    }

    fn clear_channels(&self) {
        let mut state = self.inner.channels.lock();
        state.registry.clear();
        state.self_id = None;
    }

    /// Drop the in-memory token; the next connect reads the store again.
    pub fn forget_token(&self) {
        *self.inner.token.lock() = None;
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state_tx.send_replace(state);
    }

    // ── Subscriptions ──

    /// Receive the current and every future state of `channel_name`.
    ///
    /// Re-subscribing with the same `subscriber_id` replaces the callback. If
    /// the channel is already known the callback runs before this returns.
    /// Also starts connecting on the ambient tokio runtime.
    pub fn subscribe<F>(&self, channel_name: &str, subscriber_id: &str, callback: F) -> Subscription
    where
        F: Fn(&Channel) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback: ChannelCallback = Arc::new(callback);
        {
            // Held until the first delivery so no frame overtakes it.
            let _delivery = self.inner.delivery.lock();
            let current = {
                let mut state = self.inner.channels.lock();
                let replaced = state
                    .subscriptions
                    .insert(channel_name, subscriber_id, callback.clone());
                if replaced {
                    tracing::debug!(
                        channel = channel_name,
                        subscriber = subscriber_id,
                        "Replaced subscription"
                    );
                }
                state.registry.by_name(channel_name).cloned()
            };
            if let Some(channel) = current {
                deliver(&[callback], &channel);
            }
        }

        self.spawn_connect();

        Subscription {
            session: self.clone(),
            channel_name: channel_name.to_string(),
            subscriber_id: subscriber_id.to_string(),
        }
    }

    /// Remove one subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, channel_name: &str, subscriber_id: &str) -> bool {
        self.inner
            .channels
            .lock()
            .subscriptions
            .remove(channel_name, subscriber_id)
    }

    fn spawn_connect(&self) {
        if self.inner.connection.lock().is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime; subscription will wait for an explicit connect()");
            return;
        };
        let session = self.clone();
        runtime.spawn(async move {
            match session.connect().await {
                Ok(()) | Err(SlackError::Cancelled) => {}
                Err(e) => tracing::debug!(error = %e, "Background connect failed"),
            }
        });
    }

    // ── Requests ──

    /// Ask Slack to join `channel_name`. The resulting `channel_joined`
    /// event updates the registry.
    pub async fn join_channel(&self, channel_name: &str) -> Result<()> {
        let token = self.cached_token()?;
        self.inner.api.join_channel(&token, channel_name).await?;
        tracing::info!(channel = channel_name, "Requested channel join");
        Ok(())
    }

    /// The team the cached token belongs to.
    pub async fn team(&self) -> Result<Team> {
        let token = self.cached_token()?;
        self.inner.api.team_info(&token).await
    }

    fn cached_token(&self) -> Result<String> {
        self.inner
            .token
            .lock()
            .clone()
            .ok_or(SlackError::NotAuthenticated)
    }

    // ── Read access ──

    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.inner.channels.lock().registry.by_name(name).cloned()
    }

    pub fn channel_by_id(&self, id: &str) -> Option<Channel> {
        self.inner.channels.lock().registry.get(id).cloned()
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.inner.channels.lock().registry.iter().cloned().collect()
    }

    /// The session's own Slack user id while connected.
    pub fn self_id(&self) -> Option<String> {
        self.inner.channels.lock().self_id.clone()
    }

    pub fn has_token(&self) -> bool {
        self.inner.token.lock().is_some()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Follow connection-state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscriber_count(&self, channel_name: &str) -> usize {
        self.inner
            .channels
            .lock()
            .subscriptions
            .subscriber_count(channel_name)
    }
}

fn current_generation(slot: &Option<ConnectionSlot>) -> Option<u64> {
    slot.as_ref().map(|s| s.generation)
}

/// Handle returned by [`SlackSession::subscribe`].
#[must_use = "keep the handle to unsubscribe later"]
pub struct Subscription {
    session: SlackSession,
    channel_name: String,
    subscriber_id: String,
}

impl Subscription {
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    pub fn unsubscribe(self) {
        self.session
            .unsubscribe(&self.channel_name, &self.subscriber_id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel_name", &self.channel_name)
            .field("subscriber_id", &self.subscriber_id)
            .finish()
    }
}
