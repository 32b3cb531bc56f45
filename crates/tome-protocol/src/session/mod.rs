//! Sessions: one participant in a hub-and-spoke star.
//!
//! A session owns its room and all protocol state inside a single tokio
//! task. The application holds a cheap [`Session`] handle and talks to the
//! task over a channel, so membership, listeners and pending requests are
//! only ever touched from one place.
mod effect;
mod executor;
mod r#loop;
mod state;

pub use effect::SessionEffect;
pub use state::SessionState;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tome_transport::{Connector, Room, RoomConfig, DEFAULT_MAX_MESSAGE_SIZE};

use crate::correlator::{PendingReply, ReplySender};
use crate::dispatch::{self, Context, Flow, Listener};
use crate::envelope::Addressing;
use crate::error::TomeError;
use crate::membership::Audience;
use crate::secret::Secret;
use crate::types::{PeerId, Role};
use crate::version::Version;

/// Environment variable overriding [`SessionConfig::app_id`].
pub const APP_ID_ENV: &str = "TOME_APP_ID";

// ── Configuration ─────────────────────────────────────────────────────

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Application id peers must share to meet. Defaults to the protocol
    /// version string.
    pub app_id: String,
    /// Capacity of the handle → session command channel.
    pub command_buffer: usize,
    /// Largest envelope the room will carry, in bytes.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_id: Version::application_id(),
            command_buffer: 64,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl SessionConfig {
    /// Defaults, with `TOME_APP_ID` applied when set and non-empty.
    pub fn new() -> Self {
        let mut config = Self::default();
        if let Ok(app_id) = std::env::var(APP_ID_ENV) {
            if !app_id.is_empty() {
                config.app_id = app_id;
            }
        }
        config
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn command_buffer(mut self, size: usize) -> Self {
        self.command_buffer = size;
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Room coordinates for `secret` (filtered id and password).
    pub fn room_config(&self, secret: &Secret) -> RoomConfig {
        let (room_id, password) = secret.rend(true);
        RoomConfig::new(self.app_id.clone(), room_id, password)
            .max_message_size(self.max_message_size)
    }
}

// ── Commands (handle → session task) ──────────────────────────────────

pub(crate) enum SessionCommand {
    Send {
        msg_type: String,
        data: Value,
        addressing: Addressing,
        reply: oneshot::Sender<Result<(), TomeError>>,
    },
    Request {
        msg_type: String,
        data: Value,
        addressing: Addressing,
        reply: ReplySender,
    },
    Broadcast {
        msg_type: String,
        data: Value,
        audience: Audience,
        reply: oneshot::Sender<Result<(), TomeError>>,
    },
    Subscribe {
        msg_type: String,
        listener: Listener,
    },
    HubId {
        reply: oneshot::Sender<Option<PeerId>>,
    },
    Members {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    PendingRequests {
        reply: oneshot::Sender<usize>,
    },
    /// Reject pending requests, leave the room, stop. Replies with the
    /// number of requests abandoned.
    Quit {
        reply: oneshot::Sender<usize>,
    },
}

// ── Builder ───────────────────────────────────────────────────────────

/// Configure a session before its loop starts.
///
/// Listeners registered here are in place before the first room event is
/// processed, so nothing (not even the hub's challenge) can race ahead of
/// them.
///
/// ```rust,no_run
/// use tome_protocol::{Flow, SessionBuilder};
/// use tome_transport::MemoryNetwork;
///
/// # async fn example() -> Result<(), tome_protocol::TomeError> {
/// let network = MemoryNetwork::new();
/// let _hub = SessionBuilder::host()
///     .secret("ROOMID?PASSWD")
///     .subscribe("client-connected", |peer, _ctx| {
///         println!("admitted {peer}");
///         Flow::Continue
///     })
///     .spawn(&network)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    role: Role,
    secret: Option<Secret>,
    config: Option<SessionConfig>,
    listeners: Vec<(String, Listener)>,
}

impl SessionBuilder {
    /// Build a hub.
    pub fn host() -> Self {
        Self::new(Role::Hub)
    }

    /// Build a spoke.
    pub fn join() -> Self {
        Self::new(Role::Spoke)
    }

    fn new(role: Role) -> Self {
        Self {
            role,
            secret: None,
            config: None,
            listeners: Vec::new(),
        }
    }

    /// Room secret. A random one is drawn when unset.
    pub fn secret(mut self, secret: impl Into<Secret>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn subscribe<F>(mut self, msg_type: &str, f: F) -> Self
    where
        F: FnMut(&Value, &mut Context) -> Flow + Send + 'static,
    {
        self.listeners.push((msg_type.to_string(), dispatch::listener(f)));
        self
    }

    pub fn subscribe_typed<T, F>(mut self, msg_type: &str, f: F) -> Self
    where
        T: DeserializeOwned,
        F: FnMut(T, &mut Context) -> Flow + Send + 'static,
    {
        self.listeners.push((msg_type.to_string(), dispatch::typed(f)));
        self
    }

    /// Join the room through `connector` and start the session task.
    pub async fn spawn<C: Connector>(self, connector: &C) -> Result<Session, TomeError> {
        let config = self.config.clone().unwrap_or_else(SessionConfig::new);
        let secret = self
            .secret
            .clone()
            .unwrap_or_else(Secret::random)
            .normalized();

        match self.role {
            Role::Hub => tracing::info!("hosting... {secret}"),
            Role::Spoke => tracing::info!("joining... {secret}"),
        }

        let room = connector.join_room(config.room_config(&secret)).await?;
        Ok(self.secret(secret).start(room, config))
    }

    /// Start the session task on a room that is already joined.
    pub fn spawn_on<R: Room + 'static>(self, room: R) -> Session {
        let config = self.config.clone().unwrap_or_else(SessionConfig::new);
        self.start(room, config)
    }

    fn start<R: Room + 'static>(self, room: R, config: SessionConfig) -> Session {
        let local_id = room.self_id().clone();
        let mut state = SessionState::new(self.role, local_id.clone());
        for (msg_type, listener) in self.listeners {
            state.subscribe(msg_type, listener);
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
        tokio::spawn(r#loop::session_loop(room, state, cmd_rx));

        tracing::debug!(local = %local_id, role = %self.role, "session started");
        Session {
            cmd_tx,
            local_id,
            role: self.role,
            secret: self.secret,
        }
    }
}

// ── Session handle (app-facing API) ───────────────────────────────────

/// Handle to a running session.
///
/// Cheap to clone. Once the session has quit, or its room has closed,
/// every method returns [`TomeError::SessionClosed`].
#[derive(Clone)]
pub struct Session {
    cmd_tx: mpsc::Sender<SessionCommand>,
    local_id: PeerId,
    role: Role,
    secret: Option<Secret>,
}

impl Session {
    /// Host a star with `secret`, or a random one.
    pub async fn host<C: Connector>(connector: &C, secret: Option<Secret>) -> Result<Self, TomeError> {
        let mut builder = SessionBuilder::host();
        if let Some(secret) = secret {
            builder = builder.secret(secret);
        }
        builder.spawn(connector).await
    }

    /// Join the star behind `secret`, or a random one.
    pub async fn join<C: Connector>(connector: &C, secret: Option<Secret>) -> Result<Self, TomeError> {
        let mut builder = SessionBuilder::join();
        if let Some(secret) = secret {
            builder = builder.secret(secret);
        }
        builder.spawn(connector).await
    }

    /// Identifier the room assigned us.
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_hub(&self) -> bool {
        self.role == Role::Hub
    }

    pub fn is_spoke(&self) -> bool {
        self.role == Role::Spoke
    }

    /// Filtered secret the room was joined with. `None` for sessions started
    /// on a pre-joined room without one.
    pub fn secret(&self) -> Option<&Secret> {
        self.secret.as_ref()
    }

    /// Fire-and-forget send. Default addressing delivers locally.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        msg_type: &str,
        data: &T,
        addressing: Addressing,
    ) -> Result<(), TomeError> {
        let data = serde_json::to_value(data)?;
        self.query(|reply| SessionCommand::Send {
            msg_type: msg_type.to_string(),
            data,
            addressing,
            reply,
        })
        .await?
    }

    pub async fn send_to<T: Serialize + ?Sized>(
        &self,
        peer: &PeerId,
        msg_type: &str,
        data: &T,
    ) -> Result<(), TomeError> {
        self.send(msg_type, data, Addressing::to(peer.clone())).await
    }

    /// Send and wait for the correlated response.
    ///
    /// Fails with [`TomeError::RequestAbandoned`] if the target leaves first.
    /// There is no timeout: wrap the call if one is needed.
    pub async fn request<T: Serialize + ?Sized>(
        &self,
        msg_type: &str,
        data: &T,
        addressing: Addressing,
    ) -> Result<Value, TomeError> {
        let data = serde_json::to_value(data)?;
        let (reply, pending) = PendingReply::channel();
        self.command(SessionCommand::Request {
            msg_type: msg_type.to_string(),
            data,
            addressing,
            reply,
        })
        .await?;
        pending.await
    }

    pub async fn request_to<T: Serialize + ?Sized>(
        &self,
        peer: &PeerId,
        msg_type: &str,
        data: &T,
    ) -> Result<Value, TomeError> {
        self.request(msg_type, data, Addressing::to(peer.clone())).await
    }

    /// Send to the members selected by `audience`.
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        msg_type: &str,
        data: &T,
        audience: Audience,
    ) -> Result<(), TomeError> {
        let data = serde_json::to_value(data)?;
        self.query(|reply| SessionCommand::Broadcast {
            msg_type: msg_type.to_string(),
            data,
            audience,
            reply,
        })
        .await?
    }

    /// Register a listener. Return [`Flow::Done`] to stop listening.
    pub async fn subscribe<F>(&self, msg_type: &str, f: F) -> Result<(), TomeError>
    where
        F: FnMut(&Value, &mut Context) -> Flow + Send + 'static,
    {
        self.subscribe_listener(msg_type, dispatch::listener(f)).await
    }

    /// Register a listener on decoded payloads. Payloads that do not decode
    /// as `T` are skipped.
    pub async fn subscribe_typed<T, F>(&self, msg_type: &str, f: F) -> Result<(), TomeError>
    where
        T: DeserializeOwned,
        F: FnMut(T, &mut Context) -> Flow + Send + 'static,
    {
        self.subscribe_listener(msg_type, dispatch::typed(f)).await
    }

    pub async fn subscribe_listener(&self, msg_type: &str, listener: Listener) -> Result<(), TomeError> {
        self.command(SessionCommand::Subscribe {
            msg_type: msg_type.to_string(),
            listener,
        })
        .await
    }

    /// Hub identifier: our own on a hub, the admitting hub on a spoke.
    pub async fn hub_id(&self) -> Result<Option<PeerId>, TomeError> {
        self.query(|reply| SessionCommand::HubId { reply }).await
    }

    /// Known members in id order.
    pub async fn members(&self) -> Result<Vec<PeerId>, TomeError> {
        self.query(|reply| SessionCommand::Members { reply }).await
    }

    /// Members that are in `ids`.
    pub async fn include(&self, ids: &[PeerId]) -> Result<Vec<PeerId>, TomeError> {
        let members = self.members().await?;
        Ok(members.into_iter().filter(|m| ids.contains(m)).collect())
    }

    /// Members that are not in `ids`.
    pub async fn exclude(&self, ids: &[PeerId]) -> Result<Vec<PeerId>, TomeError> {
        let members = self.members().await?;
        Ok(members.into_iter().filter(|m| !ids.contains(m)).collect())
    }

    pub async fn pending_requests(&self) -> Result<usize, TomeError> {
        self.query(|reply| SessionCommand::PendingRequests { reply }).await
    }

    /// Reject every pending request with [`TomeError::SessionClosed`] and
    /// leave the room.
    pub async fn quit(&self) -> Result<(), TomeError> {
        let abandoned = self.query(|reply| SessionCommand::Quit { reply }).await?;
        tracing::debug!(local = %self.local_id, abandoned, "quit");
        Ok(())
    }

    async fn command(&self, cmd: SessionCommand) -> Result<(), TomeError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| TomeError::SessionClosed)
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, TomeError> {
        let (tx, rx) = oneshot::channel();
        self.command(make(tx)).await?;
        rx.await.map_err(|_| TomeError::SessionClosed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local_id", &self.local_id)
            .field("role", &self.role)
            .finish()
    }
}
