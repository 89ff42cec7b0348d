//! Realtime connection manager.
//!
//! Owns at most one channel at a time. A supervisor task opens the channel,
//! joins the user's room, pumps inbound messages to handlers and, when the
//! server drops the channel, reconnects with bounded exponential backoff.
//! Every supervisor carries a generation number; a `connect()` or
//! `disconnect()` bumps it, so a stale supervisor can never overwrite state.

use crate::messages::user_room;
use crate::transport::{ChannelEvent, ChannelHandle, CloseCause, Handshake, RealtimeTransport};
use crate::{RelayError, RelayMessage, RelayResult};
use pitstop_config_and_utils::Config;
use session_engine::SessionSnapshot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Realtime endpoint (e.g., wss://realtime.pitstop.app/ws).
    pub url: Url,
    /// Bound on a single open attempt.
    pub connect_timeout: Duration,
    /// Heartbeat period for the WebSocket transport.
    pub heartbeat_interval: Duration,
    /// Delay before the first reconnect; doubled per attempt.
    pub reconnect_base_delay: Duration,
    /// Upper bound on any reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Consecutive failures after which the manager gives up.
    pub max_reconnect_attempts: u32,
}

impl RelayConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }

    pub fn from_config(config: &Config) -> RelayResult<Self> {
        Ok(Self {
            url: config.realtime_url()?,
            connect_timeout: config.connect_timeout(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            reconnect_base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(config.reconnect_max_delay_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
        })
    }

    /// `min(base * 2^attempt, cap)`, saturating at the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.reconnect_base_delay.checked_mul(factor))
            .map_or(self.reconnect_max_delay, |delay| delay.min(self.reconnect_max_delay))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted. Only an explicit `connect()` leaves it.
    Failed,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Reconnecting => "reconnecting",
            ConnectionPhase::Failed => "failed",
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Consecutive failures since the last successful open.
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl ConnectionState {
    fn disconnected() -> Self {
        Self::at(ConnectionPhase::Disconnected, 0)
    }

    fn at(phase: ConnectionPhase, attempt: u32) -> Self {
        Self {
            phase,
            attempt,
            last_error: None,
        }
    }
}

/// Lifecycle and message events broadcast by the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Connected,
    Disconnected {
        reason: Option<String>,
        /// True for `disconnect()`, false when the server or network dropped us.
        by_client: bool,
    },
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    /// Terminal failure after exhausting reconnect attempts.
    ConnectionError(String),
    Message(RelayMessage),
}

type Handler = Arc<dyn Fn(&RelayMessage) + Send + Sync>;

/// Registers per-event handlers before the manager is built.
pub struct ConnectionManagerBuilder {
    config: RelayConfig,
    transport: Arc<dyn RealtimeTransport>,
    session: watch::Receiver<SessionSnapshot>,
    handlers: HashMap<String, Vec<Handler>>,
}

impl ConnectionManagerBuilder {
    /// Call `handler` for every inbound message whose event is `event`.
    pub fn on<F>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(&RelayMessage) + Send + Sync + 'static,
    {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
        self
    }

    pub fn build(self) -> ConnectionManager {
        let (state_tx, _) = watch::channel(ConnectionState::disconnected());
        let (events, _) = broadcast::channel(100);

        ConnectionManager {
            inner: Arc::new(Inner {
                config: self.config,
                transport: self.transport,
                session: self.session,
                handlers: self.handlers,
                state_tx,
                events,
                link: Mutex::new(Link::default()),
            }),
        }
    }
}

#[derive(Default)]
struct Link {
    generation: u64,
    supervisor: Option<JoinHandle<()>>,
    outbound: Option<mpsc::Sender<RelayMessage>>,
}

struct Inner {
    config: RelayConfig,
    transport: Arc<dyn RealtimeTransport>,
    session: watch::Receiver<SessionSnapshot>,
    handlers: HashMap<String, Vec<Handler>>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<RelayEvent>,
    link: Mutex<Link>,
}

/// Manages the realtime channel for the signed-in user.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn builder(
        config: RelayConfig,
        transport: Arc<dyn RealtimeTransport>,
        session: watch::Receiver<SessionSnapshot>,
    ) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            transport,
            session,
            handlers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state_tx.borrow().phase == ConnectionPhase::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.inner.events.subscribe()
    }

    /// Open the channel for the current session.
    ///
    /// Returns false and does nothing without an authenticated session.
    /// Otherwise any existing channel is torn down first and the attempt
    /// counter starts again from zero.
    pub fn connect(&self) -> bool {
        if self.inner.credentials().is_none() {
            debug!("No authenticated session, not connecting");
            return false;
        }

        let was_connected = {
            let mut link = self.inner.lock_link();
            if let Some(supervisor) = link.supervisor.take() {
                supervisor.abort();
            }
            let was_connected = link.outbound.take().is_some();
            link.generation += 1;
            let generation = link.generation;

            self.inner
                .state_tx
                .send_replace(ConnectionState::at(ConnectionPhase::Connecting, 0));
            link.supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.inner), generation)));
            was_connected
        };

        if was_connected {
            self.inner.emit(RelayEvent::Disconnected {
                reason: Some("reconnect requested".to_string()),
                by_client: true,
            });
        }
        info!(url = %self.inner.config.url, "Connecting realtime channel");
        true
    }

    /// Close the channel without scheduling a reconnect. Idempotent.
    pub fn disconnect(&self) {
        let previous = {
            let mut link = self.inner.lock_link();
            link.generation += 1;
            if let Some(supervisor) = link.supervisor.take() {
                supervisor.abort();
            }
            link.outbound = None;
            self.inner.state_tx.send_replace(ConnectionState::disconnected())
        };

        if previous.phase != ConnectionPhase::Disconnected {
            info!(phase = previous.phase.as_str(), "Realtime channel disconnected by client");
            self.inner.emit(RelayEvent::Disconnected {
                reason: None,
                by_client: true,
            });
        }
    }

    /// Queue `message` on the open channel. False when not connected.
    pub fn send(&self, message: RelayMessage) -> bool {
        let link = self.inner.lock_link();
        if self.inner.state_tx.borrow().phase != ConnectionPhase::Connected {
            debug!(event = %message.event, "Not connected, dropping outbound message");
            return false;
        }
        match &link.outbound {
            Some(outbound) => match outbound.try_send(message) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to queue outbound message");
                    false
                }
            },
            None => false,
        }
    }

    /// Send an `event` carrying `data`.
    pub fn emit(&self, event: &str, data: serde_json::Value) -> bool {
        self.send(RelayMessage::new(event).with_data(data))
    }

    pub fn join_room(&self, room: &str) -> bool {
        self.send(RelayMessage::join(room))
    }

    pub fn leave_room(&self, room: &str) -> bool {
        self.send(RelayMessage::leave(room))
    }

    /// Keep the channel in step with the session.
    ///
    /// Connects when the session becomes authenticated (or switches user)
    /// and disconnects when it stops being authenticated. The task ends when
    /// the session publisher goes away.
    pub fn follow_session(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let mut session = self.inner.session.clone();

        tokio::spawn(async move {
            let mut current: Option<String> = None;
            loop {
                let user = {
                    let snapshot = session.borrow_and_update();
                    if snapshot.is_authenticated() {
                        snapshot.user_id.clone()
                    } else {
                        None
                    }
                };

                if user != current {
                    match &user {
                        Some(user_id) => {
                            debug!(user_id = %user_id, "Session authenticated, connecting");
                            manager.connect();
                        }
                        None => {
                            debug!("Session ended, disconnecting");
                            manager.disconnect();
                        }
                    }
                    current = user;
                }

                if session.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Inner {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RelayEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// User id and access token of the current session, if authenticated.
    fn credentials(&self) -> Option<(String, String)> {
        let snapshot = self.session.borrow();
        if !snapshot.is_authenticated() {
            return None;
        }
        Some((snapshot.user_id.clone()?, snapshot.access_token.clone()?))
    }

    /// Publish `state` only while `generation` is current.
    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let link = self.lock_link();
        if link.generation != generation {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    async fn open(&self, access_token: String) -> RelayResult<ChannelHandle> {
        let handshake = Handshake {
            url: self.config.url.clone(),
            access_token,
        };
        match tokio::time::timeout(self.config.connect_timeout, self.transport.open(&handshake)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout),
        }
    }

    /// Run an open channel until it closes.
    ///
    /// Returns `None` when this supervisor was superseded.
    async fn run_channel(&self, generation: u64, user_id: &str, handle: ChannelHandle) -> Option<CloseCause> {
        let ChannelHandle { outbound, mut inbound } = handle;

        {
            let mut link = self.lock_link();
            if link.generation != generation {
                return None;
            }
            link.outbound = Some(outbound.clone());
            self.state_tx
                .send_replace(ConnectionState::at(ConnectionPhase::Connected, 0));
        }
        info!(user_id = %user_id, "Realtime channel connected");
        self.emit(RelayEvent::Connected);

        let room = user_room(user_id);
        if let Err(e) = outbound.try_send(RelayMessage::join(&room)) {
            warn!(room = %room, error = %e, "Failed to join user room");
        }
        drop(outbound);

        let cause = loop {
            match inbound.recv().await {
                Some(ChannelEvent::Message(message)) => self.dispatch(message),
                Some(ChannelEvent::Closed(cause)) => break cause,
                None => break CloseCause::Transport("channel dropped".to_string()),
            }
        };

        {
            let mut link = self.lock_link();
            if link.generation != generation {
                return None;
            }
            link.outbound = None;
        }
        warn!(cause = %cause, "Realtime channel lost");
        self.emit(RelayEvent::Disconnected {
            reason: Some(cause.to_string()),
            by_client: false,
        });
        Some(cause)
    }

    fn dispatch(&self, message: RelayMessage) {
        if let Some(handlers) = self.handlers.get(&message.event) {
            for handler in handlers {
                handler(&message);
            }
        } else {
            debug!(event = %message.event, "No handler for realtime event");
        }
        self.emit(RelayEvent::Message(message));
    }
}

/// Connect, run, and reconnect until superseded, signed out, or out of attempts.
async fn supervise(inner: Arc<Inner>, generation: u64) {
    let mut attempt: u32 = 0;

    loop {
        let Some((user_id, access_token)) = inner.credentials() else {
            debug!("Session gone, stopping realtime supervisor");
            inner.set_state(generation, ConnectionState::disconnected());
            return;
        };

        let failure = match inner.open(access_token).await {
            Ok(handle) => {
                attempt = 0;
                match inner.run_channel(generation, &user_id, handle).await {
                    Some(cause) => cause.to_string(),
                    None => return,
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "Failed to open realtime channel");
                e.to_string()
            }
        };

        attempt += 1;
        if attempt >= inner.config.max_reconnect_attempts {
            let state = ConnectionState {
                phase: ConnectionPhase::Failed,
                attempt,
                last_error: Some(failure.clone()),
            };
            if inner.set_state(generation, state) {
                error!(attempt, error = %failure, "Realtime reconnect attempts exhausted");
                inner.emit(RelayEvent::ConnectionError(failure));
            }
            return;
        }

        let delay = inner.config.delay_for_attempt(attempt - 1);
        let state = ConnectionState {
            phase: ConnectionPhase::Reconnecting,
            attempt,
            last_error: Some(failure),
        };
        if !inner.set_state(generation, state) {
            return;
        }
        info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling realtime reconnect");
        inner.emit(RelayEvent::Reconnecting { attempt, delay });

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RelayConfig {
        RelayConfig::new(Url::parse("wss://realtime.example.com/ws").unwrap())
    }

    #[test]
    fn test_relay_config_defaults() {
        let config = config();
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(10));
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_relay_config_from_config() {
        let core = Config {
            realtime_url: "ws://localhost:9000/ws".to_string(),
            reconnect_base_delay_ms: 250,
            max_reconnect_attempts: 3,
            ..Config::default()
        };
        let config = RelayConfig::from_config(&core).unwrap();
        assert_eq!(config.url.as_str(), "ws://localhost:9000/ws");
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(config.max_reconnect_attempts, 3);
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let config = config();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_saturates_on_overflow() {
        let config = config();
        assert_eq!(config.delay_for_attempt(31), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(32), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(ConnectionPhase::Reconnecting.as_str(), "reconnecting");
        assert_eq!(ConnectionPhase::Failed.as_str(), "failed");
    }
}
