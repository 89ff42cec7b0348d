//! Realtime channel for Pitstop.
//!
//! This crate provides:
//! - A WebSocket transport authenticated with the session's access token
//! - A connection manager with bounded exponential-backoff reconnection
//! - Per-user room join on every connect
//! - Per-event handler dispatch and lifecycle events

mod error;
mod manager;
mod messages;
mod transport;

pub use error::{RelayError, RelayResult};
pub use manager::{
    ConnectionManager, ConnectionManagerBuilder, ConnectionPhase, ConnectionState, RelayConfig,
    RelayEvent,
};
pub use messages::{events, user_room, RelayMessage};
pub use transport::{
    ChannelEvent, ChannelHandle, CloseCause, Handshake, RealtimeTransport, WebSocketTransport,
};
