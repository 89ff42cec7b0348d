//! Realtime channel envelope.
//!
//! Every frame is `{ "event": ..., "room"?: ..., "data"?: ... }`. The channel
//! only routes by `event`; `data` is opaque business payload.

use serde::{Deserialize, Serialize};

/// Event names the channel itself uses.
pub mod events {
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// The per-user room joined on every connect.
pub fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// A message sent to/from the realtime server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RelayMessage {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            room: None,
            data: None,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn join(room: &str) -> Self {
        Self::new(events::JOIN).with_room(room)
    }

    pub fn leave(room: &str) -> Self {
        Self::new(events::LEAVE).with_room(room)
    }

    pub fn heartbeat() -> Self {
        Self::new(events::HEARTBEAT)
    }

    pub fn with_room(mut self, room: &str) -> Self {
        self.room = Some(room.to_string());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_heartbeat(&self) -> bool {
        self.event == events::HEARTBEAT
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
