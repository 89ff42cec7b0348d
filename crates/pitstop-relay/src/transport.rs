//! Duplex channel transports.

use crate::{RelayError, RelayMessage, RelayResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const CHANNEL_CAPACITY: usize = 100;

/// What a transport needs to open an authenticated channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Handshake {
    pub url: Url,
    pub access_token: String,
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("url", &self.url.as_str())
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Why an open channel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The server closed the channel.
    Server(Option<String>),
    /// The connection broke.
    Transport(String),
}

impl std::fmt::Display for CloseCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseCause::Server(Some(reason)) => write!(f, "closed by server: {reason}"),
            CloseCause::Server(None) => write!(f, "closed by server"),
            CloseCause::Transport(e) => write!(f, "connection lost: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(RelayMessage),
    /// Always the last event on a channel.
    Closed(CloseCause),
}

/// Both directions of an open channel.
///
/// Dropping the handle closes the channel from the client side.
pub struct ChannelHandle {
    pub outbound: mpsc::Sender<RelayMessage>,
    pub inbound: mpsc::Receiver<ChannelEvent>,
}

/// Opens authenticated duplex channels.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn open(&self, handshake: &Handshake) -> RelayResult<ChannelHandle>;
}

/// [`RealtimeTransport`] over WebSocket.
///
/// The access token travels as a bearer `Authorization` header on the
/// upgrade request. A heartbeat envelope is sent every `heartbeat_interval`
/// and pings are answered.
pub struct WebSocketTransport {
    heartbeat_interval: Duration,
}

impl WebSocketTransport {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self { heartbeat_interval }
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn open(&self, handshake: &Handshake) -> RelayResult<ChannelHandle> {
        let mut request = handshake.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", handshake.access_token))
            .map_err(|e| RelayError::Authentication(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        info!(url = %handshake.url, "Opening realtime channel");
        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<RelayMessage>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ChannelEvent>(CHANNEL_CAPACITY);
        let period = self.heartbeat_interval;

        tokio::spawn(async move {
            let mut heartbeat = interval_at(Instant::now() + period, period);

            let cause = loop {
                tokio::select! {
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => match RelayMessage::from_json(text.as_str()) {
                            Ok(msg) => {
                                if inbound_tx.send(ChannelEvent::Message(msg)).await.is_err() {
                                    break None;
                                }
                            }
                            Err(e) => warn!(error = %e, "Failed to parse realtime message"),
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Some(CloseCause::Transport(e.to_string()));
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty());
                            break Some(CloseCause::Server(reason));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break Some(CloseCause::Transport(e.to_string())),
                        None => break Some(CloseCause::Transport("stream ended".to_string())),
                    },
                    outbound = outbound_rx.recv() => match outbound {
                        Some(msg) => {
                            let sent = match msg.to_json() {
                                Ok(json) => write.send(Message::Text(json.into())).await,
                                Err(e) => {
                                    warn!(error = %e, "Failed to encode realtime message");
                                    continue;
                                }
                            };
                            if let Err(e) = sent {
                                break Some(CloseCause::Transport(e.to_string()));
                            }
                        }
                        None => {
                            // Handle dropped: client-initiated close.
                            let _ = write.send(Message::Close(None)).await;
                            break None;
                        }
                    },
                    _ = heartbeat.tick() => {
                        if let Ok(json) = RelayMessage::heartbeat().to_json() {
                            if let Err(e) = write.send(Message::Text(json.into())).await {
                                break Some(CloseCause::Transport(e.to_string()));
                            }
                        }
                    }
                }
            };

            match cause {
                Some(cause) => {
                    debug!(cause = %cause, "Realtime channel ended");
                    let _ = inbound_tx.send(ChannelEvent::Closed(cause)).await;
                }
                None => debug!("Realtime channel closed by client"),
            }
        });

        Ok(ChannelHandle {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
