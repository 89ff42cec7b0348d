//! Realtime channel commands.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use pitstop_relay::{
    ConnectionManager, RelayConfig, RelayEvent, RelayMessage, WebSocketTransport,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

fn print_message(message: &RelayMessage, format: &OutputFormat) {
    match format {
        OutputFormat::Json => match message.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => warn!(error = %e, "Failed to encode realtime message"),
        },
        OutputFormat::Text => {
            let room = message.room.as_deref().unwrap_or("-");
            let data = message
                .data
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default();
            println!("[{}] {} {}", room, message.event, data);
        }
    }
}

fn print_status(text: &str, format: &OutputFormat) {
    if *format == OutputFormat::Text {
        eprintln!("{}", text);
    }
}

/// Connect the realtime channel and print inbound events until Ctrl-C.
pub async fn listen(ctx: &Context, rooms: &[String], format: &OutputFormat) -> Result<()> {
    if !ctx.session.hydrate().await.is_authenticated() {
        output::print_error("Not logged in. Run 'pitstop login' first.", format);
        return Ok(());
    }

    let config = RelayConfig::from_config(&ctx.config)?;
    let transport = Arc::new(WebSocketTransport::new(config.heartbeat_interval));
    let manager = ConnectionManager::builder(config, transport, ctx.session.subscribe()).build();
    let mut events = manager.subscribe();

    let _store_listener = ctx.session.spawn_store_listener();
    let follower = manager.follow_session();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                print_status("Interrupted", format);
                break;
            }
            event = events.recv() => match event {
                Ok(RelayEvent::Connected) => {
                    print_status("Connected", format);
                    for room in rooms {
                        manager.join_room(room);
                    }
                }
                Ok(RelayEvent::Message(message)) => {
                    if !message.is_heartbeat() {
                        print_message(&message, format);
                    }
                }
                Ok(RelayEvent::Reconnecting { attempt, delay }) => {
                    print_status(
                        &format!("Connection lost, retrying in {}ms (attempt {})", delay.as_millis(), attempt),
                        format,
                    );
                }
                Ok(RelayEvent::Disconnected { by_client: true, .. }) => {
                    if !ctx.session.status().is_authenticated() {
                        output::print_error("Session ended. Run 'pitstop login' to sign in again.", format);
                        break;
                    }
                }
                Ok(RelayEvent::Disconnected { .. }) => {}
                Ok(RelayEvent::ConnectionError(reason)) => {
                    output::print_error(&format!("Unable to stay connected: {}", reason), format);
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime listener fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    follower.abort();
    manager.disconnect();
    Ok(())
}
