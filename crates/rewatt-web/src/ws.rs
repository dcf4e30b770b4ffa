// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Rewatt.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use rewatt_core::{CommandSender, SimCommand};
use tracing::{debug, trace, warn};

use crate::AppState;

/// Upgrade handler for the single bidirectional streaming transport.
/// The server never initiates the connection.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Pump hub envelopes out and commands in until either side goes away.
async fn handle_socket(mut socket: WebSocket, app_state: AppState) {
    let mut subscription = app_state.hub.subscribe();
    debug!("WebSocket client connected as subscriber {}", subscription.id);

    loop {
        tokio::select! {
            outbound = subscription.receiver.recv() => {
                match outbound {
                    Some(message) => {
                        if socket.send(Message::Text(message.into())).await.is_err() {
                            break;
                        }
                    }
                    // Hub evicted us (chronic lag) or shut down
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_command(&app_state.commands, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => trace!("Ignoring non-text frame"),
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {e}");
                        break;
                    }
                }
            }
        }
    }

    app_state.hub.unsubscribe(subscription.id);
    debug!("WebSocket subscriber {} disconnected", subscription.id);
}

/// Parse one inbound envelope and forward it to the engine. Malformed
/// frames are logged and dropped; the transport stays up.
fn dispatch_command(commands: &CommandSender, text: &str) {
    match serde_json::from_str::<SimCommand>(text) {
        Ok(command) => {
            if commands.send(command).is_err() {
                warn!("Engine command channel is closed");
            }
        }
        Err(e) => warn!("Dropping malformed command frame: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewatt_core::CommandSender;

    #[tokio::test]
    async fn test_dispatch_valid_command() {
        let (sender, mut channel) = CommandSender::new();
        dispatch_command(&sender, r#"{"type":"sim:start"}"#);
        let command = channel.receiver.recv().await.unwrap();
        assert!(matches!(command, SimCommand::Start));
    }

    #[tokio::test]
    async fn test_dispatch_malformed_frame_is_dropped() {
        let (sender, mut channel) = CommandSender::new();
        dispatch_command(&sender, "not json at all");
        dispatch_command(&sender, r#"{"type":"sim:warp_ten"}"#);
        assert!(channel.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_command_with_payload() {
        let (sender, mut channel) = CommandSender::new();
        dispatch_command(
            &sender,
            r#"{"type":"sim:set_source","payload":{"source":"archival"}}"#,
        );
        let command = channel.receiver.recv().await.unwrap();
        assert!(matches!(
            command,
            SimCommand::SetSource {
                source: rewatt_types::SimSource::Archival
            }
        ));
    }
}
