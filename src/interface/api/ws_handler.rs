//! Dialing panel bridge over WebSocket
//!
//! Streams every softphone event to the client and turns the client's JSON
//! commands into calls on the [`SoftphoneHandle`].

use super::router::ApiState;
use crate::application::SoftphoneHandle;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::PartnerId;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Command frame sent by the dialing panel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WsCommand {
    MakeCall {
        number: String,
        #[serde(default, rename = "partnerId")]
        partner_id: Option<PartnerId>,
    },
    AcceptIncomingCall,
    RejectIncomingCall,
    CancelCall,
    Hangup,
    MuteCall,
    UnmuteCall,
    SendDtmf {
        digit: char,
    },
    Transfer {
        number: String,
    },
    SwitchInputStream {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    State,
}

impl WsCommand {
    /// Run the command, returning a frame to send back if it produces one
    pub async fn execute(self, softphone: &SoftphoneHandle) -> Result<Option<Value>> {
        match self {
            WsCommand::MakeCall { number, partner_id } => {
                softphone.make_call(number, partner_id).await?
            }
            WsCommand::AcceptIncomingCall => softphone.accept_incoming_call().await?,
            WsCommand::RejectIncomingCall => softphone.reject_incoming_call().await?,
            WsCommand::CancelCall => softphone.cancel_call().await?,
            WsCommand::Hangup => softphone.hangup().await?,
            WsCommand::MuteCall => softphone.mute_call().await?,
            WsCommand::UnmuteCall => softphone.unmute_call().await?,
            WsCommand::SendDtmf { digit } => softphone.send_dtmf(digit).await?,
            WsCommand::Transfer { number } => softphone.transfer(number).await?,
            WsCommand::SwitchInputStream { device_id } => {
                softphone.switch_input_stream(device_id).await?
            }
            WsCommand::State => {
                let snapshot = softphone.snapshot().await?;
                return Ok(Some(json!({ "name": "state", "payload": snapshot })));
            }
        }
        Ok(None)
    }
}

fn command_error(message: impl std::fmt::Display) -> Value {
    json!({ "name": "command_error", "payload": { "message": message.to_string() } })
}

/// WebSocket handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.bus.subscribe();

    info!("Dialing panel connected");

    let welcome = match state.softphone.snapshot().await {
        Ok(snapshot) => json!({ "name": "welcome", "payload": { "state": snapshot } }),
        Err(e) => command_error(e),
    };
    if sender.send(Message::Text(welcome.to_string())).await.is_err() {
        return;
    }

    loop {
        let frame = tokio::select! {
            event = events.recv() => match event {
                Ok(event) => event.to_frame(),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dialing panel lagging, {} events dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    debug!("Dialing panel command: {}", text);
                    match serde_json::from_str::<WsCommand>(&text) {
                        Ok(command) => match command.execute(&state.softphone).await {
                            Ok(Some(reply)) => reply,
                            Ok(None) => continue,
                            Err(e) => command_error(e),
                        },
                        Err(e) => command_error(format!("Invalid command: {}", e)),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Axum answers pings itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
            },
        };

        if sender.send(Message::Text(frame.to_string())).await.is_err() {
            debug!("Failed to send frame to dialing panel");
            break;
        }
    }

    info!("Dialing panel disconnected");
}
