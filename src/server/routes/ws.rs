//! `GET /ws`: the game socket.
//!
//! Each socket gets a [`ConnId`](crate::types::ConnId) and an outbound queue registered
//! with the game loop. Text frames are forwarded unparsed; the registry validates them.
//! The socket ends when either side stops, and the game loop is told exactly once.

use crate::server::bridge::GameCommand;
use crate::server::state::ServerState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let conn = state.next_conn_id();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
    if !state.send(GameCommand::Connect { conn, outbound }) {
        return;
    }
    debug!(conn = conn.0, "websocket connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(kind = message.kind(), error = %err, "failed to encode message"),
            }
        }
        // queue dropped by the game loop (kick) or socket gone
        let _ = sender.send(Message::Close(None)).await;
    });

    let cmd_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let text = text.as_str().to_owned();
                    if !cmd_state.send(GameCommand::Text { conn, text }) {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(err) => {
                    debug!(conn = conn.0, error = %err, "websocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.send(GameCommand::Disconnect { conn });
    debug!(conn = conn.0, "websocket disconnected");
}
