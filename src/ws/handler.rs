//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::ws::protocol::ServerMsg;
use crate::ws::session::SessionHandler;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.sessions))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, sessions: Arc<SessionHandler>) {
    let (player_id, outbound_rx) = sessions.connect();
    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();

    // Writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(run_writer(player_id, ws_sink, outbound_rx));

    // Reader loop: WebSocket -> session handler
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                sessions.handle_text(player_id, &text);
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(player_id = %player_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    sessions.disconnect(&player_id);
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

async fn run_writer(
    player_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
    debug!(player_id = %player_id, "Outbound queue closed");
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
