use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::channel::{ChannelEvent, Connection, Transport};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    pub driver: String,
}

/// Bridges a websocket client into the hub room of one driver.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.driver))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, driver_id: String) {
    let Connection {
        outgoing,
        mut incoming,
    } = match state.hub.connect(&driver_id).await {
        Ok(connection) => connection,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "failed to join driver room");
            return;
        }
    };
    let (mut sender, mut receiver) = socket.split();

    info!(driver_id = %driver_id, "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = incoming.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize channel event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            match serde_json::from_str::<ChannelEvent>(&text) {
                Ok(event) => {
                    if outgoing.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "discarding malformed channel frame"),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(driver_id = %driver_id, "websocket client disconnected");
}
