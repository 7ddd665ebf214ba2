//! WebSocket handler for chat subscribers.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::hub::ChatHub;

/// Shared state for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
}

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state.hub))
}

/// Serve one subscriber: replay the history as a single batch, then forward
/// live messages until the socket closes.
async fn handle_connection(socket: WebSocket, hub: Arc<ChatHub>) {
    let (mut sender, mut receiver) = socket.split();

    let (history, mut rx) = hub.subscribe().await;
    info!("subscriber connected ({} history entries)", history.len());

    if !history.is_empty() {
        let batch = match serde_json::to_string(&history) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("failed to serialize history batch: {e}");
                return;
            }
        };
        if sender.send(Message::Text(batch.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            relayed = rx.recv() => match relayed {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // Slow subscriber: messages are dropped, not queued.
                    warn!("subscriber lagged, dropped {missed} messages");
                }
                Err(RecvError::Closed) => break,
            },
            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Viewers have nothing to say to us.
                    debug!("ignoring inbound frame from subscriber");
                }
                Some(Err(e)) => {
                    warn!("subscriber socket error: {e}");
                    break;
                }
            },
        }
    }

    info!("subscriber disconnected");
}
