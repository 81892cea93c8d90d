//! WebSocket upgrade handler and message dispatch.
//!
//! Each connected client receives:
//! 1. A full [`CollectorSnapshot`](crate::snapshot::CollectorSnapshot) on
//!    connect.
//! 2. Incremental [`WsMessage`] updates as collector events fire.
//!
//! Clients can send JSON messages back (touches, sweeps, visibility).

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use reclaim_rs::collector::Visibility;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::broadcast::WsMessage;

/// GET /ws: WebSocket upgrade handler.
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, app: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the snapshot so no event falls between the two.
    let mut broadcast_rx = app.broadcast_tx.subscribe();

    let snapshot_msg = WsMessage::Snapshot {
        data: app.snapshot().to_json(),
    };
    if ws_send(&mut sink, &snapshot_msg).await.is_err() {
        return;
    }

    debug!("WebSocket client connected");

    let resync = app.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(msg) => {
                    if ws_send(&mut sink, &msg).await.is_err() {
                        break; // Client disconnected.
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged by {n} messages, resending snapshot");
                    let msg = WsMessage::Snapshot {
                        data: resync.snapshot().to_json(),
                    };
                    if ws_send(&mut sink, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => handle_client_message(&text, &app),
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong.
        }
    }

    debug!("WebSocket client disconnected");
    forward_task.abort();
}

/// A JSON message received from a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Touch { id: String },
    Collect { tag: Option<String> },
    Visibility { visible: bool },
}

fn handle_client_message(text: &str, app: &AppState) {
    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        debug!("Ignoring malformed WebSocket message");
        return;
    };

    // Results reach every client through the event broadcast.
    match msg {
        ClientMessage::Touch { id } => {
            app.collector.registry().touch(&id);
        }
        ClientMessage::Collect { tag: Some(tag) } => {
            app.collector.collect_by_type(&tag);
        }
        ClientMessage::Collect { tag: None } => {
            app.collector.collect();
        }
        ClientMessage::Visibility { visible } => {
            app.visibility.set(if visible {
                Visibility::Visible
            } else {
                Visibility::Hidden
            });
        }
    }
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
