//! WebSocket handler that pushes every published snapshot to the browser.

use crate::metrics::data::Snapshot;
use crate::web::router::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Client {
    connected_at: DateTime<Utc>,
}

/// Connected WebSocket clients, keyed by a per-connection id.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<Uuid, Client>>>,
}

impl ClientRegistry {
    /// Register a client unless `limit` connections are already open.
    async fn try_register(&self, limit: usize) -> Option<Uuid> {
        let mut clients = self.clients.write().await;
        if clients.len() >= limit {
            return None;
        }
        let id = Uuid::new_v4();
        clients.insert(
            id,
            Client {
                connected_at: Utc::now(),
            },
        );
        Some(id)
    }

    async fn remove(&self, id: &Uuid) -> Option<DateTime<Utc>> {
        self.clients
            .write()
            .await
            .remove(id)
            .map(|client| client.connected_at)
    }

    /// Get the number of connected WebSocket clients.
    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }
}

fn encode(snapshot: &Snapshot) -> Option<Message> {
    match serde_json::to_string(snapshot) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            error!("Failed to serialize snapshot {}: {}", snapshot.sequence(), e);
            None
        }
    }
}

/// WebSocket upgrade handler.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(client_id) = state
        .clients
        .try_register(state.config.max_websocket_connections)
        .await
    else {
        warn!(
            "Rejecting WebSocket client: {} connections already open",
            state.config.max_websocket_connections
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many WebSocket connections").into_response();
    };

    let registry = state.clients.clone();
    ws.on_failed_upgrade(move |e| {
        warn!("WebSocket upgrade failed for {}: {}", client_id, e);
        tokio::spawn(async move {
            registry.remove(&client_id).await;
        });
    })
    .on_upgrade(move |socket| handle_websocket(socket, state, client_id))
}

/// Handle a WebSocket connection.
///
/// The client first receives the latest snapshot, if any, then every new one.
/// A text message `refresh` asks the sampler for an out-of-band tick; its
/// snapshot arrives through the same push channel.
async fn handle_websocket(socket: WebSocket, state: AppState, client_id: Uuid) {
    info!("WebSocket client connected: {}", client_id);

    // Subscribe before reading latest so nothing published in between is missed.
    let mut updates = BroadcastStream::new(state.presenter.subscribe());
    let (mut sender, mut receiver) = socket.split();

    let client_id_send = client_id;
    let initial = state.presenter.latest().ok();
    let mut send_task = tokio::spawn(async move {
        if let Some(message) = initial.as_deref().and_then(encode) {
            if sender.send(message).await.is_err() {
                return;
            }
        }
        while let Some(update) = updates.next().await {
            match update {
                Ok(snapshot) => {
                    let Some(message) = encode(&snapshot) else {
                        continue;
                    };
                    if let Err(e) = sender.send(message).await {
                        warn!("Failed to send message to client {}: {}", client_id_send, e);
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!("Client {} lagged, skipped {} snapshots", client_id_send, skipped);
                }
            }
        }
    });

    let presenter = Arc::clone(&state.presenter);
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) if text.trim() == "refresh" => {
                    debug!("Client {} requested a refresh", client_id);
                    if let Err(e) = presenter.trigger_refresh().await {
                        warn!("Refresh for client {} failed: {}", client_id, e);
                    }
                }
                Ok(Message::Text(text)) => {
                    debug!("Ignoring message from {}: {}", client_id, text);
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error for client {}: {}", client_id, e);
                    break;
                }
            }
        }
    });

    // Whichever side finishes first ends the connection.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Some(connected_at) = state.clients.remove(&client_id).await {
        let seconds = (Utc::now() - connected_at).num_seconds();
        info!(
            "WebSocket client disconnected: {} (connected {}s)",
            client_id, seconds
        );
    }
}
