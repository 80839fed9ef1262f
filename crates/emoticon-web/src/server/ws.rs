//! WebSocket log channel — streams error reports and audit history to connected clients.

use std::sync::Arc;

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use emoticon_core::types::{AuditEntry, ErrorReport};

use super::AppState;

/// One message on the log channel: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum LogEvent {
    #[serde(rename = "error")]
    Error(ErrorReport),

    #[serde(rename = "history")]
    History(AuditEntry),
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let config = state.service.config();
    let send_errors = config.debug_error_to_channel;
    let send_history = config.debug_history_to_channel;
    let channel = config.debug_history_or_error_channel.clone();

    let mut errors = state.service.errors().subscribe();
    let mut history = state.service.audit().subscribe();

    info!("WebSocket client joined {}", channel);

    loop {
        let event = tokio::select! {
            result = errors.recv() => match result {
                Ok(report) if send_errors => LogEvent::Error(report),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    info!("WebSocket lagged {} error reports", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            result = history.recv() => match result {
                Ok(entry) if send_history => LogEvent::History(entry),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    info!("WebSocket lagged {} history entries", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            // Incoming messages are keep-alives
            msg = socket.recv() => match msg {
                Some(Ok(_)) => continue,
                _ => break,
            },
        };

        match serde_json::to_string(&event) {
            Ok(json) => {
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => error!("Failed to serialize log event: {}", e),
        }
    }

    info!("WebSocket client left {}", channel);
}
