//! WebSocket connection handler
//!
//! One task reads frames and dispatches them; a second task owns the write
//! half and drains an unbounded channel. Sessions emit into that channel
//! through the registry, so neither task ever waits on a process.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use treehouse_core::TreehouseError;

use crate::protocol::{ClientMessage, ServerEvent};
use crate::server::AppState;
use crate::session::{EventSink, StartRequest};
use crate::types::ConnectionId;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id: ConnectionId = Uuid::new_v4().to_string();
    info!(event = "server.ws.connected", connection_id = %connection_id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut outbound) = mpsc::unbounded_channel::<ServerEvent>();

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!(
                        event = "server.ws.serialize_failed",
                        connection_id = %writer_id,
                        error = %e,
                    );
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                debug!(event = "server.ws.write_closed", connection_id = %writer_id);
                break;
            }
        }
    });

    loop {
        let next = async {
            match state.idle_timeout {
                Some(idle) => tokio::time::timeout(idle, ws_rx.next()).await.ok(),
                None => Some(ws_rx.next().await),
            }
        };

        let frame = tokio::select! {
            frame = next => frame,
            _ = state.shutdown.cancelled() => {
                debug!(event = "server.ws.shutdown", connection_id = %connection_id);
                break;
            }
        };

        let text = match frame {
            None => {
                info!(event = "server.ws.idle_timeout", connection_id = %connection_id);
                break;
            }
            Some(None) | Some(Some(Ok(Message::Close(_)))) => break,
            Some(Some(Ok(Message::Text(text)))) => text,
            Some(Some(Ok(_))) => continue,
            Some(Some(Err(e))) => {
                warn!(
                    event = "server.ws.read_error",
                    connection_id = %connection_id,
                    error = %e,
                );
                break;
            }
        };

        dispatch(&state, &connection_id, text.as_str(), &sink);
    }

    state.orchestrator.detach_connection(&connection_id);
    drop(sink);
    writer.abort();
    info!(event = "server.ws.disconnected", connection_id = %connection_id);
}

/// Handle one text frame. Never awaits: starts are handed off to their own
/// task and every reply goes through `sink`.
fn dispatch(state: &AppState, connection_id: &str, text: &str, sink: &EventSink) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                event = "server.ws.invalid_message",
                connection_id = connection_id,
                error = %e,
            );
            let _ = sink.send(ServerEvent::error(
                None,
                "INVALID_MESSAGE",
                format!("Invalid message: {e}"),
            ));
            return;
        }
    };

    match message {
        ClientMessage::Start {
            command,
            options,
            request_id,
        } => {
            let request = StartRequest {
                command,
                options,
                request_id,
            };
            if let Err(e) = state
                .orchestrator
                .start_session(connection_id, request, sink.clone())
            {
                warn!(
                    event = "server.ws.start_rejected",
                    connection_id = connection_id,
                    error = %e,
                );
                let _ = sink.send(ServerEvent::error(None, e.error_code(), e.to_string()));
            }
        }

        ClientMessage::Stop { session_id } => {
            if let Err(e) = state.orchestrator.terminate_session(&session_id) {
                let _ = sink.send(ServerEvent::error(
                    Some(session_id),
                    e.error_code(),
                    e.to_string(),
                ));
            }
        }

        ClientMessage::Attach { session_id } => {
            match state
                .orchestrator
                .attach_session(&session_id, connection_id, sink.clone())
            {
                Ok(_) => {
                    let _ = sink.send(ServerEvent::Attached { session_id });
                }
                Err(e) => {
                    let _ = sink.send(ServerEvent::error(
                        Some(session_id),
                        e.error_code(),
                        e.to_string(),
                    ));
                }
            }
        }

        ClientMessage::Ping => {
            let _ = sink.send(ServerEvent::Pong);
        }
    }
}
