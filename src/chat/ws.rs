//! Live transcript WebSocket.
//!
//! On connect the client receives the full transcript, then a fresh full
//! snapshot after every write to the session's log. Clients may also send
//! `DialogAction` JSON; the resulting stage view is sent back.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::controller::{DialogAction, StageView, Step};
use super::registry::SessionRegistry;
use crate::transcript::log::TranscriptSubscription;
use crate::transcript::model::ChatMessage;

/// Message from server → client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Transcript { messages: Vec<ChatMessage> },
    Stage { step: Step, view: StageView },
    Error { message: String },
}

#[derive(Clone)]
struct WsState {
    registry: Arc<SessionRegistry>,
}

/// Build the transcript WebSocket route.
pub fn ws_routes(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/ws/chat/{id}", get(ws_handler))
        .with_state(WsState { registry })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(session_id) = Uuid::parse_str(&id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid session ID"})),
        )
            .into_response();
    };
    if let Err(e) = state.registry.get(session_id).await {
        return e.into_response();
    }

    // Subscribed before the upgrade so a close during the handshake is still seen
    let transcript = state.registry.deps().log.subscribe(session_id);
    info!(session_id = %session_id, "Transcript client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry, session_id, transcript))
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WS message");
            true
        }
    }
}

async fn handle_socket(
    mut socket: WebSocket,
    registry: Arc<SessionRegistry>,
    session_id: Uuid,
    mut transcript: TranscriptSubscription,
) {
    loop {
        tokio::select! {
            snapshot = transcript.next() => {
                match snapshot {
                    Some(Ok(messages)) => {
                        if !send(&mut socket, &ServerMessage::Transcript { messages }).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "Transcript snapshot failed");
                        let error = ServerMessage::Error { message: "Transcript unavailable".into() };
                        if !send(&mut socket, &error).await {
                            break;
                        }
                    }
                    None => {
                        debug!(session_id = %session_id, "Session closed, ending transcript feed");
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(&text, &registry, session_id).await;
                        if !send(&mut socket, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "Transcript client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(session_id = %session_id, "Transcript connection closed");
}

async fn handle_client_message(
    text: &str,
    registry: &SessionRegistry,
    session_id: Uuid,
) -> ServerMessage {
    let action = match serde_json::from_str::<DialogAction>(text) {
        Ok(action) => action,
        Err(e) => {
            debug!(error = %e, "Unrecognized WS message from client");
            return ServerMessage::Error {
                message: format!("Unrecognized action: {e}"),
            };
        }
    };

    let controller = match registry.get(session_id).await {
        Ok(controller) => controller,
        Err(e) => return ServerMessage::Error { message: e.to_string() },
    };
    let mut controller = controller.lock().await;
    match controller.dispatch(action).await {
        Ok(step) => ServerMessage::Stage {
            step,
            view: controller.view(),
        },
        Err(e) => ServerMessage::Error {
            message: e.to_string(),
        },
    }
}
