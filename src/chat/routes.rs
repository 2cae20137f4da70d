//! REST endpoints for screening dialogs.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::controller::DialogAction;
use super::registry::SessionRegistry;
use super::session::RecruiterInfo;
use super::validation;
use crate::error::ChatError;
use crate::transcript::model::ChatMessage;
use crate::uploads::Attachment;

/// Shared state for chat routes.
#[derive(Clone)]
pub struct ChatRouteState {
    pub registry: Arc<SessionRegistry>,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ChatError::InvalidAction { .. }
            | ChatError::InvalidTransition { .. }
            | ChatError::Closed => StatusCode::CONFLICT,
            ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn internal_error(error: impl std::fmt::Display) -> Response {
    warn!(error = %error, "Chat request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal error" })),
    )
        .into_response()
}

fn parse_session_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| bad_request("Invalid session ID"))
}

// ── Sessions ────────────────────────────────────────────────────────────

/// POST /api/chat/sessions
async fn open_session(State(state): State<ChatRouteState>) -> impl IntoResponse {
    let view = state.registry.open().await;
    (StatusCode::CREATED, Json(view))
}

/// GET /api/chat/sessions/{id}
async fn get_session(
    State(state): State<ChatRouteState>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let session_id = parse_session_id(&id)?;
    let controller = state
        .registry
        .get(session_id)
        .await
        .map_err(IntoResponse::into_response)?;
    let view = controller.lock().await.view();
    Ok(Json(view).into_response())
}

/// DELETE /api/chat/sessions/{id}
async fn close_session(
    State(state): State<ChatRouteState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Response> {
    let session_id = parse_session_id(&id)?;
    state
        .registry
        .close(session_id)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/chat/sessions/{id}/actions
async fn post_action(
    State(state): State<ChatRouteState>,
    Path(id): Path<String>,
    Json(action): Json<DialogAction>,
) -> Result<Response, Response> {
    let session_id = parse_session_id(&id)?;
    let controller = state
        .registry
        .get(session_id)
        .await
        .map_err(IntoResponse::into_response)?;

    let mut controller = controller.lock().await;
    let name = action.name();
    let step = controller
        .dispatch(action)
        .await
        .map_err(IntoResponse::into_response)?;
    info!(session_id = %session_id, action = name, to = %step.to, "Action handled");

    Ok(Json(serde_json::json!({ "step": step, "view": controller.view() })).into_response())
}

/// POST /api/chat/sessions/{id}/recruiter-form (multipart)
///
/// Text fields `name`, `email`, `company`, `job_role`, optional
/// `job_description`, and an optional `file` part.
async fn post_recruiter_form(
    State(state): State<ChatRouteState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, Response> {
    let session_id = parse_session_id(&id)?;
    let controller = state
        .registry
        .get(session_id)
        .await
        .map_err(IntoResponse::into_response)?;

    let mut form = RecruiterInfo {
        name: String::new(),
        email: String::new(),
        company: String::new(),
        job_role: String::new(),
        job_description: None,
    };
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("attachment").to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Failed to read file: {e}")))?;
            if !bytes.is_empty() {
                attachment = Some(Attachment {
                    file_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| bad_request(format!("Failed to read field {name}: {e}")))?;
        match name.as_str() {
            "name" => form.name = value,
            "email" => form.email = value,
            "company" => form.company = value,
            "job_role" => form.job_role = value,
            "job_description" => form.job_description = Some(value),
            other => warn!(field = other, "Ignoring unknown recruiter form field"),
        }
    }

    let mut controller = controller.lock().await;
    let step = controller
        .submit_recruiter_form(form, attachment)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(Json(serde_json::json!({ "step": step, "view": controller.view() })).into_response())
}

// ── Transcript ──────────────────────────────────────────────────────────

/// GET /api/chat/sessions/{id}/transcript
///
/// Served from the log, so it stays readable after the session closes.
async fn get_transcript(
    State(state): State<ChatRouteState>,
    Path(id): Path<String>,
) -> Result<Response, Response> {
    let session_id = parse_session_id(&id)?;
    let messages = state
        .registry
        .deps()
        .log
        .transcript(session_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(messages).into_response())
}

#[derive(Deserialize)]
struct PipelineResponseRequest {
    response: String,
}

/// POST /api/chat/sessions/{id}/responses
///
/// A follow-up answer written by a person or an automated responder.
/// The session must be open or have a logged transcript.
async fn post_pipeline_response(
    State(state): State<ChatRouteState>,
    Path(id): Path<String>,
    Json(body): Json<PipelineResponseRequest>,
) -> Result<Response, Response> {
    let session_id = parse_session_id(&id)?;
    let text = validation::required("response", &body.response)
        .map_err(|e| ChatError::from(e).into_response())?;

    if state.registry.get(session_id).await.is_err() {
        let logged = state
            .registry
            .deps()
            .log
            .transcript(session_id)
            .await
            .map_err(internal_error)?;
        if logged.is_empty() {
            return Err(ChatError::SessionNotFound(session_id).into_response());
        }
    }

    let message = ChatMessage::pipeline_response(session_id, text);
    state
        .registry
        .deps()
        .log
        .append(&message)
        .await
        .map_err(internal_error)?;
    info!(session_id = %session_id, "Pipeline response appended");
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

/// Build the chat REST routes.
pub fn chat_routes(state: ChatRouteState) -> Router {
    Router::new()
        .route("/api/chat/sessions", post(open_session))
        .route(
            "/api/chat/sessions/{id}",
            get(get_session).delete(close_session),
        )
        .route("/api/chat/sessions/{id}/actions", post(post_action))
        .route(
            "/api/chat/sessions/{id}/recruiter-form",
            post(post_recruiter_form),
        )
        .route("/api/chat/sessions/{id}/transcript", get(get_transcript))
        .route(
            "/api/chat/sessions/{id}/responses",
            post(post_pipeline_response),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::stage::ChatStage;
    use crate::error::ValidationError;

    #[test]
    fn chat_errors_map_to_status_codes() {
        let cases = [
            (
                ChatError::Validation(ValidationError::NotAQuestion),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ChatError::InvalidAction {
                    stage: ChatStage::Initial,
                    action: "confirm_meeting",
                },
                StatusCode::CONFLICT,
            ),
            (ChatError::Closed, StatusCode::CONFLICT),
            (
                ChatError::SessionNotFound(Uuid::new_v4()),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
