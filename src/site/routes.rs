//! Site endpoints: counters, newsletter signup, news, comments, articles.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::comments::{CommentBoard, CommentFeed, NewComment};
use crate::articles::ArticleFeed;
use crate::chat::validation;
use crate::error::{ChatError, CommentError};
use crate::events::{AnalyticsEvent, EventSink};
use crate::store::ChatStore;

/// Counters clients may bump directly.
pub const PUBLIC_COUNTERS: &[&str] = &["views", "downloads", "likes"];

pub const SUBSCRIBERS_COUNTER: &str = "subscribers";

/// Metrics computed from stored records rather than counters.
/// Every recruiter submission asks for a meeting.
pub const MEETING_REQUESTS_METRIC: &str = "meeting_requests";
pub const CHAT_CONVERSATIONS_METRIC: &str = "chat_conversations";

#[derive(Clone)]
pub struct SiteRouteState {
    pub store: Arc<dyn ChatStore>,
    pub events: Arc<dyn EventSink>,
    pub comments: Arc<CommentBoard>,
    pub articles: Arc<ArticleFeed>,
}

impl IntoResponse for CommentError {
    fn into_response(self) -> Response {
        let status = match &self {
            CommentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CommentError::NotFound(_) => StatusCode::NOT_FOUND,
            CommentError::Database(e) => return internal_error(e),
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

fn internal_error(error: impl std::fmt::Display) -> Response {
    warn!(error = %error, "Site request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "Internal error"})),
    )
        .into_response()
}

/// GET /api/metrics
///
/// Counters plus the derived meeting request and conversation totals.
async fn get_metrics(State(state): State<SiteRouteState>) -> Result<Response, Response> {
    let mut metrics: BTreeMap<String, i64> = state
        .store
        .get_counters()
        .await
        .map_err(internal_error)?
        .into_iter()
        .map(|c| (c.name, c.count))
        .collect();

    let meeting_requests = state
        .store
        .count_submissions("recruiter_submissions")
        .await
        .map_err(internal_error)?;
    let conversations = state
        .store
        .count_conversations()
        .await
        .map_err(internal_error)?;
    metrics.insert(MEETING_REQUESTS_METRIC.to_string(), meeting_requests);
    metrics.insert(CHAT_CONVERSATIONS_METRIC.to_string(), conversations);
    Ok(Json(metrics).into_response())
}

/// POST /api/metrics/{counter}
async fn increment_metric(
    State(state): State<SiteRouteState>,
    Path(counter): Path<String>,
) -> Result<Response, Response> {
    if !PUBLIC_COUNTERS.contains(&counter.as_str()) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("Unknown counter: {counter}")})),
        )
            .into_response());
    }
    let count = state
        .store
        .increment_counter(&counter)
        .await
        .map_err(internal_error)?;
    state.events.record(AnalyticsEvent::profile(counter.as_str()));
    Ok(Json(serde_json::json!({"name": counter, "count": count})).into_response())
}

#[derive(Deserialize)]
struct NewsletterRequest {
    email: String,
}

/// POST /api/newsletter
async fn subscribe(
    State(state): State<SiteRouteState>,
    Json(body): Json<NewsletterRequest>,
) -> Result<Response, Response> {
    let email = validation::email(&body.email)
        .map_err(|e| ChatError::from(e).into_response())?
        .to_lowercase();

    let added = state
        .store
        .add_subscriber(&email)
        .await
        .map_err(internal_error)?;
    if !added {
        return Ok(Json(serde_json::json!({"subscribed": true, "new": false})).into_response());
    }

    if let Err(e) = state.store.increment_counter(SUBSCRIBERS_COUNTER).await {
        warn!(error = %e, "Failed to bump subscriber counter");
    }
    state.events.record(AnalyticsEvent::profile("newsletter_subscribe"));
    info!("Newsletter subscriber added");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"subscribed": true, "new": true})),
    )
        .into_response())
}

/// GET /api/news
async fn list_news(State(state): State<SiteRouteState>) -> Result<Response, Response> {
    let items = state.store.list_news().await.map_err(internal_error)?;
    Ok(Json(items).into_response())
}

// ── Comments ────────────────────────────────────────────────────────────

/// GET /api/comments
async fn list_comments(State(state): State<SiteRouteState>) -> Result<Response, Response> {
    let comments = state.comments.list().await.map_err(internal_error)?;
    Ok(Json(comments).into_response())
}

/// POST /api/comments
async fn post_comment(
    State(state): State<SiteRouteState>,
    Json(form): Json<NewComment>,
) -> Result<Response, Response> {
    let comment = state
        .comments
        .post(form)
        .await
        .map_err(IntoResponse::into_response)?;
    state.events.record(AnalyticsEvent::profile("comment_posted"));
    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

#[derive(Deserialize)]
struct CommentResponseRequest {
    response: String,
}

/// POST /api/comments/{id}/response
async fn respond_to_comment(
    State(state): State<SiteRouteState>,
    Path(id): Path<String>,
    Json(body): Json<CommentResponseRequest>,
) -> Result<Response, Response> {
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Invalid comment ID"})),
        )
            .into_response());
    };
    state
        .comments
        .respond(id, &body.response)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// WS /ws/comments: the full list, newest first, on connect and after
/// every post or reply.
async fn comments_ws(ws: WebSocketUpgrade, State(state): State<SiteRouteState>) -> Response {
    let feed = state.comments.subscribe();
    ws.on_upgrade(move |socket| stream_comments(socket, feed))
}

async fn stream_comments(mut socket: WebSocket, mut feed: CommentFeed) {
    loop {
        tokio::select! {
            snapshot = feed.next() => {
                let frame = match snapshot {
                    Some(Ok(comments)) => serde_json::json!({"type": "comments", "comments": comments}),
                    Some(Err(e)) => {
                        warn!(error = %e, "Comment snapshot failed");
                        serde_json::json!({"type": "error", "message": "Comments unavailable"})
                    }
                    None => break,
                };
                if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("Comment feed connection closed");
}

// ── Articles ────────────────────────────────────────────────────────────

/// GET /api/articles
async fn list_articles(State(state): State<SiteRouteState>) -> Result<Response, Response> {
    match state.articles.fetch().await {
        Ok(articles) => Ok(Json(articles).into_response()),
        Err(e) => {
            warn!(error = %e, "Article feed unavailable");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to fetch Medium articles"})),
            )
                .into_response())
        }
    }
}

pub fn site_routes(state: SiteRouteState) -> Router {
    Router::new()
        .route("/api/metrics", get(get_metrics))
        .route("/api/metrics/{counter}", post(increment_metric))
        .route("/api/newsletter", post(subscribe))
        .route("/api/news", get(list_news))
        .route("/api/comments", get(list_comments).post(post_comment))
        .route("/api/comments/{id}/response", post(respond_to_comment))
        .route("/ws/comments", get(comments_ws))
        .route("/api/articles", get(list_articles))
        .with_state(state)
}
