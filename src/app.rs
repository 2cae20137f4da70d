//! Service wiring: shared components and the HTTP router.

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::articles::ArticleFeed;
use crate::chat::controller::ControllerDeps;
use crate::chat::options::ChatOptions;
use crate::chat::qualification::StrictRule;
use crate::chat::registry::SessionRegistry;
use crate::chat::routes::{ChatRouteState, chat_routes};
use crate::chat::ws::ws_routes;
use crate::config::ServiceConfig;
use crate::events::EventSink;
use crate::ratelimit::UsageLimiter;
use crate::site::comments::CommentBoard;
use crate::site::{SiteRouteState, site_routes};
use crate::store::ChatStore;
use crate::transcript::log::MessageLog;
use crate::uploads::LocalObjectStore;

/// Long-lived components shared by every request.
pub struct App {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn ChatStore>,
    pub events: Arc<dyn EventSink>,
    comments: Arc<CommentBoard>,
    articles: Arc<ArticleFeed>,
    upload_dir: std::path::PathBuf,
    upload_base_url: String,
}

impl App {
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn ChatStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let options = ChatOptions {
            visitor_max_questions: config.visitor_max_questions,
            ..ChatOptions::default()
        };
        let deps = ControllerDeps {
            log: MessageLog::new(Arc::clone(&store)),
            store: Arc::clone(&store),
            limiter: Arc::new(UsageLimiter::new(Arc::clone(&store), config.daily_limit)),
            rule: Arc::new(StrictRule),
            uploads: Arc::new(LocalObjectStore::new(
                &config.upload_dir,
                config.upload_base_url.as_str(),
            )),
            events: Arc::clone(&events),
            options: Arc::new(options),
        };

        Self {
            registry: SessionRegistry::new(deps),
            comments: CommentBoard::new(Arc::clone(&store)),
            articles: Arc::new(ArticleFeed::new(config.articles_feed_url.as_str())),
            store,
            events,
            upload_dir: config.upload_dir.clone(),
            upload_base_url: config.upload_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The full HTTP surface: chat REST + WS, site endpoints, uploads.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health))
            .merge(chat_routes(ChatRouteState {
                registry: Arc::clone(&self.registry),
            }))
            .merge(ws_routes(Arc::clone(&self.registry)))
            .merge(site_routes(SiteRouteState {
                store: Arc::clone(&self.store),
                events: Arc::clone(&self.events),
                comments: Arc::clone(&self.comments),
                articles: Arc::clone(&self.articles),
            }));

        // Only a local path prefix can be served from here
        if self.upload_base_url.starts_with('/') && self.upload_base_url.len() > 1 {
            router = router.nest_service(&self.upload_base_url, ServeDir::new(&self.upload_dir));
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "screening-chat"
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::events::NoopEventSink;
    use crate::store::LibSqlBackend;

    async fn test_app(upload_dir: &std::path::Path) -> App {
        let config = ServiceConfig {
            upload_dir: upload_dir.to_path_buf(),
            visitor_max_questions: 2,
            ..ServiceConfig::default()
        };
        let store: Arc<dyn ChatStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        App::new(&config, store, Arc::new(NoopEventSink))
    }

    #[tokio::test]
    async fn health_route() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path()).await;
        let resp = app
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["service"], "screening-chat");
    }

    #[tokio::test]
    async fn config_limits_reach_new_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path()).await;
        let resp = app
            .router()
            .oneshot(
                Request::post("/api/chat/sessions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["max_questions"], 2);
        assert_eq!(app.registry.len().await, 1);
    }

    #[tokio::test]
    async fn unreachable_article_feed_is_a_500() {
        let dir = tempfile::tempdir().unwrap();
        let closed_port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ServiceConfig {
            upload_dir: dir.path().to_path_buf(),
            articles_feed_url: format!("http://127.0.0.1:{closed_port}/feed"),
            ..ServiceConfig::default()
        };
        let store: Arc<dyn ChatStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let app = App::new(&config, store, Arc::new(NoopEventSink));

        let resp = app
            .router()
            .oneshot(Request::get("/api/articles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Failed to fetch Medium articles");
    }

    #[tokio::test]
    async fn uploads_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("s1")).unwrap();
        std::fs::write(dir.path().join("s1/jd.pdf"), b"%PDF").unwrap();
        let app = test_app(dir.path()).await;

        let resp = app
            .router()
            .oneshot(Request::get("/uploads/s1/jd.pdf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
