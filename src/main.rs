use std::sync::Arc;
use std::time::Duration;

use screening_chat::app::App;
use screening_chat::config::ServiceConfig;
use screening_chat::events::{EventSink, TracingEventSink};
use screening_chat::news::{self, NewsConfig, NewsRefresher};
use screening_chat::store::{ChatStore, LibSqlBackend};

/// How often idle sessions are swept.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> screening_chat::error::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;

    eprintln!("Screening chat v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/chat/sessions", config.port);
    eprintln!("   Transcript WS: ws://0.0.0.0:{}/ws/chat/{{id}}", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn ChatStore> = match LibSqlBackend::new_local(&config.db_path).await {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!(
                "Error: Failed to open database at {}: {e}",
                config.db_path.display()
            );
            std::process::exit(1);
        }
    };
    eprintln!("   Database: {}", config.db_path.display());

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    eprintln!("   Uploads: {}", config.upload_dir.display());

    // ── Chat ─────────────────────────────────────────────────────────────
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let app = App::new(&config, Arc::clone(&store), events);
    let _prune_handle = app
        .registry
        .spawn_prune_task(PRUNE_INTERVAL, config.session_idle_timeout);

    // ── News refresh ─────────────────────────────────────────────────────
    match config.perplexity_api_key {
        Some(api_key) => {
            let news_config = NewsConfig::new(api_key, &config.news_schedule)?;
            let refresher = Arc::new(NewsRefresher::new(news_config, Arc::clone(&store)));
            let _news_handle = news::spawn_news_schedule(refresher);
            eprintln!("   News: enabled ({})", config.news_schedule);
        }
        None => eprintln!("   News: disabled (PERPLEXITY_API_KEY not set)"),
    }

    // ── HTTP server ──────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Screening chat server started");
    axum::serve(listener, app.router()).await?;

    Ok(())
}
