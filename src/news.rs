//! Scheduled AI news refresh.
//!
//! Once per schedule tick, asks the Perplexity chat completions API for the
//! day's AI/ML news, pulls the JSON array out of the reply's ```json block,
//! and replaces the whole cached set. Failures are logged; there is no retry.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{ConfigError, NewsError};
use crate::store::ChatStore;

pub const DEFAULT_ENDPOINT: &str = "https://api.perplexity.ai/chat/completions";
pub const DEFAULT_MODEL: &str = "sonar-reasoning-pro";
pub const DEFAULT_SCHEDULE: &str = "0 0 12 * * *";

const SYSTEM_PROMPT: &str = "Be precise and concise.";
const USER_PROMPT: &str = "What are the 10 latest news of today related to AI, ML and LLM in \
the world. It can be news, articles, blog posts, training etc. For both technical and hobby. \
Return only a JSON array with objects containing {title, type, summary, source_link}. No other \
text. Do not include any explanations, only return the JSON array.";

/// One cached news item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
    pub source_link: String,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

/// News refresh settings.
#[derive(Debug)]
pub struct NewsConfig {
    pub api_key: SecretString,
    pub endpoint: String,
    pub model: String,
    pub schedule: cron::Schedule,
}

impl NewsConfig {
    pub fn new(api_key: SecretString, schedule: &str) -> Result<Self, ConfigError> {
        let schedule = cron::Schedule::from_str(schedule).map_err(|e| ConfigError::InvalidValue {
            key: "SCREENING_CHAT_NEWS_SCHEDULE".to_string(),
            message: format!("invalid cron: {e}"),
        })?;
        Ok(Self {
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            schedule,
        })
    }
}

/// Extract the item array from a completion reply.
///
/// The array sits after a ```json marker; the closing fence is optional.
pub fn extract_news_items(content: &str) -> Result<Vec<NewsItem>, NewsError> {
    const MARKER: &str = "```json";
    let start = content.find(MARKER).ok_or(NewsError::MissingJsonBlock)?;
    let rest = &content[start + MARKER.len()..];
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    Ok(serde_json::from_str(body.trim())?)
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

pub struct NewsRefresher {
    client: reqwest::Client,
    config: NewsConfig,
    store: Arc<dyn ChatStore>,
}

impl NewsRefresher {
    pub fn new(config: NewsConfig, store: Arc<dyn ChatStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            store,
        }
    }

    /// Fetch and replace the cached items. Returns how many were stored.
    pub async fn refresh(&self) -> Result<usize, NewsError> {
        info!(model = %self.config.model, "Fetching news");
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": USER_PROMPT },
            ],
            "max_tokens": 5000,
            "temperature": 0.2,
            "top_p": 0.9,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| NewsError::Request(e.to_string()))?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| NewsError::InvalidResponse(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| NewsError::InvalidResponse("no choices".to_string()))?;

        let items = extract_news_items(&content)?;
        let stored = self.store.replace_news(&items).await?;
        info!(count = stored, "News cache replaced");
        Ok(stored)
    }
}

/// Spawn a task that refreshes news on every tick of the configured schedule.
pub fn spawn_news_schedule(refresher: Arc<NewsRefresher>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = refresher.config.schedule.upcoming(Utc).next() else {
                warn!("News schedule has no upcoming fire time, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = refresher.refresh().await {
                error!(error = %e, "Scheduled news refresh failed");
            }
        }
    })
}
