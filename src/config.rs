//! Service configuration, read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::articles::DEFAULT_FEED_URL;
use crate::error::ConfigError;
use crate::news::DEFAULT_SCHEDULE;
use crate::ratelimit::DEFAULT_DAILY_LIMIT;

#[derive(Debug)]
pub struct ServiceConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Directory uploaded attachments are written to.
    pub upload_dir: PathBuf,
    /// URL prefix the upload directory is served under.
    pub upload_base_url: String,
    pub daily_limit: u32,
    pub visitor_max_questions: u32,
    /// Sessions idle for this long are discarded.
    pub session_idle_timeout: Duration,
    /// News refresh is disabled when unset.
    pub perplexity_api_key: Option<SecretString>,
    pub news_schedule: String,
    /// rss2json endpoint for the articles list.
    pub articles_feed_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/screening-chat.db"),
            upload_dir: PathBuf::from("./data/uploads"),
            upload_base_url: "/uploads".to_string(),
            daily_limit: DEFAULT_DAILY_LIMIT,
            visitor_max_questions: 1,
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            perplexity_api_key: None,
            news_schedule: DEFAULT_SCHEDULE.to_string(),
            articles_feed_url: DEFAULT_FEED_URL.to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            port: parse_or(&get, "SCREENING_CHAT_PORT", defaults.port)?,
            db_path: get("SCREENING_CHAT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            upload_dir: get("SCREENING_CHAT_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            upload_base_url: get("SCREENING_CHAT_UPLOAD_BASE_URL")
                .unwrap_or(defaults.upload_base_url),
            daily_limit: parse_or(&get, "SCREENING_CHAT_DAILY_LIMIT", defaults.daily_limit)?,
            visitor_max_questions: positive(
                "SCREENING_CHAT_VISITOR_MAX_QUESTIONS",
                parse_or(
                    &get,
                    "SCREENING_CHAT_VISITOR_MAX_QUESTIONS",
                    defaults.visitor_max_questions,
                )?,
            )?,
            session_idle_timeout: Duration::from_secs(parse_or(
                &get,
                "SCREENING_CHAT_SESSION_IDLE_SECS",
                defaults.session_idle_timeout.as_secs(),
            )?),
            perplexity_api_key: get("PERPLEXITY_API_KEY").map(SecretString::from),
            news_schedule: get("SCREENING_CHAT_NEWS_SCHEDULE").unwrap_or(defaults.news_schedule),
            articles_feed_url: get("SCREENING_CHAT_ARTICLES_FEED_URL")
                .unwrap_or(defaults.articles_feed_url),
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

fn positive(key: &str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}
