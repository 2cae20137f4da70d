//! Medium articles list, read on demand through the rss2json API.
//!
//! Nothing is cached: each request fetches the feed and maps its items.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ArticlesError;

pub const DEFAULT_FEED_URL: &str =
    "https://api.rss2json.com/v1/api.json?rss_url=https://medium.com/feed/@lilmod";

const DESCRIPTION_CHARS: usize = 150;
const WORDS_PER_MINUTE: usize = 200;

static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static markup pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub date: DateTime<Utc>,
    pub description: String,
    pub link: String,
    pub read_time: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedItem {
    title: String,
    pub_date: String,
    link: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    categories: Vec<String>,
}

/// rss2json reports `pubDate` as `YYYY-MM-DD HH:MM:SS` in UTC.
fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.to_utc()))
        .or_else(|| DateTime::parse_from_rfc2822(raw).ok().map(|d| d.to_utc()))
}

/// Markup removed, cut to the first 150 characters, with a trailing ellipsis.
pub fn summarize(html: &str) -> String {
    let text = MARKUP.replace_all(html, "");
    let mut summary: String = text.chars().take(DESCRIPTION_CHARS).collect();
    summary.push_str("...");
    summary
}

/// Whole minutes at 200 words a minute, rounded up.
pub fn read_time(content: &str) -> String {
    let words = content.split(' ').count();
    format!("{} min read", words.div_ceil(WORDS_PER_MINUTE))
}

fn to_article(item: FeedItem) -> Option<Article> {
    let Some(date) = parse_pub_date(&item.pub_date) else {
        warn!(title = %item.title, pub_date = %item.pub_date, "Skipping article with unreadable date");
        return None;
    };
    Some(Article {
        description: summarize(&item.description),
        read_time: read_time(&item.content),
        title: item.title,
        date,
        link: item.link,
        tags: item.categories,
    })
}

pub struct ArticleFeed {
    client: reqwest::Client,
    feed_url: String,
}

impl ArticleFeed {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            feed_url: feed_url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<Vec<Article>, ArticlesError> {
        let feed: Feed = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ArticlesError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| ArticlesError::InvalidResponse(e.to_string()))?;

        let articles: Vec<Article> = feed.items.into_iter().filter_map(to_article).collect();
        debug!(count = articles.len(), "Articles fetched");
        Ok(articles)
    }
}
