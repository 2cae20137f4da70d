//! Per-identity daily usage limiter.
//!
//! A fixed daily bucket: each identity may start `daily_limit` conversations
//! per local calendar day. The count resets on the first request of a new
//! day; it is not a sliding window.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::ChatStore;

pub const DEFAULT_DAILY_LIMIT: u32 = 3;

/// Stored usage for one identity. Exactly one record per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub identity: String,
    pub request_count: u32,
    pub last_reset: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum UsageDecision {
    Allowed { count: u32 },
    Denied { count: u32 },
}

impl UsageDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Decide a request against the existing record.
///
/// Returns the decision and the record to write back, if any. A denial
/// writes nothing.
pub fn decide(
    existing: Option<&UsageRecord>,
    identity: &str,
    today: NaiveDate,
    daily_limit: u32,
) -> (UsageDecision, Option<UsageRecord>) {
    match existing {
        None => {
            let record = UsageRecord {
                identity: identity.to_string(),
                request_count: 1,
                last_reset: today,
                created_at: Utc::now(),
            };
            (UsageDecision::Allowed { count: 1 }, Some(record))
        }
        Some(record) if record.last_reset < today => {
            let record = UsageRecord {
                request_count: 1,
                last_reset: today,
                ..record.clone()
            };
            (UsageDecision::Allowed { count: 1 }, Some(record))
        }
        Some(record) if record.request_count >= daily_limit => (
            UsageDecision::Denied {
                count: record.request_count,
            },
            None,
        ),
        Some(record) => {
            let count = record.request_count + 1;
            let record = UsageRecord {
                request_count: count,
                ..record.clone()
            };
            (UsageDecision::Allowed { count }, Some(record))
        }
    }
}

/// Normalize an identity (email) into its record key.
pub fn identity_key(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Store-backed limiter.
///
/// Check-and-increment is serialized inside this process. Two processes
/// sharing one database can still interleave the read and the write.
pub struct UsageLimiter {
    store: Arc<dyn ChatStore>,
    daily_limit: u32,
    guard: Mutex<()>,
}

impl UsageLimiter {
    pub fn new(store: Arc<dyn ChatStore>, daily_limit: u32) -> Self {
        Self {
            store,
            daily_limit,
            guard: Mutex::new(()),
        }
    }

    /// Check and count a request for `identity` against today's local date.
    pub async fn check(&self, identity: &str) -> Result<UsageDecision, DatabaseError> {
        self.check_on(identity, Local::now().date_naive()).await
    }

    /// Check and count a request for `identity` as of `today`.
    pub async fn check_on(
        &self,
        identity: &str,
        today: NaiveDate,
    ) -> Result<UsageDecision, DatabaseError> {
        let key = identity_key(identity);
        let _held = self.guard.lock().await;

        let existing = self.store.get_usage(&key).await?;
        let (decision, update) = decide(existing.as_ref(), &key, today, self.daily_limit);

        if let Some(record) = update {
            self.store.put_usage(&record).await?;
        }

        match decision {
            UsageDecision::Allowed { count } => {
                debug!(identity = %key, count, "Usage allowed");
            }
            UsageDecision::Denied { count } => {
                info!(identity = %key, count, limit = self.daily_limit, "Daily usage limit reached");
            }
        }
        Ok(decision)
    }
}
