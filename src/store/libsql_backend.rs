//! libSQL backend: async `ChatStore` implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! fixed-width RFC 3339 text (microseconds, `Z`) so text order is time order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::session::RecruiterInfo;
use crate::error::DatabaseError;
use crate::news::NewsItem;
use crate::ratelimit::UsageRecord;
use crate::site::comments::Comment;
use crate::store::migrations;
use crate::store::traits::{
    ChatStore, ContactRequest, Counter, MeetingRequest, RecruiterSubmission,
};
use crate::transcript::model::{ChatMessage, MessageSource};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Writes
/// take `write_lock`; a transaction holds it until commit or rollback, so
/// no other write on the shared connection can land inside it.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_messages(
        &self,
        sql: &str,
        session_id: Uuid,
        source: MessageSource,
        op: &str,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params![session_id.to_string(), source.as_str()])
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            match row_to_message(&row) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!("Skipping chat message row: {e}"),
            }
        }
        Ok(messages)
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s}: {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const MESSAGE_COLUMNS: &str =
    "id, session_id, source, prompt, display_prompt, response, is_multiple_choice, created_at";

/// Map a libsql Row to a ChatMessage. Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<ChatMessage, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Serialization(e.to_string());
    let id: String = row.get(0).map_err(read)?;
    let session_id: String = row.get(1).map_err(read)?;
    let source: String = row.get(2).map_err(read)?;
    let multiple: i64 = row.get(6).map_err(read)?;
    let created: String = row.get(7).map_err(read)?;

    Ok(ChatMessage {
        id: parse_uuid(&id)?,
        session_id: parse_uuid(&session_id)?,
        source: MessageSource::parse(&source),
        prompt: row.get(3).ok(),
        display_prompt: row.get(4).ok(),
        response: row.get(5).ok(),
        is_multiple_choice: multiple != 0,
        created_at: parse_datetime(&created),
    })
}

fn row_to_news(row: &libsql::Row) -> Result<NewsItem, libsql::Error> {
    let fetched: String = row.get(4)?;
    Ok(NewsItem {
        title: row.get(0)?,
        kind: row.get(1)?,
        summary: row.get(2)?,
        source_link: row.get(3)?,
        fetched_at: parse_datetime(&fetched),
    })
}

fn row_to_comment(row: &libsql::Row) -> Result<Comment, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Serialization(e.to_string());
    let id: String = row.get(0).map_err(read)?;
    let responded: Option<String> = row.get(5).ok();
    let created: String = row.get(6).map_err(read)?;

    Ok(Comment {
        id: parse_uuid(&id)?,
        text: row.get(1).map_err(read)?,
        user_name: row.get(2).map_err(read)?,
        user_email: row.get(3).map_err(read)?,
        response: row.get(4).ok(),
        responded_at: responded.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ChatStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Message log ─────────────────────────────────────────────────

    async fn append_message(&self, message: &ChatMessage) -> Result<(), DatabaseError> {
        let _write = self.write_lock.lock().await;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO chat_messages ({MESSAGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    message.id.to_string(),
                    message.session_id.to_string(),
                    message.source.as_str(),
                    opt_text(message.prompt.as_deref()),
                    opt_text(message.display_prompt.as_deref()),
                    opt_text(message.response.as_deref()),
                    message.is_multiple_choice as i64,
                    format_datetime(&message.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;

        debug!(id = %message.id, session_id = %message.session_id, "Chat message appended");
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        self.query_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                 WHERE session_id = ?1 AND source = ?2
                 ORDER BY created_at ASC, rowid ASC"
            ),
            session_id,
            source,
            "list_messages",
        )
        .await
    }

    async fn list_messages_unordered(
        &self,
        session_id: Uuid,
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        self.query_messages(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages
                 WHERE session_id = ?1 AND source = ?2"
            ),
            session_id,
            source,
            "list_messages_unordered",
        )
        .await
    }

    async fn count_conversations(&self) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(DISTINCT session_id) FROM chat_messages WHERE source = ?1",
                params![MessageSource::Dialog.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_conversations: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_conversations: {e}")))?
        {
            Some(row) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count_conversations: {e}"))),
            None => Ok(0),
        }
    }

    // ── Submissions ─────────────────────────────────────────────────

    async fn insert_recruiter_submission(
        &self,
        submission: &RecruiterSubmission,
    ) -> Result<(), DatabaseError> {
        let _write = self.write_lock.lock().await;
        let answers = serde_json::to_string(&submission.answers)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let RecruiterInfo {
            name,
            email,
            company,
            job_role,
            job_description,
        } = &submission.info;

        self.conn()
            .execute(
                "INSERT INTO recruiter_submissions (id, session_id, name, email, company,
                    job_role, job_description, answers, attachment_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (id) DO UPDATE SET name = ?3, email = ?4, company = ?5,
                    job_role = ?6, job_description = ?7, answers = ?8, attachment_url = ?9",
                params![
                    submission.id.to_string(),
                    submission.session_id.to_string(),
                    name.as_str(),
                    email.as_str(),
                    company.as_str(),
                    job_role.as_str(),
                    opt_text(job_description.as_deref()),
                    answers,
                    opt_text(submission.attachment_url.as_deref()),
                    format_datetime(&submission.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_recruiter_submission: {e}")))?;

        info!(id = %submission.id, company = %company, "Recruiter submission stored");
        Ok(())
    }

    async fn insert_contact_request(&self, request: &ContactRequest) -> Result<(), DatabaseError> {
        let _write = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO contact_requests (id, session_id, name, email, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (id) DO UPDATE SET name = ?3, email = ?4, message = ?5",
                params![
                    request.id.to_string(),
                    request.session_id.to_string(),
                    request.name.as_str(),
                    request.email.as_str(),
                    request.message.as_str(),
                    format_datetime(&request.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_contact_request: {e}")))?;

        info!(id = %request.id, "Contact request stored");
        Ok(())
    }

    async fn insert_meeting_request(&self, request: &MeetingRequest) -> Result<(), DatabaseError> {
        let _write = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO meeting_requests (id, session_id, name, email, company, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (id) DO UPDATE SET name = ?3, email = ?4, company = ?5",
                params![
                    request.id.to_string(),
                    request.session_id.to_string(),
                    request.name.as_str(),
                    request.email.as_str(),
                    request.company.as_str(),
                    format_datetime(&request.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_meeting_request: {e}")))?;

        info!(id = %request.id, "Meeting request stored");
        Ok(())
    }

    async fn count_submissions(&self, collection: &str) -> Result<i64, DatabaseError> {
        let table = match collection {
            "recruiter_submissions" | "contact_requests" | "meeting_requests" => collection,
            other => {
                return Err(DatabaseError::Query(format!(
                    "count_submissions: unknown collection {other}"
                )));
            }
        };
        let mut rows = self
            .conn()
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_submissions: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count_submissions: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_submissions: {e}"))),
        }
    }

    // ── Usage records ───────────────────────────────────────────────

    async fn get_usage(&self, identity: &str) -> Result<Option<UsageRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT identity, request_count, last_reset, created_at
                 FROM usage_records WHERE identity = ?1",
                params![identity],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_usage: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_usage: {e}"))),
        };

        let read = |e: libsql::Error| DatabaseError::Serialization(format!("get_usage: {e}"));
        let count: i64 = row.get(1).map_err(read)?;
        let last_reset: String = row.get(2).map_err(read)?;
        let created: String = row.get(3).map_err(read)?;
        let last_reset = NaiveDate::parse_from_str(&last_reset, "%Y-%m-%d")
            .map_err(|e| DatabaseError::Serialization(format!("get_usage: {e}")))?;

        Ok(Some(UsageRecord {
            identity: row.get(0).map_err(read)?,
            request_count: u32::try_from(count).unwrap_or(u32::MAX),
            last_reset,
            created_at: parse_datetime(&created),
        }))
    }

    async fn put_usage(&self, record: &UsageRecord) -> Result<(), DatabaseError> {
        let _write = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO usage_records (identity, request_count, last_reset, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (identity) DO UPDATE SET request_count = ?2, last_reset = ?3",
                params![
                    record.identity.as_str(),
                    record.request_count as i64,
                    record.last_reset.format("%Y-%m-%d").to_string(),
                    format_datetime(&record.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_usage: {e}")))?;
        Ok(())
    }

    // ── Counters & newsletter ───────────────────────────────────────

    async fn increment_counter(&self, name: &str) -> Result<i64, DatabaseError> {
        let _write = self.write_lock.lock().await;
        let now = format_datetime(&Utc::now());
        self.conn()
            .execute(
                "INSERT INTO counters (name, count, updated_at) VALUES (?1, 1, ?2)
                 ON CONFLICT (name) DO UPDATE SET count = count + 1, updated_at = ?2",
                params![name, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_counter: {e}")))?;

        let mut rows = self
            .conn()
            .query("SELECT count FROM counters WHERE name = ?1", params![name])
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_counter: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("increment_counter: {e}"))),
            Ok(None) => Err(DatabaseError::Query(format!(
                "increment_counter: counter {name} vanished"
            ))),
            Err(e) => Err(DatabaseError::Query(format!("increment_counter: {e}"))),
        }
    }

    async fn get_counters(&self) -> Result<Vec<Counter>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT name, count FROM counters ORDER BY name ASC", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("get_counters: {e}")))?;

        let mut counters = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_counters: {e}")))?
        {
            match (row.get::<String>(0), row.get::<i64>(1)) {
                (Ok(name), Ok(count)) => counters.push(Counter { name, count }),
                _ => warn!("Skipping malformed counter row"),
            }
        }
        Ok(counters)
    }

    async fn add_subscriber(&self, email: &str) -> Result<bool, DatabaseError> {
        let _write = self.write_lock.lock().await;
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO subscribers (email, created_at) VALUES (?1, ?2)",
                params![email, format_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_subscriber: {e}")))?;
        Ok(inserted > 0)
    }

    // ── News cache ──────────────────────────────────────────────────

    async fn replace_news(&self, items: &[NewsItem]) -> Result<usize, DatabaseError> {
        let _write = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_news: {e}")))?;

        let replaced = async {
            let deleted = tx
                .execute("DELETE FROM news_items", ())
                .await
                .map_err(|e| DatabaseError::Query(format!("replace_news: {e}")))?;
            debug!(deleted, "Old news items deleted");

            for item in items {
                tx.execute(
                    "INSERT INTO news_items (id, title, kind, summary, source_link, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        Uuid::new_v4().to_string(),
                        item.title.as_str(),
                        item.kind.as_str(),
                        item.summary.as_str(),
                        item.source_link.as_str(),
                        format_datetime(&item.fetched_at),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("replace_news: {e}")))?;
            }
            Ok::<_, DatabaseError>(())
        }
        .await;

        if let Err(e) = replaced {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "News rollback failed");
            }
            return Err(e);
        }
        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("replace_news commit: {e}")))?;
        Ok(items.len())
    }

    async fn list_news(&self) -> Result<Vec<NewsItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT title, kind, summary, source_link, fetched_at
                 FROM news_items ORDER BY fetched_at DESC, rowid ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_news: {e}")))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_news: {e}")))?
        {
            match row_to_news(&row) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping news row: {e}"),
            }
        }
        Ok(items)
    }

    // ── Comments ────────────────────────────────────────────────────

    async fn insert_comment(&self, comment: &Comment) -> Result<(), DatabaseError> {
        let _write = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO comments (id, text, user_name, user_email, response, responded_at,
                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    comment.id.to_string(),
                    comment.text.as_str(),
                    comment.user_name.as_str(),
                    comment.user_email.as_str(),
                    opt_text(comment.response.as_deref()),
                    opt_text(comment.responded_at.as_ref().map(format_datetime).as_deref()),
                    format_datetime(&comment.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_comment: {e}")))?;

        info!(id = %comment.id, "Comment stored");
        Ok(())
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, text, user_name, user_email, response, responded_at, created_at
                 FROM comments ORDER BY created_at DESC, rowid DESC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_comments: {e}")))?;

        let mut comments = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_comments: {e}")))?
        {
            match row_to_comment(&row) {
                Ok(comment) => comments.push(comment),
                Err(e) => warn!("Skipping comment row: {e}"),
            }
        }
        Ok(comments)
    }

    async fn respond_to_comment(
        &self,
        id: Uuid,
        response: &str,
        responded_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let _write = self.write_lock.lock().await;
        let updated = self
            .conn()
            .execute(
                "UPDATE comments SET response = ?2, responded_at = ?3 WHERE id = ?1",
                params![id.to_string(), response, format_datetime(&responded_at)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("respond_to_comment: {e}")))?;
        Ok(updated > 0)
    }
}
