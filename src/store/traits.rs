//! `ChatStore` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::qualification::QualificationAnswers;
use crate::chat::session::RecruiterInfo;
use crate::error::DatabaseError;
use crate::news::NewsItem;
use crate::ratelimit::UsageRecord;
use crate::site::comments::Comment;
use crate::transcript::model::{ChatMessage, MessageSource};

/// A structured recruiter submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruiterSubmission {
    pub id: Uuid,
    pub session_id: Uuid,
    #[serde(flatten)]
    pub info: RecruiterInfo,
    pub answers: QualificationAnswers,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A visitor's request for a human follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRequest {
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A recruiter's request for a scheduled meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub email: String,
    pub company: String,
    pub created_at: DateTime<Utc>,
}

/// An aggregate site counter (views, downloads, likes, subscribers, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub count: i64,
}

/// Backend-agnostic persistence for the screening chat.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Message log ─────────────────────────────────────────────────

    /// Append a message. Messages are never updated or deleted.
    async fn append_message(&self, message: &ChatMessage) -> Result<(), DatabaseError>;

    /// Messages of one session and source, oldest first.
    async fn list_messages(
        &self,
        session_id: Uuid,
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, DatabaseError>;

    /// Messages of one session and source in storage order.
    async fn list_messages_unordered(
        &self,
        session_id: Uuid,
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, DatabaseError>;

    /// Number of distinct sessions with at least one dialog message.
    async fn count_conversations(&self) -> Result<i64, DatabaseError>;

    // ── Submissions ─────────────────────────────────────────────────
    //
    // Inserts are keyed by id: writing the same id again replaces the row.

    async fn insert_recruiter_submission(
        &self,
        submission: &RecruiterSubmission,
    ) -> Result<(), DatabaseError>;

    async fn insert_contact_request(&self, request: &ContactRequest) -> Result<(), DatabaseError>;

    async fn insert_meeting_request(&self, request: &MeetingRequest) -> Result<(), DatabaseError>;

    /// Count rows in a submission collection (`recruiter_submissions`,
    /// `contact_requests`, `meeting_requests`).
    async fn count_submissions(&self, collection: &str) -> Result<i64, DatabaseError>;

    // ── Usage records ───────────────────────────────────────────────

    async fn get_usage(&self, identity: &str) -> Result<Option<UsageRecord>, DatabaseError>;

    /// Insert or overwrite the single record for `record.identity`.
    async fn put_usage(&self, record: &UsageRecord) -> Result<(), DatabaseError>;

    // ── Counters & newsletter ───────────────────────────────────────

    /// Increment a counter, creating it at 1. Returns the new value.
    async fn increment_counter(&self, name: &str) -> Result<i64, DatabaseError>;

    async fn get_counters(&self) -> Result<Vec<Counter>, DatabaseError>;

    /// Add a newsletter subscriber. Returns false if already subscribed.
    async fn add_subscriber(&self, email: &str) -> Result<bool, DatabaseError>;

    // ── News cache ──────────────────────────────────────────────────

    /// Delete every cached item and insert `items`, atomically.
    async fn replace_news(&self, items: &[NewsItem]) -> Result<usize, DatabaseError>;

    /// Cached items, newest first.
    async fn list_news(&self) -> Result<Vec<NewsItem>, DatabaseError>;

    // ── Comments ────────────────────────────────────────────────────

    async fn insert_comment(&self, comment: &Comment) -> Result<(), DatabaseError>;

    /// All comments, newest first.
    async fn list_comments(&self) -> Result<Vec<Comment>, DatabaseError>;

    /// Attach the owner's reply. Returns false if no comment has `id`.
    async fn respond_to_comment(
        &self,
        id: Uuid,
        response: &str,
        responded_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
}
