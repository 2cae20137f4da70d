//! Store wrapper with switchable failures, for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::news::NewsItem;
use crate::ratelimit::UsageRecord;
use crate::site::comments::Comment;
use crate::store::{
    ChatStore, ContactRequest, Counter, LibSqlBackend, MeetingRequest, RecruiterSubmission,
};
use crate::transcript::model::{ChatMessage, MessageSource};

pub struct FaultyStore {
    inner: LibSqlBackend,
    fail_ordered: AtomicBool,
    fail_submissions: AtomicBool,
    fail_messages: AtomicBool,
}

impl FaultyStore {
    pub async fn new() -> Self {
        Self {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            fail_ordered: AtomicBool::new(false),
            fail_submissions: AtomicBool::new(false),
            fail_messages: AtomicBool::new(false),
        }
    }

    pub fn fail_ordered_queries(&self, fail: bool) {
        self.fail_ordered.store(fail, Ordering::SeqCst);
    }

    /// Make recruiter, contact, and meeting inserts fail.
    pub fn fail_submission_writes(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Make message appends fail.
    pub fn fail_message_writes(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::SeqCst);
    }

    fn check_submissions(&self, op: &str) -> Result<(), DatabaseError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query(format!("{op}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for FaultyStore {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.inner.run_migrations().await
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<(), DatabaseError> {
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("append_message: injected failure".into()));
        }
        self.inner.append_message(message).await
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        if self.fail_ordered.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("list_messages: missing index".into()));
        }
        self.inner.list_messages(session_id, source).await
    }

    async fn list_messages_unordered(
        &self,
        session_id: Uuid,
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        self.inner.list_messages_unordered(session_id, source).await
    }

    async fn count_conversations(&self) -> Result<i64, DatabaseError> {
        self.inner.count_conversations().await
    }

    async fn insert_recruiter_submission(
        &self,
        submission: &RecruiterSubmission,
    ) -> Result<(), DatabaseError> {
        self.check_submissions("insert_recruiter_submission")?;
        self.inner.insert_recruiter_submission(submission).await
    }

    async fn insert_contact_request(&self, request: &ContactRequest) -> Result<(), DatabaseError> {
        self.check_submissions("insert_contact_request")?;
        self.inner.insert_contact_request(request).await
    }

    async fn insert_meeting_request(&self, request: &MeetingRequest) -> Result<(), DatabaseError> {
        self.check_submissions("insert_meeting_request")?;
        self.inner.insert_meeting_request(request).await
    }

    async fn count_submissions(&self, collection: &str) -> Result<i64, DatabaseError> {
        self.inner.count_submissions(collection).await
    }

    async fn get_usage(&self, identity: &str) -> Result<Option<UsageRecord>, DatabaseError> {
        self.inner.get_usage(identity).await
    }

    async fn put_usage(&self, record: &UsageRecord) -> Result<(), DatabaseError> {
        self.inner.put_usage(record).await
    }

    async fn increment_counter(&self, name: &str) -> Result<i64, DatabaseError> {
        self.inner.increment_counter(name).await
    }

    async fn get_counters(&self) -> Result<Vec<Counter>, DatabaseError> {
        self.inner.get_counters().await
    }

    async fn add_subscriber(&self, email: &str) -> Result<bool, DatabaseError> {
        self.inner.add_subscriber(email).await
    }

    async fn replace_news(&self, items: &[NewsItem]) -> Result<usize, DatabaseError> {
        self.inner.replace_news(items).await
    }

    async fn list_news(&self) -> Result<Vec<NewsItem>, DatabaseError> {
        self.inner.list_news().await
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<(), DatabaseError> {
        self.inner.insert_comment(comment).await
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, DatabaseError> {
        self.inner.list_comments().await
    }

    async fn respond_to_comment(
        &self,
        id: Uuid,
        response: &str,
        responded_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.inner.respond_to_comment(id, response, responded_at).await
    }
}
