//! Public comment board with a live, newest-first feed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::validation;
use crate::error::{CommentError, DatabaseError};
use crate::store::ChatStore;
use crate::transcript::model::now;

const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// A visitor comment and the owner's optional reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub text: String,
    pub user_name: String,
    /// Kept for follow-up; never sent to clients.
    #[serde(skip_serializing, default)]
    pub user_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(text: &str, user_name: &str, user_email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            user_name: user_name.to_string(),
            user_email: user_email.to_string(),
            response: None,
            responded_at: None,
            created_at: now(),
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Comment form as posted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub text: String,
    pub user_name: String,
    pub user_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentEvent {
    Posted(Uuid),
    Responded(Uuid),
}

pub struct CommentBoard {
    store: Arc<dyn ChatStore>,
    tx: broadcast::Sender<CommentEvent>,
}

impl CommentBoard {
    pub fn new(store: Arc<dyn ChatStore>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self { store, tx })
    }

    /// Validate and store a comment, then wake every feed.
    pub async fn post(&self, form: NewComment) -> Result<Comment, CommentError> {
        let text = validation::required("text", &form.text)?;
        let user_name = validation::required("user_name", &form.user_name)?;
        let user_email = validation::email(&form.user_email)?;

        let comment = Comment::new(text, user_name, user_email);
        self.store.insert_comment(&comment).await?;
        info!(id = %comment.id, "Comment posted");
        let _ = self.tx.send(CommentEvent::Posted(comment.id));
        Ok(comment)
    }

    /// Attach the owner's reply to a comment.
    pub async fn respond(&self, id: Uuid, response: &str) -> Result<(), CommentError> {
        let response = validation::required("response", response)?;
        if !self.store.respond_to_comment(id, response, now()).await? {
            return Err(CommentError::NotFound(id));
        }
        info!(id = %id, "Comment answered");
        let _ = self.tx.send(CommentEvent::Responded(id));
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Comment>, DatabaseError> {
        self.store.list_comments().await
    }

    /// The first `next()` yields the current list; each later one waits for
    /// a post or a reply.
    pub fn subscribe(self: &Arc<Self>) -> CommentFeed {
        CommentFeed {
            board: Arc::clone(self),
            rx: self.tx.subscribe(),
            stale: true,
        }
    }
}

pub struct CommentFeed {
    board: Arc<CommentBoard>,
    rx: broadcast::Receiver<CommentEvent>,
    stale: bool,
}

impl CommentFeed {
    /// Next full snapshot, newest first. `None` once the board is gone.
    pub async fn next(&mut self) -> Option<Result<Vec<Comment>, DatabaseError>> {
        if !self.stale {
            match self.rx.recv().await {
                Ok(event) => debug!(?event, "Comment feed woken"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Comment feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
            self.stale = true;
        }
        let snapshot = self.board.list().await;
        self.stale = false;
        Some(snapshot)
    }
}
