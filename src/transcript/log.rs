//! Message log: store-backed append-only log with broadcast to live
//! transcript subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::merge::{merge_by_timestamp, sort_by_timestamp};
use super::model::{ChatMessage, MessageSource};
use crate::error::DatabaseError;
use crate::store::ChatStore;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Change notification fanned out to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    Appended {
        session_id: Uuid,
        source: MessageSource,
    },
    SessionClosed {
        session_id: Uuid,
    },
}

/// Append-only message log shared by the controller, the pipeline
/// endpoint, and every transcript subscriber.
pub struct MessageLog {
    store: Arc<dyn ChatStore>,
    tx: broadcast::Sender<LogEvent>,
}

impl MessageLog {
    pub fn new(store: Arc<dyn ChatStore>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self { store, tx })
    }

    /// Persist a message, then notify subscribers of its session.
    pub async fn append(&self, message: &ChatMessage) -> Result<(), DatabaseError> {
        self.store.append_message(message).await?;
        debug!(
            session_id = %message.session_id,
            source = message.source.as_str(),
            "Message appended"
        );
        // Ok if no subscribers are listening
        let _ = self.tx.send(LogEvent::Appended {
            session_id: message.session_id,
            source: message.source,
        });
        Ok(())
    }

    /// Ordered messages of one source. Falls back to an unordered fetch
    /// sorted here when the ordered query fails.
    pub async fn snapshot_source(
        &self,
        session_id: Uuid,
        source: MessageSource,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        match self.store.list_messages(session_id, source).await {
            Ok(messages) => Ok(messages),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    source = source.as_str(),
                    error = %e,
                    "Ordered query failed, sorting unordered fetch"
                );
                let mut messages = self.store.list_messages_unordered(session_id, source).await?;
                sort_by_timestamp(&mut messages);
                Ok(messages)
            }
        }
    }

    /// Full transcript: dialog exchanges and pipeline responses, oldest first.
    pub async fn transcript(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, DatabaseError> {
        let dialog = self.snapshot_source(session_id, MessageSource::Dialog).await?;
        let pipeline = self
            .snapshot_source(session_id, MessageSource::Pipeline)
            .await?;
        Ok(merge_by_timestamp(dialog, pipeline))
    }

    /// End every live subscription of a session.
    pub fn close_session(&self, session_id: Uuid) {
        let _ = self.tx.send(LogEvent::SessionClosed { session_id });
    }

    /// Subscribe to a session's transcript. The first `next()` yields the
    /// current snapshot; each later one waits for a write.
    pub fn subscribe(self: &Arc<Self>, session_id: Uuid) -> TranscriptSubscription {
        TranscriptSubscription {
            log: Arc::clone(self),
            session_id,
            dialog: QuerySubscription::new(self.tx.subscribe(), session_id, MessageSource::Dialog),
            pipeline: QuerySubscription::new(
                self.tx.subscribe(),
                session_id,
                MessageSource::Pipeline,
            ),
            stale: true,
        }
    }
}

/// Change feed for one (session, source) query.
struct QuerySubscription {
    rx: broadcast::Receiver<LogEvent>,
    session_id: Uuid,
    source: MessageSource,
}

impl QuerySubscription {
    fn new(rx: broadcast::Receiver<LogEvent>, session_id: Uuid, source: MessageSource) -> Self {
        Self {
            rx,
            session_id,
            source,
        }
    }

    /// Wait until this query's result may have changed. Returns false when
    /// the session closed or the log went away.
    async fn changed(&mut self) -> bool {
        loop {
            match self.rx.recv().await {
                Ok(LogEvent::Appended { session_id, source })
                    if session_id == self.session_id && source == self.source =>
                {
                    return true;
                }
                Ok(LogEvent::SessionClosed { session_id }) if session_id == self.session_id => {
                    return false;
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, session_id = %self.session_id, "Transcript subscriber lagged");
                    return true;
                }
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }
}

/// Live transcript for one session, built from two per-source query
/// subscriptions. Dropping it releases both.
pub struct TranscriptSubscription {
    log: Arc<MessageLog>,
    session_id: Uuid,
    dialog: QuerySubscription,
    pipeline: QuerySubscription,
    /// Set until the next snapshot is taken; keeps `next()` cancel-safe.
    stale: bool,
}

impl TranscriptSubscription {
    /// Next full transcript snapshot, or `None` once the session is closed.
    pub async fn next(&mut self) -> Option<Result<Vec<ChatMessage>, DatabaseError>> {
        if !self.stale {
            let open = tokio::select! {
                open = self.dialog.changed() => open,
                open = self.pipeline.changed() => open,
            };
            if !open {
                return None;
            }
            self.stale = true;
        }
        let snapshot = self.log.transcript(self.session_id).await;
        self.stale = false;
        Some(snapshot)
    }
}
