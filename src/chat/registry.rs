//! Open dialogs, keyed by session id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::controller::{ControllerDeps, DialogController, StageView};
use crate::error::ChatError;

/// A controller behind its own lock: one operation per session at a time.
pub type SharedController = Arc<Mutex<DialogController>>;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedController>>,
    deps: ControllerDeps,
}

impl SessionRegistry {
    pub fn new(deps: ControllerDeps) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            deps,
        })
    }

    pub fn deps(&self) -> &ControllerDeps {
        &self.deps
    }

    /// Open a new dialog in `INITIAL` under a fresh id.
    pub async fn open(&self) -> StageView {
        let controller = DialogController::new(self.deps.clone());
        let view = controller.view();
        self.sessions
            .write()
            .await
            .insert(view.session_id, Arc::new(Mutex::new(controller)));
        info!(session_id = %view.session_id, "Session opened");
        view
    }

    pub async fn get(&self, session_id: Uuid) -> Result<SharedController, ChatError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(ChatError::SessionNotFound(session_id))
    }

    /// Discard a session and end its live transcript subscriptions. An
    /// in-flight operation on it still runs to completion.
    pub async fn close(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.sessions
            .write()
            .await
            .remove(&session_id)
            .ok_or(ChatError::SessionNotFound(session_id))?;
        self.deps.log.close_session(session_id);
        info!(session_id = %session_id, "Session closed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions idle for longer than `max_idle`. Sessions with an
    /// operation in flight are skipped. Returns how many were dropped.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write().await;
        let stale: Vec<Uuid> = sessions
            .iter()
            .filter_map(|(id, controller)| {
                let controller = controller.try_lock().ok()?;
                (controller.session().last_activity < cutoff).then_some(*id)
            })
            .collect();

        for id in &stale {
            sessions.remove(id);
            self.deps.log.close_session(*id);
        }
        if !stale.is_empty() {
            info!(pruned = stale.len(), remaining = sessions.len(), "Idle sessions pruned");
        }
        stale.len()
    }

    /// Spawn a background task that prunes idle sessions every `interval`.
    pub fn spawn_prune_task(
        self: &Arc<Self>,
        interval: Duration,
        max_idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let pruned = registry.prune_idle(max_idle).await;
                debug!(pruned, "Session prune tick");
            }
        })
    }
}
