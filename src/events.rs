//! Analytics events emitted by the chat and site endpoints.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    /// Any dialog step taken by a visitor or recruiter.
    ChatbotInteraction {
        action: String,
        session_id: Uuid,
    },
    /// Recruiter-path milestones (qualified, submitted, meeting requested).
    RecruiterAction {
        action: String,
        session_id: Uuid,
        company: Option<String>,
    },
    /// Site-level interactions (views, downloads, likes, newsletter).
    ProfileInteraction { action: String },
}

impl AnalyticsEvent {
    pub fn chatbot(action: impl Into<String>, session_id: Uuid) -> Self {
        Self::ChatbotInteraction {
            action: action.into(),
            session_id,
        }
    }

    pub fn recruiter(action: impl Into<String>, session_id: Uuid, company: Option<&str>) -> Self {
        Self::RecruiterAction {
            action: action.into(),
            session_id,
            company: company.map(String::from),
        }
    }

    pub fn profile(action: impl Into<String>) -> Self {
        Self::ProfileInteraction {
            action: action.into(),
        }
    }
}

/// Destination for analytics events. Recording never fails the caller.
pub trait EventSink: Send + Sync {
    fn record(&self, event: AnalyticsEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: AnalyticsEvent) {}
}

/// Logs events as structured `info!` records under target `analytics`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: AnalyticsEvent) {
        match &event {
            AnalyticsEvent::ChatbotInteraction { action, session_id } => {
                info!(target: "analytics", %session_id, action = %action, "chatbot_interaction");
            }
            AnalyticsEvent::RecruiterAction {
                action,
                session_id,
                company,
            } => {
                info!(
                    target: "analytics",
                    %session_id,
                    action = %action,
                    company = company.as_deref().unwrap_or(""),
                    "recruiter_action"
                );
            }
            AnalyticsEvent::ProfileInteraction { action } => {
                info!(target: "analytics", action = %action, "profile_interaction");
            }
        }
    }
}
