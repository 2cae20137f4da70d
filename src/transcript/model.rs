//! Message records stored in the per-session log.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who wrote a message into the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// Written by the dialog controller: a user action and the system reply.
    Dialog,
    /// Written by the follow-up pipeline (a human or automated responder).
    Pipeline,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dialog => "dialog",
            Self::Pipeline => "pipeline",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pipeline" => Self::Pipeline,
            _ => Self::Dialog,
        }
    }
}

/// One entry in a session's transcript. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub source: MessageSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Alternate text shown instead of `prompt` (e.g. a form summary).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub is_multiple_choice: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A controller exchange: what the user did and what the dialog replied.
    pub fn exchange(session_id: Uuid, prompt: Option<&str>, response: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            source: MessageSource::Dialog,
            prompt: prompt.map(String::from),
            display_prompt: None,
            response: Some(response.to_string()),
            is_multiple_choice: false,
            created_at: now(),
        }
    }

    /// A follow-up answer written outside the dialog.
    pub fn pipeline_response(session_id: Uuid, response: &str) -> Self {
        Self {
            source: MessageSource::Pipeline,
            ..Self::exchange(session_id, None, response)
        }
    }

    pub fn with_display_prompt(mut self, display: impl Into<String>) -> Self {
        self.display_prompt = Some(display.into());
        self
    }

    pub fn multiple_choice(mut self, is_multiple_choice: bool) -> Self {
        self.is_multiple_choice = is_multiple_choice;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Current time at the precision the store keeps (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
