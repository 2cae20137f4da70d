//! Dialog stages: the state machine a screening conversation walks through.

use serde::{Deserialize, Serialize};

/// The stages of a screening conversation.
///
/// Visitors go Initial → EmailVerification → VisitorTopics → (TypingEnabled)
/// → ContactForm → Closed. Recruiters go Initial → RecruiterFilter →
/// RecruiterForm → MeetingSetup → Closed. Either path may end early in Closed
/// (quota exceeded, qualification rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatStage {
    Initial,
    EmailVerification,
    RecruiterFilter,
    RecruiterForm,
    VisitorTopics,
    TypingEnabled,
    ContactForm,
    MeetingSetup,
    Closed,
}

impl ChatStage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: ChatStage) -> bool {
        use ChatStage::*;
        matches!(
            (self, target),
            (Initial, EmailVerification)
                | (Initial, RecruiterFilter)
                | (EmailVerification, VisitorTopics)
                | (EmailVerification, Closed)
                | (RecruiterFilter, RecruiterForm)
                | (RecruiterFilter, Closed)
                | (RecruiterForm, MeetingSetup)
                | (VisitorTopics, VisitorTopics)
                | (VisitorTopics, TypingEnabled)
                | (VisitorTopics, ContactForm)
                | (TypingEnabled, ContactForm)
                | (ContactForm, Closed)
                | (MeetingSetup, Closed)
        )
    }

    /// Whether the conversation is over. No further input is accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether the client should show a free-text input box.
    pub fn accepts_free_text(&self) -> bool {
        matches!(self, Self::TypingEnabled)
    }
}

impl Default for ChatStage {
    fn default() -> Self {
        Self::Initial
    }
}

impl std::fmt::Display for ChatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initial => "INITIAL",
            Self::EmailVerification => "EMAIL_VERIFICATION",
            Self::RecruiterFilter => "RECRUITER_FILTER",
            Self::RecruiterForm => "RECRUITER_FORM",
            Self::VisitorTopics => "VISITOR_TOPICS",
            Self::TypingEnabled => "TYPING_ENABLED",
            Self::ContactForm => "CONTACT_FORM",
            Self::MeetingSetup => "MEETING_SETUP",
            Self::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}
