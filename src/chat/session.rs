//! In-memory conversation state for one open dialog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::qualification::QualificationAnswers;
use super::stage::ChatStage;
use crate::ratelimit::UsageDecision;

/// Who the person on the other side of the dialog says they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Recruiter,
    Visitor,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recruiter => write!(f, "recruiter"),
            Self::Visitor => write!(f, "visitor"),
        }
    }
}

/// Structured recruiter details collected by the recruiter form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruiterInfo {
    pub name: String,
    pub email: String,
    pub company: String,
    pub job_role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
}

/// State carried by the recruiter path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecruiterPath {
    pub answers: Option<QualificationAnswers>,
    pub info: Option<RecruiterInfo>,
    pub attachment_url: Option<String>,
}

/// State carried by the visitor path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorPath {
    pub email: Option<String>,
    /// Limiter verdict for an identity, kept until the email step completes
    /// so a retry does not count the same request twice.
    pub usage: Option<(String, UsageDecision)>,
}

/// Role-specific session data. Each path only holds its own fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionKind {
    #[default]
    Unset,
    Recruiter(RecruiterPath),
    Visitor(VisitorPath),
}

impl SessionKind {
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Unset => None,
            Self::Recruiter(_) => Some(Role::Recruiter),
            Self::Visitor(_) => Some(Role::Visitor),
        }
    }
}

/// One open dialog. Never persisted; only the messages it produces are.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub kind: SessionKind,
    pub stage: ChatStage,
    pub question_count: u32,
    pub max_questions: u32,
    pub allow_file_upload: bool,
    /// Id of the collection write attempted in the current stage. Retries
    /// reuse it; cleared when the stage advances.
    pub pending_write: Option<Uuid>,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Fresh session in `Initial`, with visitor limits until a role is picked.
    pub fn new(visitor_max_questions: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: SessionKind::Unset,
            stage: ChatStage::Initial,
            question_count: 0,
            max_questions: visitor_max_questions,
            allow_file_upload: false,
            pending_write: None,
            opened_at: now,
            last_activity: now,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.kind.role()
    }

    pub fn questions_remaining(&self) -> u32 {
        self.max_questions.saturating_sub(self.question_count)
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn recruiter_mut(&mut self) -> Option<&mut RecruiterPath> {
        match &mut self.kind {
            SessionKind::Recruiter(path) => Some(path),
            _ => None,
        }
    }

    pub fn recruiter(&self) -> Option<&RecruiterPath> {
        match &self.kind {
            SessionKind::Recruiter(path) => Some(path),
            _ => None,
        }
    }

    pub fn visitor(&self) -> Option<&VisitorPath> {
        match &self.kind {
            SessionKind::Visitor(path) => Some(path),
            _ => None,
        }
    }

    pub fn visitor_mut(&mut self) -> Option<&mut VisitorPath> {
        match &mut self.kind {
            SessionKind::Visitor(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_unset_and_initial() {
        let session = Session::new(1);
        assert_eq!(session.stage, ChatStage::Initial);
        assert_eq!(session.role(), None);
        assert_eq!(session.question_count, 0);
        assert!(!session.allow_file_upload);
        assert_eq!(session.questions_remaining(), 1);
        assert!(session.pending_write.is_none());
    }

    #[test]
    fn sessions_get_distinct_ids() {
        assert_ne!(Session::new(1).id, Session::new(1).id);
    }

    #[test]
    fn path_accessors_follow_kind() {
        let mut session = Session::new(1);
        assert!(session.recruiter_mut().is_none());
        assert!(session.visitor_mut().is_none());

        session.kind = SessionKind::Visitor(VisitorPath::default());
        assert!(session.visitor_mut().is_some());
        assert!(session.recruiter().is_none());
        assert_eq!(session.role(), Some(Role::Visitor));
    }

    #[test]
    fn quota_accounting() {
        let mut session = Session::new(2);
        session.question_count = 1;
        assert_eq!(session.questions_remaining(), 1);
        session.question_count = 2;
        assert_eq!(session.questions_remaining(), 0);
        session.question_count = 3;
        assert_eq!(session.questions_remaining(), 0);
    }
}
