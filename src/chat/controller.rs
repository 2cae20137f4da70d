//! DialogController: drives one session through the screening stages.
//!
//! Every handler validates its input first, then performs its external
//! writes, then appends exactly one message to the log, and only then
//! mutates the session. A failed write appends an apology and leaves the
//! stage where it was.
//!
//! Collection rows and uploads are keyed by a per-stage write id, so a retry
//! after a failed append overwrites the first attempt instead of adding one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::options::{ChatOptions, Choice, TopicKind};
use super::qualification::{QualificationAnswers, QualificationRule, Verdict};
use super::session::{RecruiterInfo, RecruiterPath, Role, Session, SessionKind, VisitorPath};
use super::stage::ChatStage;
use super::validation;
use crate::error::{ChatError, ValidationError};
use crate::events::{AnalyticsEvent, EventSink};
use crate::ratelimit::{UsageDecision, UsageLimiter, identity_key};
use crate::store::{ChatStore, ContactRequest, MeetingRequest, RecruiterSubmission};
use crate::transcript::log::MessageLog;
use crate::transcript::model::{ChatMessage, now};
use crate::uploads::{Attachment, ObjectStore};

/// Collaborators shared by every controller.
#[derive(Clone)]
pub struct ControllerDeps {
    pub log: Arc<MessageLog>,
    pub store: Arc<dyn ChatStore>,
    pub limiter: Arc<UsageLimiter>,
    pub rule: Arc<dyn QualificationRule>,
    pub uploads: Arc<dyn ObjectStore>,
    pub events: Arc<dyn EventSink>,
    pub options: Arc<ChatOptions>,
}

/// Contact form submitted at the end of the visitor path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// A user action, as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DialogAction {
    SelectRole { role: Role },
    SubmitEmail { email: String },
    SubmitQualification { answers: QualificationAnswers },
    SubmitRecruiterForm(RecruiterInfo),
    SelectTopic { topic: String },
    SubmitQuestion { question: String },
    SubmitContact(ContactForm),
    ConfirmMeeting,
}

impl DialogAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectRole { .. } => "select_role",
            Self::SubmitEmail { .. } => "submit_email",
            Self::SubmitQualification { .. } => "submit_qualification",
            Self::SubmitRecruiterForm(_) => "submit_recruiter_form",
            Self::SelectTopic { .. } => "select_topic",
            Self::SubmitQuestion { .. } => "submit_question",
            Self::SubmitContact(_) => "submit_contact",
            Self::ConfirmMeeting => "confirm_meeting",
        }
    }
}

/// Outcome of one handled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub from: ChatStage,
    pub to: ChatStage,
    /// An external write failed; an apology was appended and the stage kept.
    pub write_failed: bool,
}

/// What the client needs to render the current stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub session_id: Uuid,
    pub stage: ChatStage,
    pub role: Option<Role>,
    pub question_count: u32,
    pub max_questions: u32,
    pub questions_remaining: u32,
    pub allow_file_upload: bool,
    pub accepts_free_text: bool,
    pub choices: Vec<Choice>,
}

pub struct DialogController {
    session: Session,
    deps: ControllerDeps,
}

impl DialogController {
    pub fn new(deps: ControllerDeps) -> Self {
        Self {
            session: Session::new(deps.options.visitor_max_questions),
            deps,
        }
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stage(&self) -> ChatStage {
        self.session.stage
    }

    pub fn view(&self) -> StageView {
        let session = &self.session;
        StageView {
            session_id: session.id,
            stage: session.stage,
            role: session.role(),
            question_count: session.question_count,
            max_questions: session.max_questions,
            questions_remaining: session.questions_remaining(),
            allow_file_upload: session.allow_file_upload,
            accepts_free_text: session.stage.accepts_free_text(),
            choices: self.deps.options.choices_for(session.stage),
        }
    }

    /// Route a client action to its handler.
    pub async fn dispatch(&mut self, action: DialogAction) -> Result<Step, ChatError> {
        match action {
            DialogAction::SelectRole { role } => self.select_role(role).await,
            DialogAction::SubmitEmail { email } => self.submit_email(&email).await,
            DialogAction::SubmitQualification { answers } => {
                self.submit_qualification(answers).await
            }
            DialogAction::SubmitRecruiterForm(form) => {
                self.submit_recruiter_form(form, None).await
            }
            DialogAction::SelectTopic { topic } => self.select_topic(&topic).await,
            DialogAction::SubmitQuestion { question } => self.submit_question(&question).await,
            DialogAction::SubmitContact(form) => self.submit_contact(form).await,
            DialogAction::ConfirmMeeting => self.confirm_meeting().await,
        }
    }

    // ── Handlers ────────────────────────────────────────────────────

    /// INITIAL → EMAIL_VERIFICATION (visitor) or RECRUITER_FILTER (recruiter).
    pub async fn select_role(&mut self, role: Role) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::Initial, "select_role")?;
        let options = Arc::clone(&self.deps.options);
        let (to, response) = match role {
            Role::Recruiter => (ChatStage::RecruiterFilter, options.filter_message.as_str()),
            Role::Visitor => (ChatStage::EmailVerification, options.email_prompt.as_str()),
        };
        self.check_transition(to)?;

        let message = ChatMessage::exchange(
            self.session.id,
            Some(options.role_choice_text(role)),
            response,
        )
        .multiple_choice(role == Role::Recruiter);
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("select_role", &e).await);
        }

        match role {
            Role::Recruiter => {
                // The recruiter path has no free-text questions
                self.session.kind = SessionKind::Recruiter(RecruiterPath::default());
                self.session.max_questions = 0;
                self.session.allow_file_upload = true;
            }
            Role::Visitor => {
                self.session.kind = SessionKind::Visitor(VisitorPath::default());
                self.session.max_questions = options.visitor_max_questions;
                self.session.allow_file_upload = false;
            }
        }
        self.record(AnalyticsEvent::chatbot(format!("select_role:{role}"), self.session.id));
        Ok(self.advance(to))
    }

    /// EMAIL_VERIFICATION → VISITOR_TOPICS, or CLOSED when the daily quota
    /// for this email is used up.
    pub async fn submit_email(&mut self, email: &str) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::EmailVerification, "submit_email")?;
        let email = validation::email(email)?.to_string();
        let options = Arc::clone(&self.deps.options);

        let identity = identity_key(&email);
        let cached = self
            .session
            .visitor()
            .and_then(|v| v.usage.as_ref())
            .filter(|(key, _)| *key == identity)
            .map(|(_, decision)| *decision);
        let decision = match cached {
            Some(decision) => decision,
            None => match self.deps.limiter.check(&email).await {
                Ok(decision) => {
                    if let Some(visitor) = self.session.visitor_mut() {
                        visitor.usage = Some((identity, decision));
                    }
                    decision
                }
                Err(e) => return Ok(self.apologize("submit_email", &e).await),
            },
        };
        let (to, response) = match decision {
            UsageDecision::Allowed { .. } => {
                (ChatStage::VisitorTopics, options.topics_prompt.as_str())
            }
            UsageDecision::Denied { .. } => {
                (ChatStage::Closed, options.quota_exceeded_message.as_str())
            }
        };
        self.check_transition(to)?;

        let message = ChatMessage::exchange(self.session.id, Some(&email), response)
            .multiple_choice(to == ChatStage::VisitorTopics);
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("submit_email", &e).await);
        }

        if let Some(visitor) = self.session.visitor_mut() {
            visitor.email = Some(email);
            visitor.usage = None;
        }
        let action = if decision.is_allowed() {
            "email_verified"
        } else {
            "quota_exceeded"
        };
        self.record(AnalyticsEvent::chatbot(action, self.session.id));
        Ok(self.advance(to))
    }

    /// RECRUITER_FILTER → RECRUITER_FORM on accept, CLOSED on reject.
    pub async fn submit_qualification(
        &mut self,
        answers: QualificationAnswers,
    ) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::RecruiterFilter, "submit_qualification")?;
        let options = Arc::clone(&self.deps.options);

        let verdict = self.deps.rule.evaluate(&answers);
        let (to, response, tally) = match verdict {
            Verdict::Accept => (
                ChatStage::RecruiterForm,
                options.recruiter_form_prompt.as_str(),
                "qualified",
            ),
            Verdict::Reject => (
                ChatStage::Closed,
                options.filter_rejected_message.as_str(),
                "disqualified",
            ),
        };
        self.check_transition(to)?;

        let checked: Vec<&str> = options
            .filter_criteria
            .iter()
            .filter(|c| answers.get(c.criterion))
            .map(|c| c.label.as_str())
            .collect();
        let prompt = if checked.is_empty() {
            "No criteria confirmed".to_string()
        } else {
            checked.join("\n")
        };
        let display = format!(
            "Confirmed {} of {} criteria",
            checked.len(),
            options.filter_criteria.len()
        );
        let message = ChatMessage::exchange(self.session.id, Some(&prompt), response)
            .with_display_prompt(display);
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("submit_qualification", &e).await);
        }

        if let Err(e) = self.deps.store.increment_counter(tally).await {
            warn!(
                session_id = %self.session.id,
                counter = tally,
                error = %e,
                "Failed to bump qualification tally"
            );
        }
        if let Some(recruiter) = self.session.recruiter_mut() {
            recruiter.answers = Some(answers);
        }
        self.record(AnalyticsEvent::recruiter(tally, self.session.id, None));
        Ok(self.advance(to))
    }

    /// RECRUITER_FORM → MEETING_SETUP. Stores the optional attachment, then
    /// the structured submission.
    pub async fn submit_recruiter_form(
        &mut self,
        form: RecruiterInfo,
        attachment: Option<Attachment>,
    ) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::RecruiterForm, "submit_recruiter_form")?;
        let info = RecruiterInfo {
            name: validation::required("name", &form.name)?.to_string(),
            email: validation::email(&form.email)?.to_string(),
            company: validation::required("company", &form.company)?.to_string(),
            job_role: validation::required("job_role", &form.job_role)?.to_string(),
            job_description: form
                .job_description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from),
        };
        if let Some(attachment) = &attachment {
            if !self.session.allow_file_upload {
                return Err(ValidationError::UploadNotAllowed.into());
            }
            validation::attachment_type(&attachment.mime_type)?;
        }
        let to = ChatStage::MeetingSetup;
        self.check_transition(to)?;

        let write_id = self.write_id();
        let attachment_url = match &attachment {
            Some(attachment) => {
                match self.deps.uploads.put(self.session.id, write_id, attachment).await {
                    Ok(url) => Some(url),
                    Err(e) => return Ok(self.apologize("submit_recruiter_form", &e).await),
                }
            }
            None => None,
        };

        let submission = RecruiterSubmission {
            id: write_id,
            session_id: self.session.id,
            info: info.clone(),
            answers: self
                .session
                .recruiter()
                .and_then(|r| r.answers)
                .unwrap_or_default(),
            attachment_url: attachment_url.clone(),
            created_at: now(),
        };
        if let Err(e) = self.deps.store.insert_recruiter_submission(&submission).await {
            return Ok(self.apologize("submit_recruiter_form", &e).await);
        }

        let mut prompt = format!(
            "Name: {}\nEmail: {}\nCompany: {}\nRole: {}",
            info.name, info.email, info.company, info.job_role
        );
        if let Some(description) = &info.job_description {
            prompt.push_str(&format!("\nDescription: {description}"));
        }
        if let Some(attachment) = &attachment {
            prompt.push_str(&format!("\nAttachment: {}", attachment.file_name));
        }
        let message =
            ChatMessage::exchange(self.session.id, Some(&prompt), &self.deps.options.meeting_prompt)
                .with_display_prompt(format!("{} at {}", info.job_role, info.company))
                .multiple_choice(true);
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("submit_recruiter_form", &e).await);
        }

        self.record(AnalyticsEvent::recruiter(
            "form_submitted",
            self.session.id,
            Some(&info.company),
        ));
        if let Some(recruiter) = self.session.recruiter_mut() {
            recruiter.info = Some(info);
            recruiter.attachment_url = attachment_url;
        }
        Ok(self.advance(to))
    }

    /// VISITOR_TOPICS → CONTACT_FORM, TYPING_ENABLED, or back to
    /// VISITOR_TOPICS for an informational answer.
    pub async fn select_topic(&mut self, topic_id: &str) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::VisitorTopics, "select_topic")?;
        let options = Arc::clone(&self.deps.options);
        let topic = options
            .topic(topic_id)
            .ok_or_else(|| ValidationError::UnknownTopic(topic_id.to_string()))?;

        let mut question_count = self.session.question_count;
        let (to, response) = match &topic.kind {
            TopicKind::Contact => (ChatStage::ContactForm, options.contact_prompt.clone()),
            TopicKind::OpenQuestion { prompt } => (ChatStage::TypingEnabled, prompt.clone()),
            TopicKind::Informational { answer } => {
                question_count += 1;
                // This answer spends the last question
                if self.session.questions_remaining() <= 1 {
                    (
                        ChatStage::ContactForm,
                        format!("{answer}\n\n{}", options.contact_prompt),
                    )
                } else {
                    (ChatStage::VisitorTopics, answer.clone())
                }
            }
        };
        self.check_transition(to)?;

        let message = ChatMessage::exchange(self.session.id, Some(&topic.text), &response)
            .multiple_choice(to == ChatStage::VisitorTopics);
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("select_topic", &e).await);
        }

        self.session.question_count = question_count;
        self.record(AnalyticsEvent::chatbot(format!("topic:{}", topic.id), self.session.id));
        Ok(self.advance(to))
    }

    /// TYPING_ENABLED → CONTACT_FORM. The text must be a question.
    pub async fn submit_question(&mut self, text: &str) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::TypingEnabled, "submit_question")?;
        let question = validation::question(text)?;
        let to = ChatStage::ContactForm;
        self.check_transition(to)?;

        let message = ChatMessage::exchange(
            self.session.id,
            Some(question),
            &self.deps.options.question_received_message,
        );
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("submit_question", &e).await);
        }

        self.session.question_count += 1;
        self.record(AnalyticsEvent::chatbot("question_asked", self.session.id));
        Ok(self.advance(to))
    }

    /// CONTACT_FORM → CLOSED. Stores one contact request.
    pub async fn submit_contact(&mut self, form: ContactForm) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::ContactForm, "submit_contact")?;
        let name = validation::required("name", &form.name)?.to_string();
        let email = validation::email(&form.email)?.to_string();
        let text = validation::required("message", &form.message)?.to_string();
        let to = ChatStage::Closed;
        self.check_transition(to)?;

        let request = ContactRequest {
            id: self.write_id(),
            session_id: self.session.id,
            name,
            email,
            message: text,
            created_at: now(),
        };

        if let Err(e) = self.deps.store.insert_contact_request(&request).await {
            return Ok(self.apologize("submit_contact", &e).await);
        }

        let prompt = format!(
            "Name: {}\nEmail: {}\nMessage: {}",
            request.name, request.email, request.message
        );
        let message = ChatMessage::exchange(
            self.session.id,
            Some(&prompt),
            &self.deps.options.contact_received_message,
        )
        .with_display_prompt("Contact details sent");
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("submit_contact", &e).await);
        }

        self.record(AnalyticsEvent::chatbot("contact_submitted", self.session.id));
        Ok(self.advance(to))
    }

    /// MEETING_SETUP → CLOSED. Stores one meeting request.
    pub async fn confirm_meeting(&mut self) -> Result<Step, ChatError> {
        self.expect_stage(ChatStage::MeetingSetup, "confirm_meeting")?;
        let info = self
            .session
            .recruiter()
            .and_then(|r| r.info.clone())
            .ok_or(ChatError::InvalidAction {
                stage: self.session.stage,
                action: "confirm_meeting",
            })?;
        let to = ChatStage::Closed;
        self.check_transition(to)?;

        let request = MeetingRequest {
            id: self.write_id(),
            session_id: self.session.id,
            name: info.name,
            email: info.email,
            company: info.company,
            created_at: now(),
        };
        if let Err(e) = self.deps.store.insert_meeting_request(&request).await {
            return Ok(self.apologize("confirm_meeting", &e).await);
        }

        let message = ChatMessage::exchange(
            self.session.id,
            Some("Request a meeting"),
            &self.deps.options.meeting_confirmed_message,
        );
        if let Err(e) = self.deps.log.append(&message).await {
            return Ok(self.apologize("confirm_meeting", &e).await);
        }

        self.record(AnalyticsEvent::recruiter(
            "meeting_requested",
            self.session.id,
            Some(&request.company),
        ));
        Ok(self.advance(to))
    }

    // ── Internals ───────────────────────────────────────────────────

    fn expect_stage(&self, expected: ChatStage, action: &'static str) -> Result<(), ChatError> {
        let stage = self.session.stage;
        if stage.is_terminal() {
            return Err(ChatError::Closed);
        }
        if stage != expected {
            return Err(ChatError::InvalidAction { stage, action });
        }
        Ok(())
    }

    fn check_transition(&self, to: ChatStage) -> Result<(), ChatError> {
        let from = self.session.stage;
        if !from.can_transition_to(to) {
            return Err(ChatError::InvalidTransition { from, to });
        }
        Ok(())
    }

    /// Id for this stage's collection write. Retries after a failure reuse
    /// it, so the write lands at most once.
    fn write_id(&mut self) -> Uuid {
        *self.session.pending_write.get_or_insert_with(Uuid::new_v4)
    }

    fn advance(&mut self, to: ChatStage) -> Step {
        let from = self.session.stage;
        self.session.stage = to;
        self.session.pending_write = None;
        self.session.touch();
        info!(session_id = %self.session.id, from = %from, to = %to, "Stage transition");
        Step {
            from,
            to,
            write_failed: false,
        }
    }

    /// Log the failure and append the apology. The stage is kept.
    async fn apologize(&mut self, action: &str, cause: &(dyn std::fmt::Display + Sync)) -> Step {
        let stage = self.session.stage;
        warn!(session_id = %self.session.id, stage = %stage, action, error = %cause, "Write failed");

        let apology = ChatMessage::exchange(self.session.id, None, &self.deps.options.apology_message);
        if let Err(e) = self.deps.log.append(&apology).await {
            error!(session_id = %self.session.id, error = %e, "Failed to append apology");
        }
        self.session.touch();
        Step {
            from: stage,
            to: stage,
            write_failed: true,
        }
    }

    fn record(&self, event: AnalyticsEvent) {
        self.deps.events.record(event);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::chat::qualification::{Criterion, evaluate};
    use crate::events::NoopEventSink;
    use crate::ratelimit::DEFAULT_DAILY_LIMIT;
    use crate::test_support::FaultyStore;
    use crate::transcript::model::MessageSource;
    use crate::uploads::LocalObjectStore;

    /// Strict rule that counts how often it was consulted.
    #[derive(Default)]
    pub struct CountingRule {
        pub calls: AtomicUsize,
    }

    impl QualificationRule for CountingRule {
        fn evaluate(&self, answers: &QualificationAnswers) -> Verdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            evaluate(answers)
        }
    }

    pub struct Harness {
        pub deps: ControllerDeps,
        pub store: Arc<FaultyStore>,
        pub rule: Arc<CountingRule>,
        pub uploads: TempDir,
    }

    impl Harness {
        pub async fn new(options: ChatOptions) -> Self {
            let store = Arc::new(FaultyStore::new().await);
            let rule = Arc::new(CountingRule::default());
            let uploads = tempfile::tempdir().unwrap();
            let deps = ControllerDeps {
                log: MessageLog::new(store.clone()),
                store: store.clone(),
                limiter: Arc::new(UsageLimiter::new(store.clone(), DEFAULT_DAILY_LIMIT)),
                rule: rule.clone(),
                uploads: Arc::new(LocalObjectStore::new(uploads.path(), "/uploads")),
                events: Arc::new(NoopEventSink),
                options: Arc::new(options),
            };
            Self {
                deps,
                store,
                rule,
                uploads,
            }
        }

        pub fn controller(&self) -> DialogController {
            DialogController::new(self.deps.clone())
        }

        pub async fn messages(&self, session_id: Uuid) -> Vec<ChatMessage> {
            self.store
                .list_messages(session_id, MessageSource::Dialog)
                .await
                .unwrap()
        }

        /// Files stored for a session, across all its upload objects.
        pub fn stored_files(&self, session_id: Uuid) -> Vec<String> {
            let Ok(objects) = std::fs::read_dir(self.uploads.path().join(session_id.to_string()))
            else {
                return Vec::new();
            };
            objects
                .flat_map(|object| std::fs::read_dir(object.unwrap().path()).unwrap())
                .map(|file| file.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        }
    }

    fn recruiter_form() -> RecruiterInfo {
        RecruiterInfo {
            name: "Dana Levi".into(),
            email: "dana@corp.io".into(),
            company: "Corp".into(),
            job_role: "Senior ML Engineer".into(),
            job_description: Some("  LLM platform team ".into()),
        }
    }

    fn contact_form() -> ContactForm {
        ContactForm {
            name: "Sam".into(),
            email: "sam@example.com".into(),
            message: "Let's talk".into(),
        }
    }

    fn base_answers() -> QualificationAnswers {
        QualificationAnswers {
            location_fit: true,
            seniority_fit: true,
            domain_fit: true,
            tooling_fit: true,
            compelling_offer: false,
        }
    }

    #[tokio::test]
    async fn visitor_end_to_end() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        let sid = c.id();

        let mut stages = vec![c.stage()];
        c.select_role(Role::Visitor).await.unwrap();
        stages.push(c.stage());
        c.submit_email("visitor@example.com").await.unwrap();
        stages.push(c.stage());
        c.select_topic("open_question").await.unwrap();
        stages.push(c.stage());
        c.submit_question("What are you building right now?")
            .await
            .unwrap();
        stages.push(c.stage());

        assert_eq!(
            stages,
            [
                ChatStage::Initial,
                ChatStage::EmailVerification,
                ChatStage::VisitorTopics,
                ChatStage::TypingEnabled,
                ChatStage::ContactForm,
            ]
        );
        assert_eq!(c.session().question_count, 1);

        let usage = h.store.get_usage("visitor@example.com").await.unwrap().unwrap();
        assert_eq!(usage.request_count, 1);
        assert_eq!(h.rule.calls.load(Ordering::SeqCst), 0);

        let step = c.submit_contact(contact_form()).await.unwrap();
        assert_eq!(step.to, ChatStage::Closed);
        assert_eq!(h.messages(sid).await.len(), 5);
        assert_eq!(h.store.count_submissions("contact_requests").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recruiter_end_to_end() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        let sid = c.id();

        c.select_role(Role::Recruiter).await.unwrap();
        assert_eq!(c.stage(), ChatStage::RecruiterFilter);
        assert!(c.session().allow_file_upload);
        assert_eq!(c.session().max_questions, 0);

        c.submit_qualification(base_answers()).await.unwrap();
        assert_eq!(c.stage(), ChatStage::RecruiterForm);

        let attachment = Attachment {
            file_name: "jd.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: b"%PDF".to_vec(),
        };
        c.submit_recruiter_form(recruiter_form(), Some(attachment))
            .await
            .unwrap();
        assert_eq!(c.stage(), ChatStage::MeetingSetup);
        let path = c.session().recruiter().unwrap();
        assert_eq!(
            path.info.as_ref().unwrap().job_description.as_deref(),
            Some("LLM platform team")
        );
        assert!(path.attachment_url.as_deref().unwrap().ends_with("/jd.pdf"));

        c.confirm_meeting().await.unwrap();
        assert_eq!(c.stage(), ChatStage::Closed);

        assert_eq!(h.rule.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.count_submissions("recruiter_submissions").await.unwrap(), 1);
        assert_eq!(h.store.count_submissions("meeting_requests").await.unwrap(), 1);
        assert_eq!(h.messages(sid).await.len(), 4);

        let counters = h.store.get_counters().await.unwrap();
        assert!(counters.iter().any(|c| c.name == "qualified" && c.count == 1));
    }

    #[tokio::test]
    async fn any_missing_base_criterion_rejects() {
        for missing in Criterion::BASE {
            let h = Harness::new(ChatOptions::default()).await;
            let mut c = h.controller();
            c.select_role(Role::Recruiter).await.unwrap();

            let mut answers = base_answers();
            answers.toggle(missing);
            let step = c.submit_qualification(answers).await.unwrap();
            assert_eq!(step.to, ChatStage::Closed, "missing {missing:?}");
        }
    }

    #[tokio::test]
    async fn override_alone_accepts() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Recruiter).await.unwrap();
        let answers = QualificationAnswers {
            compelling_offer: true,
            ..Default::default()
        };
        c.submit_qualification(answers).await.unwrap();
        assert_eq!(c.stage(), ChatStage::RecruiterForm);
    }

    #[tokio::test]
    async fn roles_never_cross_paths() {
        let h = Harness::new(ChatOptions::default()).await;

        let mut recruiter = h.controller();
        recruiter.select_role(Role::Recruiter).await.unwrap();
        assert_ne!(recruiter.stage(), ChatStage::EmailVerification);
        assert!(matches!(
            recruiter.submit_email("a@b.co").await,
            Err(ChatError::InvalidAction { .. })
        ));

        let mut visitor = h.controller();
        visitor.select_role(Role::Visitor).await.unwrap();
        assert_ne!(visitor.stage(), ChatStage::RecruiterFilter);
        assert!(matches!(
            visitor.submit_qualification(base_answers()).await,
            Err(ChatError::InvalidAction { .. })
        ));
    }

    #[tokio::test]
    async fn informational_topics_force_contact_at_quota() {
        let options = ChatOptions {
            visitor_max_questions: 3,
            ..Default::default()
        };
        let h = Harness::new(options).await;
        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();
        c.submit_email("curious@example.com").await.unwrap();

        let first = c.select_topic("experience").await.unwrap();
        let second = c.select_topic("experience").await.unwrap();
        assert_eq!(first.to, ChatStage::VisitorTopics);
        assert_eq!(second.to, ChatStage::VisitorTopics);
        assert_eq!(c.view().questions_remaining, 1);

        let third = c.select_topic("experience").await.unwrap();
        assert_eq!(third.to, ChatStage::ContactForm);
        assert_eq!(c.session().question_count, 3);
    }

    #[tokio::test]
    async fn non_question_is_rejected_without_append() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();
        c.submit_email("asker@example.com").await.unwrap();
        c.select_topic("open_question").await.unwrap();
        let before = h.messages(c.id()).await.len();

        let err = c.submit_question("Tell me about your projects").await;
        assert!(matches!(
            err,
            Err(ChatError::Validation(ValidationError::NotAQuestion))
        ));
        assert_eq!(c.stage(), ChatStage::TypingEnabled);
        assert_eq!(c.session().question_count, 0);
        assert_eq!(h.messages(c.id()).await.len(), before);
    }

    #[tokio::test]
    async fn invalid_email_changes_nothing() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();

        assert!(matches!(
            c.submit_email("not-an-email").await,
            Err(ChatError::Validation(ValidationError::InvalidEmail))
        ));
        assert_eq!(c.stage(), ChatStage::EmailVerification);
        assert!(h.store.get_usage("not-an-email").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_exceeded_closes_session() {
        let h = Harness::new(ChatOptions::default()).await;
        for _ in 0..DEFAULT_DAILY_LIMIT {
            h.deps.limiter.check("busy@example.com").await.unwrap();
        }

        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();
        let step = c.submit_email("busy@example.com").await.unwrap();
        assert_eq!(step.to, ChatStage::Closed);

        let last = h.messages(c.id()).await.pop().unwrap();
        assert_eq!(
            last.response.as_deref(),
            Some(h.deps.options.quota_exceeded_message.as_str())
        );
        assert!(matches!(c.select_topic("contact").await, Err(ChatError::Closed)));
    }

    #[tokio::test]
    async fn failed_write_keeps_stage_and_apologizes() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();
        c.submit_email("writer@example.com").await.unwrap();
        c.select_topic("contact").await.unwrap();
        assert_eq!(c.stage(), ChatStage::ContactForm);

        h.store.fail_submission_writes(true);
        let step = c.submit_contact(contact_form()).await.unwrap();
        assert!(step.write_failed);
        assert_eq!(step.to, ChatStage::ContactForm);
        assert_eq!(c.stage(), ChatStage::ContactForm);

        let last = h.messages(c.id()).await.pop().unwrap();
        assert_eq!(last.response.as_deref(), Some(h.deps.options.apology_message.as_str()));

        h.store.fail_submission_writes(false);
        let step = c.submit_contact(contact_form()).await.unwrap();
        assert_eq!(step.to, ChatStage::Closed);
    }

    #[tokio::test]
    async fn email_retry_counts_usage_once() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();

        h.store.fail_message_writes(true);
        let step = c.submit_email("retry@example.com").await.unwrap();
        assert!(step.write_failed);
        assert_eq!(c.stage(), ChatStage::EmailVerification);

        h.store.fail_message_writes(false);
        let step = c.submit_email(" Retry@Example.com ").await.unwrap();
        assert_eq!(step.to, ChatStage::VisitorTopics);

        let usage = h.store.get_usage("retry@example.com").await.unwrap().unwrap();
        assert_eq!(usage.request_count, 1);
    }

    #[tokio::test]
    async fn email_retry_with_other_address_checks_it() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();

        h.store.fail_message_writes(true);
        c.submit_email("first@example.com").await.unwrap();
        h.store.fail_message_writes(false);
        c.submit_email("second@example.com").await.unwrap();

        let second = h.store.get_usage("second@example.com").await.unwrap().unwrap();
        assert_eq!(second.request_count, 1);
        assert_eq!(c.session().visitor().unwrap().email.as_deref(), Some("second@example.com"));
    }

    #[tokio::test]
    async fn contact_retry_after_failed_append_stores_one_row() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Visitor).await.unwrap();
        c.submit_email("sam@example.com").await.unwrap();
        c.select_topic("contact").await.unwrap();

        h.store.fail_message_writes(true);
        let step = c.submit_contact(contact_form()).await.unwrap();
        assert!(step.write_failed);
        assert_eq!(c.stage(), ChatStage::ContactForm);
        assert_eq!(h.store.count_submissions("contact_requests").await.unwrap(), 1);

        h.store.fail_message_writes(false);
        let step = c.submit_contact(contact_form()).await.unwrap();
        assert_eq!(step.to, ChatStage::Closed);
        assert_eq!(h.store.count_submissions("contact_requests").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recruiter_form_retry_stores_one_row_and_one_file() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        let sid = c.id();
        c.select_role(Role::Recruiter).await.unwrap();
        c.submit_qualification(base_answers()).await.unwrap();

        let attachment = |name: &str| Attachment {
            file_name: name.into(),
            mime_type: "application/pdf".into(),
            bytes: b"%PDF".to_vec(),
        };
        h.store.fail_message_writes(true);
        let step = c
            .submit_recruiter_form(recruiter_form(), Some(attachment("draft.pdf")))
            .await
            .unwrap();
        assert!(step.write_failed);
        assert_eq!(c.stage(), ChatStage::RecruiterForm);

        h.store.fail_message_writes(false);
        c.submit_recruiter_form(recruiter_form(), Some(attachment("final.pdf")))
            .await
            .unwrap();
        assert_eq!(c.stage(), ChatStage::MeetingSetup);
        assert_eq!(h.store.count_submissions("recruiter_submissions").await.unwrap(), 1);
        assert_eq!(h.stored_files(sid), ["final.pdf"]);
    }

    #[tokio::test]
    async fn meeting_retry_after_failed_append_stores_one_row() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Recruiter).await.unwrap();
        c.submit_qualification(base_answers()).await.unwrap();
        c.submit_recruiter_form(recruiter_form(), None).await.unwrap();

        h.store.fail_message_writes(true);
        assert!(c.confirm_meeting().await.unwrap().write_failed);
        h.store.fail_message_writes(false);
        c.confirm_meeting().await.unwrap();

        assert_eq!(c.stage(), ChatStage::Closed);
        assert_eq!(h.store.count_submissions("meeting_requests").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_append_keeps_stage_for_message_only_steps() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();

        h.store.fail_message_writes(true);
        assert!(c.select_role(Role::Visitor).await.unwrap().write_failed);
        assert_eq!(c.stage(), ChatStage::Initial);
        h.store.fail_message_writes(false);
        c.select_role(Role::Visitor).await.unwrap();
        c.submit_email("steps@example.com").await.unwrap();

        h.store.fail_message_writes(true);
        assert!(c.select_topic("experience").await.unwrap().write_failed);
        assert_eq!(c.session().question_count, 0);
        h.store.fail_message_writes(false);
        c.select_topic("open_question").await.unwrap();

        h.store.fail_message_writes(true);
        assert!(c.submit_question("Still there?").await.unwrap().write_failed);
        assert_eq!(c.stage(), ChatStage::TypingEnabled);
        assert_eq!(c.session().question_count, 0);
        h.store.fail_message_writes(false);
        c.submit_question("Still there?").await.unwrap();
        assert_eq!(c.session().question_count, 1);

        let mut recruiter = h.controller();
        recruiter.select_role(Role::Recruiter).await.unwrap();
        h.store.fail_message_writes(true);
        assert!(recruiter.submit_qualification(base_answers()).await.unwrap().write_failed);
        assert_eq!(recruiter.stage(), ChatStage::RecruiterFilter);
        assert_eq!(h.rule.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_future_is_send() {
        fn assert_send<T: Send>(value: T) -> T {
            value
        }
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        // Handlers run inside spawned axum tasks
        assert_send(c.dispatch(DialogAction::SelectRole { role: Role::Visitor }))
            .await
            .unwrap();
        h.store.fail_message_writes(true);
        let step = assert_send(c.dispatch(DialogAction::SubmitEmail {
            email: "send@example.com".into(),
        }))
        .await
        .unwrap();
        assert!(step.write_failed);
    }

    #[tokio::test]
    async fn unsupported_attachment_is_rejected() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Recruiter).await.unwrap();
        c.submit_qualification(base_answers()).await.unwrap();

        let attachment = Attachment {
            file_name: "photo.png".into(),
            mime_type: "image/png".into(),
            bytes: vec![0x89],
        };
        let err = c.submit_recruiter_form(recruiter_form(), Some(attachment)).await;
        assert!(matches!(
            err,
            Err(ChatError::Validation(ValidationError::UnsupportedFileType { .. }))
        ));
        assert_eq!(c.stage(), ChatStage::RecruiterForm);
        assert_eq!(h.store.count_submissions("recruiter_submissions").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recruiter_form_requires_fields() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        c.select_role(Role::Recruiter).await.unwrap();
        c.submit_qualification(base_answers()).await.unwrap();

        let form = RecruiterInfo {
            company: "   ".into(),
            ..recruiter_form()
        };
        assert!(matches!(
            c.submit_recruiter_form(form, None).await,
            Err(ChatError::Validation(ValidationError::Required { field: "company" }))
        ));
    }

    #[tokio::test]
    async fn dispatch_routes_tagged_actions() {
        let h = Harness::new(ChatOptions::default()).await;
        let mut c = h.controller();
        let action: DialogAction =
            serde_json::from_str(r#"{"action":"select_role","role":"visitor"}"#).unwrap();
        assert_eq!(action.name(), "select_role");
        c.dispatch(action).await.unwrap();

        let action: DialogAction =
            serde_json::from_str(r#"{"action":"submit_email","email":"d@x.io"}"#).unwrap();
        c.dispatch(action).await.unwrap();
        assert_eq!(c.stage(), ChatStage::VisitorTopics);

        let view = c.view();
        assert_eq!(view.choices.len(), 3);
        assert!(!view.accepts_free_text);
    }

    #[test]
    fn contact_action_is_flat() {
        let action: DialogAction = serde_json::from_str(
            r#"{"action":"submit_contact","name":"A","email":"a@b.co","message":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(action, DialogAction::SubmitContact(ref f) if f.name == "A"));
    }
}
