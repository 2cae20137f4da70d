//! Menu texts, topics, and canned replies shown by the screening dialog.

use serde::{Deserialize, Serialize};

use super::qualification::Criterion;
use super::session::Role;
use super::stage::ChatStage;

/// A clickable choice rendered by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub text: String,
}

/// What happens when a visitor picks a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopicKind {
    /// Opens the free-text input. `prompt` is shown as the reply.
    OpenQuestion { prompt: String },
    /// Answered immediately with a canned reply. Counts against the quota.
    Informational { answer: String },
    /// Jumps to the contact form.
    Contact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: TopicKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub criterion: Criterion,
    pub label: String,
}

/// All static conversation content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOptions {
    pub recruiter_choice: String,
    pub visitor_choice: String,
    pub visitor_max_questions: u32,
    pub filter_message: String,
    pub filter_criteria: Vec<FilterCriterion>,
    pub topics: Vec<Topic>,
    pub email_prompt: String,
    pub topics_prompt: String,
    pub quota_exceeded_message: String,
    pub filter_rejected_message: String,
    pub recruiter_form_prompt: String,
    pub meeting_prompt: String,
    pub meeting_confirmed_message: String,
    pub question_received_message: String,
    pub contact_prompt: String,
    pub contact_received_message: String,
    pub apology_message: String,
}

pub const RECRUITER_CHOICE_ID: &str = "recruiter";
pub const VISITOR_CHOICE_ID: &str = "visitor";

impl Default for ChatOptions {
    fn default() -> Self {
        let owner = "Avner";
        Self {
            recruiter_choice: "I'm a recruiter with a job opportunity".to_string(),
            visitor_choice: format!("I'd like to learn more about {owner}"),
            visitor_max_questions: 1,
            filter_message: DEFAULT_FILTER_MESSAGE.to_string(),
            filter_criteria: vec![
                FilterCriterion {
                    criterion: Criterion::LocationFit,
                    label: "Position is based in Israel (Tel Aviv area)".to_string(),
                },
                FilterCriterion {
                    criterion: Criterion::SeniorityFit,
                    label: "(Senior) Data Scientist/ML Engineer role".to_string(),
                },
                FilterCriterion {
                    criterion: Criterion::DomainFit,
                    label: "Core focus on ML/AI implementation".to_string(),
                },
                FilterCriterion {
                    criterion: Criterion::ToolingFit,
                    label: "Includes cloud platforms (AWS/GCP)".to_string(),
                },
                FilterCriterion {
                    criterion: Criterion::CompellingOffer,
                    label: "I do not meet all criteria but have a compelling opportunity"
                        .to_string(),
                },
            ],
            topics: vec![
                Topic {
                    id: "open_question".to_string(),
                    text: format!("Ask me anything about {owner}"),
                    kind: TopicKind::OpenQuestion {
                        prompt: format!(
                            "Feel free to ask any question about {owner}'s experience, skills, or projects."
                        ),
                    },
                },
                Topic {
                    id: "experience".to_string(),
                    text: format!("What does {owner} work on?"),
                    kind: TopicKind::Informational {
                        answer: format!(
                            "{owner} builds production ML and generative AI systems on AWS and GCP, \
                             mostly for FinTech and enterprise AI products. The Experience and \
                             Projects sections of this site list the details."
                        ),
                    },
                },
                Topic {
                    id: "contact".to_string(),
                    text: "I'd like to get in touch".to_string(),
                    kind: TopicKind::Contact,
                },
            ],
            email_prompt: "Before we start, please enter your email address.".to_string(),
            topics_prompt: "Thanks! What would you like to know?".to_string(),
            quota_exceeded_message: "You have reached the daily limit of conversations for this \
                                     email. Please come back tomorrow."
                .to_string(),
            filter_rejected_message: format!(
                "Thank you for reaching out. Unfortunately this opportunity does not match what \
                 {owner} is looking for right now. Best of luck with your search!"
            ),
            recruiter_form_prompt: "Great, thanks for confirming! Please share your details and \
                                    the role you are hiring for. You can attach a job description \
                                    (PDF, DOC or DOCX)."
                .to_string(),
            meeting_prompt: format!(
                "Thanks! {owner} will review the opportunity. Would you like to request a meeting?"
            ),
            meeting_confirmed_message: format!(
                "Meeting request sent. {owner} will get back to you by email to schedule a time."
            ),
            question_received_message: format!(
                "Thanks for your question! {owner} will get back to you. Leave your details so \
                 you can be reached."
            ),
            contact_prompt: "Please leave your name, email and a short message.".to_string(),
            contact_received_message: format!(
                "Thank you! Your message was sent and {owner} will be in touch soon."
            ),
            apology_message: "Sorry, something went wrong on our side. Please try again."
                .to_string(),
        }
    }
}

const DEFAULT_FILTER_MESSAGE: &str = "Thank you for your interest in connecting! To ensure we \
both make the best use of our time, please confirm that your opportunity meets the following \
criteria:

### Essential Requirements
* Location: Israel-based position (Tel Aviv area big plus)
* Role: (Senior) Data Scientist/ML Engineer position
* Domain: Preferably FinTech, or Enterprise AI solutions

### Technical Focus
* Core focus on ML/AI/Generative AI implementation
* Cloud platforms (AWS/GCP)
* Big Data tools and Python
* Exposure to Large Language Models is a plus

Please confirm these criteria before proceeding:";

impl ChatOptions {
    pub fn topic(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    pub fn role_choice_text(&self, role: Role) -> &str {
        match role {
            Role::Recruiter => &self.recruiter_choice,
            Role::Visitor => &self.visitor_choice,
        }
    }

    /// Choices to render for a stage. Empty for form and terminal stages.
    pub fn choices_for(&self, stage: ChatStage) -> Vec<Choice> {
        match stage {
            ChatStage::Initial => vec![
                Choice {
                    id: RECRUITER_CHOICE_ID.to_string(),
                    text: self.recruiter_choice.clone(),
                },
                Choice {
                    id: VISITOR_CHOICE_ID.to_string(),
                    text: self.visitor_choice.clone(),
                },
            ],
            ChatStage::VisitorTopics => self
                .topics
                .iter()
                .map(|t| Choice {
                    id: t.id.clone(),
                    text: t.text.clone(),
                })
                .collect(),
            ChatStage::RecruiterFilter => self
                .filter_criteria
                .iter()
                .map(|c| Choice {
                    id: serde_json::to_value(c.criterion)
                        .ok()
                        .and_then(|v| v.as_str().map(String::from))
                        .unwrap_or_default(),
                    text: c.label.clone(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topics_cover_every_kind() {
        let options = ChatOptions::default();
        assert!(matches!(
            options.topic("open_question").map(|t| &t.kind),
            Some(TopicKind::OpenQuestion { .. })
        ));
        assert!(matches!(
            options.topic("experience").map(|t| &t.kind),
            Some(TopicKind::Informational { .. })
        ));
        assert_eq!(options.topic("contact").map(|t| &t.kind), Some(&TopicKind::Contact));
        assert!(options.topic("weather").is_none());
    }

    #[test]
    fn open_question_prompt_matches_site_copy() {
        let options = ChatOptions::default();
        match &options.topic("open_question").unwrap().kind {
            TopicKind::OpenQuestion { prompt } => assert!(prompt.starts_with("Feel free to ask")),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn choices_per_stage() {
        let options = ChatOptions::default();
        let initial = options.choices_for(ChatStage::Initial);
        assert_eq!(initial.len(), 2);
        assert_eq!(initial[0].id, "recruiter");
        assert_eq!(initial[1].id, "visitor");

        let filter = options.choices_for(ChatStage::RecruiterFilter);
        assert_eq!(filter.len(), 5);
        assert_eq!(filter[4].id, "compelling_offer");

        assert_eq!(options.choices_for(ChatStage::VisitorTopics).len(), 3);
        assert!(options.choices_for(ChatStage::ContactForm).is_empty());
        assert!(options.choices_for(ChatStage::Closed).is_empty());
    }

    #[test]
    fn filter_lists_every_criterion_once() {
        let options = ChatOptions::default();
        let listed: Vec<_> = options.filter_criteria.iter().map(|c| c.criterion).collect();
        assert_eq!(listed.len(), 5);
        for criterion in Criterion::BASE {
            assert!(listed.contains(&criterion));
        }
        assert_eq!(listed.last(), Some(&Criterion::CompellingOffer));
    }

    #[test]
    fn topic_serializes_flat() {
        let topic = ChatOptions::default().topic("contact").unwrap().clone();
        let json = serde_json::to_value(&topic).unwrap();
        assert_eq!(json["kind"], "contact");
        assert_eq!(json["id"], "contact");
    }
}
