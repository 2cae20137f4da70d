//! Recruiter qualification checklist and the rule that admits or rejects it.

use serde::{Deserialize, Serialize};

/// Answers to the recruiter checklist.
///
/// `compelling_offer` is a bypass: when set, the four base criteria are
/// ignored by the strict rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationAnswers {
    pub location_fit: bool,
    pub seniority_fit: bool,
    pub domain_fit: bool,
    pub tooling_fit: bool,
    pub compelling_offer: bool,
}

/// One checkbox of the checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    LocationFit,
    SeniorityFit,
    DomainFit,
    ToolingFit,
    CompellingOffer,
}

impl Criterion {
    pub const BASE: [Criterion; 4] = [
        Criterion::LocationFit,
        Criterion::SeniorityFit,
        Criterion::DomainFit,
        Criterion::ToolingFit,
    ];
}

impl QualificationAnswers {
    /// Answers with every box ticked.
    pub fn all() -> Self {
        Self {
            location_fit: true,
            seniority_fit: true,
            domain_fit: true,
            tooling_fit: true,
            compelling_offer: true,
        }
    }

    pub fn get(&self, criterion: Criterion) -> bool {
        match criterion {
            Criterion::LocationFit => self.location_fit,
            Criterion::SeniorityFit => self.seniority_fit,
            Criterion::DomainFit => self.domain_fit,
            Criterion::ToolingFit => self.tooling_fit,
            Criterion::CompellingOffer => self.compelling_offer,
        }
    }

    fn set(&mut self, criterion: Criterion, value: bool) {
        match criterion {
            Criterion::LocationFit => self.location_fit = value,
            Criterion::SeniorityFit => self.seniority_fit = value,
            Criterion::DomainFit => self.domain_fit = value,
            Criterion::ToolingFit => self.tooling_fit = value,
            Criterion::CompellingOffer => self.compelling_offer = value,
        }
    }

    /// Toggle a checkbox the way the checklist UI does.
    ///
    /// Ticking the override ticks everything; unticking it clears everything.
    /// Touching a base criterion while the override is ticked clears the
    /// override.
    pub fn toggle(&mut self, criterion: Criterion) {
        if criterion == Criterion::CompellingOffer {
            *self = if self.compelling_offer {
                Self::default()
            } else {
                Self::all()
            };
            return;
        }
        let current = self.get(criterion);
        self.set(criterion, !current);
        self.compelling_offer = false;
    }

    /// Whether all four base criteria hold.
    pub fn base_criteria_met(&self) -> bool {
        Criterion::BASE.iter().all(|c| self.get(*c))
    }
}

/// Outcome of evaluating a checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Reject,
}

/// Rule deciding whether a recruiter may proceed to the structured form.
pub trait QualificationRule: Send + Sync {
    fn evaluate(&self, answers: &QualificationAnswers) -> Verdict;
}

/// Strict conjunction of the four base criteria, with the override as a full
/// bypass. No partial credit.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictRule;

impl QualificationRule for StrictRule {
    fn evaluate(&self, answers: &QualificationAnswers) -> Verdict {
        evaluate(answers)
    }
}

pub fn evaluate(answers: &QualificationAnswers) -> Verdict {
    if answers.compelling_offer || answers.base_criteria_met() {
        Verdict::Accept
    } else {
        Verdict::Reject
    }
}
