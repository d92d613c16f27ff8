//! Company/role preparation context.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::interview::Subject;
use crate::llm::Provider;

/// One stage of a hiring loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewRound {
    pub name: String,
    pub focus: String,
}

/// What a candidate should expect from a company's interview for a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub subject: Subject,
    pub faq: Vec<String>,
    pub rounds: Vec<InterviewRound>,
    pub required_skills: Vec<String>,
    pub evaluation_criteria: Vec<String>,
    /// StaticFallback means every field above came from the knowledge store.
    pub source: Provider,
    pub fetched_at: DateTime<Utc>,
}

impl ResearchContext {
    pub fn is_fallback(&self) -> bool {
        self.source.is_fallback()
    }

    /// Whether the context is younger than `window` at `now`.
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) < window
    }

    /// Compact text block for inclusion in prompts.
    pub fn prompt_summary(&self) -> String {
        let rounds = self
            .rounds
            .iter()
            .map(|r| format!("{} ({})", r.name, r.focus))
            .collect::<Vec<_>>()
            .join("; ");
        format!(
            "Interview rounds: {rounds}\nRequired skills: {}\nEvaluation criteria: {}",
            self.required_skills.join(", "),
            self.evaluation_criteria.join(", ")
        )
    }
}
