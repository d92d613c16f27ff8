//! Interview sessions, turns and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::evaluation::{EvaluationResult, Readiness};
use crate::interview::difficulty::Difficulty;
use crate::interview::state::TurnPhase;
use crate::llm::Provider;

/// Company and role being interviewed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub company: String,
    pub role: String,
}

impl Subject {
    pub fn new(company: &str, role: &str) -> Result<Self, ValidationError> {
        let company = company.trim();
        let role = role.trim();
        if company.is_empty() {
            return Err(ValidationError::BlankField("company"));
        }
        if role.is_empty() {
            return Err(ValidationError::BlankField("role"));
        }
        Ok(Self {
            company: company.to_string(),
            role: role.to_string(),
        })
    }

    /// Case- and whitespace-insensitive cache key.
    pub fn key(&self) -> String {
        format!("{}::{}", normalize(&self.company), normalize(&self.role))
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A question put to the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    /// Topic tag used for coverage tracking.
    pub category: String,
    /// Topics a strong answer should touch on.
    pub expected_topics: Vec<String>,
    pub difficulty: Difficulty,
    pub source: Provider,
}

/// One question + answer + evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTurn {
    pub id: Uuid,
    /// 1-based position in the session.
    pub number: u32,
    pub question: Question,
    pub answer: Option<String>,
    pub evaluation: Option<EvaluationResult>,
    pub asked_at: DateTime<Utc>,
}

impl QuestionTurn {
    pub fn new(number: u32, question: Question) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            question,
            answer: None,
            evaluation: None,
            asked_at: Utc::now(),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.evaluation.is_some()
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finalized,
    Abandoned,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Finalized => "finalized",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// Session-level outcome computed at finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub user_id: String,
    pub subject: Subject,
    pub questions_answered: u32,
    /// Mean of the turn aggregates (0 when nothing was answered).
    pub mean_score: f64,
    /// Readiness thresholds applied to `mean_score`.
    pub readiness: Readiness,
    pub final_difficulty: Difficulty,
    /// Difficulty of each asked question, in order.
    pub difficulty_trail: Vec<Difficulty>,
    pub topics_covered: Vec<String>,
    pub topics_missed: Vec<String>,
    /// Turns scored by the heuristic fallback.
    pub degraded_turns: u32,
    pub finalized_at: DateTime<Utc>,
}

/// An interview in progress or finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: Uuid,
    pub user_id: String,
    pub subject: Subject,
    /// Difficulty for the next question.
    pub difficulty: Difficulty,
    pub turns: Vec<QuestionTurn>,
    pub status: SessionStatus,
    pub phase: TurnPhase,
    /// Mean aggregate over scored turns so far.
    pub running_score: f64,
    pub max_questions: u32,
    pub summary: Option<SessionSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(
        user_id: impl Into<String>,
        subject: Subject,
        difficulty: Difficulty,
        max_questions: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            subject,
            difficulty,
            turns: Vec::new(),
            status: SessionStatus::Active,
            phase: TurnPhase::AwaitingQuestion,
            running_score: 0.0,
            max_questions,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`, keeping `status` in step with terminal phases.
    pub fn transition_to(&mut self, target: TurnPhase) -> Result<(), ValidationError> {
        if !self.phase.can_transition_to(target) {
            return Err(ValidationError::InvalidPhase {
                id: self.id,
                phase: self.phase.to_string(),
                action: format!("move to {target}"),
            });
        }
        self.phase = target;
        self.status = match target {
            TurnPhase::Finalized => SessionStatus::Finalized,
            TurnPhase::Abandoned => SessionStatus::Abandoned,
            _ => SessionStatus::Active,
        };
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn ensure_active(&self) -> Result<(), ValidationError> {
        if self.status == SessionStatus::Active {
            Ok(())
        } else {
            Err(ValidationError::SessionNotActive {
                id: self.id,
                status: self.status.to_string(),
            })
        }
    }

    /// The turn waiting for an answer, if any.
    pub fn pending_turn(&self) -> Option<&QuestionTurn> {
        self.turns.last().filter(|t| t.answer.is_none())
    }

    pub fn scored_turns(&self) -> impl Iterator<Item = &QuestionTurn> {
        self.turns.iter().filter(|t| t.is_scored())
    }

    pub fn answered_count(&self) -> u32 {
        self.scored_turns().count() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.answered_count() >= self.max_questions
    }

    /// Categories already asked about, lowercased.
    pub fn covered_categories(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for turn in &self.turns {
            let category = turn.question.category.to_lowercase();
            if !seen.contains(&category) {
                seen.push(category);
            }
        }
        seen
    }

    pub fn asked_texts(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.question.text.as_str()).collect()
    }

    /// Recompute the running score from scored turns.
    pub fn refresh_running_score(&mut self) {
        let (sum, n) = self
            .scored_turns()
            .filter_map(|t| t.evaluation.as_ref())
            .fold((0.0, 0u32), |(sum, n), e| (sum + e.aggregate, n + 1));
        self.running_score = if n == 0 { 0.0 } else { sum / f64::from(n) };
    }
}
