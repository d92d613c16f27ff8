//! Static question banks and generic research used when the model is unavailable.
//!
//! Everything here is deterministic: the same store state and the same inputs
//! always produce the same question or context. It is the last line of
//! defence when the model gateway cannot produce usable content.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::interview::{Difficulty, Question, Subject};
use crate::llm::Provider;
use crate::research::{InterviewRound, ResearchContext};

const BUILTIN: &str = include_str!("builtin.json");

/// A question in a static bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankQuestion {
    pub difficulty: Difficulty,
    pub category: String,
    pub text: String,
    #[serde(default)]
    pub expected_topics: Vec<String>,
}

/// Generic research for a role family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleResearch {
    pub faq: Vec<String>,
    pub rounds: Vec<InterviewRound>,
    pub required_skills: Vec<String>,
    pub evaluation_criteria: Vec<String>,
}

/// Questions and research for one family of roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBank {
    pub family: String,
    /// Words or phrases in a role title that select this bank.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub research: RoleResearch,
    pub questions: Vec<BankQuestion>,
}

impl RoleBank {
    /// Number of keywords found in the normalized, space-padded role title.
    fn match_score(&self, padded_role: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| padded_role.contains(&format!(" {} ", k.to_lowercase())))
            .count()
    }

    /// First question at `difficulty` whose text has not been asked,
    /// preferring categories not yet covered.
    fn pick(
        &self,
        difficulty: Difficulty,
        asked: &[&str],
        covered: &[String],
    ) -> Option<&BankQuestion> {
        let unused: Vec<&BankQuestion> = self
            .questions
            .iter()
            .filter(|q| q.difficulty == difficulty)
            .filter(|q| !asked.iter().any(|a| a.eq_ignore_ascii_case(&q.text)))
            .collect();
        unused
            .iter()
            .find(|q| !covered.contains(&q.category.to_lowercase()))
            .or_else(|| unused.first())
            .copied()
    }
}

/// On-disk format of a knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeData {
    pub roles: Vec<RoleBank>,
    pub generic: RoleBank,
}

/// Read-only fallback content.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    data: KnowledgeData,
}

impl KnowledgeStore {
    pub fn new(data: KnowledgeData) -> Result<Self, ConfigError> {
        if data.generic.questions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "knowledge.generic".to_string(),
                message: "generic bank must contain at least one question".to_string(),
            });
        }
        Ok(Self { data })
    }

    /// The bundled banks.
    pub fn builtin() -> Result<Self, ConfigError> {
        let data: KnowledgeData = serde_json::from_str(BUILTIN)
            .map_err(|e| ConfigError::ParseError(format!("builtin knowledge: {e}")))?;
        Self::new(data)
    }

    /// Load banks from a JSON file with the same layout as the bundled ones.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let data: KnowledgeData = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        let store = Self::new(data)?;
        info!(
            path = %path.display(),
            families = store.data.roles.len(),
            "Loaded knowledge store"
        );
        Ok(store)
    }

    /// Bank for a role title; the generic bank when nothing matches.
    pub fn bank_for_role(&self, role: &str) -> &RoleBank {
        let padded = format!(
            " {} ",
            role.to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let mut best: Option<(&RoleBank, usize)> = None;
        for bank in &self.data.roles {
            let score = bank.match_score(&padded);
            if score > 0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((bank, score));
            }
        }
        best.map(|(bank, _)| bank).unwrap_or(&self.data.generic)
    }

    /// An unused question for `role` near `difficulty`.
    ///
    /// Search order: the role's bank at the requested level, then at
    /// neighbouring levels (closest first, easier before harder), then the
    /// generic bank in the same order. `None` only when every bank is spent.
    pub fn fallback_question(
        &self,
        role: &str,
        difficulty: Difficulty,
        asked: &[&str],
        covered: &[String],
    ) -> Option<Question> {
        let role_bank = self.bank_for_role(role);
        let mut banks = vec![role_bank];
        if role_bank.family != self.data.generic.family {
            banks.push(&self.data.generic);
        }

        let levels = search_levels(difficulty);
        let picked = banks
            .iter()
            .flat_map(|bank| levels.iter().map(move |level| (*bank, *level)))
            .find_map(|(bank, level)| bank.pick(level, asked, covered).map(|q| (bank, q)));

        picked.map(|(bank, q)| {
            debug!(
                family = %bank.family,
                category = %q.category,
                "Serving question from knowledge store"
            );
            Question {
                text: q.text.clone(),
                category: q.category.clone(),
                expected_topics: q.expected_topics.clone(),
                difficulty,
                source: Provider::StaticFallback,
            }
        })
    }

    /// Research context built only from the bank for `subject.role`.
    pub fn fallback_research(&self, subject: &Subject) -> ResearchContext {
        let research = &self.bank_for_role(&subject.role).research;
        ResearchContext {
            subject: subject.clone(),
            faq: research.faq.clone(),
            rounds: research.rounds.clone(),
            required_skills: research.required_skills.clone(),
            evaluation_criteria: research.evaluation_criteria.clone(),
            source: Provider::StaticFallback,
            fetched_at: Utc::now(),
        }
    }
}

/// Requested level first, then by distance; easier wins ties.
fn search_levels(difficulty: Difficulty) -> Vec<Difficulty> {
    let mut levels = Difficulty::ALL.to_vec();
    levels.sort_by_key(|d| (d.level().abs_diff(difficulty.level()), d.level()));
    levels
}
