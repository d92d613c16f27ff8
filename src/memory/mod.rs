//! Memory aggregator: folds evaluations into a user's long-lived profile.
//!
//! Updates are additive. Applying the same evaluation twice records its
//! evidence twice, and nothing is ever removed from the history.

pub mod profile;

pub use profile::{MemoryProfile, Signal, Strength, TopicClass, TopicHistory, Weakness};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::evaluation::{DimensionScores, EvaluationResult};

/// Thresholds turning dimension scores into signals, and signals into labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPolicy {
    /// Every dimension at or above this is a strong signal for covered topics.
    pub strong_at: f64,
    /// Every dimension at or below this is a weak signal for covered topics.
    pub weak_at: f64,
    /// Consecutive same-direction signals needed to classify a topic.
    pub streak: u32,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            strong_at: 7.0,
            weak_at: 4.0,
            streak: 2,
        }
    }
}

impl MemoryPolicy {
    /// A single weak dimension is enough to keep a topic out of the strong
    /// bucket, and a single decent one keeps it out of the weak bucket.
    pub fn signal(&self, scores: &DimensionScores) -> Signal {
        if scores.min() >= self.strong_at {
            Signal::Strong
        } else if scores.max() <= self.weak_at {
            Signal::Weak
        } else {
            Signal::Neutral
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streak == 0 || !(self.weak_at < self.strong_at) {
            return Err(ConfigError::InvalidValue {
                key: "memory".to_string(),
                message: format!(
                    "need weak_at < strong_at and streak >= 1 (got {}, {}, {})",
                    self.weak_at, self.strong_at, self.streak
                ),
            });
        }
        Ok(())
    }
}

/// Applies evaluations to profiles.
#[derive(Debug, Clone, Default)]
pub struct MemoryAggregator {
    policy: MemoryPolicy,
}

impl MemoryAggregator {
    pub fn new(policy: MemoryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MemoryPolicy {
        &self.policy
    }

    /// Fold one evaluation into `profile`.
    ///
    /// Covered topics get the signal of the evaluation's dimension scores;
    /// missed topics always get a weak signal.
    pub fn update_profile(
        &self,
        mut profile: MemoryProfile,
        evaluation: &EvaluationResult,
        topics_covered: &[String],
        topics_missed: &[String],
    ) -> MemoryProfile {
        let now = Utc::now();
        let covered_signal = self.policy.signal(&evaluation.scores);

        let signals = normalize(topics_covered)
            .into_iter()
            .map(|t| (t, covered_signal, true))
            .chain(normalize(topics_missed).into_iter().map(|t| (t, Signal::Weak, false)));

        for (topic, signal, covered) in signals {
            if covered {
                profile.covered_topics.insert(topic.clone());
            } else {
                profile.missed_topics.insert(topic.clone());
            }

            let history = profile
                .history
                .entry(topic.clone())
                .or_insert_with(|| TopicHistory::new(now));
            history.record(signal, now);
            if history.strong_streak >= self.policy.streak {
                history.classification = TopicClass::Strength;
            } else if history.weak_streak >= self.policy.streak {
                history.classification = TopicClass::Weakness;
            }
            debug!(
                user_id = %profile.user_id,
                topic = %topic,
                signal = ?signal,
                class = ?history.classification,
                "Topic signal recorded"
            );
            profile.sync_lists(&topic);
        }

        profile.updated_at = now;
        profile
    }
}

/// Lowercased, trimmed, de-duplicated topics in first-seen order.
fn normalize(topics: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for topic in topics {
        let topic = topic.trim().to_lowercase();
        if !topic.is_empty() && !out.contains(&topic) {
            out.push(topic);
        }
    }
    out
}
