//! Long-lived per-user learning profile.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A topic the user reliably answers well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strength {
    pub topic: String,
    /// Strong signals recorded for the topic.
    pub evidence_count: u32,
}

/// A topic the user reliably struggles with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weakness {
    pub topic: String,
    /// Weak signals recorded for the topic.
    pub evidence_count: u32,
    pub last_seen: DateTime<Utc>,
}

/// Outcome of one evaluation for one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Strong,
    Weak,
    Neutral,
}

/// Current label of a topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicClass {
    #[default]
    Unclassified,
    Strength,
    Weakness,
}

/// Running evidence for one topic. Never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHistory {
    pub strong_streak: u32,
    pub weak_streak: u32,
    pub strong_total: u32,
    pub weak_total: u32,
    pub neutral_total: u32,
    pub classification: TopicClass,
    pub last_seen: DateTime<Utc>,
}

impl TopicHistory {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            strong_streak: 0,
            weak_streak: 0,
            strong_total: 0,
            weak_total: 0,
            neutral_total: 0,
            classification: TopicClass::Unclassified,
            last_seen: now,
        }
    }

    /// Record a signal. Neutral resets both streaks.
    pub fn record(&mut self, signal: Signal, now: DateTime<Utc>) {
        match signal {
            Signal::Strong => {
                self.strong_streak += 1;
                self.weak_streak = 0;
                self.strong_total += 1;
            }
            Signal::Weak => {
                self.weak_streak += 1;
                self.strong_streak = 0;
                self.weak_total += 1;
            }
            Signal::Neutral => {
                self.strong_streak = 0;
                self.weak_streak = 0;
                self.neutral_total += 1;
            }
        }
        self.last_seen = now;
    }
}

/// What the engine remembers about a user across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryProfile {
    pub user_id: String,
    pub strengths: Vec<Strength>,
    pub weaknesses: Vec<Weakness>,
    pub covered_topics: BTreeSet<String>,
    pub missed_topics: BTreeSet<String>,
    pub history: BTreeMap<String, TopicHistory>,
    pub sessions_completed: u32,
    pub updated_at: DateTime<Utc>,
}

impl MemoryProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            covered_topics: BTreeSet::new(),
            missed_topics: BTreeSet::new(),
            history: BTreeMap::new(),
            sessions_completed: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn strength(&self, topic: &str) -> Option<&Strength> {
        self.strengths.iter().find(|s| s.topic == topic)
    }

    pub fn weakness(&self, topic: &str) -> Option<&Weakness> {
        self.weaknesses.iter().find(|w| w.topic == topic)
    }

    pub fn record_session(&mut self) {
        self.sessions_completed += 1;
        self.updated_at = Utc::now();
    }

    /// Bring the strength/weakness lists in line with `topic`'s history.
    pub(crate) fn sync_lists(&mut self, topic: &str) {
        let Some(history) = self.history.get(topic) else {
            return;
        };
        match history.classification {
            TopicClass::Unclassified => {}
            TopicClass::Strength => {
                self.weaknesses.retain(|w| w.topic != topic);
                let count = history.strong_total;
                match self.strengths.iter_mut().find(|s| s.topic == topic) {
                    Some(existing) => existing.evidence_count = count,
                    None => self.strengths.push(Strength {
                        topic: topic.to_string(),
                        evidence_count: count,
                    }),
                }
            }
            TopicClass::Weakness => {
                self.strengths.retain(|s| s.topic != topic);
                let (count, last_seen) = (history.weak_total, history.last_seen);
                match self.weaknesses.iter_mut().find(|w| w.topic == topic) {
                    Some(existing) => {
                        existing.evidence_count = count;
                        existing.last_seen = last_seen;
                    }
                    None => self.weaknesses.push(Weakness {
                        topic: topic.to_string(),
                        evidence_count: count,
                        last_seen,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_resets_streaks_only() {
        let now = Utc::now();
        let mut h = TopicHistory::new(now);
        h.record(Signal::Strong, now);
        h.record(Signal::Neutral, now);
        assert_eq!(h.strong_streak, 0);
        assert_eq!(h.strong_total, 1);
        assert_eq!(h.neutral_total, 1);
    }

    #[test]
    fn profile_serde_roundtrip() {
        let mut p = MemoryProfile::new("u1");
        p.covered_topics.insert("caching".into());
        p.history.insert("caching".into(), TopicHistory::new(Utc::now()));
        let json = serde_json::to_string(&p).unwrap();
        let back: MemoryProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
