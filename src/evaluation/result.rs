//! Scores, readiness labels and the scoring configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::Provider;

/// Per-dimension answer scores, each in [0, 10].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub technical_accuracy: f64,
    pub clarity: f64,
    pub structure: f64,
    pub confidence: f64,
}

impl DimensionScores {
    /// Build scores, clamping each into [0, 10]. Non-finite values become 0.
    pub fn clamped(technical_accuracy: f64, clarity: f64, structure: f64, confidence: f64) -> Self {
        Self {
            technical_accuracy: clamp_score(technical_accuracy),
            clarity: clamp_score(clarity),
            structure: clamp_score(structure),
            confidence: clamp_score(confidence),
        }
    }

    pub fn zero() -> Self {
        Self::clamped(0.0, 0.0, 0.0, 0.0)
    }

    pub fn min(&self) -> f64 {
        self.as_array().into_iter().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.as_array().into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    fn as_array(&self) -> [f64; 4] {
        [
            self.technical_accuracy,
            self.clarity,
            self.structure,
            self.confidence,
        ]
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 10.0)
    } else {
        0.0
    }
}

/// Relative weight of each dimension in the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub technical_accuracy: f64,
    pub clarity: f64,
    pub structure: f64,
    pub confidence: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            technical_accuracy: 1.0,
            clarity: 1.0,
            structure: 1.0,
            confidence: 1.0,
        }
    }
}

impl ScoringWeights {
    /// Weighted mean `Σ(wᵢ·sᵢ) / Σwᵢ`. Unrounded, so recomputation is exact.
    pub fn aggregate(&self, scores: &DimensionScores) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        (self.technical_accuracy * scores.technical_accuracy
            + self.clarity * scores.clarity
            + self.structure * scores.structure
            + self.confidence * scores.confidence)
            / total
    }

    fn total(&self) -> f64 {
        self.technical_accuracy + self.clarity + self.structure + self.confidence
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            self.technical_accuracy,
            self.clarity,
            self.structure,
            self.confidence,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) || self.total() <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "scoring.weights".to_string(),
                message: "weights must be finite, non-negative and not all zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Coarse readiness classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    NotReady,
    Developing,
    Ready,
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotReady => "not_ready",
            Self::Developing => "developing",
            Self::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

/// Boundaries between readiness labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessThresholds {
    /// Aggregates strictly below this are NotReady.
    pub developing_from: f64,
    /// Aggregates strictly above this are Ready.
    pub ready_above: f64,
}

impl Default for ReadinessThresholds {
    fn default() -> Self {
        Self {
            developing_from: 4.0,
            ready_above: 7.0,
        }
    }
}

impl ReadinessThresholds {
    pub fn classify(&self, aggregate: f64) -> Readiness {
        if aggregate < self.developing_from {
            Readiness::NotReady
        } else if aggregate > self.ready_above {
            Readiness::Ready
        } else {
            Readiness::Developing
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.developing_from <= self.ready_above) {
            return Err(ConfigError::InvalidValue {
                key: "scoring.thresholds".to_string(),
                message: format!(
                    "developing_from ({}) must not exceed ready_above ({})",
                    self.developing_from, self.ready_above
                ),
            });
        }
        Ok(())
    }
}

/// Weights plus readiness thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub thresholds: ReadinessThresholds,
}

/// The scored outcome of one answer. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scores: DimensionScores,
    pub aggregate: f64,
    pub readiness: Readiness,
    pub feedback: String,
    pub topics_covered: Vec<String>,
    pub topics_missed: Vec<String>,
    /// True when produced by the heuristic scorer instead of a model.
    pub degraded: bool,
    pub source: Provider,
}

impl EvaluationResult {
    pub fn new(
        scores: DimensionScores,
        scoring: &ScoringConfig,
        feedback: impl Into<String>,
        topics_covered: Vec<String>,
        topics_missed: Vec<String>,
        source: Provider,
    ) -> Self {
        let aggregate = scoring.weights.aggregate(&scores);
        Self {
            scores,
            aggregate,
            readiness: scoring.thresholds.classify(aggregate),
            feedback: feedback.into(),
            topics_covered,
            topics_missed,
            degraded: source.is_fallback(),
            source,
        }
    }
}
