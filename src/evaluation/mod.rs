//! Evaluation engine: answer scoring, aggregation and readiness.

pub mod engine;
pub mod heuristic;
pub mod result;

pub use engine::EvaluationEngine;
pub use heuristic::HEURISTIC_FEEDBACK_PREFIX;
pub use result::{
    DimensionScores, EvaluationResult, Readiness, ReadinessThresholds, ScoringConfig,
    ScoringWeights,
};
