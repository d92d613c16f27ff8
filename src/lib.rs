//! Adaptive mock interview engine.
//!
//! An [`interview::InterviewOrchestrator`] asks questions through a model
//! gateway, scores answers, adapts difficulty and folds results into a
//! per-user memory profile. Every model-dependent step has a deterministic
//! fallback, so the engine also runs with no provider configured.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod interview;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod research;
pub mod store;

pub use config::{EngineConfig, ProviderSettings};
pub use error::{InterviewError, ValidationError};
pub use interview::InterviewOrchestrator;
