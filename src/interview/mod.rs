//! Interview sessions and the orchestrator that runs them.

pub mod difficulty;
mod locks;
pub mod model;
pub mod orchestrator;
pub mod state;

pub use difficulty::{Difficulty, DifficultyPolicy};
pub use model::{
    InterviewSession, Question, QuestionTurn, SessionStatus, SessionSummary, Subject,
};
pub use orchestrator::InterviewOrchestrator;
pub use state::TurnPhase;
