//! Turn state machine for an interview session.

use serde::{Deserialize, Serialize};

/// Where a session is within the question/answer/evaluation loop.
///
/// Loops AwaitingQuestion → AwaitingAnswer → AwaitingEvaluation →
/// AwaitingQuestion until Finalized; any non-terminal phase may be Abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingQuestion,
    AwaitingAnswer,
    AwaitingEvaluation,
    Finalized,
    Abandoned,
}

impl TurnPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: TurnPhase) -> bool {
        use TurnPhase::*;

        matches!(
            (self, target),
            (AwaitingQuestion, AwaitingAnswer)
                | (AwaitingQuestion, Finalized)
                | (AwaitingAnswer, AwaitingEvaluation)
                | (AwaitingAnswer, Finalized)
                | (AwaitingEvaluation, AwaitingQuestion)
                | (AwaitingEvaluation, Finalized)
                | (AwaitingQuestion, Abandoned)
                | (AwaitingAnswer, Abandoned)
                | (AwaitingEvaluation, Abandoned)
        )
    }

    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Abandoned)
    }
}

impl Default for TurnPhase {
    fn default() -> Self {
        Self::AwaitingQuestion
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingQuestion => "awaiting_question",
            Self::AwaitingAnswer => "awaiting_answer",
            Self::AwaitingEvaluation => "awaiting_evaluation",
            Self::Finalized => "finalized",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}
