//! Model-backed answer evaluation with heuristic fallback.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::evaluation::heuristic;
use crate::evaluation::result::{DimensionScores, EvaluationResult, ScoringConfig};
use crate::interview::Question;
use crate::llm::{CancelToken, FieldKind, Generated, Generator, Prompt, ResponseSchema};

const SYSTEM_PROMPT: &str = "You are a strict but fair interviewer scoring a candidate's answer. \
Score each dimension from 0 to 10: technical_accuracy (is it correct and complete), \
clarity (is it easy to follow), structure (is it organised), confidence (is it assertive \
without hedging). Feedback must be two or three actionable sentences addressed to the candidate.";

/// Scores answers through the gateway.
pub struct EvaluationEngine {
    generator: Arc<dyn Generator>,
    scoring: ScoringConfig,
}

impl EvaluationEngine {
    pub fn new(generator: Arc<dyn Generator>, scoring: ScoringConfig) -> Self {
        Self { generator, scoring }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Score `answer` to `question`.
    ///
    /// Gateway failures fall back to the heuristic scorer, so the only error
    /// is cancellation.
    pub async fn evaluate(
        &self,
        question: &Question,
        answer: &str,
        cancel: &CancelToken,
    ) -> Result<EvaluationResult, GatewayError> {
        if answer.trim().is_empty() {
            debug!("Blank answer, scoring heuristically");
            return Ok(heuristic::score_answer(question, answer, &self.scoring));
        }

        match self
            .generator
            .generate(&evaluation_prompt(question, answer), &evaluation_schema(), cancel)
            .await
        {
            Ok(generated) => {
                let result = self.from_generated(question, answer, &generated);
                info!(
                    aggregate = result.aggregate,
                    readiness = %result.readiness,
                    source = %result.source,
                    "Answer evaluated"
                );
                Ok(result)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(error = %e, "Evaluation generation failed, using heuristic scorer");
                Ok(heuristic::score_answer(question, answer, &self.scoring))
            }
        }
    }

    fn from_generated(&self, question: &Question, answer: &str, generated: &Generated) -> EvaluationResult {
        let score = |name: &str| generated.number(name).unwrap_or(0.0);
        let scores = DimensionScores::clamped(
            score("technical_accuracy"),
            score("clarity"),
            score("structure"),
            score("confidence"),
        );

        // Topic lists are optional in the response; derive them when absent.
        let (mut covered, mut missed) = (
            normalized(generated.text_list("topics_covered")),
            normalized(generated.text_list("topics_missed")),
        );
        if !generated.fields.contains_key("topics_covered")
            && !generated.fields.contains_key("topics_missed")
        {
            (covered, missed) = heuristic::topics_mentioned(question, answer);
        }

        EvaluationResult::new(
            scores,
            &self.scoring,
            generated.text("feedback").unwrap_or_default(),
            covered,
            missed,
            generated.provider,
        )
    }
}

fn normalized(topics: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(topics.len());
    for topic in topics {
        let topic = topic.to_lowercase();
        if !out.contains(&topic) {
            out.push(topic);
        }
    }
    out
}

fn evaluation_schema() -> ResponseSchema {
    ResponseSchema::new("evaluation")
        .required("technical_accuracy", FieldKind::Number)
        .required("clarity", FieldKind::Number)
        .required("structure", FieldKind::Number)
        .required("confidence", FieldKind::Number)
        .required("feedback", FieldKind::Text)
        .optional("topics_covered", FieldKind::TextList)
        .optional("topics_missed", FieldKind::TextList)
}

fn evaluation_prompt(question: &Question, answer: &str) -> Prompt {
    let expected = if question.expected_topics.is_empty() {
        "(none listed)".to_string()
    } else {
        question.expected_topics.join(", ")
    };
    Prompt::new(
        SYSTEM_PROMPT,
        format!(
            "Question ({difficulty}, {category}): {text}\n\
             Expected topics: {expected}\n\n\
             Candidate answer:\n{answer}\n\n\
             List which expected topics the answer covered and which it missed.",
            difficulty = question.difficulty,
            category = question.category,
            text = question.text,
        ),
    )
}
