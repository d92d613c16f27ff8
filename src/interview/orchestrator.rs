//! Interview orchestrator: drives a session through its turn state machine.
//!
//! Each public operation loads the session from the store, applies one
//! validated transition and saves it back. Operations on one session are
//! serialized by a per-session lock, and profile updates for one user by a
//! per-user lock. Gateway calls are the only suspension points inside a
//! locked section and are bounded by the gateway's timeouts.
//!
//! A submit whose caller went away mid-evaluation leaves the turn answered
//! but unscored; the next `get_next_question` or `submit_answer` scores it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{InterviewError, ValidationError};
use crate::evaluation::{EvaluationEngine, EvaluationResult};
use crate::interview::model::{
    InterviewSession, Question, QuestionTurn, SessionStatus, SessionSummary, Subject,
};
use crate::interview::locks::KeyedLocks;
use crate::interview::{Difficulty, TurnPhase};
use crate::knowledge::KnowledgeStore;
use crate::llm::{CancelToken, FieldKind, Generator, Prompt, ResponseSchema};
use crate::memory::{MemoryAggregator, MemoryProfile};
use crate::research::{ResearchCache, ResearchContext, ResearchModule};
use crate::store::InterviewStore;

/// Runs adaptive mock interviews.
pub struct InterviewOrchestrator {
    generator: Arc<dyn Generator>,
    knowledge: Arc<KnowledgeStore>,
    research: Arc<ResearchModule>,
    evaluator: EvaluationEngine,
    memory: MemoryAggregator,
    store: Arc<dyn InterviewStore>,
    config: EngineConfig,
    session_locks: KeyedLocks<Uuid>,
    user_locks: KeyedLocks<String>,
    cancels: RwLock<HashMap<Uuid, CancelToken>>,
}

impl InterviewOrchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        knowledge: Arc<KnowledgeStore>,
        store: Arc<dyn InterviewStore>,
        research_cache: Arc<dyn ResearchCache>,
        config: EngineConfig,
    ) -> Self {
        let research = Arc::new(ResearchModule::new(
            Arc::clone(&generator),
            Arc::clone(&knowledge),
            research_cache,
            config.research_freshness,
        ));
        let evaluator = EvaluationEngine::new(Arc::clone(&generator), config.scoring.clone());
        let memory = MemoryAggregator::new(config.memory.clone());
        Self {
            generator,
            knowledge,
            research,
            evaluator,
            memory,
            store,
            config,
            session_locks: KeyedLocks::new(),
            user_locks: KeyedLocks::new(),
            cancels: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn research(&self) -> &Arc<ResearchModule> {
        &self.research
    }

    /// Create a session and start fetching research for it in the background.
    pub async fn start_interview(
        &self,
        user_id: &str,
        company: &str,
        role: &str,
        difficulty: Option<Difficulty>,
    ) -> Result<Uuid, InterviewError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::BlankField("user_id").into());
        }
        let subject = Subject::new(company, role)?;
        let session = InterviewSession::new(
            user_id,
            subject.clone(),
            difficulty.unwrap_or(self.config.default_difficulty),
            self.config.max_questions,
        );
        self.store.save_session(&session).await?;

        // Other sessions for this subject may wait on the same fetch, so it
        // is not tied to this session's cancel token.
        let _ = self.research.prefetch(subject);

        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            company = %session.subject.company,
            role = %session.subject.role,
            difficulty = %session.difficulty,
            "Interview started"
        );
        Ok(session.id)
    }

    /// The question the candidate should answer next.
    ///
    /// Returns the pending turn unchanged when a question is already waiting
    /// for an answer. An answer left unscored by an interrupted submit is
    /// evaluated first.
    pub async fn get_next_question(&self, session_id: Uuid) -> Result<QuestionTurn, InterviewError> {
        let _guard = self.session_locks.lock(session_id).await;

        let mut session = self.load_session(session_id).await?;
        session.ensure_active()?;
        if unscored_turn(&session).is_some() {
            self.evaluate_pending(&mut session).await?;
            session.ensure_active()?;
        }
        if let Some(pending) = session.pending_turn() {
            debug!(session_id = %session_id, turn = pending.number, "Returning pending question");
            return Ok(pending.clone());
        }
        if session.phase != TurnPhase::AwaitingQuestion {
            return Err(invalid_phase(&session, "ask a question"));
        }

        let cancel = self.cancel_token(session_id).await;
        let question = self.next_question(&session, &cancel).await?;
        let turn = QuestionTurn::new(session.turns.len() as u32 + 1, question);
        session.turns.push(turn.clone());
        session.transition_to(TurnPhase::AwaitingAnswer)?;
        self.store.save_session(&session).await?;

        info!(
            session_id = %session_id,
            turn = turn.number,
            difficulty = %turn.question.difficulty,
            category = %turn.question.category,
            source = %turn.question.source,
            "Question asked"
        );
        Ok(turn)
    }

    /// Record and score the answer to the pending question.
    ///
    /// Finalizes the session once the configured number of questions has
    /// been answered. When an earlier submit was interrupted before its
    /// evaluation was stored, the stored answer is scored and returned.
    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        answer: &str,
    ) -> Result<EvaluationResult, InterviewError> {
        let _guard = self.session_locks.lock(session_id).await;

        let mut session = self.load_session(session_id).await?;
        session.ensure_active()?;
        if answer.trim().is_empty() {
            return Err(ValidationError::EmptyAnswer.into());
        }
        if unscored_turn(&session).is_some() {
            warn!(session_id = %session_id, "Resuming interrupted evaluation");
            return self.evaluate_pending(&mut session).await;
        }
        if session.phase != TurnPhase::AwaitingAnswer || session.pending_turn().is_none() {
            return Err(invalid_phase(&session, "submit an answer"));
        }

        let turn_index = session.turns.len() - 1;
        session.turns[turn_index].answer = Some(answer.to_string());
        session.transition_to(TurnPhase::AwaitingEvaluation)?;
        self.store.save_session(&session).await?;

        self.evaluate_pending(&mut session).await
    }

    /// Finish the session and fold its evaluations into the user's profile.
    ///
    /// Finalizing an already finalized session returns the stored summary.
    pub async fn finalize_interview(&self, session_id: Uuid) -> Result<SessionSummary, InterviewError> {
        let _guard = self.session_locks.lock(session_id).await;

        let mut session = self.load_session(session_id).await?;
        if session.status == SessionStatus::Finalized {
            if let Some(summary) = &session.summary {
                debug!(session_id = %session_id, "Session already finalized");
                return Ok(summary.clone());
            }
        }
        session.ensure_active()?;

        let summary = self.finalize_locked(&mut session).await?;
        self.store.save_session(&session).await?;
        Ok(summary)
    }

    /// Stop the session. In-flight model calls are cancelled and the user's
    /// profile is left untouched.
    pub async fn abandon_interview(&self, session_id: Uuid) -> Result<(), InterviewError> {
        // Cancel before locking so a blocked evaluation releases the lock.
        if let Some(token) = self.cancels.read().await.get(&session_id) {
            token.cancel();
        }

        let _guard = self.session_locks.lock(session_id).await;

        let mut session = self.load_session(session_id).await?;
        if session.status == SessionStatus::Abandoned {
            return Ok(());
        }
        session.ensure_active()?;
        session.transition_to(TurnPhase::Abandoned)?;
        self.store.save_session(&session).await?;
        self.cancels.write().await.remove(&session_id);

        info!(session_id = %session_id, turns = session.turns.len(), "Interview abandoned");
        Ok(())
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<InterviewSession, InterviewError> {
        self.load_session(session_id).await
    }

    /// The user's profile, empty when nothing has been recorded yet.
    pub async fn get_memory_summary(&self, user_id: &str) -> Result<MemoryProfile, InterviewError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::BlankField("user_id").into());
        }
        Ok(self
            .store
            .load_profile(user_id)
            .await?
            .unwrap_or_else(|| MemoryProfile::new(user_id)))
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn load_session(&self, session_id: Uuid) -> Result<InterviewSession, InterviewError> {
        self.store
            .load_session(session_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownSession(session_id).into())
    }

    #[cfg(test)]
    async fn held_entries(&self) -> (usize, usize, usize) {
        (
            self.session_locks.len(),
            self.user_locks.len(),
            self.cancels.read().await.len(),
        )
    }

    async fn cancel_token(&self, session_id: Uuid) -> CancelToken {
        self.cancels
            .write()
            .await
            .entry(session_id)
            .or_default()
            .clone()
    }

    /// Score the answered turn, adapt difficulty, finalize when the session
    /// is complete and save. The session must be in `AwaitingEvaluation`.
    async fn evaluate_pending(
        &self,
        session: &mut InterviewSession,
    ) -> Result<EvaluationResult, InterviewError> {
        let Some(turn_index) = unscored_turn(session) else {
            return Err(invalid_phase(session, "evaluate an answer"));
        };
        let turn = &session.turns[turn_index];
        let question = turn.question.clone();
        let answer = turn.answer.clone().unwrap_or_default();

        let cancel = self.cancel_token(session.id).await;
        let evaluation = self
            .evaluator
            .evaluate(&question, &answer, &cancel)
            .await
            .map_err(|_| abandoned(session.id))?;

        let previous = session.difficulty;
        session.turns[turn_index].evaluation = Some(evaluation.clone());
        session.difficulty = self.config.difficulty.next(previous, evaluation.aggregate);
        session.refresh_running_score();
        session.transition_to(TurnPhase::AwaitingQuestion)?;

        info!(
            session_id = %session.id,
            turn = session.turns[turn_index].number,
            aggregate = evaluation.aggregate,
            degraded = evaluation.degraded,
            from = %previous,
            to = %session.difficulty,
            "Answer evaluated"
        );

        if session.is_complete() {
            self.finalize_locked(session).await?;
        }
        self.store.save_session(session).await?;
        Ok(evaluation)
    }

    /// Generate a question, falling back to the knowledge store.
    async fn next_question(
        &self,
        session: &InterviewSession,
        cancel: &CancelToken,
    ) -> Result<Question, InterviewError> {
        let research = self.research.peek(&session.subject).await;
        let asked = session.asked_texts();
        let covered = session.covered_categories();

        let generated = self
            .generator
            .generate(
                &question_prompt(session, &research, &asked, &covered),
                &question_schema(),
                cancel,
            )
            .await;

        match generated {
            Ok(g) => match g.text("question") {
                Some(text) if !asked.iter().any(|a| same_question(a, &text)) => {
                    return Ok(Question {
                        text,
                        category: g
                            .text("category")
                            .map(|c| c.to_lowercase())
                            .unwrap_or_else(|| "general".to_string()),
                        expected_topics: g.text_list("expected_topics"),
                        difficulty: session.difficulty,
                        source: g.provider,
                    });
                }
                _ => warn!(
                    session_id = %session.id,
                    "Generated question unusable or repeated, using knowledge store"
                ),
            },
            Err(e) if e.is_cancelled() => return Err(abandoned(session.id).into()),
            Err(e) => warn!(
                session_id = %session.id,
                error = %e,
                "Question generation failed, using knowledge store"
            ),
        }

        self.knowledge
            .fallback_question(&session.subject.role, session.difficulty, &asked, &covered)
            .ok_or_else(|| InterviewError::ExhaustedFallback {
                what: format!("question for session {}", session.id),
            })
    }

    /// Build the summary, apply memory updates in turn order and mark the
    /// session finalized. The caller saves the session.
    async fn finalize_locked(
        &self,
        session: &mut InterviewSession,
    ) -> Result<SessionSummary, InterviewError> {
        session.refresh_running_score();
        let summary = self.build_summary(session);

        {
            let _guard = self.user_locks.lock(session.user_id.clone()).await;

            let mut profile = self
                .store
                .load_profile(&session.user_id)
                .await?
                .unwrap_or_else(|| MemoryProfile::new(session.user_id.clone()));
            for turn in session.scored_turns() {
                let Some(evaluation) = &turn.evaluation else {
                    continue;
                };
                profile = self.memory.update_profile(
                    profile,
                    evaluation,
                    &covered_topics(turn, evaluation),
                    &evaluation.topics_missed,
                );
            }
            profile.record_session();
            self.store.save_profile(&profile).await?;
        }

        session.summary = Some(summary.clone());
        session.transition_to(TurnPhase::Finalized)?;
        self.cancels.write().await.remove(&session.id);

        info!(
            session_id = %session.id,
            answered = summary.questions_answered,
            mean_score = summary.mean_score,
            readiness = %summary.readiness,
            degraded_turns = summary.degraded_turns,
            "Interview finalized"
        );
        Ok(summary)
    }

    fn build_summary(&self, session: &InterviewSession) -> SessionSummary {
        let scored: Vec<(&QuestionTurn, &EvaluationResult)> = session
            .scored_turns()
            .filter_map(|t| t.evaluation.as_ref().map(|e| (t, e)))
            .collect();

        let mut topics_covered: Vec<String> = Vec::new();
        let mut topics_missed: Vec<String> = Vec::new();
        for (turn, evaluation) in &scored {
            union_into(&mut topics_covered, &covered_topics(turn, evaluation));
            union_into(&mut topics_missed, &evaluation.topics_missed);
        }
        let evaluations: Vec<&EvaluationResult> = scored.iter().map(|(_, e)| *e).collect();

        SessionSummary {
            session_id: session.id,
            user_id: session.user_id.clone(),
            subject: session.subject.clone(),
            questions_answered: evaluations.len() as u32,
            mean_score: session.running_score,
            readiness: self.config.scoring.thresholds.classify(session.running_score),
            final_difficulty: session.difficulty,
            difficulty_trail: session.turns.iter().map(|t| t.question.difficulty).collect(),
            topics_covered,
            topics_missed,
            degraded_turns: evaluations.iter().filter(|e| e.degraded).count() as u32,
            finalized_at: chrono::Utc::now(),
        }
    }
}

impl Drop for InterviewOrchestrator {
    fn drop(&mut self) {
        self.research.stop_prefetch();
    }
}

/// Index of the last turn when it was answered but never scored.
fn unscored_turn(session: &InterviewSession) -> Option<usize> {
    if session.phase != TurnPhase::AwaitingEvaluation {
        return None;
    }
    let last = session.turns.len().checked_sub(1)?;
    let turn = &session.turns[last];
    (turn.answer.is_some() && turn.evaluation.is_none()).then_some(last)
}

/// The turn's category plus what the evaluator saw covered. Summary and
/// profile updates both use this.
fn covered_topics(turn: &QuestionTurn, evaluation: &EvaluationResult) -> Vec<String> {
    let mut covered = vec![turn.question.category.clone()];
    union_into(&mut covered, &evaluation.topics_covered);
    covered
}

fn invalid_phase(session: &InterviewSession, action: &str) -> InterviewError {
    ValidationError::InvalidPhase {
        id: session.id,
        phase: session.phase.to_string(),
        action: action.to_string(),
    }
    .into()
}

/// What a cancelled model call surfaces as.
fn abandoned(session_id: Uuid) -> ValidationError {
    ValidationError::SessionNotActive {
        id: session_id,
        status: SessionStatus::Abandoned.to_string(),
    }
}

fn same_question(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    norm(a) == norm(b)
}

fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

fn question_schema() -> ResponseSchema {
    ResponseSchema::new("question")
        .required("question", FieldKind::Text)
        .required("category", FieldKind::Text)
        .optional("expected_topics", FieldKind::TextList)
}

fn question_prompt(
    session: &InterviewSession,
    research: &ResearchContext,
    asked: &[&str],
    covered: &[String],
) -> Prompt {
    let covered = if covered.is_empty() {
        "none yet".to_string()
    } else {
        covered.join(", ")
    };
    let asked = if asked.is_empty() {
        "none yet".to_string()
    } else {
        asked
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Prompt::new(
        format!(
            "You are interviewing a candidate for the role \"{role}\" at \"{company}\". \
             Ask one question at a time, realistic for this company's process.",
            role = session.subject.role,
            company = session.subject.company,
        ),
        format!(
            "{research}\n\n\
             Difficulty: {difficulty}\n\
             Categories already covered: {covered}\n\
             Questions already asked:\n{asked}\n\n\
             Ask a new {difficulty} question, preferring a category not yet covered. \
             Give its category as a short lowercase tag and list the topics a strong \
             answer should mention.",
            research = research.prompt_summary(),
            difficulty = session.difficulty,
        ),
    )
}
