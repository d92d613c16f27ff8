//! End-to-end interview sessions driven through the public orchestrator API.
//!
//! Model output comes from in-process stubs: either a `Generator` answering
//! per schema, or an `LlmProvider` behind a real `ModelGateway`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::time::timeout;
use uuid::Uuid;

use interview_engine::error::{DatabaseError, GatewayError, GatewayErrorKind, LlmError};
use interview_engine::evaluation::Readiness;
use interview_engine::interview::{Difficulty, InterviewSession, SessionStatus, TurnPhase};
use interview_engine::knowledge::KnowledgeStore;
use interview_engine::memory::MemoryProfile;
use interview_engine::llm::scripted::ScriptedProvider;
use interview_engine::llm::{
    CancelToken, CompletionRequest, CompletionResponse, FieldKind, GatewayConfig, Generated,
    Generator, LlmProvider, ModelGateway, Prompt, Provider, RecordingSleeper, ResponseSchema,
};
use interview_engine::store::{InterviewStore, LibSqlStore, MemoryStore};
use interview_engine::{EngineConfig, InterviewError, InterviewOrchestrator, ValidationError};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers each schema from its own queue. An empty queue times out.
#[derive(Default)]
struct SchemaQueues {
    queues: Mutex<HashMap<&'static str, VecDeque<Value>>>,
}

impl SchemaQueues {
    fn push(&self, schema: &'static str, value: Value) {
        self.queues
            .lock()
            .unwrap()
            .entry(schema)
            .or_default()
            .push_back(value);
    }
}

#[async_trait]
impl Generator for SchemaQueues {
    async fn generate(
        &self,
        _prompt: &Prompt,
        schema: &ResponseSchema,
        _cancel: &CancelToken,
    ) -> Result<Generated, GatewayError> {
        let next = self
            .queues
            .lock()
            .unwrap()
            .get_mut(schema.name)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Value::Object(fields)) => Ok(Generated {
                fields,
                provider: Provider::Primary,
            }),
            _ => Err(GatewayError::new(
                GatewayErrorKind::Timeout,
                Provider::Primary,
                4,
                "no scripted reply",
            )),
        }
    }
}

/// Provider whose every reply satisfies all three schemas, with a fresh
/// question text per call.
struct StubLlm {
    calls: AtomicUsize,
    score: f64,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(reply_for_every_schema(n, self.score))
    }
}

fn reply_for_every_schema(n: usize, score: f64) -> CompletionResponse {
    let body = json!({
        "question": format!("Stub question number {n}: describe a design you owned."),
        "category": "system design",
        "expected_topics": ["trade-offs", "scaling"],
        "technical_accuracy": score,
        "clarity": score,
        "structure": score,
        "confidence": score,
        "feedback": "Solid reasoning.",
        "topics_covered": ["trade-offs"],
        "topics_missed": ["scaling"],
        "faq": ["How many rounds are there?"],
        "rounds": ["Phone screen: fundamentals", "Onsite: design"],
        "required_skills": ["distributed systems"],
        "evaluation_criteria": ["clear trade-offs"]
    });
    CompletionResponse {
        content: format!("```json\n{body}\n```"),
        input_tokens: 0,
        output_tokens: 0,
    }
}

/// Never replies.
#[derive(Default)]
struct SilentLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmProvider for SilentLlm {
    fn model_name(&self) -> &str {
        "silent"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Answers questions and research, but an evaluation call never returns.
/// Records when that call starts and when its future is dropped.
#[derive(Default)]
struct StuckEvaluations {
    calls: AtomicUsize,
    evaluating: Notify,
    released: AtomicBool,
}

struct SetOnDrop<'a>(&'a AtomicBool);

impl Drop for SetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmProvider for StuckEvaluations {
    fn model_name(&self) -> &str {
        "stuck"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let evaluating = request
            .messages
            .iter()
            .any(|m| m.content.contains("technical_accuracy"));
        if !evaluating {
            return Ok(reply_for_every_schema(n, 7.0));
        }
        let _released = SetOnDrop(&self.released);
        self.evaluating.notify_one();
        std::future::pending().await
    }
}

/// MemoryStore whose profile reads take a while, widening the window
/// between loading and saving a profile.
#[derive(Default)]
struct SlowProfileReads {
    inner: MemoryStore,
}

#[async_trait]
impl InterviewStore for SlowProfileReads {
    async fn load_session(&self, id: Uuid) -> Result<Option<InterviewSession>, DatabaseError> {
        self.inner.load_session(id).await
    }

    async fn save_session(&self, session: &InterviewSession) -> Result<(), DatabaseError> {
        self.inner.save_session(session).await
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<MemoryProfile>, DatabaseError> {
        let profile = self.inner.load_profile(user_id).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        profile
    }

    async fn save_profile(&self, profile: &MemoryProfile) -> Result<(), DatabaseError> {
        self.inner.save_profile(profile).await
    }
}

fn evaluation(score: f64) -> Value {
    json!({
        "technical_accuracy": score,
        "clarity": score,
        "structure": score,
        "confidence": score,
        "feedback": "noted",
        "topics_covered": ["caching"],
        "topics_missed": []
    })
}

fn knowledge() -> Arc<KnowledgeStore> {
    Arc::new(KnowledgeStore::builtin().unwrap())
}

fn in_memory(generator: Arc<dyn Generator>, config: EngineConfig) -> InterviewOrchestrator {
    let store = Arc::new(MemoryStore::new());
    InterviewOrchestrator::new(generator, knowledge(), store.clone(), store, config)
}

/// Gateway with no real waiting between retries.
fn gateway(provider: Arc<dyn LlmProvider>) -> ModelGateway {
    ModelGateway::new(provider, GatewayConfig::default())
        .with_sleeper(Arc::new(RecordingSleeper::new()))
}

#[tokio::test]
async fn difficulty_adapts_across_a_session() {
    timeout(TEST_TIMEOUT, async {
        let generator = Arc::new(SchemaQueues::default());
        for score in [8.0, 3.0, 6.0] {
            generator.push("evaluation", evaluation(score));
        }
        let orch = in_memory(generator, EngineConfig::default());
        let id = orch
            .start_interview("candidate", "Acme", "Backend Engineer", Some(Difficulty::Medium))
            .await
            .unwrap();

        let mut asked = Vec::new();
        for answer in ["first answer", "second answer", "third answer"] {
            let turn = orch.get_next_question(id).await.unwrap();
            asked.push(turn.question.difficulty);
            orch.submit_answer(id, answer).await.unwrap();
        }
        assert_eq!(
            asked,
            vec![Difficulty::Medium, Difficulty::Hard, Difficulty::Medium]
        );

        let session = orch.get_session(id).await.unwrap();
        assert_eq!(session.difficulty, Difficulty::Medium);
        assert_eq!(session.phase, TurnPhase::AwaitingQuestion);

        let summary = orch.finalize_interview(id).await.unwrap();
        assert_eq!(summary.questions_answered, 3);
        assert!((summary.mean_score - 17.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.readiness, Readiness::Developing);
        assert_eq!(summary.final_difficulty, Difficulty::Medium);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failing_provider_degrades_to_static_content() {
    timeout(TEST_TIMEOUT, async {
        let provider = Arc::new(ScriptedProvider::new("down"));
        let orch = in_memory(
            Arc::new(gateway(provider.clone())),
            EngineConfig::default(),
        );
        let id = orch
            .start_interview("candidate", "Acme", "Data Scientist", None)
            .await
            .unwrap();

        let turn = orch.get_next_question(id).await.unwrap();
        assert_eq!(turn.question.source, Provider::StaticFallback);
        assert!(!turn.question.text.is_empty());

        let eval = orch
            .submit_answer(id, "I would start with a baseline model and iterate.")
            .await
            .unwrap();
        assert!(eval.degraded);
        assert_eq!(eval.source, Provider::StaticFallback);
        assert!((0.0..=10.0).contains(&eval.aggregate));
        assert!(provider.calls() > 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn model_backed_session_runs_to_completion() {
    timeout(TEST_TIMEOUT, async {
        let provider = Arc::new(StubLlm {
            calls: AtomicUsize::new(0),
            score: 8.0,
        });
        let config = EngineConfig {
            max_questions: 2,
            ..EngineConfig::default()
        };
        let orch = in_memory(Arc::new(gateway(provider)), config);
        let id = orch
            .start_interview("candidate", "Acme", "Backend Engineer", Some(Difficulty::Easy))
            .await
            .unwrap();

        for _ in 0..2 {
            let turn = orch.get_next_question(id).await.unwrap();
            assert_eq!(turn.question.source, Provider::Primary);
            let eval = orch.submit_answer(id, "A thorough answer.").await.unwrap();
            assert!(!eval.degraded);
            assert!((eval.aggregate - 8.0).abs() < 1e-9);
        }

        let session = orch.get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Finalized);
        let summary = session.summary.expect("auto-finalized summary");
        assert_eq!(summary.readiness, Readiness::Ready);
        assert_eq!(
            summary.difficulty_trail,
            vec![Difficulty::Easy, Difficulty::Medium]
        );
        assert_eq!(summary.final_difficulty, Difficulty::Hard);

        let profile = orch.get_memory_summary("candidate").await.unwrap();
        assert_eq!(profile.sessions_completed, 1);
        assert!(profile.strength("system design").is_some());
        assert!(profile.weakness("scaling").is_some());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn finalize_twice_returns_the_same_summary() {
    let generator = Arc::new(SchemaQueues::default());
    generator.push("evaluation", evaluation(7.0));
    let orch = in_memory(generator, EngineConfig::default());
    let id = orch.start_interview("u", "Acme", "Engineer", None).await.unwrap();
    orch.get_next_question(id).await.unwrap();
    orch.submit_answer(id, "answer").await.unwrap();

    let first = orch.finalize_interview(id).await.unwrap();
    let second = orch.finalize_interview(id).await.unwrap();
    assert_eq!(first, second);

    let profile = orch.get_memory_summary("u").await.unwrap();
    assert_eq!(profile.sessions_completed, 1);
}

#[tokio::test]
async fn abandoned_session_rejects_further_work() {
    let orch = in_memory(Arc::new(ModelGateway::offline()), EngineConfig::default());
    let id = orch.start_interview("u", "Acme", "Engineer", None).await.unwrap();
    orch.get_next_question(id).await.unwrap();
    orch.abandon_interview(id).await.unwrap();
    orch.abandon_interview(id).await.unwrap();

    let err = orch.submit_answer(id, "late answer").await.unwrap_err();
    assert!(matches!(
        err,
        InterviewError::Validation(ValidationError::SessionNotActive { .. })
    ));
    assert_eq!(
        orch.get_memory_summary("u").await.unwrap().sessions_completed,
        0
    );
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let orch = in_memory(Arc::new(ModelGateway::offline()), EngineConfig::default());
    let missing = Uuid::new_v4();
    for err in [
        orch.get_next_question(missing).await.unwrap_err(),
        orch.submit_answer(missing, "hi").await.unwrap_err(),
        orch.finalize_interview(missing).await.unwrap_err(),
        orch.abandon_interview(missing).await.unwrap_err(),
    ] {
        assert!(matches!(
            err,
            InterviewError::Validation(ValidationError::UnknownSession(id)) if id == missing
        ));
    }
}

#[tokio::test]
async fn libsql_store_keeps_sessions_and_profiles_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interviews.db");

    let session_id = {
        let db = Arc::new(LibSqlStore::new_local(&path).await.unwrap());
        let generator = Arc::new(SchemaQueues::default());
        generator.push("evaluation", evaluation(9.0));
        generator.push("evaluation", evaluation(8.0));
        let orch = InterviewOrchestrator::new(
            generator,
            knowledge(),
            db.clone(),
            db,
            EngineConfig::default(),
        );
        let id = orch.start_interview("u", "Acme", "Engineer", None).await.unwrap();
        for _ in 0..2 {
            orch.get_next_question(id).await.unwrap();
            orch.submit_answer(id, "a considered answer").await.unwrap();
        }
        orch.finalize_interview(id).await.unwrap();
        id
    };

    let db = Arc::new(LibSqlStore::new_local(&path).await.unwrap());
    let orch = InterviewOrchestrator::new(
        Arc::new(ModelGateway::offline()),
        knowledge(),
        db.clone(),
        db,
        EngineConfig::default(),
    );
    let session = orch.get_session(session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Finalized);
    assert_eq!(session.turns.len(), 2);
    assert!(session.summary.is_some());

    let profile = orch.get_memory_summary("u").await.unwrap();
    assert_eq!(profile.sessions_completed, 1);
    assert!(profile.strength("caching").is_some());
}

#[tokio::test]
async fn abandon_cancels_an_evaluation_in_flight() {
    timeout(TEST_TIMEOUT, async {
        let provider = Arc::new(StuckEvaluations::default());
        let orch = Arc::new(in_memory(
            Arc::new(gateway(provider.clone())),
            EngineConfig::default(),
        ));
        let id = orch.start_interview("u", "Acme", "Engineer", None).await.unwrap();
        orch.get_next_question(id).await.unwrap();

        let submit = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.submit_answer(id, "I would add a read replica.").await })
        };
        provider.evaluating.notified().await;
        orch.abandon_interview(id).await.unwrap();

        let err = submit.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            InterviewError::Validation(ValidationError::SessionNotActive { .. })
        ));
        assert!(provider.released.load(Ordering::SeqCst));

        let session = orch.get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Abandoned);
        assert!(session.turns[0].evaluation.is_none());
        assert_eq!(
            orch.get_memory_summary("u").await.unwrap().sessions_completed,
            0
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn concurrent_finalizes_for_one_user_both_count() {
    timeout(TEST_TIMEOUT, async {
        let generator = Arc::new(SchemaQueues::default());
        generator.push("evaluation", evaluation(8.0));
        generator.push("evaluation", evaluation(5.0));
        let orch = InterviewOrchestrator::new(
            generator,
            knowledge(),
            Arc::new(SlowProfileReads::default()),
            Arc::new(MemoryStore::new()),
            EngineConfig::default(),
        );

        let mut ids = Vec::new();
        for role in ["Backend Engineer", "Data Scientist"] {
            let id = orch.start_interview("u", "Acme", role, None).await.unwrap();
            orch.get_next_question(id).await.unwrap();
            orch.submit_answer(id, "an answer about caching").await.unwrap();
            ids.push(id);
        }

        let (a, b) = tokio::join!(
            orch.finalize_interview(ids[0]),
            orch.finalize_interview(ids[1])
        );
        a.unwrap();
        b.unwrap();

        let profile = orch.get_memory_summary("u").await.unwrap();
        assert_eq!(profile.sessions_completed, 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn silent_provider_times_out_into_static_content() {
    timeout(TEST_TIMEOUT, async {
        let provider = Arc::new(SilentLlm::default());
        let config = GatewayConfig {
            request_timeout: Duration::from_millis(20),
            ..GatewayConfig::default()
        };
        let max_attempts = config.retry.max_attempts();
        let gateway = Arc::new(
            ModelGateway::new(provider.clone(), config)
                .with_sleeper(Arc::new(RecordingSleeper::new())),
        );

        let err = gateway
            .generate(
                &Prompt::new("system", "user"),
                &ResponseSchema::new("check").required("answer", FieldKind::Text),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Timeout);
        assert_eq!(err.attempts, max_attempts);

        let orch = in_memory(gateway, EngineConfig::default());
        let id = orch.start_interview("u", "Acme", "Engineer", None).await.unwrap();
        let turn = orch.get_next_question(id).await.unwrap();
        assert_eq!(turn.question.source, Provider::StaticFallback);

        let eval = orch
            .submit_answer(id, "Profile first, then cache the hot path.")
            .await
            .unwrap();
        assert!(eval.degraded);
        assert_eq!(eval.source, Provider::StaticFallback);
        assert!(provider.calls.load(Ordering::SeqCst) as u32 >= 3 * max_attempts);
    })
    .await
    .expect("test timed out");
}
