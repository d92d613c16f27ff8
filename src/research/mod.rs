//! Company and role research with caching and static fallback.
//!
//! Model-derived context is cached per subject for a freshness window.
//! Whenever the gateway fails, the context is rebuilt wholesale from the
//! knowledge store; partially parsed model output is never mixed in, and
//! fallback contexts are never cached.

pub mod cache;
pub mod context;

pub use cache::ResearchCache;
pub use context::{InterviewRound, ResearchContext};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ValidationError;
use crate::interview::Subject;
use crate::knowledge::KnowledgeStore;
use crate::llm::{CancelToken, FieldKind, Generated, Generator, Prompt, ResponseSchema};

/// Produces `ResearchContext`s, preferring the model and falling back to static data.
pub struct ResearchModule {
    generator: Arc<dyn Generator>,
    knowledge: Arc<KnowledgeStore>,
    cache: Arc<dyn ResearchCache>,
    freshness: chrono::Duration,
    in_flight: Mutex<HashSet<String>>,
    prefetch_cancel: CancelToken,
}

impl ResearchModule {
    pub fn new(
        generator: Arc<dyn Generator>,
        knowledge: Arc<KnowledgeStore>,
        cache: Arc<dyn ResearchCache>,
        freshness: chrono::Duration,
    ) -> Self {
        Self {
            generator,
            knowledge,
            cache,
            freshness,
            in_flight: Mutex::new(HashSet::new()),
            prefetch_cancel: CancelToken::new(),
        }
    }

    /// Context for a company and role. Never fails for valid input.
    pub async fn get_context(
        &self,
        company: &str,
        role: &str,
        cancel: &CancelToken,
    ) -> Result<ResearchContext, ValidationError> {
        let subject = Subject::new(company, role)?;
        Ok(self.context_for(&subject, cancel).await)
    }

    /// Fresh cached context, else a model call, else the knowledge store.
    pub async fn context_for(&self, subject: &Subject, cancel: &CancelToken) -> ResearchContext {
        let key = subject.key();
        if let Some(cached) = self.fresh_cached(&key).await {
            debug!(subject = %key, "Research cache hit");
            return cached;
        }

        match self
            .generator
            .generate(&research_prompt(subject), &research_schema(), cancel)
            .await
        {
            Ok(generated) => {
                let context = context_from_generated(subject, &generated);
                if let Err(e) = self.cache.put_research(&key, &context).await {
                    warn!(subject = %key, error = %e, "Failed to cache research context");
                }
                info!(subject = %key, source = %context.source, "Research context generated");
                context
            }
            Err(e) => {
                warn!(
                    subject = %key,
                    error = %e,
                    "Research generation failed, using knowledge store"
                );
                self.knowledge.fallback_research(subject)
            }
        }
    }

    /// Fresh cached context or the generic fallback. Never calls the model.
    pub async fn peek(&self, subject: &Subject) -> ResearchContext {
        match self.fresh_cached(&subject.key()).await {
            Some(context) => context,
            None => self.knowledge.fallback_research(subject),
        }
    }

    /// Warm the cache in the background. Duplicate requests for a subject
    /// already being fetched are dropped.
    ///
    /// Prefetches belong to the module rather than to any one session and
    /// only stop on `stop_prefetch`.
    pub fn prefetch(self: &Arc<Self>, subject: Subject) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let cancel = self.prefetch_cancel.clone();
        tokio::spawn(async move {
            let key = subject.key();
            let claimed = this
                .in_flight
                .lock()
                .map(|mut set| set.insert(key.clone()))
                .unwrap_or(false);
            if !claimed {
                debug!(subject = %key, "Research prefetch already running");
                return;
            }

            if this.fresh_cached(&key).await.is_none() {
                let context = this.context_for(&subject, &cancel).await;
                debug!(subject = %key, source = %context.source, "Research prefetch finished");
            }

            if let Ok(mut set) = this.in_flight.lock() {
                set.remove(&key);
            }
        })
    }

    /// Cancel running prefetches. Later prefetches return the fallback.
    pub fn stop_prefetch(&self) {
        self.prefetch_cancel.cancel();
    }

    async fn fresh_cached(&self, key: &str) -> Option<ResearchContext> {
        match self.cache.get_research(key).await {
            Ok(Some(context)) if context.is_fresh(self.freshness, Utc::now()) => Some(context),
            Ok(_) => None,
            Err(e) => {
                warn!(subject = %key, error = %e, "Research cache read failed");
                None
            }
        }
    }
}

fn research_schema() -> ResponseSchema {
    ResponseSchema::new("research")
        .required("faq", FieldKind::TextList)
        .required("rounds", FieldKind::TextList)
        .required("required_skills", FieldKind::TextList)
        .required("evaluation_criteria", FieldKind::TextList)
}

fn research_prompt(subject: &Subject) -> Prompt {
    Prompt::new(
        "You are a recruiting researcher who prepares candidates for interviews. \
         Be concrete and realistic; do not invent confidential details.",
        format!(
            "Prepare interview research for the role \"{role}\" at \"{company}\".\n\
             - faq: questions candidates commonly ask about this process\n\
             - rounds: each round as \"Round name: what it focuses on\"\n\
             - required_skills: skills the role is assessed on\n\
             - evaluation_criteria: how interviewers judge answers",
            role = subject.role,
            company = subject.company
        ),
    )
}

fn context_from_generated(subject: &Subject, generated: &Generated) -> ResearchContext {
    let rounds = generated
        .text_list("rounds")
        .into_iter()
        .map(|raw| match raw.split_once(':') {
            Some((name, focus)) => InterviewRound {
                name: name.trim().to_string(),
                focus: focus.trim().to_string(),
            },
            None => InterviewRound {
                name: raw,
                focus: String::new(),
            },
        })
        .collect();

    ResearchContext {
        subject: subject.clone(),
        faq: generated.text_list("faq"),
        rounds,
        required_skills: generated.text_list("required_skills"),
        evaluation_criteria: generated.text_list("evaluation_criteria"),
        source: generated.provider,
        fetched_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::{GatewayError, GatewayErrorKind};
    use crate::llm::Provider;
    use crate::store::MemoryStore;

    /// Generator that counts calls and either succeeds with fixed research or fails.
    struct FixedGenerator {
        succeed: bool,
        calls: AtomicUsize,
    }

    impl FixedGenerator {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                succeed,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(
            &self,
            _prompt: &Prompt,
            _schema: &ResponseSchema,
            cancel: &CancelToken,
        ) -> Result<Generated, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(GatewayError::new(
                    GatewayErrorKind::Cancelled,
                    Provider::Primary,
                    0,
                    "cancelled",
                ));
            }
            if !self.succeed {
                return Err(GatewayError::new(
                    GatewayErrorKind::Timeout,
                    Provider::Primary,
                    4,
                    "timed out",
                ));
            }
            let fields = json!({
                "faq": ["Is there a take-home?"],
                "rounds": ["Onsite: system design and coding", "Hiring manager"],
                "required_skills": ["rust"],
                "evaluation_criteria": ["ownership"]
            });
            Ok(Generated {
                fields: fields.as_object().cloned().unwrap_or_default(),
                provider: Provider::Primary,
            })
        }
    }

    fn module(generator: Arc<FixedGenerator>, cache: Arc<MemoryStore>) -> Arc<ResearchModule> {
        Arc::new(ResearchModule::new(
            generator,
            Arc::new(KnowledgeStore::builtin().unwrap()),
            cache,
            chrono::Duration::days(7),
        ))
    }

    #[tokio::test]
    async fn generated_context_is_parsed_and_cached() {
        let generator = FixedGenerator::new(true);
        let cache = Arc::new(MemoryStore::new());
        let research = module(generator.clone(), cache.clone());

        let ctx = research
            .get_context("Acme", "Backend Engineer", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(ctx.source, Provider::Primary);
        assert_eq!(ctx.rounds[0].name, "Onsite");
        assert_eq!(ctx.rounds[0].focus, "system design and coding");
        assert_eq!(ctx.rounds[1].focus, "");
        assert_eq!(cache.research_count().await, 1);

        // Second call is served from cache.
        research
            .get_context("acme", "backend  engineer", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_uses_knowledge_store_and_is_not_cached() {
        let generator = FixedGenerator::new(false);
        let cache = Arc::new(MemoryStore::new());
        let research = module(generator, cache.clone());

        let ctx = research
            .get_context("Acme", "Data Scientist", &CancelToken::new())
            .await
            .unwrap();
        assert!(ctx.is_fallback());
        let bank = KnowledgeStore::builtin().unwrap();
        assert_eq!(ctx.faq, bank.bank_for_role("Data Scientist").research.faq);
        assert_eq!(cache.research_count().await, 0);
    }

    #[tokio::test]
    async fn stale_cache_entries_are_refreshed() {
        let generator = FixedGenerator::new(true);
        let cache = Arc::new(MemoryStore::new());
        let subject = Subject::new("Acme", "Engineer").unwrap();
        let mut stale = KnowledgeStore::builtin().unwrap().fallback_research(&subject);
        stale.source = Provider::Primary;
        stale.fetched_at = Utc::now() - chrono::Duration::days(8);
        cache.put_research(&subject.key(), &stale).await.unwrap();

        let research = module(generator.clone(), cache);
        let ctx = research.context_for(&subject, &CancelToken::new()).await;
        assert_eq!(ctx.required_skills, vec!["rust".to_string()]);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_input_is_validation_error() {
        let research = module(FixedGenerator::new(true), Arc::new(MemoryStore::new()));
        let err = research
            .get_context("", "Engineer", &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::BlankField("company"));
    }

    #[tokio::test]
    async fn peek_never_calls_the_model() {
        let generator = FixedGenerator::new(true);
        let research = module(generator.clone(), Arc::new(MemoryStore::new()));
        let subject = Subject::new("Acme", "Engineer").unwrap();

        let ctx = research.peek(&subject).await;
        assert!(ctx.is_fallback());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prefetch_warms_cache_for_peek() {
        let generator = FixedGenerator::new(true);
        let research = module(generator, Arc::new(MemoryStore::new()));
        let subject = Subject::new("Acme", "Engineer").unwrap();

        research
            .prefetch(subject.clone())
            .await
            .unwrap();
        let ctx = research.peek(&subject).await;
        assert_eq!(ctx.source, Provider::Primary);
    }

    #[tokio::test]
    async fn stopped_prefetch_caches_nothing() {
        let cache = Arc::new(MemoryStore::new());
        let research = module(FixedGenerator::new(true), cache.clone());
        research.stop_prefetch();

        research
            .prefetch(Subject::new("Acme", "Engineer").unwrap())
            .await
            .unwrap();
        assert_eq!(cache.research_count().await, 0);
    }
}
