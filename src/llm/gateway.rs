//! Model gateway: retries, provider failover and structured parsing.
//!
//! Every model call in the engine goes through the `Generator` trait. The
//! `ModelGateway` implementation tries the primary provider with exponential
//! backoff, then the secondary provider once, and gives every provider one
//! corrective re-prompt when its output does not parse.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayErrorKind, LlmError};
use crate::llm::cancel::CancelToken;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::llm::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::llm::schema::{Generated, Prompt, ResponseSchema, parse_response};

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Primary,
    Secondary,
    StaticFallback,
}

impl Provider {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::StaticFallback)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::StaticFallback => "static_fallback",
        };
        write!(f, "{s}")
    }
}

/// Structured text generation.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an object matching `schema`, or explain why not.
    async fn generate(
        &self,
        prompt: &Prompt,
        schema: &ResponseSchema,
        cancel: &CancelToken,
    ) -> Result<Generated, GatewayError>;
}

/// Gateway tuning.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bound for each individual provider call.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            temperature: 0.4,
            max_tokens: 700,
        }
    }
}

/// Why a single provider call failed.
enum CallFailure {
    Timeout,
    Cancelled,
    Provider(LlmError),
}

/// The production `Generator`.
pub struct ModelGateway {
    primary: Option<Arc<dyn LlmProvider>>,
    secondary: Option<Arc<dyn LlmProvider>>,
    config: GatewayConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl ModelGateway {
    pub fn new(primary: Arc<dyn LlmProvider>, config: GatewayConfig) -> Self {
        Self {
            primary: Some(primary),
            secondary: None,
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// A gateway with no providers; every call fails immediately.
    pub fn offline() -> Self {
        Self {
            primary: None,
            secondary: None,
            config: GatewayConfig::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_secondary(mut self, secondary: Arc<dyn LlmProvider>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn call_once(
        &self,
        provider: &Arc<dyn LlmProvider>,
        messages: &[ChatMessage],
        cancel: &CancelToken,
    ) -> Result<String, CallFailure> {
        let request = CompletionRequest::new(messages.to_vec())
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallFailure::Cancelled),
            result = tokio::time::timeout(self.config.request_timeout, provider.complete(request)) => {
                match result {
                    Err(_) => Err(CallFailure::Timeout),
                    Ok(Err(e)) => Err(CallFailure::Provider(e)),
                    Ok(Ok(response)) => {
                        debug!(
                            model = provider.model_name(),
                            input_tokens = response.input_tokens,
                            output_tokens = response.output_tokens,
                            "Model replied"
                        );
                        Ok(response.content)
                    }
                }
            }
        }
    }

    /// Run one provider slot: transport retries with backoff plus a single
    /// corrective re-prompt on unparseable output.
    #[allow(clippy::too_many_arguments)]
    async fn run_slot(
        &self,
        provider: &Arc<dyn LlmProvider>,
        slot: Provider,
        max_attempts: u32,
        prompt: &Prompt,
        schema: &ResponseSchema,
        cancel: &CancelToken,
        calls: &mut u32,
    ) -> Result<Map<String, Value>, GatewayError> {
        let mut messages = vec![
            ChatMessage::system(format!("{}\n\n{}", prompt.system, schema.instructions())),
            ChatMessage::user(&prompt.user),
        ];
        let mut transport_failures = 0u32;
        let mut reprompted = false;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(slot, *calls));
            }
            *calls += 1;
            debug!(
                provider = %slot,
                model = provider.model_name(),
                schema = schema.name,
                call = *calls,
                "Calling model"
            );

            let failure = match self.call_once(provider, &messages, cancel).await {
                Ok(text) => match parse_response(&text, schema) {
                    Ok(object) => return Ok(object),
                    Err(reason) if !reprompted => {
                        warn!(
                            provider = %slot,
                            schema = schema.name,
                            reason = %reason,
                            "Unparseable model output, re-prompting"
                        );
                        reprompted = true;
                        messages.push(ChatMessage::assistant(text));
                        messages.push(ChatMessage::user(format!(
                            "Your previous reply could not be used ({reason}). {}",
                            schema.instructions()
                        )));
                        continue;
                    }
                    Err(reason) => {
                        return Err(GatewayError::new(
                            GatewayErrorKind::ParseError,
                            slot,
                            *calls,
                            reason,
                        ));
                    }
                },
                Err(failure) => failure,
            };

            let (kind, message, retryable) = match failure {
                CallFailure::Cancelled => return Err(cancelled(slot, *calls)),
                CallFailure::Timeout => (
                    GatewayErrorKind::Timeout,
                    format!("no reply within {:?}", self.config.request_timeout),
                    true,
                ),
                CallFailure::Provider(err) => {
                    let kind = if matches!(err, LlmError::Timeout { .. }) {
                        GatewayErrorKind::Timeout
                    } else {
                        GatewayErrorKind::ProviderError
                    };
                    (kind, err.to_string(), err.is_retryable())
                }
            };

            transport_failures += 1;
            if !retryable || transport_failures >= max_attempts {
                return Err(GatewayError::new(kind, slot, *calls, message));
            }

            let delay = self.config.retry.backoff(transport_failures - 1);
            warn!(
                provider = %slot,
                kind = %kind,
                attempt = transport_failures,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Model call failed, backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(slot, *calls)),
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }
}

fn cancelled(slot: Provider, calls: u32) -> GatewayError {
    GatewayError::new(GatewayErrorKind::Cancelled, slot, calls, "call cancelled")
}

#[async_trait]
impl Generator for ModelGateway {
    async fn generate(
        &self,
        prompt: &Prompt,
        schema: &ResponseSchema,
        cancel: &CancelToken,
    ) -> Result<Generated, GatewayError> {
        let Some(primary) = &self.primary else {
            return Err(GatewayError::new(
                GatewayErrorKind::ProviderError,
                Provider::Primary,
                0,
                "no model provider configured",
            ));
        };

        let mut calls = 0;
        let primary_err = match self
            .run_slot(
                primary,
                Provider::Primary,
                self.config.retry.max_attempts(),
                prompt,
                schema,
                cancel,
                &mut calls,
            )
            .await
        {
            Ok(fields) => {
                return Ok(Generated {
                    fields,
                    provider: Provider::Primary,
                });
            }
            Err(e) => e,
        };

        if primary_err.is_cancelled() {
            return Err(primary_err);
        }

        let Some(secondary) = &self.secondary else {
            warn!(error = %primary_err, schema = schema.name, "Model gateway exhausted");
            return Err(primary_err);
        };

        info!(
            error = %primary_err,
            schema = schema.name,
            "Primary provider exhausted, switching to secondary"
        );
        match self
            .run_slot(
                secondary,
                Provider::Secondary,
                1,
                prompt,
                schema,
                cancel,
                &mut calls,
            )
            .await
        {
            Ok(fields) => Ok(Generated {
                fields,
                provider: Provider::Secondary,
            }),
            Err(e) => {
                warn!(error = %e, schema = schema.name, "Model gateway exhausted");
                Err(e)
            }
        }
    }
}
