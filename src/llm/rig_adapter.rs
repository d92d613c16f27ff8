//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.
//!
//! rig owns the wire format for each backend. This adapter only maps our chat
//! messages onto a rig completion request and rig's errors onto `LlmError`,
//! so the gateway can tell retryable failures from permanent ones.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rig::completion::message::{AssistantContent, Message};
use rig::completion::{CompletionError, CompletionModel};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([45]\d\d)\b").expect("status code regex"));

/// An `LlmProvider` backed by any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, mut history) = split_messages(&request.messages);
        let prompt = history.pop().ok_or_else(|| LlmError::InvalidResponse {
            provider: self.provider.to_string(),
            reason: "request has no user message".to_string(),
        })?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if !preamble.is_empty() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_error(self.provider, e))?;

        let content = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.to_string(),
                reason: "no text content in response".to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: saturate(response.usage.input_tokens),
            output_tokens: saturate(response.usage.output_tokens),
        })
    }
}

/// System messages become the preamble; the rest keep their order.
fn split_messages(messages: &[ChatMessage]) -> (String, Vec<Message>) {
    let mut preamble: Vec<&str> = Vec::new();
    let mut history = Vec::new();
    for m in messages {
        match m.role {
            Role::System => preamble.push(&m.content),
            Role::User => history.push(Message::user(m.content.clone())),
            Role::Assistant => history.push(Message::assistant(m.content.clone())),
        }
    }
    (preamble.join("\n\n"), history)
}

/// rig reports provider failures as text, so the status code is recovered
/// from the message when the provider included one.
fn map_error(provider: &str, err: CompletionError) -> LlmError {
    let provider = provider.to_string();
    match err {
        CompletionError::JsonError(e) => LlmError::Json(e),
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse { provider, reason },
        other => classify(provider, other.to_string()),
    }
}

fn classify(provider: String, reason: String) -> LlmError {
    let lower = reason.to_lowercase();
    let status = STATUS_RE
        .captures(&reason)
        .and_then(|c| c[1].parse::<u16>().ok());

    if matches!(status, Some(401 | 403))
        || lower.contains("authentication")
        || lower.contains("invalid x-api-key")
        || lower.contains("invalid api key")
    {
        return LlmError::AuthFailed { provider };
    }
    if status == Some(429) || lower.contains("rate limit") || lower.contains("rate_limit") {
        return LlmError::RateLimited {
            provider,
            retry_after: None,
        };
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return LlmError::Timeout {
            provider,
            timeout: std::time::Duration::ZERO,
        };
    }
    let status = status.or_else(|| {
        if lower.contains("overloaded") {
            Some(529)
        } else if lower.contains("invalid_request") {
            Some(400)
        } else {
            None
        }
    });
    LlmError::RequestFailed {
        provider,
        reason,
        status,
    }
}

fn saturate(tokens: u64) -> u32 {
    u32::try_from(tokens).unwrap_or(u32::MAX)
}
