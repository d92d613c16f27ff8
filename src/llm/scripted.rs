//! Scripted provider that replays canned replies. Used by tests and offline demos.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// One scripted reaction to a request.
#[derive(Debug)]
pub enum ScriptedReply {
    Text(String),
    Fail(LlmError),
    /// Never answers; relies on the caller's timeout or cancellation.
    Hang,
}

/// Replays replies in order. When the script runs out, every call fails with
/// a retryable 503 unless a repeating reply was set.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<ScriptedReply>>,
    repeat: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text` once the script is exhausted.
    pub fn repeating(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut provider = Self::new(name);
        provider.repeat = Some(text.into());
        provider
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(text.into()));
        self
    }

    pub fn then_fail(self, error: LlmError) -> Self {
        self.push(ScriptedReply::Fail(error));
        self
    }

    pub fn then_hang(self) -> Self {
        self.push(ScriptedReply::Hang);
        self
    }

    fn push(&self, reply: ScriptedReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    /// Number of `complete` calls received.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Retryable server error used as the default failure.
    pub fn server_error(provider: &str) -> LlmError {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: "503 Service Unavailable".to_string(),
            status: Some(503),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let text = match next {
            Some(ScriptedReply::Text(text)) => text,
            Some(ScriptedReply::Fail(err)) => return Err(err),
            Some(ScriptedReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Err(Self::server_error(&self.name));
            }
            None => match &self.repeat {
                Some(text) => text.clone(),
                None => return Err(Self::server_error(&self.name)),
            },
        };
        Ok(CompletionResponse {
            content: text,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}
