//! LLM integration for the interview engine.
//!
//! Supports:
//! - **Anthropic**: direct API access via rig-core
//! - **OpenAI**: direct API access via rig-core
//!
//! rig-core handles HTTP transport and `RigAdapter` bridges its
//! `CompletionModel` to our `LlmProvider`. Callers never talk to a provider
//! directly. They go through the `Generator` trait, implemented by
//! `ModelGateway`, which owns timeouts, retries, failover to the secondary
//! provider and parsing into a `ResponseSchema`.

pub mod cancel;
pub mod gateway;
pub mod provider;
pub mod retry;
mod rig_adapter;
pub mod schema;
pub mod scripted;

pub use cancel::CancelToken;
pub use gateway::{GatewayConfig, Generator, ModelGateway, Provider};
pub use provider::*;
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper};
pub use rig_adapter::RigAdapter;
pub use schema::{FieldKind, Generated, Prompt, ResponseSchema};
pub use scripted::ScriptedProvider;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "backend".to_string(),
                message: format!("unknown LLM backend '{other}' (expected anthropic or openai)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {e}"),
                status: None,
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!(backend = "anthropic", model = %config.model, "Configured LLM provider");
    Ok(Arc::new(RigAdapter::new(model, &config.model, "anthropic")))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {e}"),
                status: None,
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!(backend = "openai", model = %config.model, "Configured LLM provider");
    Ok(Arc::new(RigAdapter::new(model, &config.model, "openai")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_constructs_without_network() {
        // Keys are only checked by the provider on the first request.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-sonnet-latest".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o-mini".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("OpenAI".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert_eq!(" anthropic ".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert!("gemini".parse::<LlmBackend>().is_err());
    }
}
