//! Error types for the interview engine.

use std::time::Duration;

use uuid::Uuid;

use crate::llm::Provider;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by a single LLM provider call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed {
        provider: String,
        reason: String,
        status: Option<u16>,
    },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether repeating the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed { status, .. } => match status {
                // No status means the request never got a response (network).
                None => true,
                Some(code) => *code >= 500 || *code == 408,
            },
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::InvalidResponse { .. } | Self::AuthFailed { .. } | Self::Json(_) => false,
        }
    }
}

/// Classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The provider did not answer within the per-attempt timeout.
    Timeout,
    /// The provider answered with an error or could not be reached.
    ProviderError,
    /// The provider answered but the output did not match the schema.
    ParseError,
    /// The caller cancelled the call (session abandoned).
    Cancelled,
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::ProviderError => "provider_error",
            Self::ParseError => "parse_error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Failure of a `Generator::generate` call after all retries and fallbacks.
///
/// Always recovered inside the engine; never surfaced to API callers.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} from {provider:?} after {attempts} attempt(s): {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    /// Provider slot that produced the last failure.
    pub provider: Provider,
    /// Total provider calls made, across all slots.
    pub attempts: u32,
    pub message: String,
}

impl GatewayError {
    pub fn new(
        kind: GatewayErrorKind,
        provider: Provider,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider,
            attempts,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == GatewayErrorKind::Cancelled
    }
}

/// Malformed caller input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unknown session {0}")]
    UnknownSession(Uuid),

    #[error("Session {id} is {status}, not active")]
    SessionNotActive { id: Uuid, status: String },

    #[error("Session {id} is in phase {phase}, cannot {action}")]
    InvalidPhase {
        id: Uuid,
        phase: String,
        action: String,
    },

    #[error("Answer text is empty")]
    EmptyAnswer,

    #[error("Field {0} must not be blank")]
    BlankField(&'static str),
}

/// Errors surfaced by the public interview API.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("No usable content for {what}: model and fallback store both exhausted")]
    ExhaustedFallback { what: String },

    #[error("Storage failed: {0}")]
    Storage(#[from] DatabaseError),
}
