//! Configuration types.
//!
//! Every setting has a default; `from_env()` overrides them from
//! `INTERVIEW_*` variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::evaluation::ScoringConfig;
use crate::interview::{Difficulty, DifficultyPolicy};
use crate::llm::{GatewayConfig, LlmBackend, LlmConfig};
use crate::memory::MemoryPolicy;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Answered questions after which a session finalizes itself.
    pub max_questions: u32,
    /// Starting difficulty when the caller does not choose one.
    pub default_difficulty: Difficulty,
    pub gateway: GatewayConfig,
    pub scoring: ScoringConfig,
    pub difficulty: DifficultyPolicy,
    pub memory: MemoryPolicy,
    /// How long model-derived research stays fresh.
    pub research_freshness: chrono::Duration,
    /// JSON question banks replacing the bundled ones.
    pub knowledge_path: Option<PathBuf>,
    /// libSQL database file. In-memory storage when unset.
    pub database_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_questions: 8,
            default_difficulty: Difficulty::Medium,
            gateway: GatewayConfig::default(),
            scoring: ScoringConfig::default(),
            difficulty: DifficultyPolicy::default(),
            memory: MemoryPolicy::default(),
            research_freshness: chrono::Duration::days(7),
            knowledge_path: None,
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(n) = parse_var::<u32>(&lookup, "INTERVIEW_MAX_QUESTIONS")? {
            config.max_questions = n;
        }
        if let Some(d) = parse_var::<Difficulty>(&lookup, "INTERVIEW_DIFFICULTY")? {
            config.default_difficulty = d;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "INTERVIEW_REQUEST_TIMEOUT_SECS")? {
            config.gateway.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<u32>(&lookup, "INTERVIEW_MAX_RETRIES")? {
            config.gateway.retry.max_retries = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "INTERVIEW_BACKOFF_BASE_MS")? {
            config.gateway.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "INTERVIEW_BACKOFF_CAP_MS")? {
            config.gateway.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(days) = parse_var::<i64>(&lookup, "INTERVIEW_RESEARCH_FRESHNESS_DAYS")? {
            config.research_freshness = chrono::Duration::try_days(days)
                .ok_or_else(|| invalid("INTERVIEW_RESEARCH_FRESHNESS_DAYS", "out of range"))?;
        }
        if let Some(raw) = lookup("INTERVIEW_SCORE_WEIGHTS") {
            let weights = parse_weights(&raw)?;
            config.scoring.weights.technical_accuracy = weights[0];
            config.scoring.weights.clarity = weights[1];
            config.scoring.weights.structure = weights[2];
            config.scoring.weights.confidence = weights[3];
        }
        config.knowledge_path = lookup("INTERVIEW_KNOWLEDGE_PATH").map(PathBuf::from);
        config.database_path = lookup("INTERVIEW_DB_PATH").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_questions == 0 {
            return Err(invalid("INTERVIEW_MAX_QUESTIONS", "must be at least 1"));
        }
        if self.gateway.request_timeout.is_zero() {
            return Err(invalid("INTERVIEW_REQUEST_TIMEOUT_SECS", "must be positive"));
        }
        if self.gateway.retry.base_delay > self.gateway.retry.max_delay {
            return Err(invalid(
                "INTERVIEW_BACKOFF_BASE_MS",
                "base delay must not exceed the cap",
            ));
        }
        if self.research_freshness <= chrono::Duration::zero() {
            return Err(invalid("INTERVIEW_RESEARCH_FRESHNESS_DAYS", "must be positive"));
        }
        self.scoring.weights.validate()?;
        self.scoring.thresholds.validate()?;
        self.difficulty.validate()?;
        self.memory.validate()?;
        Ok(())
    }
}

/// Model providers configured in the environment.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub primary: Option<LlmConfig>,
    pub secondary: Option<LlmConfig>,
}

impl ProviderSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Primary from `INTERVIEW_LLM_*`, secondary from `INTERVIEW_SECONDARY_*`.
    ///
    /// A provider without an API key is left unconfigured.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let primary = llm_config(&lookup, "INTERVIEW_LLM", Some(LlmBackend::Anthropic))?;
        let secondary = llm_config(&lookup, "INTERVIEW_SECONDARY", None)?;
        Ok(Self { primary, secondary })
    }
}

fn llm_config(
    lookup: &impl Fn(&str) -> Option<String>,
    prefix: &str,
    default_backend: Option<LlmBackend>,
) -> Result<Option<LlmConfig>, ConfigError> {
    let backend = match parse_var::<LlmBackend>(lookup, &format!("{prefix}_BACKEND"))? {
        Some(b) => b,
        None => match default_backend {
            Some(b) => b,
            None => return Ok(None),
        },
    };

    let standard_key_var = match backend {
        LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        LlmBackend::OpenAi => "OPENAI_API_KEY",
    };
    let Some(api_key) = lookup(&format!("{prefix}_API_KEY"))
        .or_else(|| lookup(standard_key_var))
        .filter(|k| !k.trim().is_empty())
    else {
        return Ok(None);
    };

    let model = lookup(&format!("{prefix}_MODEL")).unwrap_or_else(|| {
        match backend {
            LlmBackend::Anthropic => "claude-sonnet-4-20250514",
            LlmBackend::OpenAi => "gpt-4o-mini",
        }
        .to_string()
    });

    Ok(Some(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model,
    }))
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(key, &format!("'{raw}': {e}"))),
    }
}

fn parse_weights(raw: &str) -> Result<[f64; 4], ConfigError> {
    let parsed: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| invalid("INTERVIEW_SCORE_WEIGHTS", &e.to_string()))?;
    parsed.try_into().map_err(|_| {
        invalid(
            "INTERVIEW_SCORE_WEIGHTS",
            "expected four comma-separated numbers",
        )
    })
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_questions, 8);
        assert_eq!(config.default_difficulty, Difficulty::Medium);
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(30));
        assert_eq!(config.gateway.retry.max_retries, 3);
        assert_eq!(config.research_freshness, chrono::Duration::days(7));
        assert_eq!(config.difficulty.raise_at, 7.5);
        assert!(config.knowledge_path.is_none());
    }

    #[test]
    fn overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("INTERVIEW_MAX_QUESTIONS", "3"),
            ("INTERVIEW_DIFFICULTY", "hard"),
            ("INTERVIEW_MAX_RETRIES", "1"),
            ("INTERVIEW_SCORE_WEIGHTS", "2, 1, 1, 0"),
            ("INTERVIEW_KNOWLEDGE_PATH", "/tmp/bank.json"),
        ]))
        .unwrap();
        assert_eq!(config.max_questions, 3);
        assert_eq!(config.default_difficulty, Difficulty::Hard);
        assert_eq!(config.gateway.retry.max_retries, 1);
        assert_eq!(config.scoring.weights.technical_accuracy, 2.0);
        assert_eq!(config.scoring.weights.confidence, 0.0);
        assert_eq!(config.knowledge_path, Some(PathBuf::from("/tmp/bank.json")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("INTERVIEW_MAX_QUESTIONS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "INTERVIEW_MAX_QUESTIONS"));

        assert!(EngineConfig::from_lookup(lookup(&[("INTERVIEW_MAX_QUESTIONS", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("INTERVIEW_SCORE_WEIGHTS", "1,1")])).is_err());
        assert!(
            EngineConfig::from_lookup(lookup(&[("INTERVIEW_SCORE_WEIGHTS", "0,0,0,0")])).is_err()
        );
        assert!(EngineConfig::from_lookup(lookup(&[("INTERVIEW_DIFFICULTY", "insane")])).is_err());
    }

    #[test]
    fn out_of_range_freshness_is_an_error() {
        let err = EngineConfig::from_lookup(lookup(&[(
            "INTERVIEW_RESEARCH_FRESHNESS_DAYS",
            "9999999999999",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "INTERVIEW_RESEARCH_FRESHNESS_DAYS"
        ));
        assert!(
            EngineConfig::from_lookup(lookup(&[("INTERVIEW_RESEARCH_FRESHNESS_DAYS", "-3")])).is_err()
        );
    }

    #[test]
    fn no_api_key_means_no_provider() {
        let settings = ProviderSettings::from_lookup(lookup(&[])).unwrap();
        assert!(settings.primary.is_none());
        assert!(settings.secondary.is_none());
    }

    #[test]
    fn providers_from_env() {
        let settings = ProviderSettings::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("INTERVIEW_SECONDARY_BACKEND", "openai"),
            ("INTERVIEW_SECONDARY_API_KEY", "sk-oai"),
            ("INTERVIEW_SECONDARY_MODEL", "gpt-4o"),
        ]))
        .unwrap();

        let primary = settings.primary.unwrap();
        assert_eq!(primary.backend, LlmBackend::Anthropic);
        assert_eq!(primary.api_key.expose_secret(), "sk-ant");
        assert_eq!(primary.model, "claude-sonnet-4-20250514");

        let secondary = settings.secondary.unwrap();
        assert_eq!(secondary.backend, LlmBackend::OpenAi);
        assert_eq!(secondary.model, "gpt-4o");
        assert_eq!(secondary.api_key.expose_secret(), "sk-oai");
    }
}
