//! Configuration types, loaded from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Non-answers rejected for every field, compared case-insensitively.
pub const DEFAULT_REJECT_VALUES: &[&str] = &[
    "", "n/a", "na", "none", "unknown", "i don't know", "i dont know", "idk", "-", "no_match",
];

/// Conversation engine configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Consecutive failed attempts on one field before the session fails.
    pub max_field_retries: u32,
    /// Upper bound on each classifier, extractor, responder and sink call.
    pub call_timeout: Duration,
    /// In-memory sessions idle longer than this are evicted.
    pub session_idle_timeout: Duration,
    /// Values treated as "no answer" (lower-cased).
    pub reject_values: Vec<String>,
    /// History turns passed to the slot extractor as context.
    pub extractor_context_turns: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_field_retries: 3,
            call_timeout: Duration::from_secs(30),
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            reject_values: DEFAULT_REJECT_VALUES.iter().map(|s| s.to_string()).collect(),
            extractor_context_turns: 4,
        }
    }
}

impl IntakeConfig {
    /// Read overrides from `RECRUIT_ASSIST_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(max) = parse_env::<u32>("RECRUIT_ASSIST_MAX_FIELD_RETRIES")? {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "RECRUIT_ASSIST_MAX_FIELD_RETRIES".into(),
                    message: "must be at least 1".into(),
                });
            }
            config.max_field_retries = max;
        }
        if let Some(secs) = parse_env::<u64>("RECRUIT_ASSIST_CALL_TIMEOUT_SECS")? {
            config.call_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_env::<u64>("RECRUIT_ASSIST_SESSION_IDLE_SECS")? {
            config.session_idle_timeout = Duration::from_secs(secs);
        }
        if let Ok(extra) = std::env::var("RECRUIT_ASSIST_REJECT_VALUES") {
            config.extend_reject_values(extra.split(','));
        }

        Ok(config)
    }

    /// Add values to the rejection set, normalized and de-duplicated.
    pub fn extend_reject_values<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for value in values {
            let value = value.trim().to_lowercase();
            if !value.is_empty() && !self.reject_values.contains(&value) {
                self.reject_values.push(value);
            }
        }
    }
}

/// Process-level configuration for the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub db_path: PathBuf,
    pub seed_jobs_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub intake: IntakeConfig,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("RECRUIT_ASSIST_LLM_BACKEND") {
            Ok(raw) => LlmBackend::from_str(&raw).map_err(|message| ConfigError::InvalidValue {
                key: "RECRUIT_ASSIST_LLM_BACKEND".into(),
                message,
            })?,
            Err(_) => LlmBackend::OpenAi,
        };

        let api_key = std::env::var(backend.api_key_var())
            .map_err(|_| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;

        let model = std::env::var("RECRUIT_ASSIST_MODEL")
            .unwrap_or_else(|_| backend.default_model().to_string());

        let db_path = std::env::var("RECRUIT_ASSIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/recruiting.db"));

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            db_path,
            seed_jobs_path: std::env::var("RECRUIT_ASSIST_SEED_JOBS").ok().map(PathBuf::from),
            log_dir: std::env::var("RECRUIT_ASSIST_LOG_DIR").ok().map(PathBuf::from),
            intake: IntakeConfig::from_env()?,
        })
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
