//! Error types for the recruiting assistant.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Record sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

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

/// Failures reported by the record sink when persisting a candidate.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("A candidate with email {email} already exists")]
    DuplicateKey { email: String },

    #[error("Record sink unavailable: {0}")]
    Other(String),
}

impl From<DatabaseError> for SinkError {
    fn from(e: DatabaseError) -> Self {
        Self::Other(e.to_string())
    }
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Call to {operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-turn failures surfaced by the conversation state machine.
///
/// None of these leave a session half-updated; the machine maps each one
/// to a user-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Value rejected for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("External service failure during {operation}: {reason}")]
    ExternalService { operation: String, reason: String },

    #[error("Sink failure: {0}")]
    Sink(#[from] SinkError),

    #[error("Exceeded {max} attempts for field {field}")]
    ExceededRetries { field: String, max: u32 },
}

impl From<LlmError> for IntakeError {
    fn from(e: LlmError) -> Self {
        let operation = match &e {
            LlmError::Timeout { operation, .. } => operation.clone(),
            _ => "nlu".to_string(),
        };
        Self::ExternalService {
            operation,
            reason: e.to_string(),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
