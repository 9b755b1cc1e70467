//! Error types for maac-forge operations.
//!
//! Defines error types for the subsystems that share them:
//! - Scenario composition and structural validation
//! - Configuration of generation runs and the service
//! - Model provider interactions
//!
//! Errors owned by a single subsystem (queue, store, worker pool) live next
//! to that subsystem.

use thiserror::Error;

/// Errors that can occur while producing a single scenario.
///
/// All of these are fatal to the scenario, never to the job that asked for it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("Scenario composition failed: {0}")]
    Composition(String),

    #[error("Scenario '{scenario_id}' is missing required field '{field}'")]
    MissingField { scenario_id: String, field: String },

    #[error("Critical validation failure for scenario '{scenario_id}': success thresholds are empty")]
    CriticalValidationFailure { scenario_id: String },

    #[error("Complexity validation rejected the scenario after {attempts} attempt(s): {}", reasons.join("; "))]
    ValidationRejected { attempts: u32, reasons: Vec<String> },
}

impl GenerationError {
    /// Returns whether another render of the same position may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GenerationError::ValidationRejected { .. })
    }
}

/// Errors raised for invalid run or service configuration.
///
/// These fail fast: no scenario index is computed once one is raised.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown domain '{0}': expected one of analytical, planning, communication, problem_solving")]
    UnknownDomain(String),

    #[error("Unknown tier '{0}': expected one of simple, moderate, complex")]
    UnknownTier(String),

    #[error("Configuration dimension '{0}' must not be empty")]
    EmptyDimension(&'static str),

    #[error("Duplicate entry '{value}' in '{dimension}'")]
    DuplicateEntry {
        dimension: &'static str,
        value: String,
    },

    #[error("Repetitions per block must be at least 1")]
    ZeroRepetitions,

    #[error("Invalid config id '{0}': expected exactly 12 characters of '0' or '1'")]
    InvalidConfigId(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while talking to a model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),

    #[error("Missing API base URL (set LITELLM_API_BASE)")]
    MissingApiBase,

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Provider call timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Provider call cancelled")]
    Cancelled,

    #[error("Prompt rendering failed: {0}")]
    Prompt(#[from] tera::Error),
}

impl LlmError {
    /// Returns whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RequestFailed(_) | LlmError::RateLimited(_) | LlmError::Timeout { .. } => {
                true
            }
            LlmError::ApiError { code, .. } => *code == 408 || *code == 429 || *code >= 500,
            _ => false,
        }
    }
}
