//! Runtime configuration.
//!
//! [`ForgeConfig`] collects worker counts, rate limits, retry policy and
//! connection URLs. Defaults suit a local run; every field can be overridden
//! through `MAAC_*` environment variables (plus `DATABASE_URL` and
//! `REDIS_URL`). Complexity validation settings live in
//! [`crate::complexity::ValidatorConfig`] and load from YAML.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;
use crate::scheduler::{RateLimiter, WorkerPoolConfig};

/// Configuration for generation and trial execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ForgeConfig {
    // Generation settings
    /// Positions validated in parallel per generation job.
    pub generation_workers: usize,

    // Trial settings
    /// Number of trial workers.
    pub trial_workers: usize,
    /// Requests per minute applied to every provider. 0 disables limiting.
    pub requests_per_minute: u32,
    /// Per-provider overrides of `requests_per_minute`.
    pub provider_rpm: HashMap<String, u32>,
    pub max_trial_attempts: u32,
    /// Base delay of the exponential retry backoff.
    pub retry_backoff: Duration,
    pub trial_timeout: Duration,
    /// Failed / finished trial ratio that stops a worker pool.
    pub failure_ceiling: f64,

    // Provider settings
    /// How long a provider's model list stays cached.
    pub model_cache_ttl: Duration,

    // Storage settings
    /// PostgreSQL connection URL. `None` keeps everything in memory.
    pub database_url: Option<String>,
    /// Redis connection URL. `None` uses the in-process trial queue.
    pub redis_url: Option<String>,
    pub queue_name: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            generation_workers: 2,

            trial_workers: 4,
            requests_per_minute: 60,
            provider_rpm: HashMap::new(),
            max_trial_attempts: 3,
            retry_backoff: Duration::from_millis(1000),
            trial_timeout: Duration::from_secs(120),
            failure_ceiling: 0.5,

            model_cache_ttl: Duration::from_secs(300),

            database_url: None,
            redis_url: None,
            queue_name: "maac:trials".to_string(),
        }
    }
}

impl ForgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the process environment and validates it.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = lookup("MAAC_GENERATION_WORKERS") {
            config.generation_workers = parse_env_value(&val, "MAAC_GENERATION_WORKERS")?;
        }

        if let Some(val) = lookup("MAAC_TRIAL_WORKERS") {
            config.trial_workers = parse_env_value(&val, "MAAC_TRIAL_WORKERS")?;
        }

        if let Some(val) = lookup("MAAC_REQUESTS_PER_MINUTE") {
            config.requests_per_minute = parse_env_value(&val, "MAAC_REQUESTS_PER_MINUTE")?;
        }

        if let Some(val) = lookup("MAAC_PROVIDER_RPM") {
            config.provider_rpm = parse_provider_rpm(&val)?;
        }

        if let Some(val) = lookup("MAAC_MAX_TRIAL_ATTEMPTS") {
            config.max_trial_attempts = parse_env_value(&val, "MAAC_MAX_TRIAL_ATTEMPTS")?;
        }

        if let Some(val) = lookup("MAAC_RETRY_BACKOFF_MS") {
            let ms: u64 = parse_env_value(&val, "MAAC_RETRY_BACKOFF_MS")?;
            config.retry_backoff = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("MAAC_TRIAL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "MAAC_TRIAL_TIMEOUT_SECS")?;
            config.trial_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("MAAC_FAILURE_CEILING") {
            config.failure_ceiling = parse_env_value(&val, "MAAC_FAILURE_CEILING")?;
        }

        if let Some(val) = lookup("MAAC_MODEL_CACHE_TTL_SECS") {
            let secs: u64 = parse_env_value(&val, "MAAC_MODEL_CACHE_TTL_SECS")?;
            config.model_cache_ttl = Duration::from_secs(secs);
        }

        config.database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        config.redis_url = lookup("REDIS_URL").filter(|v| !v.trim().is_empty());

        if let Some(val) = lookup("MAAC_QUEUE_NAME") {
            config.queue_name = val;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_trial_workers(mut self, workers: usize) -> Self {
        self.trial_workers = workers;
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_provider_rpm(mut self, provider: impl Into<String>, rpm: u32) -> Self {
        self.provider_rpm.insert(provider.into(), rpm);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "generation_workers must be greater than 0".to_string(),
            ));
        }

        if self.trial_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "trial_workers must be greater than 0".to_string(),
            ));
        }

        if self.max_trial_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_trial_attempts must be at least 1".to_string(),
            ));
        }

        if self.trial_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "trial_timeout must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.failure_ceiling) {
            return Err(ConfigError::ValidationFailed(
                "failure_ceiling must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Rate limiter shared by every trial worker.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.requests_per_minute).with_limits(&self.provider_rpm)
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.trial_workers)
            .with_trial_timeout(self.trial_timeout)
            .with_retry_backoff(self.retry_backoff, self.retry_backoff.saturating_mul(32))
            .with_failure_ceiling(self.failure_ceiling, 10)
    }
}

/// Parses `provider=rpm,provider=rpm`.
fn parse_provider_rpm(value: &str) -> Result<HashMap<String, u32>, ConfigError> {
    let mut limits = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((provider, rpm)) = entry.split_once('=') else {
            return Err(ConfigError::InvalidValue {
                key: "MAAC_PROVIDER_RPM".to_string(),
                message: format!("expected provider=rpm, got '{}'", entry),
            });
        };
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "MAAC_PROVIDER_RPM".to_string(),
                message: format!("missing provider name in '{}'", entry),
            });
        }
        limits.insert(
            provider.to_string(),
            parse_env_value(rpm.trim(), "MAAC_PROVIDER_RPM")?,
        );
    }
    Ok(limits)
}

/// Parse an environment variable value into a specific type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
