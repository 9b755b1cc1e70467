//! Job definitions for the scheduler.
//!
//! - `GenerationJob`: a batch of scenarios produced by sweeping the indexer
//! - `TrialJob`: one scenario executed against one model under one config id
//! - `TrialResult`: the recorded outcome of a trial
//! - `ConfigId`: 12-bit capability mask for the cognitive engine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::scenario::{Domain, Tier};

/// Default maximum number of attempts for a trial.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Cognitive-engine capabilities, in config-id bit order.
pub const CAPABILITIES: [&str; 12] = [
    "working_memory",
    "episodic_memory",
    "semantic_memory",
    "tool_execution",
    "planning",
    "reflection",
    "self_critique",
    "knowledge_retrieval",
    "goal_tracking",
    "attention_control",
    "metacognition",
    "learning",
];

/// Which optional capabilities are enabled for a trial.
///
/// Exactly 12 characters of `0` or `1`; character `i` toggles
/// `CAPABILITIES[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigId(String);

impl ConfigId {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let valid = value.len() == CAPABILITIES.len() && value.chars().all(|c| c == '0' || c == '1');
        if !valid {
            return Err(ConfigError::InvalidConfigId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// All capabilities disabled.
    pub fn baseline() -> Self {
        Self("0".repeat(CAPABILITIES.len()))
    }

    /// All capabilities enabled.
    pub fn full() -> Self {
        Self("1".repeat(CAPABILITIES.len()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_enabled(&self, capability: &str) -> bool {
        CAPABILITIES
            .iter()
            .position(|c| *c == capability)
            .is_some_and(|i| self.0.as_bytes()[i] == b'1')
    }

    /// Enabled capability names in bit order.
    pub fn enabled_capabilities(&self) -> Vec<&'static str> {
        CAPABILITIES
            .iter()
            .zip(self.0.bytes())
            .filter(|(_, bit)| *bit == b'1')
            .map(|(name, _)| *name)
            .collect()
    }
}

impl Default for ConfigId {
    fn default() -> Self {
        Self::full()
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConfigId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ConfigId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConfigId> for String {
    fn from(id: ConfigId) -> Self {
        id.0
    }
}

/// Lifecycle of a generation job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl GenerationJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationJobStatus::Pending => "pending",
            GenerationJobStatus::Running => "running",
            GenerationJobStatus::Completed => "completed",
            GenerationJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationJobStatus::Completed | GenerationJobStatus::Failed
        )
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// A job may fail from any non-terminal state (configuration errors fail
    /// a pending job), and nothing returns to `pending`.
    pub fn can_transition_to(&self, next: GenerationJobStatus) -> bool {
        use GenerationJobStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }

    /// States from which `next` may be entered.
    pub fn predecessors(next: GenerationJobStatus) -> &'static [GenerationJobStatus] {
        use GenerationJobStatus::*;
        match next {
            Pending => &[],
            Running => &[Pending],
            Completed => &[Running],
            Failed => &[Pending, Running],
        }
    }
}

impl fmt::Display for GenerationJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GenerationJobStatus::Pending),
            "running" => Ok(GenerationJobStatus::Running),
            "completed" => Ok(GenerationJobStatus::Completed),
            "failed" => Ok(GenerationJobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Caller's request for a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub domains: Vec<String>,
    pub tiers: Vec<String>,
    pub repetitions: u32,
    pub provider: String,
    pub models: Vec<String>,
    pub config_id: String,
    /// Scenarios produced in parallel.
    pub concurrency: usize,
}

impl GenerationRequest {
    /// Creates a request over every domain and tier with one repetition.
    pub fn new(provider: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            domains: Domain::ALL.iter().map(|d| d.to_string()).collect(),
            tiers: Tier::ALL.iter().map(|t| t.to_string()).collect(),
            repetitions: 1,
            provider: provider.into(),
            models,
            config_id: ConfigId::full().to_string(),
            concurrency: 1,
        }
    }

    pub fn with_domains(mut self, domains: &[&str]) -> Self {
        self.domains = domains.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_tiers(mut self, tiers: &[&str]) -> Self {
        self.tiers = tiers.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = config_id.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Persisted record of a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub domains: Vec<Domain>,
    pub tiers: Vec<Tier>,
    pub repetitions: u32,
    pub provider: String,
    pub models: Vec<String>,
    pub config_id: ConfigId,
    pub concurrency: usize,
    pub status: GenerationJobStatus,
    pub total_scenarios: u64,
    pub generated_count: u64,
    pub stored_count: u64,
    pub failed_count: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub experiment_id: Uuid,
}

impl GenerationJob {
    /// Creates a pending job.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        domains: Vec<Domain>,
        tiers: Vec<Tier>,
        repetitions: u32,
        provider: impl Into<String>,
        models: Vec<String>,
        config_id: ConfigId,
        concurrency: usize,
        total_scenarios: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            domains,
            tiers,
            repetitions,
            provider: provider.into(),
            models,
            config_id,
            concurrency: concurrency.max(1),
            status: GenerationJobStatus::Pending,
            total_scenarios,
            generated_count: 0,
            stored_count: 0,
            failed_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
            experiment_id: Uuid::new_v4(),
        }
    }

    /// Index the sweep continues from.
    pub fn next_index(&self) -> u64 {
        self.stored_count + self.failed_count
    }

    /// Whether every position has been produced.
    pub fn is_exhausted(&self) -> bool {
        self.next_index() >= self.total_scenarios
    }

    pub fn counters(&self) -> JobCounters {
        JobCounters {
            total: self.total_scenarios,
            generated: self.generated_count,
            stored: self.stored_count,
            failed: self.failed_count,
        }
    }
}

/// Snapshot of a generation job's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub total: u64,
    pub generated: u64,
    pub stored: u64,
    pub failed: u64,
}

impl JobCounters {
    /// `generated == stored + failed` and `stored + failed <= total`.
    pub fn is_consistent(&self) -> bool {
        self.generated == self.stored + self.failed && self.stored + self.failed <= self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.stored + self.failed)
    }

    /// Fraction of produced scenarios that failed.
    pub fn failure_ratio(&self) -> f64 {
        if self.generated == 0 {
            return 0.0;
        }
        self.failed as f64 / self.generated as f64
    }
}

/// Outcome of one position, as applied to a job's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    Stored,
    Failed { reason: String },
}

/// State of a trial on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    /// Waiting for a retry backoff to elapse.
    Delayed,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Waiting => "waiting",
            TrialStatus::Active => "active",
            TrialStatus::Completed => "completed",
            TrialStatus::Failed => "failed",
            TrialStatus::Delayed => "delayed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialStatus::Completed | TrialStatus::Failed)
    }

    /// Legal trial moves. `Active -> Waiting` is the crash-recovery edge
    /// taken when a stalled trial is requeued.
    pub fn can_transition_to(&self, next: TrialStatus) -> bool {
        use TrialStatus::*;
        matches!(
            (self, next),
            (Waiting, Active)
                | (Active, Waiting)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Delayed)
                | (Delayed, Waiting)
                | (Delayed, Active)
        )
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scenario to execute against one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialJob {
    pub id: Uuid,
    pub scenario_id: String,
    pub provider: String,
    pub model: String,
    pub config_id: ConfigId,
    pub status: TrialStatus,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Earliest time a delayed trial may run again.
    #[serde(default)]
    pub available_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

impl TrialJob {
    pub fn new(
        scenario_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        config_id: ConfigId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scenario_id: scenario_id.into(),
            provider: provider.into(),
            model: model.into(),
            config_id,
            status: TrialStatus::Waiting,
            attempts_made: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
            available_at: None,
            failed_reason: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Called before each execution attempt.
    pub fn increment_attempts(&mut self) {
        self.attempts_made += 1;
    }

    pub fn should_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_made)
    }

    /// Moves to `next` if the transition is legal.
    pub fn transition(&mut self, next: TrialStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Whether a delayed trial's backoff has elapsed.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.available_at.map_or(true, |at| at <= now)
    }
}

/// Recorded outcome of a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub scenario_id: String,
    pub provider: String,
    pub model: String,
    pub config_id: ConfigId,
    pub status: TrialStatus,
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub attempts: u32,
    pub duration_ms: u64,
    pub failed_reason: Option<String>,
    pub worker_id: String,
    pub completed_at: DateTime<Utc>,
}

impl TrialResult {
    pub fn success(
        trial: &TrialJob,
        worker_id: impl Into<String>,
        content: String,
        metadata: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            trial_id: trial.id,
            scenario_id: trial.scenario_id.clone(),
            provider: trial.provider.clone(),
            model: trial.model.clone(),
            config_id: trial.config_id.clone(),
            status: TrialStatus::Completed,
            content: Some(content),
            metadata,
            attempts: trial.attempts_made,
            duration_ms,
            failed_reason: None,
            worker_id: worker_id.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn failure(
        trial: &TrialJob,
        worker_id: impl Into<String>,
        reason: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            trial_id: trial.id,
            scenario_id: trial.scenario_id.clone(),
            provider: trial.provider.clone(),
            model: trial.model.clone(),
            config_id: trial.config_id.clone(),
            status: TrialStatus::Failed,
            content: None,
            metadata: serde_json::Value::Null,
            attempts: trial.attempts_made,
            duration_ms,
            failed_reason: Some(reason.into()),
            worker_id: worker_id.into(),
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TrialStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_id_parsing() {
        let id = ConfigId::parse("101000000001").expect("valid id");
        assert_eq!(
            id.enabled_capabilities(),
            vec!["working_memory", "semantic_memory", "learning"]
        );
        assert!(id.is_enabled("semantic_memory"));
        assert!(!id.is_enabled("planning"));
        assert!(!id.is_enabled("telepathy"));

        assert!(ConfigId::parse("10100000000").is_err());
        assert!(ConfigId::parse("1010000000012").is_err());
        assert!(ConfigId::parse("10100000000x").is_err());
        assert_eq!(ConfigId::full().enabled_capabilities().len(), 12);
        assert!(ConfigId::baseline().enabled_capabilities().is_empty());
    }

    #[test]
    fn test_config_id_serde_rejects_malformed() {
        let id = ConfigId::parse("111100001111").expect("valid id");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"111100001111\"");
        let back: ConfigId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ConfigId>("\"12\"").is_err());
    }

    #[test]
    fn test_generation_status_is_monotonic() {
        use GenerationJobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));

        for next in [Pending, Running, Completed, Failed] {
            for from in GenerationJobStatus::predecessors(next) {
                assert!(from.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_job_counters() {
        let counters = JobCounters {
            total: 10,
            generated: 4,
            stored: 3,
            failed: 1,
        };
        assert!(counters.is_consistent());
        assert_eq!(counters.remaining(), 6);
        assert_eq!(counters.failure_ratio(), 0.25);

        let broken = JobCounters {
            total: 2,
            generated: 3,
            stored: 2,
            failed: 1,
        };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn test_generation_job_next_index() {
        let mut job = GenerationJob::new(
            vec![Domain::Analytical],
            vec![Tier::Simple],
            2,
            "openrouter",
            vec!["m1".to_string(), "m2".to_string()],
            ConfigId::full(),
            0,
            4,
        );
        assert_eq!(job.concurrency, 1);
        assert_eq!(job.status, GenerationJobStatus::Pending);
        job.stored_count = 2;
        job.failed_count = 1;
        job.generated_count = 3;
        assert_eq!(job.next_index(), 3);
        assert!(!job.is_exhausted());
        assert!(job.counters().is_consistent());
    }

    #[test]
    fn test_trial_job_retry_budget() {
        let mut trial = TrialJob::new("s-1", "openrouter", "m1", ConfigId::baseline())
            .with_max_attempts(2);
        assert!(trial.should_retry());
        trial.increment_attempts();
        assert_eq!(trial.remaining_attempts(), 1);
        trial.increment_attempts();
        assert!(!trial.should_retry());
    }

    #[test]
    fn test_trial_status_transitions() {
        let mut trial = TrialJob::new("s-1", "openrouter", "m1", ConfigId::baseline());
        assert!(!trial.transition(TrialStatus::Completed));
        assert!(trial.transition(TrialStatus::Active));
        assert!(trial.transition(TrialStatus::Delayed));
        assert!(trial.transition(TrialStatus::Waiting));
        assert!(!trial.transition(TrialStatus::Delayed));
        assert!(trial.transition(TrialStatus::Active));
        assert!(trial.transition(TrialStatus::Failed));
        assert!(!trial.transition(TrialStatus::Active));
        assert!(!trial.transition(TrialStatus::Waiting));
        assert!(trial.status.is_terminal());
    }

    #[test]
    fn test_trial_result_constructors() {
        let mut trial = TrialJob::new("s-9", "openrouter", "m1", ConfigId::full());
        trial.increment_attempts();

        let ok = TrialResult::success(
            &trial,
            "worker-1",
            "answer".to_string(),
            serde_json::json!({"tokens": 12}),
            40,
        );
        assert!(ok.is_success());
        assert_eq!(ok.attempts, 1);
        assert_eq!(ok.scenario_id, "s-9");

        let failed = TrialResult::failure(&trial, "worker-1", "bad request", 10);
        assert!(!failed.is_success());
        assert_eq!(failed.failed_reason.as_deref(), Some("bad request"));
        assert!(failed.content.is_none());
    }
}
