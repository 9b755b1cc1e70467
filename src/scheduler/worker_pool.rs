//! Worker pool executing trials from a [`TrialQueue`].
//!
//! Each worker runs as an independent async task: it dequeues a trial,
//! loads the scenario, renders the blind prompt, waits for a rate-limit slot
//! and invokes the provider under a timeout.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Graceful shutdown with broadcast channel
//! - Exponential backoff with jitter for retryable provider errors
//! - Dead letter queue for trials that fail for good
//! - Failure-ratio ceiling that stops the pool
//! - Pool statistics tracking

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngExt;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cancel::CancellationFlag;
use super::job::{TrialJob, TrialResult};
use super::queue::{QueueError, TrialQueue};
use super::rate_limit::RateLimiter;
use crate::error::LlmError;
use crate::llm::{render_trial_prompt, InvocationRequest, ProviderRegistry, TRIAL_SYSTEM_PROMPT};
use crate::metrics::MetricsCollector;
use crate::storage::{ForgeStore, StoreError};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Pool is already running")]
    AlreadyRunning,

    #[error("Pool is not running")]
    NotRunning,

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// Too many trials failed; the pool stopped taking work.
    #[error("Trial failure ratio {ratio:.2} exceeded ceiling {ceiling:.2}")]
    FailureCeilingExceeded { ratio: f64, ceiling: f64 },

    #[error("Pool was cancelled")]
    Cancelled,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// How long a dequeue waits when the queue is empty.
    pub poll_interval: Duration,
    /// Maximum time allowed for one provider call.
    pub trial_timeout: Duration,
    /// Delay before the first retry; doubled on each later attempt.
    pub retry_backoff: Duration,
    /// Upper bound for a single retry delay.
    pub max_backoff: Duration,
    /// Failed / finished ratio above which the pool stops.
    pub failure_ceiling: f64,
    /// Finished trials required before the ceiling is checked.
    pub ceiling_min_trials: u64,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            poll_interval: Duration::from_secs(1),
            trial_timeout: Duration::from_secs(120),
            retry_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            failure_ceiling: 0.5,
            ceiling_min_trials: 10,
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_trial_timeout(mut self, timeout: Duration) -> Self {
        self.trial_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_backoff = base;
        self.max_backoff = max.max(base);
        self
    }

    pub fn with_failure_ceiling(mut self, ceiling: f64, min_trials: u64) -> Self {
        self.failure_ceiling = ceiling;
        self.ceiling_min_trials = min_trials;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Delay before retrying after attempt number `attempt` (1-based),
    /// without jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub num_workers: usize,
    /// Workers currently executing a trial.
    pub active_workers: usize,
    pub trials_completed: u64,
    /// Trials that failed for good.
    pub trials_failed: u64,
    /// Attempts that were requeued with backoff.
    pub retries: u64,
    pub average_trial_duration: Duration,
}

impl PoolStats {
    /// Returns the number of trials that reached a final state.
    pub fn total_processed(&self) -> u64 {
        self.trials_completed + self.trials_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.trials_completed as f64 / total as f64) * 100.0
    }

    pub fn failure_ratio(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        self.trials_failed as f64 / total as f64
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    trials_completed: AtomicU64,
    trials_failed: AtomicU64,
    retries: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            trials_completed: AtomicU64::new(0),
            trials_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.trials_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.trials_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.trials_completed.load(Ordering::SeqCst);
        let failed = self.trials_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let active = self.active_workers.load(Ordering::SeqCst);

        let total = completed + failed;
        let average = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: active as usize,
            trials_completed: completed,
            trials_failed: failed,
            retries: self.retries.load(Ordering::SeqCst),
            average_trial_duration: average,
        }
    }
}

/// Everything a worker needs, shared by all workers of a pool.
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<dyn TrialQueue>,
    store: Arc<dyn ForgeStore>,
    providers: Arc<ProviderRegistry>,
    rate_limiter: Arc<RateLimiter>,
    cancel: CancellationFlag,
    stats: Arc<SharedPoolStats>,
    ceiling_tripped: Arc<AtomicBool>,
    config: WorkerPoolConfig,
    metrics: MetricsCollector,
}

impl WorkerContext {
    /// Trips the ceiling once enough trials failed.
    fn check_ceiling(&self) {
        let stats = self.stats.to_pool_stats(self.config.num_workers);
        if stats.total_processed() < self.config.ceiling_min_trials {
            return;
        }
        let ratio = stats.failure_ratio();
        if ratio > self.config.failure_ceiling
            && !self.ceiling_tripped.swap(true, Ordering::SeqCst)
        {
            error!(
                ratio = ratio,
                ceiling = self.config.failure_ceiling,
                failed = stats.trials_failed,
                "Trial failure ceiling exceeded, stopping workers"
            );
        }
    }
}

/// Pool of workers executing trials against model providers.
pub struct TrialWorkerPool {
    context: WorkerContext,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    is_running: AtomicBool,
}

impl TrialWorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<dyn TrialQueue>,
        store: Arc<dyn ForgeStore>,
        providers: Arc<ProviderRegistry>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        // Buffer size of 1 is sufficient since we only send once
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            context: WorkerContext {
                queue,
                store,
                providers,
                rate_limiter,
                cancel: CancellationFlag::new(),
                stats: Arc::new(SharedPoolStats::new()),
                ceiling_tripped: Arc::new(AtomicBool::new(false)),
                config,
                metrics: MetricsCollector::new(),
            },
            shutdown_tx,
            worker_handles: Vec::new(),
            is_running: AtomicBool::new(false),
        }
    }

    /// Uses `cancel` to abort in-flight provider calls and rate-limit waits.
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.context.cancel = cancel;
        self
    }

    /// Starts all workers in the pool.
    ///
    /// Trials left in processing by an earlier crash are requeued first.
    pub async fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        match self.context.queue.recover_processing().await {
            Ok(recovered) if recovered > 0 => {
                info!(recovered = recovered, "Recovered trials from processing queue");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to recover processing trials");
            }
        }

        let num_workers = self.context.config.num_workers;
        for i in 0..num_workers {
            let worker = Worker::new(
                format!("worker-{}", i),
                self.context.clone(),
                self.shutdown_tx.subscribe(),
            );

            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        self.context.metrics.update_workers(num_workers);
        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = num_workers, "Trial worker pool started");

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// Workers finish the trial they hold before stopping.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");

        // Ignore send error - workers may have already stopped
        let _ = self.shutdown_tx.send(());

        let shutdown_future = async {
            for handle in self.worker_handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        let timeout = self.context.config.shutdown_timeout;
        let outcome = tokio::time::timeout(timeout, shutdown_future).await;
        self.is_running.store(false, Ordering::SeqCst);
        self.context.metrics.update_workers(0);

        match outcome {
            Ok(()) => {
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => Err(PoolError::ShutdownTimeout(timeout)),
        }
    }

    /// Starts the pool if needed and runs until the queue holds no pending,
    /// processing or delayed trials, then shuts down.
    ///
    /// Stops early with an error when the failure ceiling trips or the pool
    /// is cancelled.
    pub async fn run_until_drained(&mut self) -> Result<PoolStats, PoolError> {
        if !self.is_running() {
            self.start().await?;
        }

        let outcome = loop {
            if self.context.cancel.is_cancelled() {
                break Err(PoolError::Cancelled);
            }
            if self.ceiling_exceeded() {
                let stats = self.stats();
                break Err(PoolError::FailureCeilingExceeded {
                    ratio: stats.failure_ratio(),
                    ceiling: self.context.config.failure_ceiling,
                });
            }

            match self.context.queue.stats().await {
                Ok(queue_stats) => {
                    self.context
                        .metrics
                        .update_queue_depth(&queue_stats.queue_name, queue_stats.pending as u64);
                    if queue_stats.is_drained() {
                        break Ok(());
                    }
                }
                Err(e) => warn!(error = %e, "Failed to read queue stats"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.context.config.poll_interval) => {}
                _ = self.context.cancel.cancelled() => {}
            }
        };

        self.shutdown().await?;
        outcome.map(|()| self.stats())
    }

    pub fn stats(&self) -> PoolStats {
        self.context
            .stats
            .to_pool_stats(self.context.config.num_workers)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Whether the failure ratio has crossed the configured ceiling.
    pub fn ceiling_exceeded(&self) -> bool {
        self.context.ceiling_tripped.load(Ordering::SeqCst)
    }

    pub fn num_workers(&self) -> usize {
        self.context.config.num_workers
    }

    pub fn queue(&self) -> &Arc<dyn TrialQueue> {
        &self.context.queue
    }
}

/// Why one attempt of a trial did not produce an answer.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error("Scenario {0} not found")]
    MissingScenario(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Trial cancelled")]
    Cancelled,
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Provider(e) => e.is_retryable(),
            AttemptError::Store(_) => true,
            AttemptError::MissingScenario(_) | AttemptError::Cancelled => false,
        }
    }
}

/// A single worker that processes trials from the queue.
struct Worker {
    id: String,
    context: WorkerContext,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Worker {
    fn new(id: String, context: WorkerContext, shutdown_rx: broadcast::Receiver<()>) -> Self {
        Self {
            id,
            context,
            shutdown_rx,
        }
    }

    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            if self.context.cancel.is_cancelled()
                || self.context.ceiling_tripped.load(Ordering::SeqCst)
            {
                // Stop taking work but stay alive until shutdown.
                tokio::time::sleep(self.context.config.poll_interval).await;
                continue;
            }

            match self.context.queue.dequeue(self.context.config.poll_interval).await {
                Ok(Some(trial)) => self.process_trial(trial).await,
                Ok(None) => debug!(worker_id = %self.id, "No trials available"),
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue trial");
                    tokio::time::sleep(self.context.config.poll_interval).await;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process_trial(&self, mut trial: TrialJob) {
        let start_time = Instant::now();
        trial.increment_attempts();

        info!(
            worker_id = %self.id,
            trial_id = %trial.id,
            scenario_id = %trial.scenario_id,
            provider = %trial.provider,
            model = %trial.model,
            attempt = trial.attempts_made,
            "Processing trial"
        );

        self.context.stats.increment_active();
        let outcome = self.execute(&trial).await;
        self.context.stats.decrement_active();
        let duration = start_time.elapsed();
        let duration_ms = duration.as_millis() as u64;

        match outcome {
            Ok(invocation) => {
                let result = TrialResult::success(
                    &trial,
                    &self.id,
                    invocation.content,
                    invocation.metadata,
                    duration_ms,
                );
                self.finish(&trial, &result).await;
                self.context.stats.record_completion(duration);
                self.context.metrics.record_trial(&trial.provider, "completed");
                info!(
                    worker_id = %self.id,
                    trial_id = %trial.id,
                    duration_ms = duration_ms,
                    "Trial completed"
                );
            }
            Err(AttemptError::Cancelled) => {
                // The answer, if any, is discarded; the attempt does not count.
                trial.attempts_made = trial.attempts_made.saturating_sub(1);
                info!(worker_id = %self.id, trial_id = %trial.id, "Trial cancelled, requeueing");
                if let Err(e) = self.context.queue.retry_later(trial, Duration::ZERO).await {
                    error!(worker_id = %self.id, error = %e, "Failed to requeue cancelled trial");
                }
            }
            Err(e) if e.is_retryable() && trial.should_retry() => {
                let delay = self.retry_delay(trial.attempts_made);
                self.context.stats.record_retry();
                warn!(
                    worker_id = %self.id,
                    trial_id = %trial.id,
                    error = %e,
                    remaining_attempts = trial.remaining_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Trial failed, retrying with backoff"
                );
                let trial_id = trial.id;
                if let Err(requeue_err) = self.context.queue.retry_later(trial, delay).await {
                    error!(
                        worker_id = %self.id,
                        trial_id = %trial_id,
                        error = %requeue_err,
                        "Failed to requeue trial"
                    );
                }
            }
            Err(e) => {
                let reason = e.to_string();
                error!(
                    worker_id = %self.id,
                    trial_id = %trial.id,
                    error = %reason,
                    attempts = trial.attempts_made,
                    "Trial failed, moving to dead letter queue"
                );
                let result = TrialResult::failure(&trial, &self.id, reason.clone(), duration_ms);
                if let Err(store_err) = self.context.store.save_trial_result(&result).await {
                    error!(worker_id = %self.id, error = %store_err, "Failed to save trial result");
                }
                if let Err(dlq_err) = self.context.queue.dead_letter(trial.clone(), &reason).await {
                    error!(
                        worker_id = %self.id,
                        trial_id = %trial.id,
                        error = %dlq_err,
                        "Failed to move trial to dead letter queue"
                    );
                }
                self.context.stats.record_failure(duration);
                self.context.metrics.record_trial(&trial.provider, "failed");
                self.context.check_ceiling();
            }
        }
    }

    /// One attempt: load, render, wait for a slot, invoke.
    async fn execute(&self, trial: &TrialJob) -> Result<crate::llm::Invocation, AttemptError> {
        let scenario = self
            .context
            .store
            .find_scenario(&trial.scenario_id)
            .await?
            .ok_or_else(|| AttemptError::MissingScenario(trial.scenario_id.clone()))?;

        let provider = self.context.providers.get(&trial.provider)?;
        let prompt = render_trial_prompt(&scenario, &trial.config_id)?;
        let request = InvocationRequest::new(&trial.model, prompt, trial.config_id.clone())
            .with_system_prompt(TRIAL_SYSTEM_PROMPT);

        let cancel = &self.context.cancel;
        if self
            .context
            .rate_limiter
            .acquire(&trial.provider, Some(cancel))
            .await
            .is_none()
        {
            return Err(AttemptError::Cancelled);
        }

        let timeout = self.context.config.trial_timeout;
        let started = Instant::now();
        let invocation = tokio::select! {
            outcome = tokio::time::timeout(timeout, provider.invoke(request)) => match outcome {
                Ok(result) => result?,
                Err(_) => {
                    return Err(LlmError::Timeout {
                        seconds: timeout.as_secs(),
                    }
                    .into())
                }
            },
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
        };
        self.context
            .metrics
            .record_provider_latency(&trial.provider, started.elapsed());

        Ok(invocation)
    }

    async fn finish(&self, trial: &TrialJob, result: &TrialResult) {
        if let Err(e) = self.context.store.save_trial_result(result).await {
            error!(
                worker_id = %self.id,
                trial_id = %trial.id,
                error = %e,
                "Failed to save trial result"
            );
        }
        if let Err(e) = self.context.queue.complete(trial, result).await {
            error!(
                worker_id = %self.id,
                trial_id = %trial.id,
                error = %e,
                "Failed to mark trial complete"
            );
        }
    }

    /// Exponential backoff plus up to 25% random jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.context.config.backoff_for(attempt);
        let jitter_ms = (base.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Invocation, ModelInfo, ModelProvider};
    use crate::scenario::{Domain, Position, ScenarioGenerator, ScenarioSource, Tier};
    use crate::scheduler::job::{ConfigId, TrialStatus};
    use crate::scheduler::queue::MemoryTrialQueue;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays scripted results, then answers "ok".
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<Invocation, LlmError>>>,
        calls: AtomicU64,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Invocation, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU64::new(0),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn invoke(&self, request: InvocationRequest) -> Result<Invocation, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().expect("script").pop_front();
            next.unwrap_or_else(|| {
                Ok(Invocation {
                    content: format!("answer from {}", request.model),
                    metadata: serde_json::json!({"model": request.model}),
                })
            })
        }

        async fn fetch_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
            Ok(vec![ModelInfo::new("m1")])
        }
    }

    struct Harness {
        queue: Arc<MemoryTrialQueue>,
        store: Arc<MemoryStore>,
        provider: Arc<ScriptedProvider>,
        pool: TrialWorkerPool,
        scenario_id: String,
    }

    async fn harness(script: Vec<Result<Invocation, LlmError>>, config: WorkerPoolConfig) -> Harness {
        let queue = Arc::new(MemoryTrialQueue::new("test"));
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(script));

        let scenario = ScenarioGenerator::new(Uuid::nil())
            .render(&Position::new(Domain::Planning, Tier::Moderate, 1, "m1"), &[])
            .expect("render");
        store.create_scenario(&scenario).await.expect("store");

        let registry = ProviderRegistry::new().with_provider(provider.clone());
        let pool = TrialWorkerPool::new(
            config,
            queue.clone(),
            store.clone(),
            Arc::new(registry),
            Arc::new(RateLimiter::new(0)),
        );

        Harness {
            queue,
            store,
            provider,
            pool,
            scenario_id: scenario.scenario_id,
        }
    }

    fn config() -> WorkerPoolConfig {
        WorkerPoolConfig::new(2)
            .with_poll_interval(Duration::from_millis(50))
            .with_retry_backoff(Duration::from_millis(100), Duration::from_secs(1))
            .with_failure_ceiling(1.0, 1)
    }

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();

        assert_eq!(config.num_workers, 4);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.trial_timeout, Duration::from_secs(120));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = WorkerPoolConfig::new(1)
            .with_retry_backoff(Duration::from_millis(100), Duration::from_millis(350));

        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
        assert_eq!(config.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_pool_stats_calculations() {
        let stats = PoolStats {
            num_workers: 4,
            active_workers: 2,
            trials_completed: 80,
            trials_failed: 20,
            retries: 5,
            average_trial_duration: Duration::from_secs(60),
        };

        assert_eq!(stats.total_processed(), 100);
        assert!((stats.success_rate() - 80.0).abs() < f64::EPSILON);
        assert!((stats.failure_ratio() - 0.2).abs() < f64::EPSILON);
        assert_eq!(PoolStats::default().failure_ratio(), 0.0);
    }

    #[test]
    fn test_shared_pool_stats() {
        let stats = SharedPoolStats::new();

        stats.record_completion(Duration::from_secs(10));
        stats.record_completion(Duration::from_secs(20));
        stats.record_failure(Duration::from_secs(5));
        stats.record_retry();
        stats.increment_active();

        let pool_stats = stats.to_pool_stats(4);
        assert_eq!(pool_stats.trials_completed, 2);
        assert_eq!(pool_stats.trials_failed, 1);
        assert_eq!(pool_stats.retries, 1);
        assert_eq!(pool_stats.active_workers, 1);
        assert!(pool_stats.average_trial_duration.as_millis() > 11000);
        assert!(pool_stats.average_trial_duration.as_millis() < 12000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_trial_is_recorded() {
        let mut h = harness(vec![], config()).await;
        let trial = TrialJob::new(&h.scenario_id, "mock", "m1", ConfigId::full());
        let trial_id = trial.id;
        h.queue.enqueue(trial).await.expect("enqueue");

        let stats = h.pool.run_until_drained().await.expect("drained");
        assert_eq!(stats.trials_completed, 1);
        assert!(!h.pool.is_running());

        let results = h.store.find_trial_results(Some(&h.scenario_id)).await.expect("find");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].trial_id, trial_id);
        assert_eq!(results[0].status, TrialStatus::Completed);
        assert_eq!(results[0].content.as_deref(), Some("answer from m1"));
        assert_eq!(results[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_is_retried_with_backoff() {
        let script = vec![
            Err(LlmError::RateLimited("slow down".to_string())),
            Err(LlmError::ApiError {
                code: 503,
                message: "unavailable".to_string(),
            }),
        ];
        let mut h = harness(script, config()).await;
        let trial = TrialJob::new(&h.scenario_id, "mock", "m1", ConfigId::full()).with_max_attempts(3);
        h.queue.enqueue(trial).await.expect("enqueue");

        let stats = h.pool.run_until_drained().await.expect("drained");
        assert_eq!(stats.trials_completed, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(h.provider.calls(), 3);

        let results = h.store.find_trial_results(None).await.expect("find");
        assert_eq!(results[0].attempts, 3);
        assert!(results[0].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_without_retry() {
        let script = vec![Err(LlmError::ApiError {
            code: 400,
            message: "bad request".to_string(),
        })];
        let mut h = harness(script, config()).await;
        let trial = TrialJob::new(&h.scenario_id, "mock", "m1", ConfigId::full()).with_max_attempts(5);
        h.queue.enqueue(trial).await.expect("enqueue");

        let stats = h.pool.run_until_drained().await.expect("drained");
        assert_eq!(stats.trials_failed, 1);
        assert_eq!(stats.retries, 0);
        assert_eq!(h.provider.calls(), 1);

        let dead = h.queue.dead_letters().expect("dead letters");
        assert_eq!(dead.len(), 1);
        assert!(dead[0].1.contains("bad request"));

        let results = h.store.find_trial_results(None).await.expect("find");
        assert_eq!(results[0].status, TrialStatus::Failed);
        assert!(results[0].failed_reason.as_deref().unwrap_or_default().contains("400"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_at_max_attempts() {
        let script = (0..5)
            .map(|_| Err(LlmError::RequestFailed("connection reset".to_string())))
            .collect();
        let mut h = harness(script, config()).await;
        let trial = TrialJob::new(&h.scenario_id, "mock", "m1", ConfigId::full()).with_max_attempts(2);
        h.queue.enqueue(trial).await.expect("enqueue");

        let stats = h.pool.run_until_drained().await.expect("drained");
        assert_eq!(stats.trials_failed, 1);
        assert_eq!(stats.retries, 1);
        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_scenario_is_not_retried() {
        let mut h = harness(vec![], config()).await;
        let trial = TrialJob::new("no-such-scenario", "mock", "m1", ConfigId::full());
        h.queue.enqueue(trial).await.expect("enqueue");

        let stats = h.pool.run_until_drained().await.expect("drained");
        assert_eq!(stats.trials_failed, 1);
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_ceiling_stops_pool() {
        let script = (0..10)
            .map(|_| {
                Err(LlmError::ApiError {
                    code: 401,
                    message: "unauthorized".to_string(),
                })
            })
            .collect();
        let config = WorkerPoolConfig::new(1)
            .with_poll_interval(Duration::from_millis(50))
            .with_failure_ceiling(0.5, 2);
        let mut h = harness(script, config).await;
        for _ in 0..6 {
            let trial = TrialJob::new(&h.scenario_id, "mock", "m1", ConfigId::full());
            h.queue.enqueue(trial).await.expect("enqueue");
        }

        let err = h.pool.run_until_drained().await.expect_err("ceiling");
        assert!(matches!(err, PoolError::FailureCeilingExceeded { .. }));
        assert!(h.pool.ceiling_exceeded());
        let queue_stats = h.queue.stats().await.expect("stats");
        assert!(queue_stats.pending > 0, "pool kept taking work");
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_twice() {
        let mut h = harness(vec![], config()).await;
        h.pool.start().await.expect("start");
        assert!(matches!(h.pool.start().await, Err(PoolError::AlreadyRunning)));
        h.pool.shutdown().await.expect("shutdown");
        assert!(matches!(h.pool.shutdown().await, Err(PoolError::NotRunning)));
    }

    #[test]
    fn test_pool_error_display() {
        assert!(PoolError::AlreadyRunning.to_string().contains("already running"));
        assert!(PoolError::ShutdownTimeout(Duration::from_secs(60))
            .to_string()
            .contains("60"));
        let err = PoolError::FailureCeilingExceeded {
            ratio: 0.75,
            ceiling: 0.5,
        };
        assert!(err.to_string().contains("0.75"));
    }
}
