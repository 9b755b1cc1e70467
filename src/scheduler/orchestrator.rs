//! Generation job lifecycle.
//!
//! A [`JobOrchestrator`] turns a [`GenerationRequest`] into a persisted
//! [`GenerationJob`] and runs its sweep on a background task:
//!
//! ```text
//! pending ──▶ running ──▶ completed
//!                │
//!                └──────▶ failed   (job-level error or cancel)
//! ```
//!
//! Pausing is a flag next to the status, not a status of its own. A paused
//! job stops launching new positions, lets in-flight ones finish and keeps
//! `status = running`. Resuming continues from `stored + failed`.
//!
//! Positions are validated on the blocking pool, up to `concurrency` at a
//! time, and persisted strictly in index order, so the event stream of a
//! job follows production order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cancel::CancellationFlag;
use super::events::JobEvent;
use super::job::{
    ConfigId, GenerationJob, GenerationJobStatus, GenerationRequest, ScenarioOutcome, TrialJob,
};
use super::queue::{QueueError, TrialQueue};
use crate::complexity::{generate_validated, ComplexityValidator, RegenerationOutcome};
use crate::error::{ConfigError, LlmError};
use crate::llm::ModelCatalog;
use crate::metrics::MetricsCollector;
use crate::scenario::{IndexerConfig, Position, ScenarioGenerator, ScenarioIndexer, ScenarioSource};
use crate::storage::{ForgeStore, JobFilter, ScenarioFilter, StoreError};

/// Last error recorded on a job cancelled through [`JobOrchestrator::cancel`].
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Errors returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Job {id} is already {status}")]
    JobAlreadyTerminal {
        id: Uuid,
        status: GenerationJobStatus,
    },

    #[error("Job {0} is not paused")]
    JobNotPaused(Uuid),

    #[error("Job {0} is not running")]
    JobNotRunning(Uuid),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Model check failed: {0}")]
    Model(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Builds the scenario source for a job.
pub type SourceFactory = Arc<dyn Fn(&GenerationJob) -> Arc<dyn ScenarioSource> + Send + Sync>;

/// Control handles of one job that has a live or paused runner.
#[derive(Clone)]
struct JobControl {
    paused: Arc<AtomicBool>,
    cancel: CancellationFlag,
    events: mpsc::UnboundedSender<JobEvent>,
    /// Flips to `true` when the current runner task exits.
    runner_done: watch::Receiver<bool>,
}

impl JobControl {
    fn emit(&self, event: JobEvent) {
        // The caller may have dropped the receiver; the job keeps going.
        let _ = self.events.send(event);
    }

    async fn wait_for_runner(&self) {
        let mut done = self.runner_done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Registry of jobs that have a runner or are paused.
///
/// Passed to the orchestrator rather than held globally, so several
/// orchestrators can run side by side in one process.
#[derive(Default)]
pub struct RunningJobs {
    jobs: Mutex<HashMap<Uuid, JobControl>>,
}

impl RunningJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobControl>> {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn insert(&self, id: Uuid, control: JobControl) {
        self.lock().insert(id, control);
    }

    fn get(&self, id: Uuid) -> Option<JobControl> {
        self.lock().get(&id).cloned()
    }

    fn remove(&self, id: Uuid) -> Option<JobControl> {
        self.lock().remove(&id)
    }

    /// Hands a paused job to a new runner. Succeeds only while the job is
    /// paused and its previous runner has exited, so at most one caller
    /// wins and no two runners sweep the same job.
    fn claim_runner(&self, id: Uuid, runner_done: watch::Receiver<bool>) -> Option<JobControl> {
        let mut jobs = self.lock();
        let control = jobs.get_mut(&id)?;
        if !control.paused.load(Ordering::SeqCst) || !*control.runner_done.borrow() {
            return None;
        }
        control.runner_done = runner_done;
        control.paused.store(false, Ordering::SeqCst);
        Some(control.clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn is_paused(&self, id: Uuid) -> bool {
        self.lock()
            .get(&id)
            .is_some_and(|c| c.paused.load(Ordering::SeqCst))
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Caller's side of a started job.
pub struct GenerationHandle {
    pub job_id: Uuid,
    pub events: mpsc::UnboundedReceiver<JobEvent>,
}

impl GenerationHandle {
    /// Events as a `Stream`, ending when the job's runner and orchestrator
    /// entry are gone.
    pub fn into_stream(self) -> UnboundedReceiverStream<JobEvent> {
        UnboundedReceiverStream::new(self.events)
    }
}

/// Sends `true` on drop, so waiters wake even if the runner panics.
struct RunnerGuard(watch::Sender<bool>);

impl Drop for RunnerGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Runs generation jobs against a store.
pub struct JobOrchestrator {
    store: Arc<dyn ForgeStore>,
    running: Arc<RunningJobs>,
    validator: Arc<ComplexityValidator>,
    sources: SourceFactory,
    catalog: Option<Arc<ModelCatalog>>,
    metrics: MetricsCollector,
}

impl JobOrchestrator {
    pub fn new(store: Arc<dyn ForgeStore>, running: Arc<RunningJobs>) -> Self {
        Self {
            store,
            running,
            validator: Arc::new(ComplexityValidator::default()),
            sources: Arc::new(|job: &GenerationJob| {
                Arc::new(ScenarioGenerator::new(job.experiment_id)) as Arc<dyn ScenarioSource>
            }),
            catalog: None,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_validator(mut self, validator: ComplexityValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Replaces the default [`ScenarioGenerator`] source.
    pub fn with_source_factory(mut self, sources: SourceFactory) -> Self {
        self.sources = sources;
        self
    }

    /// Checks requested models against the provider's model list before a
    /// job is created.
    pub fn with_model_catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn running_jobs(&self) -> &Arc<RunningJobs> {
        &self.running
    }

    /// Validates the request, persists a job and starts its sweep.
    ///
    /// Configuration errors surface here, before any index is computed or
    /// any record is written.
    pub async fn start_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationHandle, OrchestratorError> {
        let indexer_config = IndexerConfig::parse(
            &request.domains,
            &request.tiers,
            request.repetitions,
            request.models.clone(),
        )?;
        let config_id = ConfigId::parse(&request.config_id)?;
        if let Some(catalog) = &self.catalog {
            for model in indexer_config.models() {
                catalog.ensure_model(&request.provider, model).await?;
            }
        }

        let indexer = ScenarioIndexer::new(indexer_config);
        let job = GenerationJob::new(
            indexer.config().domains().to_vec(),
            indexer.config().tiers().to_vec(),
            indexer.config().repetitions(),
            request.provider.clone(),
            indexer.config().models().to_vec(),
            config_id,
            request.concurrency,
            indexer.total(),
        );
        self.store.create_job(&job).await?;
        let job = self
            .store
            .transition_job(job.id, GenerationJobStatus::Running, None)
            .await?;

        info!(
            job_id = %job.id,
            experiment_id = %job.experiment_id,
            total = job.total_scenarios,
            concurrency = job.concurrency,
            "Generation job started"
        );
        self.metrics.inc_jobs_in_progress();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        let control = JobControl {
            paused: Arc::new(AtomicBool::new(false)),
            cancel: CancellationFlag::new(),
            events: events_tx,
            runner_done: done_rx,
        };
        control.emit(JobEvent::progress(format!(
            "Starting generation of {} scenarios",
            job.total_scenarios
        )));
        self.running.insert(job.id, control.clone());
        self.spawn_runner(job.clone(), control, done_tx);

        Ok(GenerationHandle {
            job_id: job.id,
            events: events_rx,
        })
    }

    /// Stops launching new positions. In-flight positions finish and are
    /// persisted before this returns.
    pub async fn pause(&self, id: Uuid) -> Result<GenerationJob, OrchestratorError> {
        let job = self.job(id).await?;
        ensure_not_terminal(&job)?;
        let control = self
            .running
            .get(id)
            .ok_or(OrchestratorError::JobNotRunning(id))?;

        control.paused.store(true, Ordering::SeqCst);
        control.wait_for_runner().await;
        self.job(id).await
    }

    /// Continues a paused job from `stored + failed`.
    ///
    /// If the pause is still draining in-flight positions, this waits for
    /// them to be persisted before reading where to continue from.
    pub async fn resume(&self, id: Uuid) -> Result<GenerationJob, OrchestratorError> {
        let job = self.job(id).await?;
        ensure_not_terminal(&job)?;
        let control = self
            .running
            .get(id)
            .filter(|c| c.paused.load(Ordering::SeqCst))
            .ok_or(OrchestratorError::JobNotPaused(id))?;
        control.wait_for_runner().await;

        let job = self.job(id).await?;
        ensure_not_terminal(&job)?;
        let (done_tx, done_rx) = watch::channel(false);
        let control = self
            .running
            .claim_runner(id, done_rx)
            .ok_or(OrchestratorError::JobNotPaused(id))?;

        info!(job_id = %id, next_index = job.next_index(), "Generation job resumed");
        control.emit(JobEvent::progress(format!(
            "Resuming at scenario {} of {}",
            job.next_index() + 1,
            job.total_scenarios
        )));
        self.spawn_runner(job.clone(), control, done_tx);
        Ok(job)
    }

    /// Fails the job with `"cancelled by user"` and stops its runner.
    ///
    /// Validation in flight observes the signal between attempts; its result
    /// is discarded.
    pub async fn cancel(&self, id: Uuid) -> Result<GenerationJob, OrchestratorError> {
        let job = self.job(id).await?;
        ensure_not_terminal(&job)?;

        let control = self.running.get(id);
        if let Some(control) = &control {
            control.cancel.cancel();
        }

        let job = match self
            .store
            .transition_job(id, GenerationJobStatus::Failed, Some(CANCELLED_BY_USER))
            .await
        {
            Ok(job) => job,
            Err(StoreError::InvalidTransition { from, .. }) => {
                return Err(OrchestratorError::JobAlreadyTerminal { id, status: from })
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(control) = control {
            control.wait_for_runner().await;
            control.emit(JobEvent::error(CANCELLED_BY_USER));
            self.running.remove(id);
        }
        self.metrics.dec_jobs_in_progress();
        warn!(job_id = %id, "Generation job cancelled");
        Ok(job)
    }

    /// Waits for the job's current runner to stop and returns the job.
    ///
    /// Returns at once for jobs without a runner, including paused ones.
    pub async fn wait(&self, id: Uuid) -> Result<GenerationJob, OrchestratorError> {
        if let Some(control) = self.running.get(id) {
            control.wait_for_runner().await;
        }
        self.job(id).await
    }

    pub async fn job(&self, id: Uuid) -> Result<GenerationJob, OrchestratorError> {
        self.store
            .find_job(id)
            .await?
            .ok_or(OrchestratorError::JobNotFound(id))
    }

    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
    ) -> Result<Vec<GenerationJob>, OrchestratorError> {
        Ok(self.store.find_jobs(filter).await?)
    }

    pub fn is_paused(&self, id: Uuid) -> bool {
        self.running.is_paused(id)
    }

    /// Enqueues one trial per stored scenario of the job.
    pub async fn schedule_trials(
        &self,
        id: Uuid,
        queue: &dyn TrialQueue,
        max_attempts: u32,
    ) -> Result<usize, OrchestratorError> {
        let job = self.job(id).await?;
        let scenarios = self
            .store
            .find_scenarios(&ScenarioFilter::new().for_experiment(job.experiment_id))
            .await?;

        let trials: Vec<TrialJob> = scenarios
            .iter()
            .map(|scenario| {
                TrialJob::new(
                    &scenario.scenario_id,
                    &job.provider,
                    &scenario.model,
                    job.config_id.clone(),
                )
                .with_max_attempts(max_attempts)
            })
            .collect();
        let count = trials.len();
        queue.enqueue_batch(trials).await?;

        info!(job_id = %id, trials = count, provider = %job.provider, "Trials scheduled");
        Ok(count)
    }

    fn spawn_runner(&self, job: GenerationJob, control: JobControl, done: watch::Sender<bool>) {
        let runner = JobRunner {
            source: (self.sources)(&job),
            store: Arc::clone(&self.store),
            running: Arc::clone(&self.running),
            validator: Arc::clone(&self.validator),
            metrics: self.metrics,
            control,
        };
        tokio::spawn(async move {
            let _guard = RunnerGuard(done);
            runner.run(job).await;
        });
    }
}

fn ensure_not_terminal(job: &GenerationJob) -> Result<(), OrchestratorError> {
    if job.status.is_terminal() {
        return Err(OrchestratorError::JobAlreadyTerminal {
            id: job.id,
            status: job.status,
        });
    }
    Ok(())
}

/// How a runner pass ended.
enum RunnerExit {
    Exhausted,
    Paused,
    Cancelled,
}

/// One pass of a job's sweep, from `next_index` until the end, a pause or
/// a cancel.
struct JobRunner {
    source: Arc<dyn ScenarioSource>,
    store: Arc<dyn ForgeStore>,
    running: Arc<RunningJobs>,
    validator: Arc<ComplexityValidator>,
    metrics: MetricsCollector,
    control: JobControl,
}

impl JobRunner {
    async fn run(self, job: GenerationJob) {
        let job_id = job.id;
        match self.sweep(&job).await {
            Ok(RunnerExit::Exhausted) => self.complete(job_id).await,
            Ok(RunnerExit::Paused) => self.report_pause(job_id).await,
            Ok(RunnerExit::Cancelled) => {
                debug!(job_id = %job_id, "Runner stopped for cancel");
            }
            Err(e) => self.fail(job_id, &e.to_string()).await,
        }
    }

    async fn sweep(&self, job: &GenerationJob) -> Result<RunnerExit, OrchestratorError> {
        let indexer = ScenarioIndexer::new(IndexerConfig::new(
            job.domains.clone(),
            job.tiers.clone(),
            job.repetitions,
            job.models.clone(),
        )?);
        let start = job.next_index();
        let total = indexer.total();

        let paused = Arc::clone(&self.control.paused);
        let cancel = self.control.cancel.clone();
        let gate_cancel = cancel.clone();
        let source = Arc::clone(&self.source);
        let validator = Arc::clone(&self.validator);

        // The `take_while` gate is evaluated each time a slot frees up, so a
        // pause or cancel stops new launches while in-flight work drains.
        let launches = (start..total)
            .filter_map(move |index| indexer.position_at(index).map(|p| (index, p)))
            .take_while(move |_| !paused.load(Ordering::SeqCst) && !gate_cancel.is_cancelled())
            .map(move |(index, position)| {
                let source = Arc::clone(&source);
                let validator = Arc::clone(&validator);
                let cancel = cancel.clone();
                async move {
                    let task_position = position.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        generate_validated(&*source, &validator, &task_position, Some(&cancel))
                    })
                    .await;
                    (index, position, outcome)
                }
            });

        let mut results = stream::iter(launches).buffered(job.concurrency.max(1));
        let mut next_expected = start;

        while let Some((index, position, outcome)) = results.next().await {
            if self.control.cancel.is_cancelled() {
                return Ok(RunnerExit::Cancelled);
            }

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(job_id = %job.id, index, error = %join_error, "Validation task failed");
                    RegenerationOutcome::Failed {
                        error: crate::error::GenerationError::Composition(join_error.to_string()),
                        attempts: 0,
                    }
                }
            };

            if !self.persist(job, index, &position, outcome).await? {
                return Ok(RunnerExit::Cancelled);
            }
            next_expected = index + 1;
        }

        if self.control.cancel.is_cancelled() {
            return Ok(RunnerExit::Cancelled);
        }
        if next_expected < total {
            return Ok(RunnerExit::Paused);
        }
        Ok(RunnerExit::Exhausted)
    }

    /// Applies one position's outcome. Returns `false` when the position
    /// was cancelled mid-validation and nothing was recorded.
    async fn persist(
        &self,
        job: &GenerationJob,
        index: u64,
        position: &Position,
        outcome: RegenerationOutcome,
    ) -> Result<bool, OrchestratorError> {
        let domain = position.domain.as_str();
        let tier = position.tier.as_str();

        let (record, accepted) = match outcome {
            RegenerationOutcome::Accepted { scenario, attempts } => {
                match self.store.create_scenario(&scenario).await {
                    Ok(()) => (ScenarioOutcome::Stored, Some((scenario, attempts))),
                    Err(StoreError::Duplicate(_)) => {
                        warn!(
                            job_id = %job.id,
                            scenario_id = %scenario.scenario_id,
                            "Scenario already stored, counting it as stored"
                        );
                        (ScenarioOutcome::Stored, Some((scenario, attempts)))
                    }
                    Err(StoreError::InvalidRecord(reason)) => {
                        (ScenarioOutcome::Failed { reason }, None)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            RegenerationOutcome::Failed { error, attempts } => {
                warn!(
                    job_id = %job.id,
                    index,
                    position = %position,
                    attempts,
                    error = %error,
                    "Scenario generation failed"
                );
                (
                    ScenarioOutcome::Failed {
                        reason: format!("{}: {}", position.scenario_id(), error),
                    },
                    None,
                )
            }
            RegenerationOutcome::Cancelled { .. } => return Ok(false),
        };

        let counters = self.store.record_outcome(job.id, &record).await?;

        match (&record, accepted) {
            (ScenarioOutcome::Stored, Some((scenario, attempts))) => {
                self.metrics.record_scenario("stored", domain, tier);
                info!(
                    job_id = %job.id,
                    index,
                    scenario_id = %scenario.scenario_id,
                    attempts,
                    "Scenario stored"
                );
                self.control.emit(JobEvent::progress(format!(
                    "Generated scenario {} of {} ({} {}, attempt {})",
                    index + 1,
                    counters.total,
                    domain,
                    tier,
                    attempts
                )));
                self.control.emit(JobEvent::scenario(*scenario));
            }
            (ScenarioOutcome::Failed { reason }, _) => {
                self.metrics.record_scenario("failed", domain, tier);
                self.control.emit(JobEvent::progress(format!(
                    "Scenario {} of {} failed: {}",
                    index + 1,
                    counters.total,
                    reason
                )));
            }
            (ScenarioOutcome::Stored, None) => {}
        }
        Ok(true)
    }

    /// Runs before the runner's exit is signalled, so the pause event
    /// always precedes anything a resumed runner emits.
    async fn report_pause(&self, job_id: Uuid) {
        match self.store.find_job(job_id).await {
            Ok(Some(job)) => {
                info!(job_id = %job_id, next_index = job.next_index(), "Generation job paused");
                self.control.emit(JobEvent::progress(format!(
                    "Paused after {} of {} scenarios",
                    job.next_index(),
                    job.total_scenarios
                )));
            }
            Ok(None) => debug!(job_id = %job_id, "Paused job no longer stored"),
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to read paused job"),
        }
    }

    async fn complete(&self, job_id: Uuid) {
        match self
            .store
            .transition_job(job_id, GenerationJobStatus::Completed, None)
            .await
        {
            Ok(job) => {
                info!(
                    job_id = %job_id,
                    stored = job.stored_count,
                    failed = job.failed_count,
                    "Generation job completed"
                );
                self.control.emit(JobEvent::complete(format!(
                    "Generated {} scenarios ({} stored, {} failed)",
                    job.generated_count, job.stored_count, job.failed_count
                )));
            }
            Err(StoreError::InvalidTransition { .. }) => {
                // Cancelled concurrently; cancel() reports it.
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to complete generation job");
                self.control.emit(JobEvent::error(e.to_string()));
            }
        }
        self.running.remove(job_id);
        self.metrics.dec_jobs_in_progress();
    }

    async fn fail(&self, job_id: Uuid, reason: &str) {
        error!(job_id = %job_id, error = %reason, "Generation job failed");
        match self
            .store
            .transition_job(job_id, GenerationJobStatus::Failed, Some(reason))
            .await
        {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { .. }) => return,
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to record job failure"),
        }
        self.control.emit(JobEvent::error(reason));
        self.running.remove(job_id);
        self.metrics.dec_jobs_in_progress();
    }
}
