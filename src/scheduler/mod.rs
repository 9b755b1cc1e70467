//! Job scheduling: generation jobs, trial queues and worker pools.
//!
//! - **JobOrchestrator**: generation job lifecycle with pause, resume and cancel
//! - **TrialQueue**: durable trial queue with reliable dequeue (Redis or in-process)
//! - **TrialWorkerPool**: workers executing trials under a shared rate limit
//! - **RateLimiter**: per-provider requests-per-minute limits
//!
//! # Architecture
//!
//! ```text
//!      GenerationRequest
//!             │
//!      ┌──────▼────────┐   events   ┌──────────┐
//!      │ Orchestrator  ├───────────▶│  caller  │
//!      └──────┬────────┘            └──────────┘
//!             │ scenarios
//!      ┌──────▼───────┐
//!      │    Store     │
//!      └──────┬───────┘
//!             │ schedule_trials
//!      ┌──────▼───────┐
//!      │ Trial queue  │
//!      └──────┬───────┘
//!         ┌───┴──────────────┬──────────────┐
//!         ▼                  ▼              ▼
//!    ┌─────────┐        ┌─────────┐    ┌─────────┐
//!    │ Worker 1│        │ Worker 2│    │ Worker N│──▶ RateLimiter ──▶ provider
//!    └─────────┘        └─────────┘    └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use maac_forge::scheduler::{GenerationRequest, JobOrchestrator, RunningJobs};
//! use maac_forge::storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let orchestrator = JobOrchestrator::new(Arc::new(MemoryStore::new()), Arc::new(RunningJobs::new()));
//! let request = GenerationRequest::new("openrouter", vec!["openai/gpt-4o-mini".into()])
//!     .with_repetitions(3);
//! let mut handle = orchestrator.start_generation(request).await?;
//! while let Some(event) = handle.events.recv().await {
//!     print!("{}", event.to_sse_line()?);
//! }
//! ```
//!
//! # Reliability Features
//!
//! - **Atomic counters**: scenario outcomes are applied in one store operation
//! - **Atomic dequeue**: BRPOPLPUSH moves trials to a processing list
//! - **Crash recovery**: processing trials are requeued when a pool starts
//! - **Dead letter queue**: trials that fail for good are kept for analysis
//! - **Cooperative cancellation**: checked between attempts and raced against provider calls

pub mod cancel;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod queue;
pub mod rate_limit;
pub mod worker_pool;

pub use cancel::CancellationFlag;
pub use events::JobEvent;
pub use job::{
    ConfigId, GenerationJob, GenerationJobStatus, GenerationRequest, JobCounters,
    ScenarioOutcome, TrialJob, TrialResult, TrialStatus, CAPABILITIES,
};
pub use orchestrator::{
    GenerationHandle, JobOrchestrator, OrchestratorError, RunningJobs, SourceFactory,
    CANCELLED_BY_USER,
};
pub use queue::{MemoryTrialQueue, QueueError, QueueStats, RedisTrialQueue, TrialQueue};
pub use rate_limit::{RateLimiter, RATE_WINDOW};
pub use worker_pool::{PoolError, PoolStats, TrialWorkerPool, WorkerPoolConfig};
