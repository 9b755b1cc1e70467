//! Durable trial queue with reliable dequeue.
//!
//! [`TrialQueue`] is the contract the worker pool consumes. Two
//! implementations share it:
//!
//! - [`RedisTrialQueue`]: durable, shared between processes
//! - [`MemoryTrialQueue`]: single process, used by tests and local runs
//!
//! # Queue Structure
//!
//! The Redis queue uses four keys:
//!
//! - `{queue_name}`: main list where trials are enqueued
//! - `{queue_name}:processing`: trials being executed (for crash recovery)
//! - `{queue_name}:delayed`: sorted set of trials waiting out a retry backoff
//! - `{queue_name}:dead_letter`: trials that failed for good
//!
//! Trials are atomically moved from the main list to the processing list
//! with BRPOPLPUSH, so a crashed worker's trials can be recovered.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::job::{TrialJob, TrialResult, TrialStatus};

/// Seconds a trial result is kept in Redis.
const RESULT_TTL_SECS: u64 = 7 * 24 * 3600;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Queue state poisoned")]
    Poisoned,

    #[error("Trial {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TrialStatus,
        to: TrialStatus,
    },
}

/// Statistics about queue state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_name: String,
    pub pending: usize,
    pub processing: usize,
    pub delayed: usize,
    pub dead_letter: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.delayed + self.dead_letter
    }

    /// No trial is waiting, running or backing off.
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.processing == 0 && self.delayed == 0
    }
}

/// Queue of trials consumed by the worker pool.
#[async_trait]
pub trait TrialQueue: Send + Sync {
    async fn enqueue(&self, trial: TrialJob) -> Result<(), QueueError>;

    async fn enqueue_batch(&self, trials: Vec<TrialJob>) -> Result<(), QueueError> {
        for trial in trials {
            self.enqueue(trial).await?;
        }
        Ok(())
    }

    /// Next ready trial, waiting up to `timeout`. The trial is marked active
    /// and held in the processing set until completed, retried or dead-lettered.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<TrialJob>, QueueError>;

    /// Removes a finished trial from processing and keeps its result.
    async fn complete(&self, trial: &TrialJob, result: &TrialResult) -> Result<(), QueueError>;

    /// Puts a trial back after `delay`.
    async fn retry_later(&self, trial: TrialJob, delay: Duration) -> Result<(), QueueError>;

    /// Moves a trial to the dead-letter list.
    async fn dead_letter(&self, trial: TrialJob, error: &str) -> Result<(), QueueError>;

    /// Requeues trials left in processing by a crashed worker.
    async fn recover_processing(&self) -> Result<usize, QueueError>;

    async fn get_result(&self, trial_id: Uuid) -> Result<Option<TrialResult>, QueueError>;

    async fn stats(&self) -> Result<QueueStats, QueueError>;
}

/// Applies a status change through the trial's transition table.
fn advance(trial: &mut TrialJob, next: TrialStatus) -> Result<(), QueueError> {
    let from = trial.status;
    if trial.transition(next) {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition {
            id: trial.id,
            from,
            to: next,
        })
    }
}

fn mark_delayed(trial: &mut TrialJob, delay: Duration) -> Result<(), QueueError> {
    advance(trial, TrialStatus::Delayed)?;
    trial.available_at = chrono::Duration::from_std(delay)
        .ok()
        .map(|d| Utc::now() + d);
    Ok(())
}

fn mark_active(trial: &mut TrialJob) -> Result<(), QueueError> {
    advance(trial, TrialStatus::Active)?;
    trial.available_at = None;
    Ok(())
}

fn mark_failed(trial: &mut TrialJob, error: &str) -> Result<(), QueueError> {
    advance(trial, TrialStatus::Failed)?;
    trial.failed_reason = Some(error.to_string());
    Ok(())
}

/// Redis-backed [`TrialQueue`].
pub struct RedisTrialQueue {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    queue_name: String,
    processing_queue: String,
    delayed_queue: String,
    dead_letter_queue: String,
    results_key: String,
}

impl RedisTrialQueue {
    /// Connects to Redis and creates a new trial queue.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a queue from an existing ConnectionManager.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
            processing_queue: format!("{}:processing", queue_name),
            delayed_queue: format!("{}:delayed", queue_name),
            dead_letter_queue: format!("{}:dead_letter", queue_name),
            results_key: format!("{}:results", queue_name),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Moves delayed trials whose backoff has elapsed to the front of the main list.
    async fn promote_due(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(&self.delayed_queue, 0, now_ms)
            .await?;

        for data in &due {
            let mut trial: TrialJob = serde_json::from_str(data)?;
            advance(&mut trial, TrialStatus::Waiting)?;
            let serialized = serde_json::to_string(&trial)?;
            let mut pipe = redis::pipe();
            pipe.atomic()
                .zrem(&self.delayed_queue, data)
                .rpush(&self.queue_name, &serialized);
            pipe.query_async::<_, ()>(&mut conn).await?;
        }
        Ok(due.len())
    }

    /// Removes a trial from the processing list by id.
    async fn remove_from_processing(&self, trial_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let entries: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for data in entries {
            if let Ok(trial) = serde_json::from_str::<TrialJob>(&data) {
                if trial.id == trial_id {
                    conn.lrem::<_, _, ()>(&self.processing_queue, 1, &data)
                        .await?;
                    return Ok(());
                }
            }
        }

        // Not found is fine: it may already have been removed.
        Ok(())
    }

    /// Peeks at dead-lettered trials without removing them.
    pub async fn peek_dead_letter(
        &self,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, QueueError> {
        let mut conn = self.redis.clone();
        let data: Vec<String> = conn
            .lrange(&self.dead_letter_queue, 0, limit as isize - 1)
            .await?;

        let entries: Result<Vec<serde_json::Value>, _> =
            data.iter().map(|s| serde_json::from_str(s)).collect();
        Ok(entries?)
    }

    /// Deletes every key of this queue.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.del(&self.queue_name)
            .del(&self.processing_queue)
            .del(&self.delayed_queue)
            .del(&self.dead_letter_queue);
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl TrialQueue for RedisTrialQueue {
    async fn enqueue(&self, trial: TrialJob) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(&trial)?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    async fn enqueue_batch(&self, trials: Vec<TrialJob>) -> Result<(), QueueError> {
        if trials.is_empty() {
            return Ok(());
        }
        let serialized = trials
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<String>, _>>()?;

        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        for data in &serialized {
            pipe.lpush(&self.queue_name, data);
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<TrialJob>, QueueError> {
        self.promote_due().await?;

        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;
        let result: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_name)
            .arg(&self.processing_queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        let Some(data) = result else {
            return Ok(None);
        };

        // Rewrite the processing entry so it reflects the active state.
        let mut trial: TrialJob = serde_json::from_str(&data)?;
        if let Err(e) = mark_active(&mut trial) {
            let entry = serde_json::json!({
                "trial": trial,
                "error": e.to_string(),
                "moved_at": Utc::now().to_rfc3339(),
            });
            let mut pipe = redis::pipe();
            pipe.atomic()
                .lrem(&self.processing_queue, 1, &data)
                .lpush(&self.dead_letter_queue, serde_json::to_string(&entry)?);
            pipe.query_async::<_, ()>(&mut conn).await?;
            return Err(e);
        }
        let updated = serde_json::to_string(&trial)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lrem(&self.processing_queue, 1, &data)
            .lpush(&self.processing_queue, &updated);
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(Some(trial))
    }

    async fn complete(&self, trial: &TrialJob, result: &TrialResult) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let result_key = format!("{}:{}", self.results_key, trial.id);
        let result_data = serde_json::to_string(result)?;
        conn.set_ex::<_, _, ()>(&result_key, &result_data, RESULT_TTL_SECS)
            .await?;

        self.remove_from_processing(trial.id).await
    }

    async fn retry_later(&self, mut trial: TrialJob, delay: Duration) -> Result<(), QueueError> {
        self.remove_from_processing(trial.id).await?;

        mark_delayed(&mut trial, delay)?;
        let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let serialized = serde_json::to_string(&trial)?;
        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(&self.delayed_queue, serialized, ready_at)
            .await?;
        Ok(())
    }

    async fn dead_letter(&self, mut trial: TrialJob, error: &str) -> Result<(), QueueError> {
        self.remove_from_processing(trial.id).await?;

        mark_failed(&mut trial, error)?;
        let entry = serde_json::json!({
            "trial": trial,
            "error": error,
            "moved_at": Utc::now().to_rfc3339(),
        });
        let serialized = serde_json::to_string(&entry)?;

        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.dead_letter_queue, serialized)
            .await?;
        Ok(())
    }

    async fn recover_processing(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let mut recovered = 0;
        let entries: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for data in entries {
            let Ok(mut trial) = serde_json::from_str::<TrialJob>(&data) else {
                continue;
            };
            // The interrupted run counts as an attempt.
            trial.increment_attempts();

            if trial.should_retry() {
                advance(&mut trial, TrialStatus::Waiting)?;
                let serialized = serde_json::to_string(&trial)?;
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .lrem(&self.processing_queue, 1, &data)
                    .rpush(&self.queue_name, &serialized);
                pipe.query_async::<_, ()>(&mut conn).await?;
                recovered += 1;
            } else {
                self.dead_letter(trial, "recovered from processing after max attempts")
                    .await?;
            }
        }

        Ok(recovered)
    }

    async fn get_result(&self, trial_id: Uuid) -> Result<Option<TrialResult>, QueueError> {
        let mut conn = self.redis.clone();
        let result_key = format!("{}:{}", self.results_key, trial_id);
        let data: Option<String> = conn.get(&result_key).await?;
        match data {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut conn = self.redis.clone();
        let pending: usize = conn.llen(&self.queue_name).await?;
        let processing: usize = conn.llen(&self.processing_queue).await?;
        let delayed: usize = conn.zcard(&self.delayed_queue).await?;
        let dead_letter: usize = conn.llen(&self.dead_letter_queue).await?;

        Ok(QueueStats {
            queue_name: self.queue_name.clone(),
            pending,
            processing,
            delayed,
            dead_letter,
        })
    }
}

#[derive(Default)]
struct MemoryState {
    pending: VecDeque<TrialJob>,
    processing: HashMap<Uuid, TrialJob>,
    delayed: Vec<(Instant, TrialJob)>,
    dead_letter: Vec<(TrialJob, String)>,
    results: HashMap<Uuid, TrialResult>,
}

impl MemoryState {
    fn promote_due(&mut self, now: Instant) -> Result<(), QueueError> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(ready, _)| *ready <= now);
        self.delayed = waiting;
        for (_, mut trial) in due {
            advance(&mut trial, TrialStatus::Waiting)?;
            self.pending.push_front(trial);
        }
        Ok(())
    }

    fn next_ready(&self) -> Option<Instant> {
        self.delayed.iter().map(|(ready, _)| *ready).min()
    }
}

/// In-process [`TrialQueue`] with the same contract as the Redis queue.
///
/// Backoff delays run on the tokio clock, so paused-time tests are deterministic.
#[derive(Default)]
pub struct MemoryTrialQueue {
    name: String,
    state: Mutex<MemoryState>,
    notify: Notify,
}

impl MemoryTrialQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
            notify: Notify::new(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, QueueError> {
        let mut state = self.state.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(f(&mut state))
    }

    /// Dead-lettered trials with their final error.
    pub fn dead_letters(&self) -> Result<Vec<(TrialJob, String)>, QueueError> {
        self.with_state(|s| s.dead_letter.clone())
    }
}

#[async_trait]
impl TrialQueue for MemoryTrialQueue {
    async fn enqueue(&self, trial: TrialJob) -> Result<(), QueueError> {
        self.with_state(|s| s.pending.push_back(trial))?;
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<TrialJob>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let (trial, next_ready) = self.with_state(|s| {
                s.promote_due(Instant::now())?;
                match s.pending.pop_front() {
                    Some(mut trial) => match mark_active(&mut trial) {
                        Ok(()) => {
                            s.processing.insert(trial.id, trial.clone());
                            Ok((Some(trial), None))
                        }
                        Err(e) => {
                            s.dead_letter.push((trial, e.to_string()));
                            Err(e)
                        }
                    },
                    None => Ok::<_, QueueError>((None, s.next_ready())),
                }
            })??;
            if trial.is_some() {
                return Ok(trial);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wake_at = next_ready.map_or(deadline, |ready| ready.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, self.notify.notified()).await;
        }
    }

    async fn complete(&self, trial: &TrialJob, result: &TrialResult) -> Result<(), QueueError> {
        self.with_state(|s| {
            s.processing.remove(&trial.id);
            s.results.insert(trial.id, result.clone());
        })
    }

    async fn retry_later(&self, mut trial: TrialJob, delay: Duration) -> Result<(), QueueError> {
        mark_delayed(&mut trial, delay)?;
        let ready = Instant::now() + delay;
        self.with_state(|s| {
            s.processing.remove(&trial.id);
            s.delayed.push((ready, trial));
        })?;
        self.notify.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, mut trial: TrialJob, error: &str) -> Result<(), QueueError> {
        mark_failed(&mut trial, error)?;
        self.with_state(|s| {
            s.processing.remove(&trial.id);
            s.dead_letter.push((trial, error.to_string()));
        })
    }

    async fn recover_processing(&self) -> Result<usize, QueueError> {
        let recovered = self.with_state(|s| {
            let mut recovered = 0;
            let stuck: Vec<TrialJob> = s.processing.drain().map(|(_, t)| t).collect();
            for mut trial in stuck {
                trial.increment_attempts();
                if trial.should_retry() {
                    advance(&mut trial, TrialStatus::Waiting)?;
                    s.pending.push_front(trial);
                    recovered += 1;
                } else {
                    let reason = "recovered from processing after max attempts";
                    mark_failed(&mut trial, reason)?;
                    s.dead_letter.push((trial, reason.to_string()));
                }
            }
            Ok::<_, QueueError>(recovered)
        })??;
        if recovered > 0 {
            self.notify.notify_waiters();
        }
        Ok(recovered)
    }

    async fn get_result(&self, trial_id: Uuid) -> Result<Option<TrialResult>, QueueError> {
        self.with_state(|s| s.results.get(&trial_id).cloned())
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.with_state(|s| QueueStats {
            queue_name: self.name.clone(),
            pending: s.pending.len(),
            processing: s.processing.len(),
            delayed: s.delayed.len(),
            dead_letter: s.dead_letter.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::ConfigId;

    fn trial(scenario: &str) -> TrialJob {
        TrialJob::new(scenario, "mock", "m1", ConfigId::full())
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));
        assert!(QueueError::Poisoned.to_string().contains("poisoned"));
    }

    #[test]
    fn test_queue_stats() {
        let stats = QueueStats {
            queue_name: "trials".to_string(),
            pending: 3,
            processing: 1,
            delayed: 2,
            dead_letter: 4,
        };
        assert_eq!(stats.total(), 10);
        assert!(!stats.is_drained());

        let done = QueueStats {
            dead_letter: 4,
            ..Default::default()
        };
        assert!(done.is_drained());
    }

    #[tokio::test]
    async fn test_memory_queue_fifo_and_processing() {
        let queue = MemoryTrialQueue::new("trials");
        queue
            .enqueue_batch(vec![trial("s-1"), trial("s-2")])
            .await
            .expect("enqueue");

        let first = queue
            .dequeue(Duration::from_millis(10))
            .await
            .expect("dequeue")
            .expect("trial available");
        assert_eq!(first.scenario_id, "s-1");
        assert_eq!(first.status, TrialStatus::Active);

        let stats = queue.stats().await.expect("stats");
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 1);

        let result = TrialResult::success(&first, "w", "ok".to_string(), serde_json::Value::Null, 1);
        queue.complete(&first, &result).await.expect("complete");
        assert_eq!(
            queue.get_result(first.id).await.expect("result"),
            Some(result)
        );
        assert_eq!(queue.stats().await.expect("stats").processing, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_queue_delays_retries() {
        let queue = MemoryTrialQueue::new("trials");
        queue.enqueue(trial("s-1")).await.expect("enqueue");
        let active = queue
            .dequeue(Duration::from_millis(10))
            .await
            .expect("dequeue")
            .expect("trial");

        queue
            .retry_later(active, Duration::from_secs(5))
            .await
            .expect("retry");
        assert_eq!(queue.stats().await.expect("stats").delayed, 1);

        let early = queue
            .dequeue(Duration::from_secs(1))
            .await
            .expect("dequeue");
        assert!(early.is_none());

        let later = queue
            .dequeue(Duration::from_secs(10))
            .await
            .expect("dequeue")
            .expect("delayed trial becomes ready");
        assert_eq!(later.scenario_id, "s-1");
        assert_eq!(later.status, TrialStatus::Active);
    }

    #[tokio::test]
    async fn test_memory_queue_recovery_and_dead_letter() {
        let queue = MemoryTrialQueue::new("trials");
        queue
            .enqueue(trial("s-1").with_max_attempts(2))
            .await
            .expect("enqueue");
        queue
            .enqueue(trial("s-2").with_max_attempts(1))
            .await
            .expect("enqueue");
        queue.dequeue(Duration::ZERO).await.expect("dequeue");
        queue.dequeue(Duration::ZERO).await.expect("dequeue");

        let recovered = queue.recover_processing().await.expect("recover");
        assert_eq!(recovered, 1);
        let stats = queue.stats().await.expect("stats");
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.dead_letter, 1);

        let dead = queue.dead_letters().expect("dead letters");
        assert_eq!(dead[0].0.scenario_id, "s-2");
        assert_eq!(dead[0].0.status, TrialStatus::Failed);

        let requeued = queue
            .dequeue(Duration::ZERO)
            .await
            .expect("dequeue")
            .expect("recovered trial");
        assert_eq!(requeued.scenario_id, "s-1");
        assert_eq!(requeued.status, TrialStatus::Active);
        assert_eq!(requeued.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_memory_queue_rejects_illegal_status_changes() {
        let queue = MemoryTrialQueue::new("trials");
        let waiting = trial("s-1");

        let err = queue
            .dead_letter(waiting.clone(), "never ran")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidTransition {
                from: TrialStatus::Waiting,
                to: TrialStatus::Failed,
                ..
            }
        ));

        let err = queue
            .retry_later(waiting, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));

        let stats = queue.stats().await.expect("stats");
        assert_eq!(stats.dead_letter, 0);
        assert_eq!(stats.delayed, 0);
    }
}
