//! Per-provider request limits shared by every worker.
//!
//! Each provider gets one bucket holding the start times of its admitted
//! requests over the last minute. A request is admitted while the bucket
//! holds fewer than `rpm` entries. Otherwise the caller sleeps until the
//! oldest entry leaves the window. Waiting is never an error.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::cancel::CancellationFlag;
use crate::metrics::MetricsCollector;

/// Length of the limiting window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Bucket {
    admitted: VecDeque<Instant>,
}

impl Bucket {
    /// Admits a request at `now`, or returns how long to wait.
    fn try_admit(&mut self, now: Instant, rpm: u32) -> Result<(), Duration> {
        while let Some(&oldest) = self.admitted.front() {
            if now.duration_since(oldest) >= RATE_WINDOW {
                self.admitted.pop_front();
            } else {
                break;
            }
        }

        if (self.admitted.len() as u32) < rpm {
            self.admitted.push_back(now);
            return Ok(());
        }

        let oldest = self.admitted.front().copied().unwrap_or(now);
        Err(RATE_WINDOW.saturating_sub(now.duration_since(oldest)))
    }
}

/// Requests-per-minute limiter keyed by provider name.
#[derive(Debug)]
pub struct RateLimiter {
    default_rpm: u32,
    limits: HashMap<String, u32>,
    buckets: Mutex<HashMap<String, Bucket>>,
    metrics: MetricsCollector,
}

impl RateLimiter {
    /// Creates a limiter applying `default_rpm` to every provider.
    /// A limit of 0 disables limiting.
    pub fn new(default_rpm: u32) -> Self {
        Self {
            default_rpm,
            limits: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
            metrics: MetricsCollector::new(),
        }
    }

    /// Overrides the limit for one provider.
    pub fn with_limit(mut self, provider: impl Into<String>, rpm: u32) -> Self {
        self.limits.insert(provider.into(), rpm);
        self
    }

    pub fn with_limits(mut self, limits: &HashMap<String, u32>) -> Self {
        self.limits
            .extend(limits.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }

    pub fn limit_for(&self, provider: &str) -> u32 {
        self.limits
            .get(provider)
            .copied()
            .unwrap_or(self.default_rpm)
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        // The bucket map stays consistent even if a holder panicked.
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits for a request slot for `provider`.
    ///
    /// Returns the time spent waiting, or `None` if `cancel` was raised
    /// before a slot became available.
    pub async fn acquire(
        &self,
        provider: &str,
        cancel: Option<&CancellationFlag>,
    ) -> Option<Duration> {
        let rpm = self.limit_for(provider);
        if rpm == 0 {
            return Some(Duration::ZERO);
        }

        let started = Instant::now();
        loop {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                return None;
            }

            let wait = {
                let mut buckets = self.buckets();
                let bucket = buckets.entry(provider.to_string()).or_default();
                bucket.try_admit(Instant::now(), rpm)
            };

            match wait {
                Ok(()) => {
                    let waited = started.elapsed();
                    if !waited.is_zero() {
                        self.metrics.record_rate_limit_wait(provider, waited);
                    }
                    return Some(waited);
                }
                Err(delay) => {
                    debug!(
                        provider = %provider,
                        rpm,
                        wait_ms = delay.as_millis() as u64,
                        "Rate limit reached, waiting for slot"
                    );
                    match cancel {
                        Some(flag) => {
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = flag.cancelled() => return None,
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                }
            }
        }
    }

    /// Requests admitted for `provider` within the current window.
    pub fn in_window(&self, provider: &str) -> usize {
        let now = Instant::now();
        self.buckets()
            .get(provider)
            .map(|b| {
                b.admitted
                    .iter()
                    .filter(|t| now.duration_since(**t) < RATE_WINDOW)
                    .count()
            })
            .unwrap_or(0)
    }
}
