//! Recording interface over the Prometheus statics.
//!
//! `MetricsCollector` keeps label values consistent across call sites. Every
//! method is safe to call before `init_metrics()`; it only emits a trace
//! event in that case.

use std::time::Duration;

use super::prometheus::{
    ACTIVE_WORKERS, COMPLEXITY_SCORE, JOBS_IN_PROGRESS, PROVIDER_LATENCY, QUEUE_DEPTH,
    RATE_LIMIT_WAIT, REGENERATION_ATTEMPTS, SCENARIOS_TOTAL, TRIALS_TOTAL,
};

/// Metrics collector for generation and trial execution.
///
/// # Example
///
/// ```ignore
/// use maac_forge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.record_scenario("stored", "planning", "moderate");
/// collector.record_trial("openrouter", "completed");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one generated position.
    ///
    /// `outcome` is `"stored"` or `"failed"`.
    pub fn record_scenario(&self, outcome: &str, domain: &str, tier: &str) {
        if let Some(scenarios) = SCENARIOS_TOTAL.get() {
            scenarios.with_label_values(&[outcome, domain, tier]).inc();
        }

        tracing::trace!(
            outcome = outcome,
            domain = domain,
            tier = tier,
            "Recorded scenario metric"
        );
    }

    /// Record how many renders one position needed.
    pub fn record_regeneration_attempts(&self, attempts: u32) {
        if let Some(histogram) = REGENERATION_ATTEMPTS.get() {
            histogram.observe(f64::from(attempts));
        }

        tracing::trace!(attempts = attempts, "Recorded regeneration attempts");
    }

    pub fn record_complexity_score(&self, score: f64) {
        if let Some(histogram) = COMPLEXITY_SCORE.get() {
            histogram.observe(score);
        }
    }

    /// Record a trial reaching a final state (`completed` or `failed`).
    pub fn record_trial(&self, provider: &str, status: &str) {
        if let Some(trials) = TRIALS_TOTAL.get() {
            trials.with_label_values(&[provider, status]).inc();
        }

        tracing::trace!(provider = provider, status = status, "Recorded trial metric");
    }

    pub fn record_provider_latency(&self, provider: &str, latency: Duration) {
        if let Some(histogram) = PROVIDER_LATENCY.get() {
            histogram
                .with_label_values(&[provider])
                .observe(latency.as_secs_f64());
        }
    }

    pub fn record_rate_limit_wait(&self, provider: &str, waited: Duration) {
        if let Some(histogram) = RATE_LIMIT_WAIT.get() {
            histogram
                .with_label_values(&[provider])
                .observe(waited.as_secs_f64());
        }

        tracing::trace!(
            provider = provider,
            waited_ms = waited.as_millis() as u64,
            "Recorded rate limit wait"
        );
    }

    pub fn update_queue_depth(&self, queue_name: &str, depth: u64) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth
                .with_label_values(&[queue_name])
                .set(depth as f64);
        }
    }

    pub fn update_workers(&self, count: usize) {
        if let Some(active_workers) = ACTIVE_WORKERS.get() {
            active_workers.set(count as f64);
        }

        tracing::trace!(count = count, "Updated active workers metric");
    }

    pub fn inc_jobs_in_progress(&self) {
        if let Some(jobs_in_progress) = JOBS_IN_PROGRESS.get() {
            jobs_in_progress.inc();
        }
    }

    pub fn dec_jobs_in_progress(&self) {
        if let Some(jobs_in_progress) = JOBS_IN_PROGRESS.get() {
            jobs_in_progress.dec();
        }
    }
}
