//! Prometheus metrics registration and export.
//!
//! All metrics live in process-wide statics and are created once by
//! [`init_metrics`]. Recording through [`super::MetricsCollector`] before
//! initialization is a no-op.

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all maac_forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Generated positions, labeled by outcome, domain and tier.
pub static SCENARIOS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Renders needed per position before acceptance or rejection.
pub static REGENERATION_ATTEMPTS: OnceLock<Histogram> = OnceLock::new();

/// Upper bounds for composite complexity scores. The default tier
/// boundaries (15 and 30) fall on bucket edges.
pub const COMPLEXITY_SCORE_BUCKETS: [f64; 9] = [5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 50.0, 60.0];

/// Distribution of overall complexity scores.
pub static COMPLEXITY_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Trials reaching a final state, labeled by provider and status.
pub static TRIALS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Provider invocation latency in seconds, labeled by provider.
pub static PROVIDER_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Time spent waiting on the rate limiter, labeled by provider.
pub static RATE_LIMIT_WAIT: OnceLock<HistogramVec> = OnceLock::new();

/// Number of trials in queue, labeled by queue name.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Number of generation jobs currently running.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Number of active trial workers.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. A second call builds a fresh registry but leaves
/// the statics pointing at the first one.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid or a
/// name is registered twice.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Generation metrics
    let scenarios_total = CounterVec::new(
        Opts::new(
            "maac_forge_scenarios_total",
            "Generated positions by outcome",
        ),
        &["outcome", "domain", "tier"],
    )?;

    let regeneration_attempts = Histogram::with_opts(
        HistogramOpts::new(
            "maac_forge_regeneration_attempts",
            "Renders per position before a verdict",
        )
        .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
    )?;

    let complexity_score = Histogram::with_opts(
        HistogramOpts::new(
            "maac_forge_complexity_score",
            "Distribution of overall complexity scores",
        )
        .buckets(COMPLEXITY_SCORE_BUCKETS.to_vec()),
    )?;

    // Trial metrics
    let trials_total = CounterVec::new(
        Opts::new("maac_forge_trials_total", "Trials reaching a final state"),
        &["provider", "status"],
    )?;

    let provider_latency = HistogramVec::new(
        HistogramOpts::new(
            "maac_forge_provider_latency_seconds",
            "Provider invocation latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["provider"],
    )?;

    let rate_limit_wait = HistogramVec::new(
        HistogramOpts::new(
            "maac_forge_rate_limit_wait_seconds",
            "Time spent waiting for a rate limit slot",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0]),
        &["provider"],
    )?;

    // Queue and worker metrics
    let queue_depth = GaugeVec::new(
        Opts::new("maac_forge_queue_depth", "Number of trials in queue"),
        &["queue_name"],
    )?;

    let jobs_in_progress = Gauge::new(
        "maac_forge_jobs_in_progress",
        "Number of generation jobs currently running",
    )?;

    let active_workers = Gauge::new("maac_forge_active_workers", "Number of active workers")?;

    registry.register(Box::new(scenarios_total.clone()))?;
    registry.register(Box::new(regeneration_attempts.clone()))?;
    registry.register(Box::new(complexity_score.clone()))?;
    registry.register(Box::new(trials_total.clone()))?;
    registry.register(Box::new(provider_latency.clone()))?;
    registry.register(Box::new(rate_limit_wait.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = SCENARIOS_TOTAL.set(scenarios_total);
    let _ = REGENERATION_ATTEMPTS.set(regeneration_attempts);
    let _ = COMPLEXITY_SCORE.set(complexity_score);
    let _ = TRIALS_TOTAL.set(trials_total);
    let _ = PROVIDER_LATENCY.set(provider_latency);
    let _ = RATE_LIMIT_WAIT.set(rate_limit_wait);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = ACTIVE_WORKERS.set(active_workers);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics when the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
