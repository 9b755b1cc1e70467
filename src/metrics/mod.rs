//! Prometheus-based monitoring.
//!
//! # Example
//!
//! ```ignore
//! use maac_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//!
//! let collector = MetricsCollector::new();
//! collector.record_regeneration_attempts(2);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, COMPLEXITY_SCORE, JOBS_IN_PROGRESS, PROVIDER_LATENCY, QUEUE_DEPTH,
    RATE_LIMIT_WAIT, REGENERATION_ATTEMPTS, REGISTRY, SCENARIOS_TOTAL, TRIALS_TOTAL,
};
