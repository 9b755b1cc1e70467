//! PostgreSQL table definitions.
//!
//! Every statement is idempotent so `Database::ensure_schema` can run at
//! each startup.

/// Generation jobs and their counters.
pub const CREATE_GENERATION_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS generation_jobs (
    id UUID PRIMARY KEY,
    domains JSONB NOT NULL,
    tiers JSONB NOT NULL,
    repetitions INTEGER NOT NULL,
    provider VARCHAR(255) NOT NULL,
    models JSONB NOT NULL,
    config_id CHAR(12) NOT NULL,
    concurrency INTEGER NOT NULL,
    status VARCHAR(16) NOT NULL,
    total_scenarios BIGINT NOT NULL,
    generated_count BIGINT NOT NULL DEFAULT 0,
    stored_count BIGINT NOT NULL DEFAULT 0,
    failed_count BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    last_error TEXT,
    experiment_id UUID NOT NULL,
    CHECK (generated_count = stored_count + failed_count),
    CHECK (stored_count + failed_count <= total_scenarios)
)
"#;

/// Accepted scenarios. The full record lives in `payload`; the other
/// columns exist for filtering and aggregation.
pub const CREATE_SCENARIOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS scenarios (
    seq BIGSERIAL,
    scenario_id VARCHAR(255) PRIMARY KEY,
    experiment_id UUID NOT NULL,
    domain VARCHAR(32) NOT NULL,
    tier VARCHAR(16) NOT NULL,
    model VARCHAR(255) NOT NULL,
    repetition INTEGER NOT NULL,
    predicted_tier VARCHAR(16),
    tier_match BOOLEAN,
    overall_score DOUBLE PRECISION,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Trial outcomes, one row per trial.
pub const CREATE_TRIAL_RESULTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trial_results (
    trial_id UUID PRIMARY KEY,
    scenario_id VARCHAR(255) NOT NULL,
    provider VARCHAR(255) NOT NULL,
    model VARCHAR(255) NOT NULL,
    config_id CHAR(12) NOT NULL,
    status VARCHAR(16) NOT NULL,
    content TEXT,
    metadata JSONB NOT NULL,
    attempts INTEGER NOT NULL,
    duration_ms BIGINT NOT NULL,
    failed_reason TEXT,
    worker_id VARCHAR(255) NOT NULL,
    completed_at TIMESTAMPTZ NOT NULL
)
"#;

/// Indexes for the monitoring queries.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_generation_jobs_status ON generation_jobs(status);
CREATE INDEX IF NOT EXISTS idx_generation_jobs_started_at ON generation_jobs(started_at);
CREATE INDEX IF NOT EXISTS idx_scenarios_experiment_id ON scenarios(experiment_id);
CREATE INDEX IF NOT EXISTS idx_scenarios_domain_tier ON scenarios(domain, tier);
CREATE INDEX IF NOT EXISTS idx_scenarios_seq ON scenarios(seq);
CREATE INDEX IF NOT EXISTS idx_trial_results_scenario_id ON trial_results(scenario_id)
"#;

/// All schema statements in dependency order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_GENERATION_JOBS_TABLE,
        CREATE_SCENARIOS_TABLE,
        CREATE_TRIAL_RESULTS_TABLE,
        CREATE_INDEXES,
    ]
}

/// Table names in the schema.
pub mod tables {
    pub const GENERATION_JOBS: &str = "generation_jobs";
    pub const SCENARIOS: &str = "scenarios";
    pub const TRIAL_RESULTS: &str = "trial_results";
}
