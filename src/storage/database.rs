//! PostgreSQL store.
//!
//! Counter updates and status transitions are single guarded `UPDATE`
//! statements, so concurrent workers never read-modify-write a job row.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use super::schema::all_schema_statements;
use super::{check_persistable, ForgeStore, JobFilter, ScenarioFilter, StoreError};
use crate::scenario::Scenario;
use crate::scheduler::job::{
    ConfigId, GenerationJob, GenerationJobStatus, JobCounters, ScenarioOutcome, TrialResult,
    TrialStatus,
};

const JOB_COLUMNS: &str = "id, domains, tiers, repetitions, provider, models, config_id, \
     concurrency, status, total_scenarios, generated_count, stored_count, failed_count, \
     created_at, started_at, completed_at, last_error, experiment_id";

const TRIAL_COLUMNS: &str = "trial_id, scenario_id, provider, model, config_id, status, \
     content, metadata, attempts, duration_ms, failed_reason, worker_id, completed_at";

/// PostgreSQL-backed [`ForgeStore`].
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects with a pooled client.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates missing tables and indexes.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in all_schema_statements() {
            for part in statement.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(part).execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        info!("Database schema ensured");
        Ok(())
    }
}

fn decode_err(field: &str, message: impl std::fmt::Display) -> StoreError {
    StoreError::Decode(format!("{}: {}", field, message))
}

fn job_from_row(row: &PgRow) -> Result<GenerationJob, StoreError> {
    let status: String = row.try_get("status")?;
    let config_id: String = row.try_get("config_id")?;

    Ok(GenerationJob {
        id: row.try_get("id")?,
        domains: serde_json::from_value(row.try_get("domains")?)?,
        tiers: serde_json::from_value(row.try_get("tiers")?)?,
        repetitions: row.try_get::<i32, _>("repetitions")? as u32,
        provider: row.try_get("provider")?,
        models: serde_json::from_value(row.try_get("models")?)?,
        config_id: ConfigId::parse(config_id.trim()).map_err(|e| decode_err("config_id", e))?,
        concurrency: row.try_get::<i32, _>("concurrency")?.max(1) as usize,
        status: status
            .parse::<GenerationJobStatus>()
            .map_err(|e| decode_err("status", e))?,
        total_scenarios: row.try_get::<i64, _>("total_scenarios")? as u64,
        generated_count: row.try_get::<i64, _>("generated_count")? as u64,
        stored_count: row.try_get::<i64, _>("stored_count")? as u64,
        failed_count: row.try_get::<i64, _>("failed_count")? as u64,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_error: row.try_get("last_error")?,
        experiment_id: row.try_get("experiment_id")?,
    })
}

fn trial_status(value: &str) -> Result<TrialStatus, StoreError> {
    match value {
        "waiting" => Ok(TrialStatus::Waiting),
        "active" => Ok(TrialStatus::Active),
        "completed" => Ok(TrialStatus::Completed),
        "failed" => Ok(TrialStatus::Failed),
        "delayed" => Ok(TrialStatus::Delayed),
        other => Err(decode_err("status", other)),
    }
}

fn trial_from_row(row: &PgRow) -> Result<TrialResult, StoreError> {
    let config_id: String = row.try_get("config_id")?;
    let status: String = row.try_get("status")?;

    Ok(TrialResult {
        trial_id: row.try_get("trial_id")?,
        scenario_id: row.try_get("scenario_id")?,
        provider: row.try_get("provider")?,
        model: row.try_get("model")?,
        config_id: ConfigId::parse(config_id.trim()).map_err(|e| decode_err("config_id", e))?,
        status: trial_status(&status)?,
        content: row.try_get("content")?,
        metadata: row.try_get("metadata")?,
        attempts: row.try_get::<i32, _>("attempts")? as u32,
        duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
        failed_reason: row.try_get("failed_reason")?,
        worker_id: row.try_get("worker_id")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// WHERE clause for a job filter. Placeholders are numbered in the order
/// [`bind_job_filter`] binds them.
fn job_where(filter: &JobFilter) -> String {
    let mut clause = String::from(" WHERE 1=1");
    let mut param_idx = 1;

    if filter.status.is_some() {
        clause.push_str(&format!(" AND status = ${}", param_idx));
        param_idx += 1;
    }
    if filter.started_after.is_some() {
        clause.push_str(&format!(" AND started_at >= ${}", param_idx));
        param_idx += 1;
    }
    if filter.started_before.is_some() {
        clause.push_str(&format!(" AND started_at < ${}", param_idx));
    }
    clause
}

fn bind_job_filter<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    filter: &'q JobFilter,
) -> Query<'q, Postgres, PgArguments> {
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if let Some(after) = filter.started_after {
        query = query.bind(after);
    }
    if let Some(before) = filter.started_before {
        query = query.bind(before);
    }
    query
}

fn scenario_where(filter: &ScenarioFilter) -> String {
    let mut clause = String::from(" WHERE 1=1");
    let mut param_idx = 1;

    if filter.experiment_id.is_some() {
        clause.push_str(&format!(" AND experiment_id = ${}", param_idx));
        param_idx += 1;
    }
    if filter.domain.is_some() {
        clause.push_str(&format!(" AND domain = ${}", param_idx));
        param_idx += 1;
    }
    if filter.tier.is_some() {
        clause.push_str(&format!(" AND tier = ${}", param_idx));
        param_idx += 1;
    }
    if filter.model.is_some() {
        clause.push_str(&format!(" AND model = ${}", param_idx));
    }
    clause
}

fn bind_scenario_filter<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    filter: &'q ScenarioFilter,
) -> Query<'q, Postgres, PgArguments> {
    if let Some(id) = filter.experiment_id {
        query = query.bind(id);
    }
    if let Some(domain) = filter.domain {
        query = query.bind(domain.as_str());
    }
    if let Some(tier) = filter.tier {
        query = query.bind(tier.as_str());
    }
    if let Some(ref model) = filter.model {
        query = query.bind(model);
    }
    query
}

fn filter_param_count(where_clause: &str) -> usize {
    where_clause.matches('$').count()
}

#[async_trait]
impl ForgeStore for Database {
    async fn create_job(&self, job: &GenerationJob) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO generation_jobs (
                id, domains, tiers, repetitions, provider, models, config_id, concurrency,
                status, total_scenarios, generated_count, stored_count, failed_count,
                created_at, started_at, completed_at, last_error, experiment_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(serde_json::to_value(&job.domains)?)
        .bind(serde_json::to_value(&job.tiers)?)
        .bind(job.repetitions as i32)
        .bind(&job.provider)
        .bind(serde_json::to_value(&job.models)?)
        .bind(job.config_id.as_str())
        .bind(job.concurrency as i32)
        .bind(job.status.as_str())
        .bind(job.total_scenarios as i64)
        .bind(job.generated_count as i64)
        .bind(job.stored_count as i64)
        .bind(job.failed_count as i64)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.last_error)
        .bind(job.experiment_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(format!("job {}", job.id)));
        }
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<GenerationJob>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM generation_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<GenerationJob>, StoreError> {
        let where_clause = job_where(filter);
        let mut sql = format!(
            "SELECT {} FROM generation_jobs{} ORDER BY created_at DESC",
            JOB_COLUMNS, where_clause
        );
        if filter.limit.is_some() {
            sql.push_str(&format!(" LIMIT ${}", filter_param_count(&where_clause) + 1));
        }

        let mut query = bind_job_filter(sqlx::query(&sql), filter);
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS total FROM generation_jobs{}", job_where(filter));
        let row = bind_job_filter(sqlx::query(&sql), filter)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("total")? as u64)
    }

    async fn transition_job(
        &self,
        id: Uuid,
        next: GenerationJobStatus,
        last_error: Option<&str>,
    ) -> Result<GenerationJob, StoreError> {
        let allowed: Vec<String> = GenerationJobStatus::predecessors(next)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let row = sqlx::query(&format!(
            r#"
            UPDATE generation_jobs SET
                status = $2,
                started_at = CASE WHEN $2 = 'running' THEN $4 ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed') THEN $4 ELSE completed_at END,
                last_error = COALESCE($3, last_error)
            WHERE id = $1 AND status = ANY($5)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(next.as_str())
        .bind(last_error)
        .bind(Utc::now())
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => job_from_row(&row),
            None => match self.find_job(id).await? {
                Some(job) => Err(StoreError::InvalidTransition {
                    id,
                    from: job.status,
                    to: next,
                }),
                None => Err(StoreError::NotFound(format!("job {}", id))),
            },
        }
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &ScenarioOutcome,
    ) -> Result<JobCounters, StoreError> {
        let (stored, failed, reason) = match outcome {
            ScenarioOutcome::Stored => (1_i64, 0_i64, None),
            ScenarioOutcome::Failed { reason } => (0, 1, Some(reason.as_str())),
        };

        let row = sqlx::query(
            r#"
            UPDATE generation_jobs SET
                generated_count = generated_count + 1,
                stored_count = stored_count + $2,
                failed_count = failed_count + $3,
                last_error = COALESCE($4, last_error)
            WHERE id = $1 AND stored_count + failed_count < total_scenarios
            RETURNING total_scenarios, generated_count, stored_count, failed_count
            "#,
        )
        .bind(id)
        .bind(stored)
        .bind(failed)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return match self.find_job(id).await? {
                Some(_) => Err(StoreError::CountersExhausted(id)),
                None => Err(StoreError::NotFound(format!("job {}", id))),
            };
        };
        Ok(JobCounters {
            total: row.try_get::<i64, _>("total_scenarios")? as u64,
            generated: row.try_get::<i64, _>("generated_count")? as u64,
            stored: row.try_get::<i64, _>("stored_count")? as u64,
            failed: row.try_get::<i64, _>("failed_count")? as u64,
        })
    }

    async fn create_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        check_persistable(scenario)?;
        let score = scenario.complexity_metrics.as_ref();

        let result = sqlx::query(
            r#"
            INSERT INTO scenarios (
                scenario_id, experiment_id, domain, tier, model, repetition,
                predicted_tier, tier_match, overall_score, payload, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (scenario_id) DO NOTHING
            "#,
        )
        .bind(&scenario.scenario_id)
        .bind(scenario.metadata.experiment_id)
        .bind(scenario.domain.as_str())
        .bind(scenario.tier.as_str())
        .bind(&scenario.model)
        .bind(scenario.repetition as i32)
        .bind(score.map(|s| s.predicted_tier.as_str()))
        .bind(score.map(|s| s.tier_match))
        .bind(score.map(|s| s.overall_score))
        .bind(serde_json::to_value(scenario)?)
        .bind(scenario.metadata.generated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(format!(
                "scenario {}",
                scenario.scenario_id
            )));
        }
        Ok(())
    }

    async fn find_scenario(&self, scenario_id: &str) -> Result<Option<Scenario>, StoreError> {
        let row = sqlx::query("SELECT payload FROM scenarios WHERE scenario_id = $1")
            .bind(scenario_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.try_get("payload")?)?)),
            None => Ok(None),
        }
    }

    async fn find_scenarios(&self, filter: &ScenarioFilter) -> Result<Vec<Scenario>, StoreError> {
        let where_clause = scenario_where(filter);
        let mut sql = format!("SELECT payload FROM scenarios{} ORDER BY seq", where_clause);
        if filter.limit.is_some() {
            sql.push_str(&format!(" LIMIT ${}", filter_param_count(&where_clause) + 1));
        }

        let mut query = bind_scenario_filter(sqlx::query(&sql), filter);
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut scenarios = Vec::with_capacity(rows.len());
        for row in rows {
            scenarios.push(serde_json::from_value(row.try_get("payload")?)?);
        }
        Ok(scenarios)
    }

    async fn count_scenarios(&self, filter: &ScenarioFilter) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS total FROM scenarios{}", scenario_where(filter));
        let row = bind_scenario_filter(sqlx::query(&sql), filter)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("total")? as u64)
    }

    async fn save_trial_result(&self, result: &TrialResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trial_results (
                trial_id, scenario_id, provider, model, config_id, status, content,
                metadata, attempts, duration_ms, failed_reason, worker_id, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (trial_id) DO UPDATE SET
                status = EXCLUDED.status,
                content = EXCLUDED.content,
                metadata = EXCLUDED.metadata,
                attempts = EXCLUDED.attempts,
                duration_ms = EXCLUDED.duration_ms,
                failed_reason = EXCLUDED.failed_reason,
                worker_id = EXCLUDED.worker_id,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(result.trial_id)
        .bind(&result.scenario_id)
        .bind(&result.provider)
        .bind(&result.model)
        .bind(result.config_id.as_str())
        .bind(result.status.as_str())
        .bind(&result.content)
        .bind(&result.metadata)
        .bind(result.attempts as i32)
        .bind(result.duration_ms as i64)
        .bind(&result.failed_reason)
        .bind(&result.worker_id)
        .bind(result.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_trial_results(
        &self,
        scenario_id: Option<&str>,
    ) -> Result<Vec<TrialResult>, StoreError> {
        let rows = match scenario_id {
            Some(id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM trial_results WHERE scenario_id = $1 ORDER BY completed_at",
                    TRIAL_COLUMNS
                ))
                .bind(id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM trial_results ORDER BY completed_at",
                    TRIAL_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(trial_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Domain, Tier};

    #[test]
    fn test_job_where_numbers_placeholders_in_bind_order() {
        assert_eq!(job_where(&JobFilter::new()), " WHERE 1=1");

        let filter = JobFilter::new()
            .with_status(GenerationJobStatus::Running)
            .started_between(Some(Utc::now()), None);
        assert_eq!(
            job_where(&filter),
            " WHERE 1=1 AND status = $1 AND started_at >= $2"
        );
        assert_eq!(filter_param_count(&job_where(&filter)), 2);
    }

    #[test]
    fn test_scenario_where() {
        let filter = ScenarioFilter::new()
            .with_domain(Domain::Planning)
            .with_tier(Tier::Complex)
            .with_model("m1");
        assert_eq!(
            scenario_where(&filter),
            " WHERE 1=1 AND domain = $1 AND tier = $2 AND model = $3"
        );
    }

    #[test]
    fn test_trial_status_decoding() {
        for status in [
            TrialStatus::Waiting,
            TrialStatus::Active,
            TrialStatus::Completed,
            TrialStatus::Failed,
            TrialStatus::Delayed,
        ] {
            assert_eq!(trial_status(status.as_str()).expect("known"), status);
        }
        assert!(matches!(trial_status("lost"), Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound("job 42".to_string());
        assert!(err.to_string().contains("job 42"));

        let err = StoreError::ConnectionFailed("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
