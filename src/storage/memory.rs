//! In-process store.
//!
//! All state sits behind one lock, so every trait operation is atomic with
//! respect to the others, including counter updates from concurrent workers.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::{check_persistable, ForgeStore, JobFilter, ScenarioFilter, StoreError};
use crate::scenario::Scenario;
use crate::scheduler::job::{
    GenerationJob, GenerationJobStatus, JobCounters, ScenarioOutcome, TrialResult,
};

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, GenerationJob>,
    scenarios: Vec<Scenario>,
    scenario_index: HashMap<String, usize>,
    trial_results: Vec<TrialResult>,
}

/// [`ForgeStore`] backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    fn limited<T>(items: impl Iterator<Item = T>, limit: Option<i64>) -> Vec<T> {
        match limit {
            Some(limit) => items.take(limit.max(0) as usize).collect(),
            None => items.collect(),
        }
    }
}

#[async_trait]
impl ForgeStore for MemoryStore {
    async fn create_job(&self, job: &GenerationJob) -> Result<(), StoreError> {
        let mut state = self.write();
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(format!("job {}", job.id)));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<GenerationJob>, StoreError> {
        Ok(self.read().jobs.get(&id).cloned())
    }

    async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<GenerationJob>, StoreError> {
        let state = self.read();
        let mut jobs: Vec<GenerationJob> = state
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Self::limited(jobs.into_iter(), filter.limit))
    }

    async fn count_jobs(&self, filter: &JobFilter) -> Result<u64, StoreError> {
        Ok(self
            .read()
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .count() as u64)
    }

    async fn transition_job(
        &self,
        id: Uuid,
        next: GenerationJobStatus,
        last_error: Option<&str>,
    ) -> Result<GenerationJob, StoreError> {
        let mut state = self.write();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;

        if !job.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to: next,
            });
        }

        job.status = next;
        let now = Utc::now();
        if next == GenerationJobStatus::Running {
            job.started_at = Some(now);
        }
        if next.is_terminal() {
            job.completed_at = Some(now);
        }
        if let Some(error) = last_error {
            job.last_error = Some(error.to_string());
        }
        Ok(job.clone())
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: &ScenarioOutcome,
    ) -> Result<JobCounters, StoreError> {
        let mut state = self.write();
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;

        if job.is_exhausted() {
            return Err(StoreError::CountersExhausted(id));
        }

        job.generated_count += 1;
        match outcome {
            ScenarioOutcome::Stored => job.stored_count += 1,
            ScenarioOutcome::Failed { reason } => {
                job.failed_count += 1;
                job.last_error = Some(reason.clone());
            }
        }
        Ok(job.counters())
    }

    async fn create_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        check_persistable(scenario)?;
        let mut state = self.write();
        if state.scenario_index.contains_key(&scenario.scenario_id) {
            return Err(StoreError::Duplicate(format!(
                "scenario {}",
                scenario.scenario_id
            )));
        }
        let position = state.scenarios.len();
        state
            .scenario_index
            .insert(scenario.scenario_id.clone(), position);
        state.scenarios.push(scenario.clone());
        Ok(())
    }

    async fn find_scenario(&self, scenario_id: &str) -> Result<Option<Scenario>, StoreError> {
        let state = self.read();
        Ok(state
            .scenario_index
            .get(scenario_id)
            .and_then(|&i| state.scenarios.get(i))
            .cloned())
    }

    async fn find_scenarios(&self, filter: &ScenarioFilter) -> Result<Vec<Scenario>, StoreError> {
        let state = self.read();
        let matching = state
            .scenarios
            .iter()
            .filter(|s| filter.matches(s))
            .cloned();
        Ok(Self::limited(matching, filter.limit))
    }

    async fn count_scenarios(&self, filter: &ScenarioFilter) -> Result<u64, StoreError> {
        Ok(self
            .read()
            .scenarios
            .iter()
            .filter(|s| filter.matches(s))
            .count() as u64)
    }

    async fn save_trial_result(&self, result: &TrialResult) -> Result<(), StoreError> {
        let mut state = self.write();
        // Upsert: a recovered trial may report twice.
        match state
            .trial_results
            .iter()
            .position(|r| r.trial_id == result.trial_id)
        {
            Some(i) => state.trial_results[i] = result.clone(),
            None => state.trial_results.push(result.clone()),
        }
        Ok(())
    }

    async fn find_trial_results(
        &self,
        scenario_id: Option<&str>,
    ) -> Result<Vec<TrialResult>, StoreError> {
        Ok(self
            .read()
            .trial_results
            .iter()
            .filter(|r| scenario_id.map_or(true, |id| r.scenario_id == id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Domain, Position, ScenarioGenerator, ScenarioSource, Tier};
    use crate::scheduler::job::{ConfigId, TrialJob};
    use std::sync::Arc;

    fn job(total: u64) -> GenerationJob {
        GenerationJob::new(
            vec![Domain::Analytical],
            vec![Tier::Simple],
            1,
            "mock",
            vec!["m1".to_string()],
            ConfigId::full(),
            1,
            total,
        )
    }

    fn scenario(rep: u32) -> Scenario {
        ScenarioGenerator::new(Uuid::nil())
            .render(&Position::new(Domain::Analytical, Tier::Simple, rep, "m1"), &[])
            .expect("render")
    }

    #[tokio::test]
    async fn test_job_transitions_are_guarded() {
        let store = MemoryStore::new();
        let job = job(2);
        store.create_job(&job).await.expect("create");
        assert!(matches!(
            store.create_job(&job).await,
            Err(StoreError::Duplicate(_))
        ));

        let running = store
            .transition_job(job.id, GenerationJobStatus::Running, None)
            .await
            .expect("start");
        assert!(running.started_at.is_some());

        let failed = store
            .transition_job(job.id, GenerationJobStatus::Failed, Some("cancelled by user"))
            .await
            .expect("fail");
        assert_eq!(failed.last_error.as_deref(), Some("cancelled by user"));
        assert!(failed.completed_at.is_some());

        let err = store
            .transition_job(job.id, GenerationJobStatus::Completed, None)
            .await
            .expect_err("terminal");
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: GenerationJobStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_keep_counters_consistent() {
        let store = Arc::new(MemoryStore::new());
        let job = job(40);
        store.create_job(&job).await.expect("create");
        let job_id = job.id;

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let outcome = if i % 3 == 0 {
                    ScenarioOutcome::Failed {
                        reason: "rejected".to_string(),
                    }
                } else {
                    ScenarioOutcome::Stored
                };
                store.record_outcome(job_id, &outcome).await
            }));
        }

        let mut exhausted = 0;
        for handle in handles {
            match handle.await.expect("joined") {
                Ok(counters) => assert!(counters.is_consistent()),
                Err(StoreError::CountersExhausted(_)) => exhausted += 1,
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        assert_eq!(exhausted, 10);

        let stored = store.find_job(job_id).await.expect("find").expect("exists");
        let counters = stored.counters();
        assert!(counters.is_consistent());
        assert_eq!(counters.stored + counters.failed, 40);
    }

    #[tokio::test]
    async fn test_scenarios_are_unique_and_ordered() {
        let store = MemoryStore::new();
        for rep in 1..=3 {
            store.create_scenario(&scenario(rep)).await.expect("create");
        }
        assert!(matches!(
            store.create_scenario(&scenario(2)).await,
            Err(StoreError::Duplicate(_))
        ));

        let all = store
            .find_scenarios(&ScenarioFilter::new())
            .await
            .expect("find");
        let reps: Vec<u32> = all.iter().map(|s| s.repetition).collect();
        assert_eq!(reps, vec![1, 2, 3]);

        let limited = store
            .find_scenarios(&ScenarioFilter::new().with_limit(2))
            .await
            .expect("find");
        assert_eq!(limited.len(), 2);
        assert_eq!(
            store
                .count_scenarios(&ScenarioFilter::new().with_tier(Tier::Complex))
                .await
                .expect("count"),
            0
        );
        let found = store
            .find_scenario(&all[1].scenario_id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found, all[1]);
    }

    #[tokio::test]
    async fn test_scenario_without_thresholds_is_never_persisted() {
        let store = MemoryStore::new();
        let mut bad = scenario(1);
        bad.control_expectations.success_thresholds.clear();

        assert!(matches!(
            store.create_scenario(&bad).await,
            Err(StoreError::InvalidRecord(_))
        ));
        assert_eq!(
            store
                .count_scenarios(&ScenarioFilter::new())
                .await
                .expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn test_trial_results_upsert() {
        let store = MemoryStore::new();
        let trial = TrialJob::new("s-1", "mock", "m1", ConfigId::full());
        let failed = TrialResult::failure(&trial, "worker-0", "timeout", 10);
        let ok = TrialResult::success(&trial, "worker-1", "answer".to_string(), serde_json::Value::Null, 20);

        store.save_trial_result(&failed).await.expect("save");
        store.save_trial_result(&ok).await.expect("save");

        let results = store.find_trial_results(Some("s-1")).await.expect("find");
        assert_eq!(results, vec![ok]);
        assert!(store
            .find_trial_results(Some("other"))
            .await
            .expect("find")
            .is_empty());
    }
}
