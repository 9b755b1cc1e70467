//! Bounded regeneration loop.
//!
//! A position is rendered, checked structurally, then scored. A rejected
//! render is retried with the validator's hints accumulated into the next
//! render, until the attempt budget is spent. Structural failures stop the
//! loop immediately: re-rendering cannot fix a missing field or empty
//! thresholds.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::validator::{ComplexityScore, ComplexityValidator, PromptEnhancement};
use crate::error::GenerationError;
use crate::metrics::MetricsCollector;
use crate::scenario::{validate_scenario, Position, Scenario, ScenarioSource};
use crate::scheduler::CancellationFlag;

/// Attempt bookkeeping for one position.
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationState {
    attempt: u32,
    max_attempts: u32,
    last_rejection: Option<ComplexityScore>,
    enhancements: Vec<PromptEnhancement>,
}

impl RegenerationState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            last_rejection: None,
            enhancements: Vec::new(),
        }
    }

    /// Renders performed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_rejection(&self) -> Option<&ComplexityScore> {
        self.last_rejection.as_ref()
    }

    /// Distinct hints from every rejected attempt, in first-seen order.
    pub fn enhancements(&self) -> &[PromptEnhancement] {
        &self.enhancements
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Starts the next attempt, returning its 1-based number, or `None`
    /// once the budget is spent.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    /// Records a rejected score and folds its hints into the next render.
    /// A hint already requested by an earlier attempt is not repeated.
    pub fn record_rejection(&mut self, score: ComplexityScore) {
        for hint in &score.prompt_enhancements {
            if !self.enhancements.contains(hint) {
                self.enhancements.push(*hint);
            }
        }
        self.last_rejection = Some(score);
    }

    fn rejection_reasons(&self) -> Vec<String> {
        self.last_rejection
            .as_ref()
            .map(|s| s.rejection_reasons.clone())
            .unwrap_or_default()
    }
}

/// Final result of the loop for one position.
#[derive(Debug, Clone, PartialEq)]
pub enum RegenerationOutcome {
    /// Accepted scenario, annotated with its score.
    Accepted { scenario: Box<Scenario>, attempts: u32 },
    /// The position could not produce an acceptable scenario.
    Failed { error: GenerationError, attempts: u32 },
    /// Cancellation was observed between attempts.
    Cancelled { attempts: u32 },
}

impl RegenerationOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RegenerationOutcome::Accepted { attempts, .. }
            | RegenerationOutcome::Failed { attempts, .. }
            | RegenerationOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, RegenerationOutcome::Accepted { .. })
    }
}

/// Produces a validated scenario for `position`.
///
/// Never panics or propagates: every failure is folded into the outcome so
/// the caller can count it and continue its sweep.
pub fn generate_validated(
    source: &dyn ScenarioSource,
    validator: &ComplexityValidator,
    position: &Position,
    cancel: Option<&CancellationFlag>,
) -> RegenerationOutcome {
    let metrics = MetricsCollector::new();
    let mut state = RegenerationState::new(validator.config().max_regeneration_attempts);

    while let Some(attempt) = state.begin_attempt() {
        if attempt > 1 && cancel.is_some_and(|c| c.is_cancelled()) {
            debug!(position = %position, attempt, "Regeneration cancelled");
            return RegenerationOutcome::Cancelled {
                attempts: attempt - 1,
            };
        }

        let mut scenario = match source.render(position, state.enhancements()) {
            Ok(scenario) => scenario,
            Err(error) => {
                warn!(position = %position, attempt, error = %error, "Scenario render failed");
                metrics.record_regeneration_attempts(attempt);
                return RegenerationOutcome::Failed {
                    error,
                    attempts: attempt,
                };
            }
        };

        if let Err(error) = validate_scenario(&scenario) {
            warn!(
                scenario_id = %scenario.scenario_id,
                attempt,
                error = %error,
                "Scenario failed structural validation"
            );
            metrics.record_regeneration_attempts(attempt);
            return RegenerationOutcome::Failed {
                error,
                attempts: attempt,
            };
        }

        let score = validator.validate(&scenario);
        metrics.record_complexity_score(score.overall_score);
        if score.is_valid {
            info!(
                scenario_id = %scenario.scenario_id,
                attempt,
                overall = score.overall_score,
                predicted = %score.predicted_tier,
                confidence = score.confidence_score,
                "Scenario accepted"
            );
            metrics.record_regeneration_attempts(attempt);
            scenario.annotate(score, Utc::now());
            return RegenerationOutcome::Accepted {
                scenario: Box::new(scenario),
                attempts: attempt,
            };
        }

        info!(
            scenario_id = %scenario.scenario_id,
            attempt,
            max_attempts = state.max_attempts(),
            reasons = ?score.rejection_reasons,
            hints = ?score.prompt_enhancements,
            "Scenario rejected by complexity validation"
        );
        state.record_rejection(score);
    }

    metrics.record_regeneration_attempts(state.attempt());
    RegenerationOutcome::Failed {
        error: GenerationError::ValidationRejected {
            attempts: state.attempt(),
            reasons: state.rejection_reasons(),
        },
        attempts: state.attempt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::ValidatorConfig;
    use crate::scenario::{Domain, ScenarioGenerator, Tier};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Renders an underspecified (simple-profile) scenario that ignores hints
    /// for the first `weak_renders` calls, then the real one. Records the
    /// hints it was given.
    struct WeakThenStrongSource {
        inner: ScenarioGenerator,
        weak_renders: u32,
        calls: Mutex<Vec<Vec<PromptEnhancement>>>,
    }

    impl WeakThenStrongSource {
        fn new(weak_renders: u32) -> Self {
            Self {
                inner: ScenarioGenerator::new(Uuid::nil()),
                weak_renders,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<PromptEnhancement>> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl ScenarioSource for WeakThenStrongSource {
        fn render(
            &self,
            position: &Position,
            enhancements: &[PromptEnhancement],
        ) -> Result<Scenario, GenerationError> {
            let mut calls = self.calls.lock().expect("lock");
            calls.push(enhancements.to_vec());
            if calls.len() as u32 <= self.weak_renders {
                let weak = Position {
                    tier: Tier::Simple,
                    ..position.clone()
                };
                let mut scenario = self.inner.render(&weak, &[])?;
                scenario.tier = position.tier;
                Ok(scenario)
            } else {
                self.inner.render(position, enhancements)
            }
        }
    }

    struct EmptyThresholdSource;

    impl ScenarioSource for EmptyThresholdSource {
        fn render(
            &self,
            position: &Position,
            enhancements: &[PromptEnhancement],
        ) -> Result<Scenario, GenerationError> {
            let mut scenario = ScenarioGenerator::new(Uuid::nil()).render(position, enhancements)?;
            scenario.control_expectations.success_thresholds.clear();
            Ok(scenario)
        }
    }

    fn complex_position() -> Position {
        Position::new(Domain::Planning, Tier::Complex, 1, "m1")
    }

    #[test]
    fn test_state_budget() {
        let mut state = RegenerationState::new(3);
        assert_eq!(state.begin_attempt(), Some(1));
        assert_eq!(state.begin_attempt(), Some(2));
        assert_eq!(state.begin_attempt(), Some(3));
        assert_eq!(state.begin_attempt(), None);
        assert!(state.is_exhausted());

        let mut zero = RegenerationState::new(0);
        assert_eq!(zero.begin_attempt(), Some(1));
        assert_eq!(zero.begin_attempt(), None);
    }

    #[test]
    fn test_accepts_first_render() {
        let source = ScenarioGenerator::new(Uuid::nil());
        let validator = ComplexityValidator::default();
        let outcome = generate_validated(&source, &validator, &complex_position(), None);

        match outcome {
            RegenerationOutcome::Accepted { scenario, attempts } => {
                assert_eq!(attempts, 1);
                let score = scenario.complexity_metrics.as_ref().expect("annotated");
                assert!(score.tier_match);
                assert!(scenario.validated_at.is_some());
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_retries_with_accumulated_hints() {
        let source = WeakThenStrongSource::new(1);
        let validator = ComplexityValidator::default();
        let outcome = generate_validated(&source, &validator, &complex_position(), None);

        assert!(outcome.is_accepted());
        assert_eq!(outcome.attempts(), 2);
        let calls = source.calls();
        assert!(calls[0].is_empty());
        assert!(calls[1].contains(&PromptEnhancement::IncreaseInterdependence));
    }

    #[test]
    fn test_hints_are_not_repeated_across_retries() {
        let source = WeakThenStrongSource::new(2);
        let validator = ComplexityValidator::default();
        let outcome = generate_validated(&source, &validator, &complex_position(), None);

        assert!(outcome.is_accepted());
        assert_eq!(outcome.attempts(), 3);
        let calls = source.calls();
        assert!(!calls[1].is_empty());
        assert_eq!(calls[2], calls[1], "the same rejection adds no new hints");
        let mut distinct = calls[2].clone();
        distinct.sort_by_key(|hint| hint.hint());
        distinct.dedup();
        assert_eq!(distinct.len(), calls[2].len());
    }

    #[test]
    fn test_budget_exhaustion_fails_without_panicking() {
        let source = WeakThenStrongSource::new(u32::MAX);
        let validator = ComplexityValidator::default();
        let outcome = generate_validated(&source, &validator, &complex_position(), None);

        match outcome {
            RegenerationOutcome::Failed {
                error: GenerationError::ValidationRejected { attempts, reasons },
                attempts: total,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(total, 3);
                assert!(!reasons.is_empty());
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(source.calls().len(), 3);
    }

    #[test]
    fn test_attempt_budget_is_configurable() {
        let source = WeakThenStrongSource::new(u32::MAX);
        let validator =
            ComplexityValidator::new(ValidatorConfig::default().with_max_regeneration_attempts(5));
        let outcome = generate_validated(&source, &validator, &complex_position(), None);
        assert_eq!(outcome.attempts(), 5);
        assert_eq!(source.calls().len(), 5);
    }

    #[test]
    fn test_critical_failure_is_not_retried() {
        let validator = ComplexityValidator::default();
        let outcome =
            generate_validated(&EmptyThresholdSource, &validator, &complex_position(), None);
        assert!(matches!(
            outcome,
            RegenerationOutcome::Failed {
                error: GenerationError::CriticalValidationFailure { .. },
                attempts: 1
            }
        ));
    }

    #[test]
    fn test_cancellation_checked_between_attempts() {
        let source = WeakThenStrongSource::new(u32::MAX);
        let validator = ComplexityValidator::default();
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let outcome = generate_validated(&source, &validator, &complex_position(), Some(&cancel));
        assert_eq!(outcome, RegenerationOutcome::Cancelled { attempts: 1 });
        assert_eq!(source.calls().len(), 1);
    }
}
