//! Validation read models for monitoring.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scenario::Scenario;

/// Aggregate view over stored scenarios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total: u64,
    /// Scenarios carrying a complexity score.
    pub validated: u64,
    pub tier_matches: u64,
    /// Counts by intended tier.
    pub by_tier: BTreeMap<String, u64>,
    pub by_domain: BTreeMap<String, u64>,
    pub by_predicted_tier: BTreeMap<String, u64>,
    pub mean_overall_score: Option<f64>,
}

impl ValidationStats {
    pub fn from_scenarios<'a>(scenarios: impl IntoIterator<Item = &'a Scenario>) -> Self {
        let mut stats = ValidationStats::default();
        let mut score_sum = 0.0;

        for scenario in scenarios {
            stats.total += 1;
            *stats.by_tier.entry(scenario.tier.to_string()).or_default() += 1;
            *stats
                .by_domain
                .entry(scenario.domain.to_string())
                .or_default() += 1;

            if let Some(score) = &scenario.complexity_metrics {
                stats.validated += 1;
                score_sum += score.overall_score;
                if score.tier_match {
                    stats.tier_matches += 1;
                }
                *stats
                    .by_predicted_tier
                    .entry(score.predicted_tier.to_string())
                    .or_default() += 1;
            }
        }

        if stats.validated > 0 {
            stats.mean_overall_score = Some(score_sum / stats.validated as f64);
        }
        stats
    }

    /// Fraction of validated scenarios whose predicted tier matched.
    pub fn tier_match_rate(&self) -> f64 {
        if self.validated == 0 {
            return 0.0;
        }
        self.tier_matches as f64 / self.validated as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::{generate_validated, ComplexityValidator};
    use crate::scenario::{Domain, Position, ScenarioGenerator, ScenarioSource, Tier};
    use uuid::Uuid;

    #[test]
    fn test_stats_over_validated_and_raw_scenarios() {
        let source = ScenarioGenerator::new(Uuid::nil());
        let validator = ComplexityValidator::default();

        let mut scenarios = Vec::new();
        for tier in Tier::ALL {
            let position = Position::new(Domain::Planning, tier, 1, "m1");
            let outcome = generate_validated(&source, &validator, &position, None);
            match outcome {
                crate::complexity::RegenerationOutcome::Accepted { scenario, .. } => {
                    scenarios.push(*scenario)
                }
                other => panic!("expected acceptance, got {:?}", other),
            }
        }
        let raw = source
            .render(&Position::new(Domain::Analytical, Tier::Simple, 1, "m1"), &[])
            .expect("render");
        scenarios.push(raw);

        let stats = ValidationStats::from_scenarios(&scenarios);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.validated, 3);
        assert_eq!(stats.tier_matches, 3);
        assert_eq!(stats.by_domain.get("planning"), Some(&3));
        assert_eq!(stats.by_tier.get("simple"), Some(&2));
        assert_eq!(stats.by_predicted_tier.get("complex"), Some(&1));
        assert!((stats.tier_match_rate() - 1.0).abs() < 1e-9);
        assert!(stats.mean_overall_score.is_some());
    }

    #[test]
    fn test_empty_stats() {
        let stats = ValidationStats::from_scenarios(&Vec::<Scenario>::new());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.tier_match_rate(), 0.0);
        assert_eq!(stats.mean_overall_score, None);
    }
}
