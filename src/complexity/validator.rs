//! Composite complexity scoring and tier classification.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::metrics::ComplexityMetrics;
use crate::error::ConfigError;
use crate::scenario::{Scenario, Tier};

/// Wood component complexity at which the Wood signal reads moderate.
const WOOD_COMPONENT_MODERATE: f64 = 8.0;
/// Wood component complexity at which the Wood signal reads complex.
const WOOD_COMPONENT_COMPLEX: f64 = 14.0;
/// Mean Liu & Li dimension at which the signal reads moderate.
const LIU_LI_MODERATE: f64 = 0.25;
/// Mean Liu & Li dimension at which the signal reads complex.
const LIU_LI_COMPLEX: f64 = 0.5;
/// Score distance from a tier boundary that counts as full margin.
const FULL_MARGIN: f64 = 7.5;

/// Regeneration hint fed back into scenario rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptEnhancement {
    IncreaseInterdependence,
    ReduceInterdependence,
    IncreaseInformationCues,
    ReduceInformationCues,
    IncreaseConflictingGoals,
    ReduceConflictingGoals,
    IncreaseUncertainty,
    ReduceUncertainty,
    IncreaseVariety,
    ReduceVariety,
}

impl PromptEnhancement {
    pub fn hint(&self) -> &'static str {
        match self {
            PromptEnhancement::IncreaseInterdependence => "increase variable interdependence",
            PromptEnhancement::ReduceInterdependence => "reduce variable interdependence",
            PromptEnhancement::IncreaseInformationCues => {
                "add more information cues the solver must integrate"
            }
            PromptEnhancement::ReduceInformationCues => {
                "remove information cues that are not essential"
            }
            PromptEnhancement::IncreaseConflictingGoals => {
                "introduce conflicting goals between stakeholders"
            }
            PromptEnhancement::ReduceConflictingGoals => "align the goals so they do not conflict",
            PromptEnhancement::IncreaseUncertainty => {
                "add ambiguity and conditions that change during the task"
            }
            PromptEnhancement::ReduceUncertainty => "make the conditions explicit and stable",
            PromptEnhancement::IncreaseVariety => "draw on a wider variety of data sources",
            PromptEnhancement::ReduceVariety => "limit the task to fewer data sources",
        }
    }
}

/// Weights of the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub wood_component: f64,
    pub wood_coordinative: f64,
    pub wood_dynamic: f64,
    pub campbell_paths: f64,
    pub campbell_outcomes: f64,
    pub campbell_conflict: f64,
    pub campbell_uncertainty: f64,
    pub liu_li_variety: f64,
    pub liu_li_ambiguity: f64,
    /// Weight of each of the remaining eight Liu & Li dimensions.
    pub liu_li_other: f64,
    pub interactivity_ratio: f64,
    pub working_memory_load: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            wood_component: 0.5,
            wood_coordinative: 4.0,
            wood_dynamic: 2.0,
            campbell_paths: 3.0,
            campbell_outcomes: 3.0,
            campbell_conflict: 4.0,
            campbell_uncertainty: 2.0,
            liu_li_variety: 6.0,
            liu_li_ambiguity: 6.0,
            liu_li_other: 1.0,
            interactivity_ratio: 10.0,
            working_memory_load: 4.0,
        }
    }
}

impl CompositeWeights {
    fn all(&self) -> [f64; 12] {
        [
            self.wood_component,
            self.wood_coordinative,
            self.wood_dynamic,
            self.campbell_paths,
            self.campbell_outcomes,
            self.campbell_conflict,
            self.campbell_uncertainty,
            self.liu_li_variety,
            self.liu_li_ambiguity,
            self.liu_li_other,
            self.interactivity_ratio,
            self.working_memory_load,
        ]
    }
}

/// Composite score boundaries. Intervals are half-open: a score equal to a
/// boundary belongs to the higher tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub moderate: f64,
    pub complex: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            moderate: 15.0,
            complex: 30.0,
        }
    }
}

impl TierThresholds {
    pub fn classify(&self, score: f64) -> Tier {
        if score >= self.complex {
            Tier::Complex
        } else if score >= self.moderate {
            Tier::Moderate
        } else {
            Tier::Simple
        }
    }

    /// Distance from `score` to the nearest boundary of `tier`'s interval.
    fn margin(&self, score: f64, tier: Tier) -> f64 {
        match tier {
            Tier::Simple => self.moderate - score,
            Tier::Moderate => (score - self.moderate).min(self.complex - score),
            Tier::Complex => score - self.complex,
        }
        .max(0.0)
    }
}

/// Element-interactivity ratio bands: simple at or below `simple`,
/// complex at or above `complex`, moderate in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractivityThresholds {
    pub simple: f64,
    pub complex: f64,
}

impl Default for InteractivityThresholds {
    fn default() -> Self {
        Self {
            simple: 0.2,
            complex: 0.5,
        }
    }
}

impl InteractivityThresholds {
    pub fn classify(&self, ratio: f64) -> Tier {
        if ratio <= self.simple {
            Tier::Simple
        } else if ratio >= self.complex {
            Tier::Complex
        } else {
            Tier::Moderate
        }
    }
}

/// Configuration for the [`ComplexityValidator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub weights: CompositeWeights,
    pub tier_thresholds: TierThresholds,
    pub interactivity_thresholds: InteractivityThresholds,
    /// Tiers the prediction may differ from the intended tier (0 or 1).
    pub allowed_tier_deviation: u8,
    pub minimum_confidence: f64,
    /// Total renders allowed per position, including the first.
    pub max_regeneration_attempts: u32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            weights: CompositeWeights::default(),
            tier_thresholds: TierThresholds::default(),
            interactivity_thresholds: InteractivityThresholds::default(),
            allowed_tier_deviation: 0,
            minimum_confidence: 0.6,
            max_regeneration_attempts: 3,
        }
    }
}

impl ValidatorConfig {
    /// Loads a configuration from a YAML file. Missing fields take defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the allowed tier deviation.
    pub fn with_allowed_tier_deviation(mut self, deviation: u8) -> Self {
        self.allowed_tier_deviation = deviation;
        self
    }

    /// Sets the minimum confidence.
    pub fn with_minimum_confidence(mut self, confidence: f64) -> Self {
        self.minimum_confidence = confidence;
        self
    }

    /// Sets the attempt budget.
    pub fn with_max_regeneration_attempts(mut self, attempts: u32) -> Self {
        self.max_regeneration_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tiers = &self.tier_thresholds;
        if !(tiers.moderate > 0.0 && tiers.complex > tiers.moderate) {
            return Err(ConfigError::ValidationFailed(format!(
                "tier thresholds must satisfy 0 < moderate < complex (got {} and {})",
                tiers.moderate, tiers.complex
            )));
        }
        let ei = &self.interactivity_thresholds;
        if !(0.0 <= ei.simple && ei.simple < ei.complex && ei.complex <= 1.0) {
            return Err(ConfigError::ValidationFailed(format!(
                "interactivity thresholds must satisfy 0 <= simple < complex <= 1 (got {} and {})",
                ei.simple, ei.complex
            )));
        }
        if self.allowed_tier_deviation > 1 {
            return Err(ConfigError::ValidationFailed(
                "allowed_tier_deviation must be 0 or 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.minimum_confidence) {
            return Err(ConfigError::ValidationFailed(
                "minimum_confidence must be between 0 and 1".to_string(),
            ));
        }
        if self.max_regeneration_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_regeneration_attempts must be at least 1".to_string(),
            ));
        }
        if self.weights.all().iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(ConfigError::ValidationFailed(
                "composite weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Weighted contribution of each signal group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub wood: f64,
    pub campbell: f64,
    pub liu_li: f64,
    pub interactivity: f64,
}

impl ComponentScores {
    pub fn total(&self) -> f64 {
        self.wood + self.campbell + self.liu_li + self.interactivity
    }
}

/// The tier each signal group reads on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalTiers {
    pub wood: Tier,
    pub campbell: Tier,
    pub liu_li: Tier,
    pub interactivity: Tier,
}

impl SignalTiers {
    fn as_array(&self) -> [Tier; 4] {
        [self.wood, self.campbell, self.liu_li, self.interactivity]
    }

    /// Fraction of signal groups agreeing with `tier`.
    pub fn agreement(&self, tier: Tier) -> f64 {
        self.as_array().iter().filter(|t| **t == tier).count() as f64 / 4.0
    }
}

/// Result of scoring one scenario. Superseded, never mutated, on re-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub metrics: ComplexityMetrics,
    pub campbell_type: u8,
    pub component_scores: ComponentScores,
    pub signal_tiers: SignalTiers,
    pub overall_score: f64,
    pub predicted_tier: Tier,
    pub intended_tier: Tier,
    pub tier_match: bool,
    pub confidence_score: f64,
    pub is_valid: bool,
    pub rejection_reasons: Vec<String>,
    pub prompt_enhancements: Vec<PromptEnhancement>,
}

/// Scores scenarios against the Wood, Campbell and Liu & Li frameworks.
#[derive(Debug, Clone, Default)]
pub struct ComplexityValidator {
    config: ValidatorConfig,
}

impl ComplexityValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Extracts metrics from a scenario and scores them against its tier.
    pub fn validate(&self, scenario: &Scenario) -> ComplexityScore {
        let metrics = ComplexityMetrics::extract(scenario);
        let score = self.evaluate(metrics, scenario.tier);
        debug!(
            scenario_id = %scenario.scenario_id,
            overall = score.overall_score,
            predicted = %score.predicted_tier,
            intended = %score.intended_tier,
            confidence = score.confidence_score,
            valid = score.is_valid,
            "Scored scenario complexity"
        );
        score
    }

    /// Classifies a composite score.
    pub fn classify(&self, overall_score: f64) -> Tier {
        self.config.tier_thresholds.classify(overall_score)
    }

    /// Weighted contribution of every signal group.
    pub fn component_scores(&self, metrics: &ComplexityMetrics) -> ComponentScores {
        let w = &self.config.weights;
        let wood = &metrics.wood;
        let campbell = &metrics.campbell;
        let ll = &metrics.liu_li;
        let ei = &metrics.interactivity;

        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        ComponentScores {
            wood: wood.component_complexity() * w.wood_component
                + wood.coordinative.level() as f64 * w.wood_coordinative
                + wood.dynamic.level() as f64 * w.wood_dynamic,
            campbell: flag(campbell.multiple_paths) * w.campbell_paths
                + flag(campbell.multiple_outcomes) * w.campbell_outcomes
                + flag(campbell.conflicting_interdependence) * w.campbell_conflict
                + campbell.uncertainty.level() as f64 * w.campbell_uncertainty,
            liu_li: ll.variety * w.liu_li_variety
                + ll.ambiguity * w.liu_li_ambiguity
                + ll.other_dimensions().iter().sum::<f64>() * w.liu_li_other,
            interactivity: ei.ratio * w.interactivity_ratio
                + ei.working_memory_load * w.working_memory_load,
        }
    }

    /// Reads each signal group's own tier.
    pub fn signal_tiers(&self, metrics: &ComplexityMetrics) -> SignalTiers {
        let component = metrics.wood.component_complexity();
        let component_level = if component >= WOOD_COMPONENT_COMPLEX {
            2
        } else if component >= WOOD_COMPONENT_MODERATE {
            1
        } else {
            0
        };
        let mut wood_levels = [
            component_level,
            metrics.wood.coordinative.level(),
            metrics.wood.dynamic.level(),
        ];
        wood_levels.sort_unstable();

        let campbell = match metrics.campbell.elevated_count() {
            0 => Tier::Simple,
            1 | 2 => Tier::Moderate,
            _ => Tier::Complex,
        };

        let mean = metrics.liu_li.mean();
        let liu_li = if mean >= LIU_LI_COMPLEX {
            Tier::Complex
        } else if mean >= LIU_LI_MODERATE {
            Tier::Moderate
        } else {
            Tier::Simple
        };

        SignalTiers {
            wood: Tier::from_level(wood_levels[1]),
            campbell,
            liu_li,
            interactivity: self
                .config
                .interactivity_thresholds
                .classify(metrics.interactivity.ratio),
        }
    }

    /// Scores raw metrics against an intended tier.
    pub fn evaluate(&self, metrics: ComplexityMetrics, intended_tier: Tier) -> ComplexityScore {
        let component_scores = self.component_scores(&metrics);
        let overall_score = component_scores.total();
        let predicted_tier = self.classify(overall_score);
        let signal_tiers = self.signal_tiers(&metrics);

        let margin = (self.config.tier_thresholds.margin(overall_score, predicted_tier)
            / FULL_MARGIN)
            .min(1.0);
        let confidence_score = 0.4 * margin + 0.6 * signal_tiers.agreement(predicted_tier);

        let deviation = predicted_tier.distance(intended_tier);
        let within_deviation = deviation <= self.config.allowed_tier_deviation;
        let confident = confidence_score >= self.config.minimum_confidence;
        let is_valid = within_deviation && confident;

        let mut rejection_reasons = Vec::new();
        let mut prompt_enhancements = Vec::new();
        if !is_valid {
            if !within_deviation {
                rejection_reasons.push(format!(
                    "predicted tier '{}' (score {:.1}) differs from intended tier '{}'",
                    predicted_tier, overall_score, intended_tier
                ));
            }
            if !confident {
                rejection_reasons.push(format!(
                    "confidence {:.2} is below the minimum of {:.2}",
                    confidence_score, self.config.minimum_confidence
                ));
            }
            for (name, tier) in [
                ("Wood", signal_tiers.wood),
                ("Campbell", signal_tiers.campbell),
                ("Liu & Li", signal_tiers.liu_li),
                ("element interactivity", signal_tiers.interactivity),
            ] {
                if tier != intended_tier {
                    rejection_reasons.push(format!(
                        "{} signals read '{}' instead of '{}'",
                        name, tier, intended_tier
                    ));
                }
            }
            prompt_enhancements =
                enhancements_for(&signal_tiers, predicted_tier, intended_tier);
        }

        ComplexityScore {
            campbell_type: metrics.campbell.campbell_type(),
            metrics,
            component_scores,
            signal_tiers,
            overall_score,
            predicted_tier,
            intended_tier,
            tier_match: predicted_tier == intended_tier,
            confidence_score,
            is_valid,
            rejection_reasons,
            prompt_enhancements,
        }
    }

    /// Validates a scenario and, if accepted, annotates it with the score.
    pub fn annotate_if_valid(&self, scenario: &mut Scenario) -> ComplexityScore {
        let score = self.validate(scenario);
        if score.is_valid {
            scenario.annotate(score.clone(), Utc::now());
        }
        score
    }
}

fn enhancements_for(
    signals: &SignalTiers,
    predicted: Tier,
    intended: Tier,
) -> Vec<PromptEnhancement> {
    use PromptEnhancement::*;

    fn push(out: &mut Vec<PromptEnhancement>, hint: PromptEnhancement) {
        if !out.contains(&hint) {
            out.push(hint);
        }
    }

    let mut out: Vec<PromptEnhancement> = Vec::new();

    let groups: [(Tier, [PromptEnhancement; 2], [PromptEnhancement; 2]); 4] = [
        (
            signals.wood,
            [IncreaseInformationCues, IncreaseInterdependence],
            [ReduceInformationCues, ReduceInterdependence],
        ),
        (
            signals.campbell,
            [IncreaseConflictingGoals, IncreaseUncertainty],
            [ReduceConflictingGoals, ReduceUncertainty],
        ),
        (
            signals.liu_li,
            [IncreaseVariety, IncreaseUncertainty],
            [ReduceVariety, ReduceUncertainty],
        ),
        (
            signals.interactivity,
            [IncreaseInterdependence, IncreaseInterdependence],
            [ReduceInterdependence, ReduceInterdependence],
        ),
    ];
    for (tier, raise, lower) in groups {
        let hints = if tier < intended {
            raise
        } else if tier > intended {
            lower
        } else {
            continue;
        };
        for hint in hints {
            push(&mut out, hint);
        }
    }

    if out.is_empty() && predicted != intended {
        push(
            &mut out,
            if predicted < intended {
                IncreaseInformationCues
            } else {
                ReduceInformationCues
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::metrics::{
        CampbellMetrics, CoordinativeComplexity, DynamicComplexity, InteractivityMetrics,
        LiuLiMetrics, WoodMetrics,
    };
    use crate::scenario::UncertaintyLevel;

    fn worked_example() -> ComplexityMetrics {
        ComplexityMetrics {
            wood: WoodMetrics {
                distinct_acts: 2,
                information_cues_per_act: 1.0,
                ..Default::default()
            },
            campbell: CampbellMetrics::default(),
            liu_li: LiuLiMetrics {
                variety: 0.1,
                ambiguity: 0.1,
                ..Default::default()
            },
            interactivity: InteractivityMetrics {
                ratio: 0.15,
                ..Default::default()
            },
        }
    }

    fn heavy() -> ComplexityMetrics {
        ComplexityMetrics {
            wood: WoodMetrics {
                distinct_acts: 7,
                information_cues_per_act: 2.0,
                coordinative: CoordinativeComplexity::Networked,
                dynamic: DynamicComplexity::High,
            },
            campbell: CampbellMetrics {
                multiple_paths: true,
                multiple_outcomes: true,
                conflicting_interdependence: true,
                uncertainty: UncertaintyLevel::High,
            },
            liu_li: LiuLiMetrics {
                size: 0.7,
                variety: 1.0,
                ambiguity: 0.75,
                relationships: 0.7,
                variability: 0.75,
                unreliability: 0.2,
                novelty: 0.7,
                incongruity: 0.7,
                action_complexity: 0.8,
                time_pressure: 0.7,
            },
            interactivity: InteractivityMetrics {
                total_elements: 14,
                interacting_elements: 8,
                ratio: 8.0 / 14.0,
                effective_elements: 6,
                working_memory_load: 6.0 / 7.0,
            },
        }
    }

    #[test]
    fn test_worked_example_is_simple() {
        let validator = ComplexityValidator::default();
        let score = validator.evaluate(worked_example(), Tier::Simple);

        assert!((score.overall_score - 3.7).abs() < 1e-9);
        assert_eq!(score.predicted_tier, Tier::Simple);
        assert!(score.tier_match);
        assert!(score.is_valid);
        assert_eq!(score.confidence_score, 1.0);
        assert_eq!(score.campbell_type, 0);
        assert!(score.rejection_reasons.is_empty());
        assert!(score.prompt_enhancements.is_empty());
    }

    #[test]
    fn test_boundaries_are_half_open() {
        let thresholds = TierThresholds::default();
        assert_eq!(thresholds.classify(14.999), Tier::Simple);
        assert_eq!(thresholds.classify(15.0), Tier::Moderate);
        assert_eq!(thresholds.classify(29.999), Tier::Moderate);
        assert_eq!(thresholds.classify(30.0), Tier::Complex);

        let ei = InteractivityThresholds::default();
        assert_eq!(ei.classify(0.2), Tier::Simple);
        assert_eq!(ei.classify(0.35), Tier::Moderate);
        assert_eq!(ei.classify(0.5), Tier::Complex);
    }

    #[test]
    fn test_mismatch_rejected_with_increase_hints() {
        let validator = ComplexityValidator::default();
        let score = validator.evaluate(worked_example(), Tier::Complex);

        assert!(!score.is_valid);
        assert!(!score.tier_match);
        assert!(score
            .rejection_reasons
            .iter()
            .any(|r| r.contains("differs from intended tier 'complex'")));
        assert!(score
            .prompt_enhancements
            .contains(&PromptEnhancement::IncreaseInterdependence));
        assert!(score
            .prompt_enhancements
            .iter()
            .all(|e| e.hint().starts_with("increase")
                || e.hint().starts_with("add")
                || e.hint().starts_with("introduce")
                || e.hint().starts_with("draw")));
    }

    #[test]
    fn test_overshoot_yields_reduce_hints() {
        let validator = ComplexityValidator::default();
        let score = validator.evaluate(heavy(), Tier::Simple);

        assert_eq!(score.predicted_tier, Tier::Complex);
        assert!(!score.is_valid);
        assert!(score
            .prompt_enhancements
            .contains(&PromptEnhancement::ReduceConflictingGoals));
        assert!(!score
            .prompt_enhancements
            .contains(&PromptEnhancement::IncreaseVariety));
    }

    #[test]
    fn test_allowed_deviation_accepts_adjacent_tier() {
        let strict = ComplexityValidator::default();
        let lenient =
            ComplexityValidator::new(ValidatorConfig::default().with_allowed_tier_deviation(1));

        let strict_score = strict.evaluate(worked_example(), Tier::Moderate);
        let lenient_score = lenient.evaluate(worked_example(), Tier::Moderate);
        assert!(!strict_score.is_valid);
        assert!(lenient_score.is_valid);
        assert!(!lenient_score.tier_match);

        let two_away = lenient.evaluate(worked_example(), Tier::Complex);
        assert!(!two_away.is_valid);
    }

    #[test]
    fn test_minimum_confidence_gates_acceptance() {
        let validator =
            ComplexityValidator::new(ValidatorConfig::default().with_minimum_confidence(1.0));
        // Campbell reads complex while the composite says simple.
        let mut metrics = worked_example();
        metrics.campbell = CampbellMetrics {
            multiple_paths: true,
            multiple_outcomes: true,
            conflicting_interdependence: false,
            uncertainty: UncertaintyLevel::Bounded,
        };
        let score = validator.evaluate(metrics, Tier::Simple);
        assert_eq!(score.predicted_tier, Tier::Simple);
        assert!(score.confidence_score < 1.0);
        assert!(!score.is_valid);
        assert!(score
            .rejection_reasons
            .iter()
            .any(|r| r.contains("confidence")));
    }

    #[test]
    fn test_config_validation() {
        assert!(ValidatorConfig::default().validate().is_ok());

        let mut bad = ValidatorConfig::default();
        bad.tier_thresholds.complex = 10.0;
        assert!(bad.validate().is_err());

        let bad = ValidatorConfig::default().with_max_regeneration_attempts(0);
        assert!(bad.validate().is_err());

        let bad = ValidatorConfig::default().with_allowed_tier_deviation(2);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_from_yaml_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("validator.yaml");
        std::fs::write(
            &path,
            "allowed_tier_deviation: 1\nweights:\n  interactivity_ratio: 12.0\n",
        )
        .expect("write config");

        let config = ValidatorConfig::from_yaml_file(&path).expect("load config");
        assert_eq!(config.allowed_tier_deviation, 1);
        assert_eq!(config.weights.interactivity_ratio, 12.0);
        assert_eq!(config.weights.liu_li_variety, 6.0);
        assert_eq!(config.minimum_confidence, 0.6);
        assert_eq!(config.max_regeneration_attempts, 3);
    }
}
