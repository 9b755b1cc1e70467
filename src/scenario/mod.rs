//! Scenario model, indexing and generation.
//!
//! A scenario is one evaluation task drawn from a reasoning domain at a
//! difficulty tier, rendered for a specific model and repetition. Scenarios
//! are produced by sweeping a combinatorial index space:
//!
//! ```text
//!  index ──► ScenarioIndexer ──► Position ──► ScenarioGenerator ──► Scenario
//!                                   ▲                                   │
//!                                   └──── prompt enhancements ◄─── ComplexityValidator
//! ```
//!
//! - [`indexer`]: bijection between a global index and a [`Position`]
//! - [`patterns`]: static template tables keyed by domain and pattern id
//! - [`generator`]: renders a [`Scenario`] from a position and a pattern

pub mod generator;
pub mod indexer;
pub mod patterns;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::complexity::ComplexityScore;
use crate::error::ConfigError;

pub use generator::{validate_scenario, ScenarioCheck, ScenarioGenerator, ScenarioSource};
pub use indexer::{IndexerConfig, ScenarioIndexer, Sweep};
pub use patterns::{PatternLibrary, ScenarioPattern};

/// Namespace for deterministic scenario identifiers.
const SCENARIO_NAMESPACE: Uuid = Uuid::from_u128(0x6d61_6163_2d73_6365_6e61_7269_6f2d_6964);

/// Version stamped into every scenario's metadata.
pub const FRAMEWORK_VERSION: &str = "maac-forge/1.0";

/// Reasoning domain a scenario is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Analytical,
    Planning,
    Communication,
    ProblemSolving,
}

impl Domain {
    /// All domains in enumeration order.
    pub const ALL: [Domain; 4] = [
        Domain::Analytical,
        Domain::Planning,
        Domain::Communication,
        Domain::ProblemSolving,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Analytical => "analytical",
            Domain::Planning => "planning",
            Domain::Communication => "communication",
            Domain::ProblemSolving => "problem_solving",
        }
    }

    /// Human-readable label used in rendered titles.
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Analytical => "Analytical",
            Domain::Planning => "Planning",
            Domain::Communication => "Communication",
            Domain::ProblemSolving => "Problem Solving",
        }
    }

    /// Position of this domain in [`Domain::ALL`].
    pub fn ordinal(&self) -> usize {
        match self {
            Domain::Analytical => 0,
            Domain::Planning => 1,
            Domain::Communication => 2,
            Domain::ProblemSolving => 3,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "analytical" => Ok(Domain::Analytical),
            "planning" => Ok(Domain::Planning),
            "communication" => Ok(Domain::Communication),
            "problem_solving" | "problemsolving" => Ok(Domain::ProblemSolving),
            _ => Err(ConfigError::UnknownDomain(s.to_string())),
        }
    }
}

/// Difficulty classification, both intended (generation) and predicted (validation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Simple,
    Moderate,
    Complex,
}

impl Tier {
    /// All tiers in ascending difficulty.
    pub const ALL: [Tier; 3] = [Tier::Simple, Tier::Moderate, Tier::Complex];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Simple => "simple",
            Tier::Moderate => "moderate",
            Tier::Complex => "complex",
        }
    }

    /// Title prefix for rendered scenarios.
    pub fn prefix(&self) -> &'static str {
        match self {
            Tier::Simple => "Basic",
            Tier::Moderate => "Intermediate",
            Tier::Complex => "Advanced",
        }
    }

    /// Ordinal level (0 = simple).
    pub fn level(&self) -> u8 {
        match self {
            Tier::Simple => 0,
            Tier::Moderate => 1,
            Tier::Complex => 2,
        }
    }

    pub fn from_level(level: u8) -> Tier {
        match level {
            0 => Tier::Simple,
            1 => Tier::Moderate,
            _ => Tier::Complex,
        }
    }

    /// Number of tiers between `self` and `other`.
    pub fn distance(&self, other: Tier) -> u8 {
        self.level().abs_diff(other.level())
    }

    /// Documented minimum count of expected calculations for this tier.
    pub fn min_expected_calculations(&self) -> usize {
        match self {
            Tier::Simple => 1,
            Tier::Moderate => 2,
            Tier::Complex => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Tier::Simple),
            "moderate" => Ok(Tier::Moderate),
            "complex" => Ok(Tier::Complex),
            _ => Err(ConfigError::UnknownTier(s.to_string())),
        }
    }
}

/// A point in the domain x tier x repetition x model space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub domain: Domain,
    pub tier: Tier,
    /// 1-indexed repetition within the (domain, tier) block.
    pub repetition: u32,
    pub model: String,
}

impl Position {
    pub fn new(domain: Domain, tier: Tier, repetition: u32, model: impl Into<String>) -> Self {
        Self {
            domain,
            tier,
            repetition,
            model: model.into(),
        }
    }

    /// Deterministic scenario identifier for this position.
    ///
    /// The repetition is the last segment of the hashed key, so model ids
    /// containing the separator cannot collide.
    pub fn scenario_id(&self) -> String {
        let key = format!(
            "{}|{}|{}|{}",
            self.domain, self.tier, self.model, self.repetition
        );
        let id = Uuid::new_v5(&SCENARIO_NAMESPACE, key.as_bytes());
        format!("{}-{}-{}", self.domain, self.tier, id)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, rep={}, {})",
            self.domain, self.tier, self.repetition, self.model
        )
    }
}

/// Category of a blind success criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionCategory {
    Accuracy,
    Completeness,
    Reasoning,
    Efficiency,
    Insight,
}

/// Weighted success criterion, hidden from the model under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriterion {
    pub criterion: String,
    /// Weight in [0, 1]; the weights of a scenario sum to 1.
    pub weight: f64,
    pub category: CriterionCategory,
}

/// Control expectations an evaluator compares a trial response against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlExpectations {
    /// Calculation name mapped to the method expected to produce it.
    pub expected_calculations: BTreeMap<String, String>,
    pub expected_insights: Vec<String>,
    /// Per-field minimum scores. Must never be empty.
    pub success_thresholds: BTreeMap<String, f64>,
}

/// One act (step) of a scenario's task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub description: String,
    /// Indices of steps that must complete before this one.
    pub depends_on: Vec<usize>,
}

/// One information cue the solver has to take into account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformationCue {
    pub label: String,
    /// Indices of other cues this cue interacts with.
    pub linked_to: Vec<usize>,
    /// Chunk group the cue can be processed in, if any.
    pub chunk: Option<String>,
}

/// Campbell-style outcome uncertainty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyLevel {
    #[default]
    None,
    Bounded,
    High,
}

impl UncertaintyLevel {
    pub fn level(&self) -> u8 {
        match self {
            UncertaintyLevel::None => 0,
            UncertaintyLevel::Bounded => 1,
            UncertaintyLevel::High => 2,
        }
    }

    pub fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=0 => UncertaintyLevel::None,
            1 => UncertaintyLevel::Bounded,
            _ => UncertaintyLevel::High,
        }
    }
}

/// Structural description of the task the complexity frameworks are scored on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStructure {
    pub steps: Vec<TaskStep>,
    pub information_cues: Vec<InformationCue>,
    pub data_sources: Vec<String>,
    pub ambiguities: Vec<String>,
    pub changing_conditions: Vec<String>,
    pub solution_paths: u32,
    pub outcomes: Vec<String>,
    pub conflicts: Vec<String>,
    pub uncertainty: UncertaintyLevel,
    /// Novelty of the task relative to routine work, in [0, 1].
    pub novelty: f64,
    /// Time pressure, in [0, 1].
    pub time_pressure: f64,
    pub unreliable_sources: u32,
}

impl TaskStructure {
    /// Total number of step dependencies.
    pub fn dependency_count(&self) -> usize {
        self.steps.iter().map(|s| s.depends_on.len()).sum()
    }
}

/// Provenance of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub experiment_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub framework_version: String,
    pub pattern_id: u8,
    pub pattern_name: String,
    /// Hex SHA-256 of the rendered title, description and context.
    pub content_hash: String,
}

/// A complete evaluation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    pub domain: Domain,
    pub tier: Tier,
    pub model: String,
    pub repetition: u32,
    pub title: String,
    pub description: String,
    pub business_context: String,
    pub requirements: Vec<String>,
    pub success_criteria: Vec<SuccessCriterion>,
    pub control_expectations: ControlExpectations,
    pub cognitive_requirements: Vec<String>,
    pub task_structure: TaskStructure,
    /// Domain-specific data payload handed to the model.
    pub domain_data: serde_json::Value,
    pub metadata: ScenarioMetadata,
    #[serde(default)]
    pub complexity_metrics: Option<ComplexityScore>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
}

impl Scenario {
    /// The position this scenario was rendered for.
    pub fn position(&self) -> Position {
        Position::new(self.domain, self.tier, self.repetition, self.model.clone())
    }

    /// Attaches the accepted complexity score.
    pub fn annotate(&mut self, score: ComplexityScore, at: DateTime<Utc>) {
        self.complexity_metrics = Some(score);
        self.validated_at = Some(at);
    }

    /// Sum of success-criterion weights.
    pub fn criteria_weight_sum(&self) -> f64 {
        self.success_criteria.iter().map(|c| c.weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_round_trip_names() {
        for domain in Domain::ALL {
            let parsed: Domain = domain.as_str().parse().expect("known domain");
            assert_eq!(parsed, domain);
        }
        assert_eq!(
            "problem-solving".parse::<Domain>().expect("dash alias"),
            Domain::ProblemSolving
        );
        assert!("poetry".parse::<Domain>().is_err());
    }

    #[test]
    fn test_tier_levels_and_distance() {
        assert_eq!(Tier::Simple.distance(Tier::Complex), 2);
        assert_eq!(Tier::Moderate.distance(Tier::Simple), 1);
        assert_eq!(Tier::from_level(Tier::Complex.level()), Tier::Complex);
        assert!("extreme".parse::<Tier>().is_err());
        assert_eq!(Tier::Complex.prefix(), "Advanced");
    }

    #[test]
    fn test_scenario_id_is_deterministic() {
        let a = Position::new(Domain::Analytical, Tier::Simple, 1, "m1");
        let b = Position::new(Domain::Analytical, Tier::Simple, 1, "m1");
        assert_eq!(a.scenario_id(), b.scenario_id());
        assert!(a.scenario_id().starts_with("analytical-simple-"));
    }

    #[test]
    fn test_scenario_id_separates_models_and_repetitions() {
        let a = Position::new(Domain::Planning, Tier::Complex, 12, "vendor/model");
        let b = Position::new(Domain::Planning, Tier::Complex, 2, "vendor/model|1");
        let c = Position::new(Domain::Planning, Tier::Complex, 12, "vendor-model");
        assert_ne!(a.scenario_id(), b.scenario_id());
        assert_ne!(a.scenario_id(), c.scenario_id());
    }

    #[test]
    fn test_uncertainty_from_level_clamps() {
        assert_eq!(UncertaintyLevel::from_level(-3), UncertaintyLevel::None);
        assert_eq!(UncertaintyLevel::from_level(1), UncertaintyLevel::Bounded);
        assert_eq!(UncertaintyLevel::from_level(7), UncertaintyLevel::High);
    }
}
