//! Scenario rendering.
//!
//! [`ScenarioGenerator`] turns a [`Position`] into a complete [`Scenario`]:
//! pattern selection, title and context, requirements, blind success
//! criteria, control expectations and the task structure the complexity
//! validator scores. Rendering is deterministic apart from the experiment
//! id and timestamp stamped into the metadata.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use super::patterns::{PatternLibrary, ScenarioPattern, StructureProfile};
use super::{
    ControlExpectations, CriterionCategory, Domain, InformationCue, Position, Scenario,
    ScenarioMetadata, SuccessCriterion, TaskStep, TaskStructure, Tier, UncertaintyLevel,
    FRAMEWORK_VERSION,
};
use crate::complexity::PromptEnhancement;
use crate::error::GenerationError;

const AMBIGUITIES: [&str; 4] = [
    "some figures are reported in inconsistent units",
    "the intended audience is only loosely defined",
    "one requirement can be read two ways",
    "several key dates are approximate",
];

const CHANGING_CONDITIONS: [&str; 4] = [
    "priorities may shift midway through the task",
    "new data arrives while the task is under way",
    "a key resource may become unavailable",
    "the deadline may move forward",
];

const OUTCOMES: [&str; 4] = [
    "primary recommendation",
    "fallback option",
    "phased alternative",
    "do-nothing baseline",
];

const CONFLICTS: [&str; 4] = [
    "cost versus quality",
    "speed versus thoroughness",
    "short-term versus long-term value",
    "team autonomy versus central control",
];

/// Renders scenarios for positions, honoring regeneration hints.
pub trait ScenarioSource: Send + Sync {
    fn render(
        &self,
        position: &Position,
        enhancements: &[PromptEnhancement],
    ) -> Result<Scenario, GenerationError>;
}

/// Default [`ScenarioSource`] backed by the static [`PatternLibrary`].
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    library: PatternLibrary,
    experiment_id: Uuid,
}

impl ScenarioGenerator {
    pub fn new(experiment_id: Uuid) -> Self {
        Self {
            library: PatternLibrary::new(),
            experiment_id,
        }
    }

    pub fn experiment_id(&self) -> Uuid {
        self.experiment_id
    }

    fn title(&self, position: &Position, pattern: &ScenarioPattern) -> String {
        format!(
            "{} {}: {}",
            position.tier.prefix(),
            position.domain.label(),
            pattern.label()
        )
    }

    fn description(
        &self,
        tier: Tier,
        pattern: &ScenarioPattern,
        structure: &TaskStructure,
        enhancements: &[PromptEnhancement],
    ) -> String {
        let tier_clause = match tier {
            Tier::Simple => "Work through the task step by step using the figures given.",
            Tier::Moderate => {
                "Several inputs interact, so consider how they influence each other."
            }
            Tier::Complex => {
                "Inputs conflict and conditions shift, so weigh the trade-offs and state how your answer depends on them."
            }
        };
        let cues: Vec<&str> = structure
            .information_cues
            .iter()
            .map(|c| c.label.as_str())
            .collect();

        let mut description = format!(
            "{} {} Information available: {}.",
            pattern.task,
            tier_clause,
            cues.join(", ")
        );

        let mut hints: Vec<&str> = Vec::new();
        for enhancement in enhancements {
            let hint = enhancement.hint();
            if !hints.contains(&hint) {
                hints.push(hint);
            }
        }
        if !hints.is_empty() {
            description.push_str(&format!(" Emphasis: {}.", hints.join("; ")));
        }
        description
    }

    fn requirements(&self, tier: Tier, pattern: &ScenarioPattern) -> Vec<String> {
        let mut requirements: Vec<String> = self
            .library
            .base_requirements()
            .iter()
            .map(|r| r.to_string())
            .collect();
        requirements.extend(self.library.tier_requirements(tier).iter().map(|r| r.to_string()));
        requirements.extend(
            pattern
                .cognitive_demands
                .iter()
                .take(2)
                .map(|d| format!("Demonstrate {}", d)),
        );
        requirements
    }

    fn control_expectations(
        &self,
        domain: Domain,
        tier: Tier,
        pattern: &ScenarioPattern,
    ) -> ControlExpectations {
        let table = self.library.calculations(domain);
        let count = match tier {
            Tier::Simple => 2,
            Tier::Moderate => 3,
            Tier::Complex => 5,
        };
        let expected_calculations: BTreeMap<String, String> = (0..count)
            .map(|k| {
                let (name, method) = table[(pattern.id as usize + k) % table.len()];
                (name.to_string(), method.to_string())
            })
            .collect();

        let mut expected_insights: Vec<String> = pattern
            .expected_insight
            .iter()
            .map(|i| i.to_string())
            .collect();
        if tier == Tier::Complex {
            expected_insights.push("the objectives cannot all be maximized at once".to_string());
        }

        let (accuracy, completeness, reasoning) = match tier {
            Tier::Simple => (0.8, 0.8, 0.6),
            Tier::Moderate => (0.7, 0.75, 0.7),
            Tier::Complex => (0.6, 0.7, 0.75),
        };
        let mut success_thresholds = BTreeMap::from([
            ("accuracy".to_string(), accuracy),
            ("completeness".to_string(), completeness),
            ("reasoning".to_string(), reasoning),
        ]);
        if pattern.expected_insight.is_some() {
            success_thresholds.insert("insight".to_string(), 0.5);
        }

        ControlExpectations {
            expected_calculations,
            expected_insights,
            success_thresholds,
        }
    }

    fn task_structure(&self, domain: Domain, profile: &StructureProfile) -> TaskStructure {
        let steps = (0..profile.steps)
            .map(|i| TaskStep {
                description: cycled(self.library.step_phrases(domain), i),
                depends_on: profile.shape.predecessors(i),
            })
            .collect();

        let labels = self.library.cue_labels(domain);
        let information_cues = (0..profile.cues)
            .map(|i| {
                let linked = i < profile.linked_cues && profile.cues > 1;
                InformationCue {
                    label: cycled(labels, i),
                    linked_to: if linked {
                        vec![(i + 1) % profile.cues]
                    } else {
                        Vec::new()
                    },
                    // chunk groups pair up consecutive linked cues
                    chunk: (linked && i / 2 < profile.chunks)
                        .then(|| format!("group-{}", i / 2 + 1)),
                }
            })
            .collect();

        TaskStructure {
            steps,
            information_cues,
            data_sources: (0..profile.data_sources)
                .map(|i| cycled(self.library.data_sources(domain), i))
                .collect(),
            ambiguities: (0..profile.ambiguities)
                .map(|i| cycled(&AMBIGUITIES, i))
                .collect(),
            changing_conditions: (0..profile.changing_conditions)
                .map(|i| cycled(&CHANGING_CONDITIONS, i))
                .collect(),
            solution_paths: profile.solution_paths,
            outcomes: (0..profile.outcomes).map(|i| cycled(&OUTCOMES, i)).collect(),
            conflicts: (0..profile.conflicts).map(|i| cycled(&CONFLICTS, i)).collect(),
            uncertainty: UncertaintyLevel::from_level(profile.uncertainty),
            novelty: profile.novelty,
            time_pressure: profile.time_pressure,
            unreliable_sources: profile.unreliable_sources,
        }
    }

    fn domain_data(
        &self,
        position: &Position,
        pattern: &ScenarioPattern,
        structure: &TaskStructure,
    ) -> serde_json::Value {
        let observations: BTreeMap<&str, u64> = structure
            .information_cues
            .iter()
            .enumerate()
            .map(|(i, cue)| {
                let value = (position.repetition as u64 * 37 + i as u64 * 11) % 90 + 10;
                (cue.label.as_str(), value)
            })
            .collect();

        json!({
            "domain": position.domain,
            "pattern": pattern.name,
            "data_sources": structure.data_sources,
            "observations": observations,
            "constraints": structure.conflicts,
        })
    }
}

impl ScenarioSource for ScenarioGenerator {
    fn render(
        &self,
        position: &Position,
        enhancements: &[PromptEnhancement],
    ) -> Result<Scenario, GenerationError> {
        let pattern = self.library.pattern(position.domain, position.repetition);

        let mut profile = StructureProfile::for_tier(position.tier, pattern.id);
        for enhancement in enhancements {
            profile.apply(*enhancement);
        }
        let task_structure = self.task_structure(position.domain, &profile);
        if task_structure.steps.is_empty() {
            return Err(GenerationError::Composition(format!(
                "pattern '{}' produced no task steps",
                pattern.name
            )));
        }

        let title = self.title(position, pattern);
        let description = self.description(position.tier, pattern, &task_structure, enhancements);
        let business_context = self
            .library
            .business_context(position.domain, position.tier)
            .to_string();
        let content_hash = content_hash(&title, &description, &business_context);

        Ok(Scenario {
            scenario_id: position.scenario_id(),
            domain: position.domain,
            tier: position.tier,
            model: position.model.clone(),
            repetition: position.repetition,
            title,
            description,
            business_context,
            requirements: self.requirements(position.tier, pattern),
            success_criteria: success_criteria(pattern.expected_insight),
            control_expectations: self.control_expectations(
                position.domain,
                position.tier,
                pattern,
            ),
            cognitive_requirements: self
                .library
                .cognitive_requirements(position.domain, position.tier),
            domain_data: self.domain_data(position, pattern, &task_structure),
            task_structure,
            metadata: ScenarioMetadata {
                experiment_id: self.experiment_id,
                generated_at: Utc::now(),
                framework_version: FRAMEWORK_VERSION.to_string(),
                pattern_id: pattern.id,
                pattern_name: pattern.name.to_string(),
                content_hash,
            },
            complexity_metrics: None,
            validated_at: None,
        })
    }
}

fn cycled(items: &[&str], i: usize) -> String {
    let base = items[i % items.len()];
    match i / items.len() {
        0 => base.to_string(),
        round => format!("{} ({})", base, round + 1),
    }
}

fn content_hash(title: &str, description: &str, context: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(description.as_bytes());
    hasher.update(b"\n");
    hasher.update(context.as_bytes());
    hex::encode(hasher.finalize())
}

/// Blind success criteria. Weights always sum to 1.
pub fn success_criteria(expected_insight: Option<&str>) -> Vec<SuccessCriterion> {
    let mut criteria = vec![
        SuccessCriterion {
            criterion: "Produces correct results from the data provided".to_string(),
            weight: 0.25,
            category: CriterionCategory::Accuracy,
        },
        SuccessCriterion {
            criterion: "Addresses every stated requirement".to_string(),
            weight: 0.25,
            category: CriterionCategory::Completeness,
        },
        SuccessCriterion {
            criterion: "Justifies each conclusion with explicit reasoning".to_string(),
            weight: 0.25,
            category: CriterionCategory::Reasoning,
        },
        SuccessCriterion {
            criterion: "Reaches the answer without unnecessary detours".to_string(),
            weight: 0.25,
            category: CriterionCategory::Efficiency,
        },
    ];

    if let Some(insight) = expected_insight {
        for criterion in &mut criteria {
            criterion.weight *= 0.8;
        }
        criteria.push(SuccessCriterion {
            criterion: format!("Recognizes that {}", insight),
            weight: 0.2,
            category: CriterionCategory::Insight,
        });
    }

    let total: f64 = criteria.iter().map(|c| c.weight).sum();
    for criterion in &mut criteria {
        criterion.weight /= total;
    }
    criteria
}

/// Outcome of a structural check that did not reject the scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioCheck {
    pub warnings: Vec<String>,
}

/// Structural validation.
///
/// Missing required fields and empty success thresholds reject the
/// scenario. Too few expected calculations for the tier only warns.
pub fn validate_scenario(scenario: &Scenario) -> Result<ScenarioCheck, GenerationError> {
    let missing = |field: &str| GenerationError::MissingField {
        scenario_id: scenario.scenario_id.clone(),
        field: field.to_string(),
    };

    if scenario.scenario_id.trim().is_empty() {
        return Err(missing("scenario_id"));
    }
    let required_text = [
        ("model", &scenario.model),
        ("title", &scenario.title),
        ("description", &scenario.description),
        ("business_context", &scenario.business_context),
    ];
    for (field, value) in required_text {
        if value.trim().is_empty() {
            return Err(missing(field));
        }
    }
    if scenario.requirements.is_empty() {
        return Err(missing("requirements"));
    }
    if scenario.success_criteria.is_empty() {
        return Err(missing("success_criteria"));
    }
    if scenario.cognitive_requirements.is_empty() {
        return Err(missing("cognitive_requirements"));
    }
    if scenario.control_expectations.success_thresholds.is_empty() {
        return Err(GenerationError::CriticalValidationFailure {
            scenario_id: scenario.scenario_id.clone(),
        });
    }

    let mut check = ScenarioCheck::default();
    let calculations = scenario.control_expectations.expected_calculations.len();
    let minimum = scenario.tier.min_expected_calculations();
    if calculations < minimum {
        warn!(
            scenario_id = %scenario.scenario_id,
            tier = %scenario.tier,
            calculations,
            minimum,
            "Scenario has fewer expected calculations than its tier suggests"
        );
        check.warnings.push(format!(
            "expected {} or more calculations for a {} scenario, found {}",
            minimum, scenario.tier, calculations
        ));
    }

    let weight_sum = scenario.criteria_weight_sum();
    if (weight_sum - 1.0).abs() > 1e-9 {
        warn!(
            scenario_id = %scenario.scenario_id,
            weight_sum,
            "Success criteria weights do not sum to 1"
        );
        check
            .warnings
            .push(format!("success criteria weights sum to {:.6}", weight_sum));
    }

    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::ComplexityValidator;

    fn generator() -> ScenarioGenerator {
        ScenarioGenerator::new(Uuid::nil())
    }

    fn position(domain: Domain, tier: Tier, repetition: u32) -> Position {
        Position::new(domain, tier, repetition, "vendor/model-a")
    }

    #[test]
    fn test_render_is_deterministic() {
        let source = generator();
        let pos = position(Domain::Planning, Tier::Moderate, 3);
        let a = source.render(&pos, &[]).expect("render");
        let b = source.render(&pos, &[]).expect("render");

        assert_eq!(a.scenario_id, b.scenario_id);
        assert_eq!(a.title, b.title);
        assert_eq!(a.description, b.description);
        assert_eq!(a.metadata.content_hash, b.metadata.content_hash);
        assert_eq!(a.task_structure, b.task_structure);
        assert_eq!(a.domain_data, b.domain_data);
    }

    #[test]
    fn test_title_format() {
        let scenario = generator()
            .render(&position(Domain::Analytical, Tier::Complex, 2), &[])
            .expect("render");
        assert_eq!(scenario.title, "Advanced Analytical: Root Cause Analysis");

        let scenario = generator()
            .render(&position(Domain::ProblemSolving, Tier::Simple, 5), &[])
            .expect("render");
        assert_eq!(scenario.title, "Basic Problem Solving: Process Bottleneck");
    }

    #[test]
    fn test_requirements_composition() {
        let source = generator();
        let simple = source
            .render(&position(Domain::Communication, Tier::Simple, 1), &[])
            .expect("render");
        assert_eq!(simple.requirements.len(), 4 + 2);

        let complex = source
            .render(&position(Domain::Communication, Tier::Complex, 1), &[])
            .expect("render");
        assert_eq!(complex.requirements.len(), 4 + 4 + 2);
        assert!(complex.requirements[..4]
            .iter()
            .zip(source.library.base_requirements())
            .all(|(a, b)| a == b));
    }

    #[test]
    fn test_success_criteria_weights_sum_to_one() {
        let plain = success_criteria(None);
        assert_eq!(plain.len(), 4);
        assert!(plain.iter().all(|c| (c.weight - 0.25).abs() < 1e-12));

        let with_insight = success_criteria(Some("the data is seasonal"));
        assert_eq!(with_insight.len(), 5);
        let sum: f64 = with_insight.iter().map(|c| c.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((with_insight[0].weight - 0.2).abs() < 1e-9);
        assert_eq!(with_insight[4].category, CriterionCategory::Insight);
    }

    #[test]
    fn test_every_rendered_scenario_has_thresholds() {
        let source = generator();
        for domain in Domain::ALL {
            for tier in Tier::ALL {
                for rep in 1..=5 {
                    let scenario = source.render(&position(domain, tier, rep), &[]).expect("render");
                    assert!(!scenario.control_expectations.success_thresholds.is_empty());
                    let check = validate_scenario(&scenario).expect("structurally valid");
                    assert!(check.warnings.is_empty(), "{:?}", check.warnings);
                }
            }
        }
    }

    #[test]
    fn test_default_profiles_validate_on_first_attempt() {
        let source = generator();
        let validator = ComplexityValidator::default();
        for domain in Domain::ALL {
            for tier in Tier::ALL {
                for rep in 1..=5 {
                    let scenario = source.render(&position(domain, tier, rep), &[]).expect("render");
                    let score = validator.validate(&scenario);
                    assert!(
                        score.is_valid,
                        "{} {} rep {} rejected: {:?} (score {:.2}, confidence {:.2})",
                        domain,
                        tier,
                        rep,
                        score.rejection_reasons,
                        score.overall_score,
                        score.confidence_score
                    );
                    assert_eq!(score.predicted_tier, tier);
                }
            }
        }
    }

    #[test]
    fn test_empty_thresholds_are_critical() {
        let mut scenario = generator()
            .render(&position(Domain::Analytical, Tier::Simple, 1), &[])
            .expect("render");
        scenario.control_expectations.success_thresholds.clear();
        assert!(matches!(
            validate_scenario(&scenario),
            Err(GenerationError::CriticalValidationFailure { .. })
        ));
    }

    #[test]
    fn test_missing_field_and_soft_warning() {
        let mut scenario = generator()
            .render(&position(Domain::Planning, Tier::Complex, 4), &[])
            .expect("render");
        let mut untitled = scenario.clone();
        untitled.title.clear();
        assert!(matches!(
            validate_scenario(&untitled),
            Err(GenerationError::MissingField { ref field, .. }) if field == "title"
        ));

        scenario.control_expectations.expected_calculations =
            BTreeMap::from([("only".to_string(), "one".to_string())]);
        let check = validate_scenario(&scenario).expect("soft failure only");
        assert_eq!(check.warnings.len(), 1);
    }

    #[test]
    fn test_enhancements_reach_text_and_structure() {
        let source = generator();
        let pos = position(Domain::Analytical, Tier::Simple, 1);
        let base = source.render(&pos, &[]).expect("render");
        let enhanced = source
            .render(
                &pos,
                &[
                    PromptEnhancement::IncreaseInterdependence,
                    PromptEnhancement::IncreaseVariety,
                ],
            )
            .expect("render");

        assert!(enhanced
            .description
            .contains("increase variable interdependence"));
        assert_ne!(base.metadata.content_hash, enhanced.metadata.content_hash);
        assert_eq!(base.scenario_id, enhanced.scenario_id);
        assert_eq!(
            enhanced.task_structure.data_sources.len(),
            base.task_structure.data_sources.len() + 2
        );
        assert!(
            enhanced.task_structure.dependency_count() > base.task_structure.dependency_count()
        );
    }

    #[test]
    fn test_cycled_labels_stay_unique() {
        let labels = ["a", "b"];
        let out: Vec<String> = (0..5).map(|i| cycled(&labels, i)).collect();
        assert_eq!(out, vec!["a", "b", "a (2)", "b (2)", "a (3)"]);
    }
}
