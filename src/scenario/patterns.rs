//! Static template tables for scenario rendering.
//!
//! Every lookup here is a pure function of its key, so the same position
//! always renders the same text.

use serde::{Deserialize, Serialize};

use super::{Domain, Tier};
use crate::complexity::PromptEnhancement;

/// Number of patterns each domain cycles through.
pub const PATTERNS_PER_DOMAIN: u32 = 5;

/// Fixed universe of cognitive dimensions a scenario can exercise.
pub const COGNITIVE_DIMENSIONS: [&str; 9] = [
    "working_memory",
    "attention_control",
    "logical_reasoning",
    "planning",
    "abstraction",
    "evaluation",
    "communication",
    "adaptability",
    "metacognition",
];

/// A task template within a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioPattern {
    pub id: u8,
    /// Snake-case pattern name, title-cased for rendering.
    pub name: &'static str,
    pub task: &'static str,
    pub cognitive_demands: &'static [&'static str],
    pub expected_insight: Option<&'static str>,
}

impl ScenarioPattern {
    /// Title-cased pattern label, e.g. `root_cause_analysis` -> `Root Cause Analysis`.
    pub fn label(&self) -> String {
        self.name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

const ANALYTICAL_PATTERNS: [ScenarioPattern; 5] = [
    ScenarioPattern {
        id: 0,
        name: "trend_analysis",
        task: "Analyze the provided sales figures to identify the dominant trends and explain what is driving them.",
        cognitive_demands: &["pattern recognition", "quantitative reasoning"],
        expected_insight: Some("seasonal effects mask an underlying decline in repeat customers"),
    },
    ScenarioPattern {
        id: 1,
        name: "anomaly_detection",
        task: "Review the operational metrics and flag the readings that deviate from expected behavior.",
        cognitive_demands: &["attention to detail", "statistical intuition"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 2,
        name: "root_cause_analysis",
        task: "Determine the root cause of the recent rise in support tickets using the available evidence.",
        cognitive_demands: &["causal reasoning", "hypothesis testing", "evidence weighing"],
        expected_insight: Some("the spike follows a configuration change rather than increased traffic"),
    },
    ScenarioPattern {
        id: 3,
        name: "comparative_evaluation",
        task: "Compare the candidate vendors across cost, quality and delivery data and rank them.",
        cognitive_demands: &["multi-criteria comparison", "trade-off assessment"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 4,
        name: "forecast_review",
        task: "Assess whether the quarterly revenue forecast is consistent with the historical data.",
        cognitive_demands: &["quantitative reasoning", "skeptical review"],
        expected_insight: Some("the forecast assumes a growth rate never observed in the history"),
    },
];

const PLANNING_PATTERNS: [ScenarioPattern; 5] = [
    ScenarioPattern {
        id: 0,
        name: "resource_allocation",
        task: "Allocate the available staff and budget across the pending initiatives.",
        cognitive_demands: &["constraint handling", "prioritization"],
        expected_insight: Some("two initiatives compete for the same specialist"),
    },
    ScenarioPattern {
        id: 1,
        name: "project_scheduling",
        task: "Produce a schedule for the project phases that respects their dependencies.",
        cognitive_demands: &["sequencing", "dependency tracking"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 2,
        name: "contingency_planning",
        task: "Prepare contingency plans for the risks identified in the launch plan.",
        cognitive_demands: &["risk anticipation", "scenario thinking"],
        expected_insight: Some("the highest-impact risk has no owner"),
    },
    ScenarioPattern {
        id: 3,
        name: "capacity_planning",
        task: "Estimate the capacity needed to serve projected demand over the next two quarters.",
        cognitive_demands: &["estimation", "forward projection"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 4,
        name: "milestone_sequencing",
        task: "Order the program milestones so that each one unlocks the next with minimal idle time.",
        cognitive_demands: &["sequencing", "critical path reasoning"],
        expected_insight: Some("the critical path runs through procurement, not engineering"),
    },
];

const COMMUNICATION_PATTERNS: [ScenarioPattern; 5] = [
    ScenarioPattern {
        id: 0,
        name: "stakeholder_briefing",
        task: "Write a briefing that explains the project status to stakeholders with different concerns.",
        cognitive_demands: &["audience modeling", "message structuring"],
        expected_insight: Some("finance and operations read the same delay as different risks"),
    },
    ScenarioPattern {
        id: 1,
        name: "conflict_mediation",
        task: "Draft a response that mediates a disagreement between two team leads.",
        cognitive_demands: &["perspective taking", "tone calibration"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 2,
        name: "executive_summary",
        task: "Condense the attached report into an executive summary with clear recommendations.",
        cognitive_demands: &["summarization", "prioritization"],
        expected_insight: Some("the report's key finding is buried in an appendix"),
    },
    ScenarioPattern {
        id: 3,
        name: "change_announcement",
        task: "Announce an organizational change to affected employees and address likely concerns.",
        cognitive_demands: &["empathy", "clarity"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 4,
        name: "negotiation_preparation",
        task: "Prepare talking points for a contract renegotiation with a key supplier.",
        cognitive_demands: &["interest mapping", "persuasion"],
        expected_insight: Some("the supplier depends on this contract more than it appears"),
    },
];

const PROBLEM_SOLVING_PATTERNS: [ScenarioPattern; 5] = [
    ScenarioPattern {
        id: 0,
        name: "process_bottleneck",
        task: "Find and resolve the bottleneck slowing down order fulfillment.",
        cognitive_demands: &["systems thinking", "flow analysis"],
        expected_insight: Some("the bottleneck moves once the first constraint is removed"),
    },
    ScenarioPattern {
        id: 1,
        name: "constraint_satisfaction",
        task: "Find an assignment of shifts that satisfies every staffing rule.",
        cognitive_demands: &["constraint handling", "search"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 2,
        name: "system_diagnosis",
        task: "Diagnose why the nightly data pipeline intermittently produces incomplete reports.",
        cognitive_demands: &["hypothesis testing", "elimination"],
        expected_insight: Some("the failures coincide with an upstream batch overrunning its window"),
    },
    ScenarioPattern {
        id: 3,
        name: "tradeoff_resolution",
        task: "Choose between competing remediation options with different costs and risks.",
        cognitive_demands: &["trade-off assessment", "decision making"],
        expected_insight: None,
    },
    ScenarioPattern {
        id: 4,
        name: "failure_recovery",
        task: "Plan the recovery from a partial outage affecting several dependent services.",
        cognitive_demands: &["dependency tracking", "recovery ordering"],
        expected_insight: Some("restoring the shared cache first shortens every other recovery"),
    },
];

const BASE_REQUIREMENTS: [&str; 4] = [
    "State every assumption you make",
    "Show the reasoning behind each conclusion",
    "Use only the information provided in the scenario",
    "Finish with a clear, actionable recommendation",
];

/// Shape of the step dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyShape {
    /// Each step depends on the one before it.
    Chain,
    /// Chain plus a skip link from every even step to the step two back.
    Branching,
    /// Each step depends on up to three predecessors.
    Mesh,
}

impl DependencyShape {
    fn level(&self) -> i32 {
        match self {
            DependencyShape::Chain => 0,
            DependencyShape::Branching => 1,
            DependencyShape::Mesh => 2,
        }
    }

    fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=0 => DependencyShape::Chain,
            1 => DependencyShape::Branching,
            _ => DependencyShape::Mesh,
        }
    }

    /// Predecessors of step `i`.
    pub fn predecessors(&self, i: usize) -> Vec<usize> {
        match self {
            DependencyShape::Chain => i.checked_sub(1).into_iter().collect(),
            DependencyShape::Branching => {
                let mut deps: Vec<usize> = i.checked_sub(1).into_iter().collect();
                if i >= 2 && i % 2 == 0 {
                    deps.push(i - 2);
                }
                deps
            }
            DependencyShape::Mesh => (1..=3).filter_map(|back| i.checked_sub(back)).collect(),
        }
    }
}

/// Element counts a task structure is materialized from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureProfile {
    pub steps: usize,
    pub cues: usize,
    pub linked_cues: usize,
    pub chunks: usize,
    pub data_sources: usize,
    pub ambiguities: usize,
    pub changing_conditions: usize,
    pub solution_paths: u32,
    pub outcomes: usize,
    pub conflicts: usize,
    pub uncertainty: i32,
    pub novelty: f64,
    pub time_pressure: f64,
    pub unreliable_sources: u32,
    pub shape: DependencyShape,
}

impl StructureProfile {
    /// Baseline profile for a tier, varied slightly by pattern.
    pub fn for_tier(tier: Tier, pattern_id: u8) -> Self {
        // 0..=2 extra cues keep every pattern inside its tier's band
        let extra_cues = (pattern_id % 3) as usize;
        let mut profile = match tier {
            Tier::Simple => Self {
                steps: 3,
                cues: 5,
                linked_cues: 1,
                chunks: 0,
                data_sources: 2,
                ambiguities: 0,
                changing_conditions: 0,
                solution_paths: 1,
                outcomes: 1,
                conflicts: 0,
                uncertainty: 0,
                novelty: 0.1,
                time_pressure: 0.1,
                unreliable_sources: 0,
                shape: DependencyShape::Chain,
            },
            Tier::Moderate => Self {
                steps: 5,
                cues: 9,
                linked_cues: 3,
                chunks: 1,
                data_sources: 3,
                ambiguities: 1,
                changing_conditions: 1,
                solution_paths: 1,
                outcomes: 1,
                conflicts: 0,
                uncertainty: 1,
                novelty: 0.4,
                time_pressure: 0.4,
                unreliable_sources: 0,
                shape: DependencyShape::Branching,
            },
            Tier::Complex => Self {
                steps: 7,
                cues: 14,
                linked_cues: 8,
                chunks: 2,
                data_sources: 6,
                ambiguities: 3,
                changing_conditions: 3,
                solution_paths: 2,
                outcomes: 3,
                conflicts: 2,
                uncertainty: 2,
                novelty: 0.7,
                time_pressure: 0.7,
                unreliable_sources: 1,
                shape: DependencyShape::Mesh,
            },
        };
        profile.cues += extra_cues;
        profile
    }

    /// Moves the profile in the direction a hint asks for.
    pub fn apply(&mut self, enhancement: PromptEnhancement) {
        match enhancement {
            PromptEnhancement::IncreaseInterdependence => {
                self.shape = DependencyShape::from_level(self.shape.level() + 1);
                self.linked_cues += 2;
            }
            PromptEnhancement::ReduceInterdependence => {
                self.shape = DependencyShape::from_level(self.shape.level() - 1);
                self.linked_cues = self.linked_cues.saturating_sub(2);
            }
            PromptEnhancement::IncreaseInformationCues => {
                self.cues += 3;
                self.steps += 1;
            }
            PromptEnhancement::ReduceInformationCues => {
                self.cues = self.cues.saturating_sub(3).max(2);
                self.steps = self.steps.saturating_sub(1).max(2);
            }
            PromptEnhancement::IncreaseConflictingGoals => {
                self.conflicts += 1;
                self.outcomes += 1;
            }
            PromptEnhancement::ReduceConflictingGoals => {
                self.conflicts = self.conflicts.saturating_sub(1);
                self.outcomes = self.outcomes.saturating_sub(1).max(1);
            }
            PromptEnhancement::IncreaseUncertainty => {
                self.uncertainty = (self.uncertainty + 1).min(2);
                self.ambiguities += 1;
                self.changing_conditions += 1;
            }
            PromptEnhancement::ReduceUncertainty => {
                self.uncertainty = (self.uncertainty - 1).max(0);
                self.ambiguities = self.ambiguities.saturating_sub(1);
                self.changing_conditions = self.changing_conditions.saturating_sub(1);
            }
            PromptEnhancement::IncreaseVariety => {
                self.data_sources += 2;
            }
            PromptEnhancement::ReduceVariety => {
                self.data_sources = self.data_sources.saturating_sub(2).max(1);
            }
        }
        self.linked_cues = self.linked_cues.min(self.cues);
        self.unreliable_sources = self.unreliable_sources.min(self.data_sources as u32);
    }
}

/// Deterministic lookup tables keyed by domain, tier and pattern id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternLibrary;

impl PatternLibrary {
    pub fn new() -> Self {
        Self
    }

    /// Pattern id for a 1-indexed repetition.
    pub fn pattern_id(repetition: u32) -> u8 {
        (repetition % PATTERNS_PER_DOMAIN) as u8
    }

    pub fn patterns(&self, domain: Domain) -> &'static [ScenarioPattern; 5] {
        match domain {
            Domain::Analytical => &ANALYTICAL_PATTERNS,
            Domain::Planning => &PLANNING_PATTERNS,
            Domain::Communication => &COMMUNICATION_PATTERNS,
            Domain::ProblemSolving => &PROBLEM_SOLVING_PATTERNS,
        }
    }

    /// Pattern for a domain and repetition.
    pub fn pattern(&self, domain: Domain, repetition: u32) -> &'static ScenarioPattern {
        &self.patterns(domain)[Self::pattern_id(repetition) as usize]
    }

    pub fn business_context(&self, domain: Domain, tier: Tier) -> &'static str {
        match (domain, tier) {
            (Domain::Analytical, Tier::Simple) => {
                "A small retail shop keeps a single spreadsheet of monthly sales and wants a quick read on how the business is doing."
            }
            (Domain::Analytical, Tier::Moderate) => {
                "A regional distributor combines sales, inventory and customer data from several systems and needs findings for its monthly review."
            }
            (Domain::Analytical, Tier::Complex) => {
                "A multinational manufacturer reconciles partially conflicting data from plants, distributors and market research while leadership prepares a restructuring decision."
            }
            (Domain::Planning, Tier::Simple) => {
                "A team of five is organizing a one-day internal workshop with a fixed budget."
            }
            (Domain::Planning, Tier::Moderate) => {
                "A product group is planning a release across three teams with shared testing resources."
            }
            (Domain::Planning, Tier::Complex) => {
                "A hospital network is consolidating two facilities while keeping services running and meeting regulatory deadlines."
            }
            (Domain::Communication, Tier::Simple) => {
                "A team lead needs to tell the team about a change in the weekly meeting schedule."
            }
            (Domain::Communication, Tier::Moderate) => {
                "A project manager must report a delay to clients and internal teams who care about different things."
            }
            (Domain::Communication, Tier::Complex) => {
                "A company announcing a merger must address employees, regulators, customers and investors whose interests conflict."
            }
            (Domain::ProblemSolving, Tier::Simple) => {
                "A small office printer queue keeps stalling every morning."
            }
            (Domain::ProblemSolving, Tier::Moderate) => {
                "An e-commerce site sees intermittent checkout failures during promotions."
            }
            (Domain::ProblemSolving, Tier::Complex) => {
                "A logistics platform suffers cascading delays across warehouses, carriers and customer notifications with incomplete telemetry."
            }
        }
    }

    pub fn base_requirements(&self) -> &'static [&'static str; 4] {
        &BASE_REQUIREMENTS
    }

    /// Requirements added on top of the base set for a tier.
    pub fn tier_requirements(&self, tier: Tier) -> &'static [&'static str] {
        match tier {
            Tier::Simple => &[],
            Tier::Moderate => &[
                "Account for how the inputs influence each other",
                "Explain which information you considered less reliable",
            ],
            Tier::Complex => &[
                "Account for how the inputs influence each other",
                "Explain which information you considered less reliable",
                "Reconcile the conflicting objectives explicitly",
                "Describe how your recommendation changes if conditions shift",
            ],
        }
    }

    /// Cognitive dimensions a domain primarily exercises.
    pub fn primary_focus(&self, domain: Domain) -> &'static [&'static str] {
        match domain {
            Domain::Analytical => &["logical_reasoning", "working_memory", "evaluation"],
            Domain::Planning => &["planning", "working_memory", "adaptability"],
            Domain::Communication => &["communication", "abstraction", "evaluation"],
            Domain::ProblemSolving => &["logical_reasoning", "adaptability", "abstraction"],
        }
    }

    /// Cognitive requirement tags, ordered as in [`COGNITIVE_DIMENSIONS`].
    ///
    /// Harder tiers additionally demand attention control and metacognition.
    pub fn cognitive_requirements(&self, domain: Domain, tier: Tier) -> Vec<String> {
        let focus = self.primary_focus(domain);
        let secondary: &[&str] = match tier {
            Tier::Simple => &[],
            Tier::Moderate => &["attention_control"],
            Tier::Complex => &["attention_control", "metacognition"],
        };
        COGNITIVE_DIMENSIONS
            .iter()
            .filter(|dim| focus.contains(dim) || secondary.contains(dim))
            .map(|dim| dim.to_string())
            .collect()
    }

    /// Calculation names and methods a domain's scenarios expect.
    pub fn calculations(&self, domain: Domain) -> &'static [(&'static str, &'static str); 6] {
        match domain {
            Domain::Analytical => &[
                ("growth_rate", "period-over-period percentage change"),
                ("moving_average", "three-period moving average"),
                ("variance", "sample variance of the series"),
                ("share_of_total", "segment value divided by total"),
                ("correlation", "Pearson correlation between paired series"),
                ("outlier_threshold", "mean plus two standard deviations"),
            ],
            Domain::Planning => &[
                ("total_effort", "sum of task estimates"),
                ("critical_path", "longest dependency chain duration"),
                ("slack", "latest start minus earliest start"),
                ("utilization", "assigned hours over available hours"),
                ("budget_variance", "planned cost minus forecast cost"),
                ("buffer", "risk-weighted schedule contingency"),
            ],
            Domain::Communication => &[
                ("audience_coverage", "share of stakeholder groups addressed"),
                ("message_priority", "ranking of key messages by impact"),
                ("reading_time", "word count divided by reading speed"),
                ("concern_mapping", "stakeholder concerns matched to responses"),
                ("escalation_level", "severity tier of the communicated issue"),
                ("follow_up_count", "number of required follow-up actions"),
            ],
            Domain::ProblemSolving => &[
                ("throughput", "completed units per hour"),
                ("failure_rate", "failed runs over total runs"),
                ("queue_delay", "average wait time per item"),
                ("cost_of_option", "sum of direct and risk costs"),
                ("recovery_time", "sequential restore duration"),
                ("constraint_violations", "count of unmet rules"),
            ],
        }
    }

    pub fn step_phrases(&self, domain: Domain) -> &'static [&'static str] {
        match domain {
            Domain::Analytical => &[
                "Gather the relevant figures",
                "Clean and align the data",
                "Compute the key indicators",
                "Compare indicators against expectations",
                "Form candidate explanations",
                "Test explanations against the data",
                "Summarize findings",
            ],
            Domain::Planning => &[
                "List the goals and constraints",
                "Break the work into tasks",
                "Estimate each task",
                "Order tasks by dependency",
                "Assign resources",
                "Identify risks and buffers",
                "Finalize the plan",
            ],
            Domain::Communication => &[
                "Identify the audiences",
                "Determine each audience's concerns",
                "Select the key messages",
                "Structure the message",
                "Calibrate tone and detail",
                "Anticipate questions",
                "Finalize the draft",
            ],
            Domain::ProblemSolving => &[
                "Characterize the symptoms",
                "Collect evidence",
                "Generate hypotheses",
                "Eliminate unlikely causes",
                "Select a remedy",
                "Plan the rollout",
                "Define how success is verified",
            ],
        }
    }

    pub fn cue_labels(&self, domain: Domain) -> &'static [&'static str] {
        match domain {
            Domain::Analytical => &[
                "monthly revenue",
                "unit volume",
                "average price",
                "returns",
                "customer count",
                "repeat purchase rate",
                "marketing spend",
                "regional split",
            ],
            Domain::Planning => &[
                "available headcount",
                "budget ceiling",
                "deadline",
                "task estimates",
                "shared equipment",
                "vendor lead time",
                "approval cycle",
                "holiday calendar",
            ],
            Domain::Communication => &[
                "audience seniority",
                "prior announcements",
                "sensitive topics",
                "channel preferences",
                "timing constraints",
                "legal review",
                "open questions",
                "sentiment signals",
            ],
            Domain::ProblemSolving => &[
                "error logs",
                "incident timeline",
                "recent changes",
                "load profile",
                "dependency map",
                "user reports",
                "monitoring gaps",
                "maintenance windows",
            ],
        }
    }

    pub fn data_sources(&self, domain: Domain) -> &'static [&'static str] {
        match domain {
            Domain::Analytical => &[
                "point-of-sale export",
                "inventory system",
                "CRM records",
                "web analytics",
                "market survey",
                "finance ledger",
            ],
            Domain::Planning => &[
                "project tracker",
                "resource calendar",
                "budget sheet",
                "vendor quotes",
                "risk register",
                "team capacity survey",
            ],
            Domain::Communication => &[
                "meeting notes",
                "email threads",
                "stakeholder map",
                "employee survey",
                "press coverage",
                "policy documents",
            ],
            Domain::ProblemSolving => &[
                "application logs",
                "metrics dashboard",
                "change log",
                "support tickets",
                "architecture diagram",
                "on-call notes",
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_cycle_is_five_way() {
        let library = PatternLibrary::new();
        for domain in Domain::ALL {
            let first = library.pattern(domain, 1);
            let sixth = library.pattern(domain, 6);
            assert_eq!(first, sixth);
            let ids: Vec<u8> = (1..=5).map(|rep| library.pattern(domain, rep).id).collect();
            assert_eq!(ids, vec![1, 2, 3, 4, 0]);
        }
    }

    #[test]
    fn test_pattern_label_title_cases_name() {
        let library = PatternLibrary::new();
        let pattern = library.pattern(Domain::Analytical, 2);
        assert_eq!(pattern.label(), "Root Cause Analysis");
    }

    #[test]
    fn test_business_context_covers_every_cell() {
        let library = PatternLibrary::new();
        let mut seen = std::collections::HashSet::new();
        for domain in Domain::ALL {
            for tier in Tier::ALL {
                assert!(seen.insert(library.business_context(domain, tier)));
            }
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn test_cognitive_requirements_follow_universe_order() {
        let library = PatternLibrary::new();
        let tags = library.cognitive_requirements(Domain::Analytical, Tier::Complex);
        assert_eq!(
            tags,
            vec![
                "working_memory",
                "attention_control",
                "logical_reasoning",
                "evaluation",
                "metacognition"
            ]
        );
        assert_eq!(
            library
                .cognitive_requirements(Domain::Planning, Tier::Simple)
                .len(),
            3
        );
    }

    #[test]
    fn test_dependency_shapes() {
        assert_eq!(DependencyShape::Chain.predecessors(0), Vec::<usize>::new());
        assert_eq!(DependencyShape::Chain.predecessors(3), vec![2]);
        assert_eq!(DependencyShape::Branching.predecessors(4), vec![3, 2]);
        assert_eq!(DependencyShape::Branching.predecessors(3), vec![2]);
        assert_eq!(DependencyShape::Mesh.predecessors(1), vec![0]);
        assert_eq!(DependencyShape::Mesh.predecessors(5), vec![4, 3, 2]);
    }

    #[test]
    fn test_profile_enhancements_move_counts() {
        let mut profile = StructureProfile::for_tier(Tier::Simple, 0);
        profile.apply(PromptEnhancement::IncreaseInterdependence);
        assert_eq!(profile.shape, DependencyShape::Branching);
        assert_eq!(profile.linked_cues, 3);

        profile.apply(PromptEnhancement::ReduceInformationCues);
        assert_eq!(profile.cues, 2);
        assert_eq!(profile.linked_cues, 2);

        profile.apply(PromptEnhancement::ReduceUncertainty);
        assert_eq!(profile.uncertainty, 0);

        let mut complex = StructureProfile::for_tier(Tier::Complex, 2);
        assert_eq!(complex.cues, 16);
        complex.apply(PromptEnhancement::IncreaseUncertainty);
        assert_eq!(complex.uncertainty, 2);
        assert_eq!(complex.ambiguities, 4);
    }
}
