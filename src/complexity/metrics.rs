//! Raw metrics of the three task-complexity frameworks plus element interactivity.
//!
//! Every metric is extracted from a scenario's [`TaskStructure`] and control
//! expectations, so scoring is a pure function of the scenario.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::scenario::{Scenario, TaskStructure, UncertaintyLevel};

/// Coordination between acts (Wood).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinativeComplexity {
    #[default]
    Sequential,
    Interdependent,
    Networked,
}

impl CoordinativeComplexity {
    pub fn level(&self) -> u8 {
        match self {
            CoordinativeComplexity::Sequential => 0,
            CoordinativeComplexity::Interdependent => 1,
            CoordinativeComplexity::Networked => 2,
        }
    }
}

/// How much the task's conditions change while it is performed (Wood).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicComplexity {
    #[default]
    Static,
    Low,
    High,
}

impl DynamicComplexity {
    pub fn level(&self) -> u8 {
        match self {
            DynamicComplexity::Static => 0,
            DynamicComplexity::Low => 1,
            DynamicComplexity::High => 2,
        }
    }
}

/// Wood's component, coordinative and dynamic complexity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WoodMetrics {
    pub distinct_acts: u32,
    pub information_cues_per_act: f64,
    pub coordinative: CoordinativeComplexity,
    pub dynamic: DynamicComplexity,
}

impl WoodMetrics {
    /// Component complexity: acts times information cues per act.
    pub fn component_complexity(&self) -> f64 {
        self.distinct_acts as f64 * self.information_cues_per_act
    }
}

/// Campbell's four complexity attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampbellMetrics {
    pub multiple_paths: bool,
    pub multiple_outcomes: bool,
    pub conflicting_interdependence: bool,
    pub uncertainty: UncertaintyLevel,
}

impl CampbellMetrics {
    /// 4-bit Campbell type (0-15): paths=1, outcomes=2, conflict=4, uncertainty=8.
    pub fn campbell_type(&self) -> u8 {
        let mut bits = 0;
        if self.multiple_paths {
            bits |= 1;
        }
        if self.multiple_outcomes {
            bits |= 2;
        }
        if self.conflicting_interdependence {
            bits |= 4;
        }
        if self.uncertainty != UncertaintyLevel::None {
            bits |= 8;
        }
        bits
    }

    /// Number of attributes that are present or elevated.
    pub fn elevated_count(&self) -> u8 {
        self.campbell_type().count_ones() as u8
    }
}

/// Liu & Li's ten task-complexity dimensions, each normalized to [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiuLiMetrics {
    pub size: f64,
    pub variety: f64,
    pub ambiguity: f64,
    pub relationships: f64,
    pub variability: f64,
    pub unreliability: f64,
    pub novelty: f64,
    pub incongruity: f64,
    pub action_complexity: f64,
    pub time_pressure: f64,
}

impl LiuLiMetrics {
    /// Dimensions other than variety and ambiguity, which carry their own weights.
    pub fn other_dimensions(&self) -> [f64; 8] {
        [
            self.size,
            self.relationships,
            self.variability,
            self.unreliability,
            self.novelty,
            self.incongruity,
            self.action_complexity,
            self.time_pressure,
        ]
    }

    pub fn mean(&self) -> f64 {
        (self.variety + self.ambiguity + self.other_dimensions().iter().sum::<f64>()) / 10.0
    }
}

/// Element interactivity and working-memory load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractivityMetrics {
    pub total_elements: u32,
    pub interacting_elements: u32,
    /// Interacting over total elements.
    pub ratio: f64,
    /// Elements held simultaneously once chunk groups are collapsed.
    pub effective_elements: u32,
    /// Effective elements over working-memory capacity, capped at 1.
    pub working_memory_load: f64,
}

/// Working-memory capacity in elements.
pub const WORKING_MEMORY_CAPACITY: f64 = 7.0;

/// All raw metrics for one scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    pub wood: WoodMetrics,
    pub campbell: CampbellMetrics,
    pub liu_li: LiuLiMetrics,
    pub interactivity: InteractivityMetrics,
}

impl ComplexityMetrics {
    /// Extracts every metric from a scenario.
    pub fn extract(scenario: &Scenario) -> Self {
        let structure = &scenario.task_structure;
        let calculations = scenario.control_expectations.expected_calculations.len();
        Self {
            wood: wood(structure),
            campbell: campbell(structure),
            liu_li: liu_li(structure, calculations),
            interactivity: interactivity(structure),
        }
    }
}

fn ratio(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    (value / max).clamp(0.0, 1.0)
}

fn wood(structure: &TaskStructure) -> WoodMetrics {
    let acts = structure.steps.len();
    let cues_per_act = if acts == 0 {
        0.0
    } else {
        structure.information_cues.len() as f64 / acts as f64
    };

    let max_predecessors = structure
        .steps
        .iter()
        .map(|s| s.depends_on.len())
        .max()
        .unwrap_or(0);
    let density = if acts > 1 {
        structure.dependency_count() as f64 / (acts - 1) as f64
    } else {
        0.0
    };
    let coordinative = if max_predecessors <= 1 {
        CoordinativeComplexity::Sequential
    } else if density >= 2.0 {
        CoordinativeComplexity::Networked
    } else {
        CoordinativeComplexity::Interdependent
    };

    let dynamic = match structure.changing_conditions.len() {
        0 => DynamicComplexity::Static,
        1 | 2 => DynamicComplexity::Low,
        _ => DynamicComplexity::High,
    };

    WoodMetrics {
        distinct_acts: acts as u32,
        information_cues_per_act: cues_per_act,
        coordinative,
        dynamic,
    }
}

fn campbell(structure: &TaskStructure) -> CampbellMetrics {
    CampbellMetrics {
        multiple_paths: structure.solution_paths > 1,
        multiple_outcomes: structure.outcomes.len() > 1,
        conflicting_interdependence: !structure.conflicts.is_empty(),
        uncertainty: structure.uncertainty,
    }
}

fn liu_li(structure: &TaskStructure, calculations: usize) -> LiuLiMetrics {
    let acts = structure.steps.len() as f64;
    let cues = structure.information_cues.len() as f64;
    let possible_links = acts * (acts - 1.0) / 2.0;
    let sources = structure.data_sources.len() as f64;

    LiuLiMetrics {
        size: ratio(acts + cues, 30.0),
        variety: ratio(sources, 6.0),
        ambiguity: ratio(structure.ambiguities.len() as f64, 4.0),
        relationships: ratio(structure.dependency_count() as f64, possible_links),
        variability: ratio(structure.changing_conditions.len() as f64, 4.0),
        unreliability: ratio(structure.unreliable_sources as f64, sources),
        novelty: structure.novelty.clamp(0.0, 1.0),
        incongruity: ratio(structure.conflicts.len() as f64, 3.0),
        action_complexity: ratio(calculations as f64, 6.0),
        time_pressure: structure.time_pressure.clamp(0.0, 1.0),
    }
}

fn interactivity(structure: &TaskStructure) -> InteractivityMetrics {
    let cues = &structure.information_cues;
    let linked: Vec<_> = cues.iter().filter(|c| !c.linked_to.is_empty()).collect();
    let chunks: HashSet<&str> = linked.iter().filter_map(|c| c.chunk.as_deref()).collect();
    let unchunked = linked.iter().filter(|c| c.chunk.is_none()).count();
    let effective = unchunked + chunks.len();

    InteractivityMetrics {
        total_elements: cues.len() as u32,
        interacting_elements: linked.len() as u32,
        ratio: ratio(linked.len() as f64, cues.len() as f64),
        effective_elements: effective as u32,
        working_memory_load: ratio(effective as f64, WORKING_MEMORY_CAPACITY),
    }
}
