//! Task-complexity validation.
//!
//! Scores a scenario against three task-complexity frameworks plus element
//! interactivity, classifies it into a tier and decides whether it matches
//! the tier it was generated for:
//!
//! - **Wood**: component, coordinative and dynamic complexity
//! - **Campbell**: multiple paths, multiple outcomes, conflicting
//!   interdependence and uncertainty, encoded as a 4-bit type
//! - **Liu & Li**: ten normalized task dimensions
//! - **Element interactivity**: interacting-element ratio and working-memory load
//!
//! Rejected scenarios carry [`PromptEnhancement`] hints that the
//! [`regeneration`] loop feeds back into the next render.

pub mod metrics;
pub mod regeneration;
pub mod validator;

pub use metrics::{
    CampbellMetrics, ComplexityMetrics, CoordinativeComplexity, DynamicComplexity,
    InteractivityMetrics, LiuLiMetrics, WoodMetrics,
};
pub use regeneration::{generate_validated, RegenerationOutcome, RegenerationState};
pub use validator::{
    ComplexityScore, ComplexityValidator, ComponentScores, CompositeWeights,
    InteractivityThresholds, PromptEnhancement, SignalTiers, TierThresholds, ValidatorConfig,
};
