//! Trial prompt rendering.
//!
//! Only the task-facing parts of a scenario reach the model. Success
//! criteria and control expectations stay out so evaluation remains blind.

use tera::{Context, Tera};

use crate::error::LlmError;
use crate::scenario::Scenario;
use crate::scheduler::job::ConfigId;

/// System prompt sent with every trial.
pub const TRIAL_SYSTEM_PROMPT: &str = "You are a business analyst completing a workplace task. \
Work through the task step by step, state any assumptions, show calculations where \
they apply and finish with a clear recommendation.";

const TRIAL_PROMPT_TEMPLATE: &str = r#"# {{ title }}

## Context
{{ business_context }}

## Task
{{ description }}

## Requirements
{% for requirement in requirements -%}
- {{ requirement }}
{% endfor %}
{%- if capabilities | length > 0 %}
## Reasoning supports enabled
{{ capabilities | join(sep=", ") }}
{% endif %}"#;

/// Renders the user prompt for one trial of `scenario` under `config_id`.
pub fn render_trial_prompt(scenario: &Scenario, config_id: &ConfigId) -> Result<String, LlmError> {
    let mut context = Context::new();
    context.insert("title", &scenario.title);
    context.insert("business_context", &scenario.business_context);
    context.insert("description", &scenario.description);
    context.insert("requirements", &scenario.requirements);
    context.insert("capabilities", &config_id.enabled_capabilities());

    Ok(Tera::one_off(TRIAL_PROMPT_TEMPLATE, &context, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Domain, Position, ScenarioGenerator, ScenarioSource, Tier};
    use uuid::Uuid;

    fn scenario() -> Scenario {
        ScenarioGenerator::new(Uuid::nil())
            .render(&Position::new(Domain::Analytical, Tier::Moderate, 1, "m1"), &[])
            .expect("render")
    }

    #[test]
    fn test_prompt_contains_task_fields() {
        let scenario = scenario();
        let prompt = render_trial_prompt(&scenario, &ConfigId::full()).expect("prompt");

        assert!(prompt.starts_with(&format!("# {}", scenario.title)));
        assert!(prompt.contains(&scenario.business_context));
        assert!(prompt.contains(&scenario.description));
        for requirement in &scenario.requirements {
            assert!(prompt.contains(&format!("- {}", requirement)));
        }
        assert!(prompt.contains("Reasoning supports enabled"));
    }

    #[test]
    fn test_prompt_is_blind_to_evaluation_data() {
        let scenario = scenario();
        let prompt = render_trial_prompt(&scenario, &ConfigId::full()).expect("prompt");

        for criterion in &scenario.success_criteria {
            assert!(!prompt.contains(&criterion.criterion));
        }
        for insight in &scenario.control_expectations.expected_insights {
            assert!(!prompt.contains(insight.as_str()));
        }
    }

    #[test]
    fn test_baseline_config_omits_capabilities() {
        let prompt = render_trial_prompt(&scenario(), &ConfigId::baseline()).expect("prompt");
        assert!(!prompt.contains("Reasoning supports enabled"));
    }
}
