use async_trait::async_trait;
use serde_json::json;

use crate::models::AgentKind;

use super::budget::ParsedBudget;
use super::{
    excerpt, render_json, require_text, AdjustInputs, Agent, AgentError, AgentInputs, AgentOutput,
    AgentResult, TextGenerator,
};

/// Reworks a budget to meet a target total.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetAdjustAgent;

#[async_trait]
impl Agent for BudgetAdjustAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::BudgetAdjust
    }

    async fn invoke(
        &self,
        generator: &dyn TextGenerator,
        inputs: &AgentInputs,
    ) -> AgentResult<AgentOutput> {
        let AgentInputs::BudgetAdjust(inputs) = inputs else {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        };

        let response = generator.generate(&prompt(inputs)).await?;
        let response = require_text(response, "budget adjustment")?;

        let parsed = ParsedBudget::parse(&response);
        let mut output = json!({
            "adjusted_budget": response,
            "target_amount": inputs.target_amount,
            "constraints": inputs.constraints,
            "source_version": inputs.budget.version,
            "adjustment_strategy": "Cost optimization while maintaining project integrity",
        });
        if !parsed.is_empty() {
            output["budget_details"] = parsed.details();
            output["budget_summary"] = parsed.summary();
            output["cost_breakdown"] = parsed.breakdown();
        }

        Ok(AgentOutput {
            output,
            rationale: format!(
                "Adjusted budget version {} to meet ${:.2} target with constraints: {}",
                inputs.budget.version,
                inputs.target_amount,
                inputs.constraints.as_deref().unwrap_or("none")
            ),
        })
    }
}

fn prompt(inputs: &AdjustInputs) -> String {
    format!(
        "Adjust the following grant budget for \"{topic}\" to meet a target amount of ${target:.2}.

Original Budget (version {version}):
{budget}

Constraints: {constraints}

Provide a revised budget with costed line items under the same category headings, then \
recommend which categories to reduce or increase, how to maintain project quality, alternative \
funding sources and phased implementation options.",
        topic = inputs.topic,
        target = inputs.target_amount,
        version = inputs.budget.version,
        budget = excerpt(&render_json(&inputs.budget.output), 8000),
        constraints = inputs.constraints.as_deref().unwrap_or("none"),
    )
}
