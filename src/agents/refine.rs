use async_trait::async_trait;
use serde_json::json;

use crate::models::AgentKind;

use super::{
    excerpt, render_json, require_text, Agent, AgentError, AgentInputs, AgentOutput, AgentResult,
    RefineInputs, TextGenerator,
};

/// Rewrites a prior outline, budget or review to address feedback.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefineAgent;

#[async_trait]
impl Agent for RefineAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Refine
    }

    async fn invoke(
        &self,
        generator: &dyn TextGenerator,
        inputs: &AgentInputs,
    ) -> AgentResult<AgentOutput> {
        let AgentInputs::Refine(inputs) = inputs else {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        };

        let response = generator.generate(&prompt(inputs)).await?;
        let response = require_text(response, "refinement")?;
        let target = &inputs.target;

        Ok(AgentOutput {
            output: json!({
                "refined_agent": target.agent,
                "refined_version": target.version,
                "refined_content": response,
                "feedback": inputs.feedback,
                "changes_made": "Addressed specific feedback points while maintaining proposal structure",
            }),
            rationale: format!(
                "Refined {} version {} based on feedback: {}",
                artifact_name(&target.agent),
                target.version,
                excerpt(&inputs.feedback, 100)
            ),
        })
    }
}

fn artifact_name(kind: &AgentKind) -> &'static str {
    match kind {
        AgentKind::OutlineDesigner => "outline",
        AgentKind::BudgetEstimator => "budget",
        AgentKind::ReviewerSimulation => "review",
        _ => "artifact",
    }
}

fn prompt(inputs: &RefineInputs) -> String {
    let name = artifact_name(&inputs.target.agent);
    let guidance = match inputs.target.agent {
        AgentKind::BudgetEstimator => {
            "Keep every line item costed in dollars under the PERSONNEL, EQUIPMENT, TRAVEL, \
             SUPPLIES, OTHER DIRECT COSTS and INDIRECT COSTS headings."
        }
        AgentKind::ReviewerSimulation => {
            "Keep the reviewer perspectives, scores and recommendations, revising them where the \
             feedback calls for it."
        }
        _ => "Maintain the overall structure and quality of the proposal.",
    };

    format!(
        "You are refining the {name} of a grant proposal on \"{topic}\".

Original {name} (version {version}):
{original}

Feedback to Address: {feedback}

Provide an improved version that addresses the feedback. {guidance}",
        topic = inputs.topic,
        version = inputs.target.version,
        original = excerpt(&render_json(&inputs.target.output), 8000),
        feedback = inputs.feedback,
    )
}
