use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::{AgentKind, VersionRecord};

use super::review::{consensus, Recommendation};
use super::{
    excerpt, render_json, require_text, Agent, AgentError, AgentInputs, AgentOutput, AgentResult,
    PanelInputs, TextGenerator,
};

/// Writes a panel summary report over every review of a proposal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanelSummaryAgent;

#[async_trait]
impl Agent for PanelSummaryAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::PanelSummary
    }

    async fn invoke(
        &self,
        generator: &dyn TextGenerator,
        inputs: &AgentInputs,
    ) -> AgentResult<AgentOutput> {
        let AgentInputs::PanelSummary(inputs) = inputs else {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        };
        if inputs.reviews.is_empty() {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        }

        let response = generator.generate(&prompt(inputs)).await?;
        let response = require_text(response, "panel summary")?;

        let versions: Vec<u32> = inputs.reviews.iter().map(|r| r.version).collect();
        let recommendations: Vec<Recommendation> = inputs
            .reviews
            .iter()
            .filter_map(review_recommendation)
            .collect();
        let consensus = consensus(&recommendations).map(|(rec, _)| rec.as_str());

        Ok(AgentOutput {
            output: json!({
                "panel_summary": response,
                "review_versions": versions,
                "consensus_recommendation": consensus,
                "report_type": "Final Panel Review Summary",
            }),
            rationale: format!(
                "Generated panel summary for {} from {} review version(s)",
                inputs.topic,
                versions.len()
            ),
        })
    }
}

fn review_recommendation(review: &VersionRecord) -> Option<Recommendation> {
    if let Some(text) = refined_content(review) {
        return Some(Recommendation::from_review(text));
    }
    review
        .output
        .pointer("/overall_assessment/consensus_recommendation")
        .and_then(Value::as_str)
        .and_then(Recommendation::parse)
}

/// The reworked text of a review produced by a refine.
fn refined_content(review: &VersionRecord) -> Option<&str> {
    if review.output.get("individual_reviews").is_some() {
        return None;
    }
    review.output.get("refined_content").and_then(Value::as_str)
}

fn render_review(review: &VersionRecord) -> String {
    if let Some(text) = refined_content(review) {
        let source = review
            .output
            .get("refined_version")
            .and_then(Value::as_u64)
            .map(|v| format!(" (refines version {})", v))
            .unwrap_or_default();
        return format!(
            "Review version {}{}:\nRefined review: {}",
            review.version,
            source,
            excerpt(text, 6000)
        );
    }
    if review.output.get("individual_reviews").is_none() {
        return format!(
            "Review version {}:\n{}",
            review.version,
            excerpt(&render_json(&review.output), 6000)
        );
    }
    format!(
        "Review version {}:\nIndividual reviews: {}\nOverall assessment: {}",
        review.version,
        excerpt(&render_json(&review.output["individual_reviews"]), 6000),
        render_json(&review.output["overall_assessment"])
    )
}

fn prompt(inputs: &PanelInputs) -> String {
    let reviews = inputs
        .reviews
        .iter()
        .map(render_review)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Generate a comprehensive panel summary report for the grant proposal \"{topic}\" \
based on the following review rounds:

{reviews}

Include:
1. EXECUTIVE SUMMARY (overall recommendation, key strengths and weaknesses, funding rationale)
2. DETAILED ASSESSMENT (significance and innovation, approach, team and environment, budget)
3. REVIEWER CONSENSUS (agreement, disagreement, critical issues)
4. RECOMMENDATIONS FOR IMPROVEMENT (high priority, moderate priority, optional)

Format as a professional grant review panel summary.",
        topic = inputs.topic,
    )
}
