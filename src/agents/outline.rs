use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::AgentKind;

use super::{
    excerpt, require_text, Agent, AgentError, AgentInputs, AgentOutput, AgentResult, OutlineInputs,
    TextGenerator,
};

const MAX_SECTIONS: usize = 10;
const MAX_AGENCY_NOTES: usize = 5;

const SECTION_KEYWORDS: [&str; 6] = [
    "summary",
    "statement",
    "methodology",
    "timeline",
    "budget",
    "outcomes",
];
const AGENCY_KEYWORDS: [&str; 3] = ["agency", "funder", "specific"];

const SYSTEM_PROMPT: &str = "You are an expert Grant Proposal Outline Designer. You create \
comprehensive, well-structured outlines for grant proposals based on the research topic, \
goals and funding agency requirements. Consider standard proposal sections, agency-specific \
requirements, an appropriate research methodology, timeline and deliverables, and impact \
and evaluation metrics.";

/// Designs the section structure of a proposal.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineDesignerAgent;

#[async_trait]
impl Agent for OutlineDesignerAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::OutlineDesigner
    }

    async fn invoke(
        &self,
        generator: &dyn TextGenerator,
        inputs: &AgentInputs,
    ) -> AgentResult<AgentOutput> {
        let AgentInputs::Outline(inputs) = inputs else {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        };

        let response = generator.generate(&prompt(inputs)).await?;
        let response = require_text(response, "outline")?;
        let outline = parse_outline(&response, &inputs.funding_agency)?;

        Ok(AgentOutput {
            output: json!({
                "outline": outline,
                "recommendations": [
                    format!(
                        "Tailor language and emphasis to {} priorities",
                        inputs.funding_agency
                    ),
                    "Include specific, measurable outcomes",
                    "Develop detailed timeline with realistic milestones",
                    "Ensure budget aligns with proposed activities",
                ],
            }),
            rationale: format!(
                "Created comprehensive outline for {} targeting {}. Considered project goals: {} \
                 and incorporated best practices for grant proposals.",
                inputs.topic,
                inputs.funding_agency,
                excerpt(&inputs.goals, 100)
            ),
        })
    }
}

fn prompt(inputs: &OutlineInputs) -> String {
    format!(
        "{SYSTEM_PROMPT}

Create a detailed grant proposal outline for:

Research Topic: {topic}
Project Goals: {goals}
Funding Agency: {agency}
Project Duration: {duration}
Team Size: {team_size}
Project Type: {project_type}

Cover: Executive Summary, Problem Statement and Significance, Literature Review, Research \
Methodology, Project Timeline and Milestones, Budget Categories, Expected Outcomes and Impact, \
Evaluation Plan, Sustainability, Team Qualifications.

For each section give its purpose, suggested content, approximate length, critical elements \
and common pitfalls. Add recommendations specific to {agency}.

Format your response as structured JSON.",
        topic = inputs.topic,
        goals = inputs.goals,
        agency = inputs.funding_agency,
        duration = inputs.duration,
        team_size = inputs.team_size,
        project_type = inputs.project_type,
    )
}

/// Structure a model response: JSON is kept as-is, prose gets headings and notes extracted.
pub(crate) fn parse_outline(response: &str, agency: &str) -> AgentResult<Value> {
    let body = strip_code_fence(response.trim());
    if body.starts_with('{') {
        return serde_json::from_str(body).map_err(|e| {
            AgentError::malformed(
                format!("outline looked like JSON but did not parse: {}", e),
                response,
            )
        });
    }

    Ok(json!({
        "outline_content": response,
        "sections": extract_sections(response),
        "agency_specific_notes": extract_agency_notes(response, agency),
    }))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_sections(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            SECTION_KEYWORDS.iter().any(|k| lower.contains(k))
                && (line.ends_with(':') || line.chars().take(3).any(|c| c.is_ascii_digit()))
        })
        .take(MAX_SECTIONS)
        .map(str::to_string)
        .collect()
}

fn extract_agency_notes(response: &str, agency: &str) -> Vec<String> {
    let agency = agency.trim().to_lowercase();
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_lowercase();
            (!agency.is_empty() && lower.contains(&agency))
                || AGENCY_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .take(MAX_AGENCY_NOTES)
        .map(str::to_string)
        .collect()
}
