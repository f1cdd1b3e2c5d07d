use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{AgentKind, ReviewerPerspective};

use super::{
    excerpt, render_json, require_text, Agent, AgentError, AgentInputs, AgentOutput, AgentResult,
    ReviewInputs, TextGenerator,
};

/// Review criteria and their weight in the overall score. Weights sum to 1.
pub(crate) const CRITERIA: [(&str, f64); 5] = [
    ("significance", 0.25),
    ("approach", 0.25),
    ("innovation", 0.20),
    ("investigator", 0.15),
    ("environment", 0.15),
];

const DEFAULT_SCORE: f64 = 3.0;
const MAX_CONCERNS: usize = 5;
const MAX_SUGGESTIONS: usize = 10;

static SCORE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    CRITERIA
        .iter()
        .map(|(criterion, _)| {
            let re = RegexBuilder::new(&format!(r"{}.*?([1-5](?:\.\d)?)", criterion))
                .case_insensitive(true)
                .build()
                .expect("Invalid score pattern");
            (*criterion, re)
        })
        .collect()
});

const SYSTEM_PROMPT: &str = "You are an expert grant reviewer simulating a funding panel. \
Evaluate scientific significance and innovation, methodological rigor and feasibility, budget \
justification, team qualifications and institutional support, and broader impact. Give \
detailed, actionable feedback held to the standard of a competitive review.";

/// A reviewer's bottom line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub(crate) enum Recommendation {
    Fund,
    #[serde(rename = "Revise & Resubmit")]
    ReviseAndResubmit,
    Decline,
    Conditional,
}

impl Recommendation {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Fund => "Fund",
            Self::ReviseAndResubmit => "Revise & Resubmit",
            Self::Decline => "Decline",
            Self::Conditional => "Conditional",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "Fund" => Some(Self::Fund),
            "Revise & Resubmit" => Some(Self::ReviseAndResubmit),
            "Decline" => Some(Self::Decline),
            "Conditional" => Some(Self::Conditional),
            _ => None,
        }
    }

    pub(crate) fn from_review(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("fund") && !lower.contains("decline") {
            Self::Fund
        } else if lower.contains("revise") || lower.contains("resubmit") {
            Self::ReviseAndResubmit
        } else if lower.contains("decline") {
            Self::Decline
        } else {
            Self::Conditional
        }
    }
}

/// Most frequent recommendation; ties go to the one seen first.
pub(crate) fn consensus(recommendations: &[Recommendation]) -> Option<(Recommendation, usize)> {
    let mut best: Option<(Recommendation, usize)> = None;
    for rec in recommendations {
        let count = recommendations.iter().filter(|r| *r == rec).count();
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((*rec, count));
        }
    }
    best
}

#[derive(Debug, Clone, Serialize)]
struct ReviewerReport {
    reviewer_type: &'static str,
    perspective: ReviewerPerspective,
    review_text: String,
    scores: BTreeMap<&'static str, f64>,
    recommendation: Recommendation,
    key_concerns: Vec<String>,
}

impl ReviewerReport {
    fn from_response(perspective: ReviewerPerspective, text: String) -> Self {
        Self {
            reviewer_type: perspective.title(),
            perspective,
            scores: extract_scores(&text),
            recommendation: Recommendation::from_review(&text),
            key_concerns: extract_concerns(&text),
            review_text: text,
        }
    }
}

/// Simulates a multi-perspective review panel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewerSimulationAgent;

#[async_trait]
impl Agent for ReviewerSimulationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::ReviewerSimulation
    }

    async fn invoke(
        &self,
        generator: &dyn TextGenerator,
        inputs: &AgentInputs,
    ) -> AgentResult<AgentOutput> {
        let AgentInputs::Review(inputs) = inputs else {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        };
        if inputs.perspectives.is_empty() {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        }

        let mut reports = Vec::with_capacity(inputs.perspectives.len());
        for perspective in &inputs.perspectives {
            let response = generator.generate(&prompt(inputs, *perspective)).await?;
            let response = require_text(response, &format!("{} review", perspective.title()))?;
            reports.push(ReviewerReport::from_response(*perspective, response));
        }

        let assessment = overall_assessment(&reports);
        let next_steps = next_steps(&assessment);
        let agency = inputs
            .funding_agency
            .as_deref()
            .unwrap_or("the funding agency");
        let focus = inputs.goals.as_deref().unwrap_or(&inputs.topic);

        Ok(AgentOutput {
            output: json!({
                "individual_reviews": reports,
                "overall_assessment": assessment.to_json(),
                "improvement_recommendations": improvement_recommendations(&reports),
                "scoring_summary": scoring_summary(&reports),
                "next_steps": next_steps,
            }),
            rationale: format!(
                "Simulated {}-perspective review of {} proposal for {}. Evaluated based on \
                 standard review criteria with focus on {}",
                reports.len(),
                inputs.topic,
                agency,
                excerpt(focus, 100)
            ),
        })
    }
}

fn prompt(inputs: &ReviewInputs, perspective: ReviewerPerspective) -> String {
    let outline = inputs
        .outline
        .as_ref()
        .map(|o| excerpt(&render_json(o), 6000))
        .unwrap_or_else(|| "not yet drafted".to_string());
    let budget = inputs
        .budget
        .as_ref()
        .map(|b| excerpt(&render_json(b), 4000))
        .unwrap_or_else(|| "not yet drafted".to_string());

    format!(
        "{SYSTEM_PROMPT}

You are a {title} reviewing a grant proposal for {agency}.
Your focus: {focus}.

Proposal Summary:
- Topic: {topic}
- Goals: {goals}
- Outline: {outline}
- Budget: {budget}

Provide:
1. STRENGTHS (3-5 key points)
2. WEAKNESSES (3-5 key points)
3. SPECIFIC CONCERNS
4. SUGGESTIONS FOR IMPROVEMENT
5. SCORING (1-5 for each of: significance, approach, innovation, investigator, environment)
6. OVERALL RECOMMENDATION (Fund, Revise & Resubmit, or Decline, with reasoning)",
        title = perspective.title(),
        agency = inputs
            .funding_agency
            .as_deref()
            .unwrap_or("an unspecified funder"),
        focus = perspective.focus(),
        topic = inputs.topic,
        goals = inputs.goals.as_deref().unwrap_or("not specified"),
    )
}

fn extract_scores(text: &str) -> BTreeMap<&'static str, f64> {
    SCORE_PATTERNS
        .iter()
        .map(|(criterion, re)| {
            let score = re
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(DEFAULT_SCORE);
            (*criterion, score)
        })
        .collect()
}

/// Lines following the first weakness/concern heading. Bullets marked with
/// `*` and lines that mention a concern marker themselves are skipped.
fn extract_concerns(text: &str) -> Vec<String> {
    const MARKERS: [&str; 4] = ["weakness", "concern", "issue", "problem"];

    let mut concerns = Vec::new();
    let mut in_section = false;
    for line in text.lines().map(str::trim) {
        let lower = line.to_lowercase();
        if MARKERS.iter().any(|m| lower.contains(m)) {
            in_section = true;
            continue;
        }
        if in_section && !line.is_empty() && !line.starts_with('*') {
            concerns.push(line.to_string());
            if concerns.len() >= MAX_CONCERNS {
                break;
            }
        }
    }
    concerns
}

struct Assessment {
    overall_score: f64,
    criterion_scores: BTreeMap<&'static str, f64>,
    consensus: Recommendation,
    agreeing: usize,
    reviewers: usize,
    strengths: Vec<String>,
    concerns: Vec<String>,
}

impl Assessment {
    fn to_json(&self) -> Value {
        json!({
            "overall_score": round2(self.overall_score),
            "criterion_scores": self
                .criterion_scores
                .iter()
                .map(|(k, v)| (k.to_string(), json!(round2(*v))))
                .collect::<serde_json::Map<_, _>>(),
            "consensus_recommendation": self.consensus.as_str(),
            "review_consensus": format!("{}/{} reviewers", self.agreeing, self.reviewers),
            "strengths_consensus": self.strengths,
            "concerns_consensus": self.concerns,
        })
    }
}

fn criterion_values(reports: &[ReviewerReport], criterion: &str) -> Vec<f64> {
    reports
        .iter()
        .map(|r| r.scores.get(criterion).copied().unwrap_or(DEFAULT_SCORE))
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn overall_assessment(reports: &[ReviewerReport]) -> Assessment {
    let criterion_scores: BTreeMap<&'static str, f64> = CRITERIA
        .iter()
        .map(|(criterion, _)| (*criterion, mean(&criterion_values(reports, criterion))))
        .collect();
    let overall_score = CRITERIA
        .iter()
        .map(|(criterion, weight)| criterion_scores[criterion] * weight)
        .fold(0.0, |a, b| a + b);

    let recommendations: Vec<Recommendation> = reports.iter().map(|r| r.recommendation).collect();
    let (consensus, agreeing) =
        consensus(&recommendations).unwrap_or((Recommendation::Conditional, 0));

    let all_text = reports
        .iter()
        .map(|r| r.review_text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    Assessment {
        overall_score,
        criterion_scores,
        consensus,
        agreeing,
        reviewers: reports.len(),
        strengths: common_themes(
            &all_text,
            &["strong", "excellent", "innovative", "comprehensive", "well-designed"],
        ),
        concerns: common_themes(
            &all_text,
            &["concern", "weakness", "unclear", "insufficient", "problematic"],
        ),
    }
}

fn common_themes(all_text: &str, keywords: &[&str]) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| all_text.matches(*k).count() >= 2)
        .map(|k| format!("Multiple reviewers noted {} aspects", k))
        .take(5)
        .collect()
}

fn improvement_recommendations(reports: &[ReviewerReport]) -> Vec<String> {
    const MARKERS: [&str; 4] = ["suggest", "recommend", "should", "consider"];

    let mut seen = Vec::new();
    for line in reports
        .iter()
        .flat_map(|r| r.review_text.lines())
        .map(str::trim)
    {
        let lower = line.to_lowercase();
        if line.len() > 20
            && MARKERS.iter().any(|m| lower.contains(m))
            && !seen.iter().any(|s: &String| s == line)
        {
            seen.push(line.to_string());
            if seen.len() >= MAX_SUGGESTIONS {
                break;
            }
        }
    }
    seen
}

fn funding_probability(average: f64) -> &'static str {
    if average >= 4.0 {
        "High (>70%)"
    } else if average >= 3.5 {
        "Moderate (40-70%)"
    } else if average >= 3.0 {
        "Low (10-40%)"
    } else {
        "Very Low (<10%)"
    }
}

fn scoring_summary(reports: &[ReviewerReport]) -> Value {
    let mut details = serde_json::Map::new();
    let mut averages = Vec::new();
    let mut max_std_dev: f64 = 0.0;

    for (criterion, _) in CRITERIA {
        let values = criterion_values(reports, criterion);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sd = round2(std_dev(&values));
        let avg = round2(mean(&values));
        max_std_dev = max_std_dev.max(sd);
        averages.push(avg);
        details.insert(
            criterion.to_string(),
            json!({
                "average": avg,
                "range": format!("{:.1} - {:.1}", min, max),
                "std_dev": sd,
            }),
        );
    }

    let all_scores: Vec<f64> = reports
        .iter()
        .flat_map(|r| r.scores.values().copied())
        .collect();

    json!({
        "criterion_details": details,
        "overall_average": round2(mean(&all_scores)),
        "score_consistency": if max_std_dev < 0.5 { "High" } else { "Moderate" },
        "funding_probability": funding_probability(mean(&averages)),
    })
}

fn next_steps(assessment: &Assessment) -> Vec<&'static str> {
    let mut steps = if assessment.consensus == Recommendation::Fund
        || assessment.overall_score >= 4.0
    {
        vec![
            "Prepare final proposal submission",
            "Gather required institutional commitments",
            "Finalize team member confirmations",
            "Complete budget verification",
        ]
    } else if assessment.consensus == Recommendation::ReviseAndResubmit
        || assessment.overall_score >= 3.0
    {
        vec![
            "Address major reviewer concerns systematically",
            "Strengthen methodology section based on feedback",
            "Revise budget based on reviewer suggestions",
            "Consider additional pilot data or preliminary results",
            "Seek additional collaborators if recommended",
        ]
    } else {
        vec![
            "Major revision of project scope and approach needed",
            "Consider alternative funding sources",
            "Gather additional preliminary data",
            "Strengthen team qualifications",
            "Redesign methodology based on feedback",
        ]
    };
    steps.extend([
        "Schedule team meeting to discuss feedback",
        "Create revision timeline and task assignments",
        "Consider seeking additional external review",
    ]);
    steps
}
