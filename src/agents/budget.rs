use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::models::AgentKind;

use super::{
    excerpt, render_json, require_text, Agent, AgentError, AgentInputs, AgentOutput, AgentResult,
    BudgetInputs, TextGenerator,
};

/// Budget categories, in the order they are matched against a line.
pub(crate) const CATEGORIES: [&str; 6] = [
    "personnel",
    "equipment",
    "travel",
    "supplies",
    "indirect",
    "other",
];

const LARGE_BUDGET: f64 = 1_000_000.0;

static DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[\d,]+(?:\.\d{2})?").expect("Invalid dollar pattern"));

const SYSTEM_PROMPT: &str = "You are an expert Budget Estimator for grant proposals. You create \
realistic, well-justified budget estimates based on research projects, timelines and funding \
agency guidelines. Cover personnel, equipment and supplies, travel, indirect costs and \
agency-specific limitations, with a justification for each line item.";

/// Produces a categorised cost estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetEstimatorAgent;

#[async_trait]
impl Agent for BudgetEstimatorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::BudgetEstimator
    }

    async fn invoke(
        &self,
        generator: &dyn TextGenerator,
        inputs: &AgentInputs,
    ) -> AgentResult<AgentOutput> {
        let AgentInputs::Budget(inputs) = inputs else {
            return Err(AgentError::UnsupportedInputs { agent: self.kind() });
        };

        let response = generator.generate(&prompt(inputs)).await?;
        let response = require_text(response, "budget")?;

        let parsed = ParsedBudget::parse(&response);
        if parsed.is_empty() {
            return Err(AgentError::malformed(
                "budget response contains no costed line items",
                response,
            ));
        }

        let agency = inputs
            .funding_agency
            .as_deref()
            .unwrap_or("the funding agency");
        let total = parsed.total();
        let mut output = json!({
            "budget_details": parsed.details(),
            "budget_summary": parsed.summary(),
            "cost_breakdown": parsed.breakdown(),
            "funding_recommendations": funding_recommendations(agency, total),
            "budget_text": response,
        });
        if let Some(target) = inputs.target_amount {
            output["target_amount"] = json!(target);
        }

        Ok(AgentOutput {
            output,
            rationale: format!(
                "Generated comprehensive budget for {} {} project on {}. Considered team size ({}) \
                 and {} guidelines. Total estimated cost: ${:.2}",
                inputs.duration, inputs.project_type, inputs.topic, inputs.team_size, agency, total
            ),
        })
    }
}

fn prompt(inputs: &BudgetInputs) -> String {
    let mut prompt = format!(
        "{SYSTEM_PROMPT}

Create a detailed budget estimate for:

Research Topic: {topic}
Project Goals: {goals}
Funding Agency: {agency}
Project Duration: {duration}
Team Size: {team_size}
Project Type: {project_type}
",
        topic = inputs.topic,
        goals = inputs.goals.as_deref().unwrap_or("not specified"),
        agency = inputs.funding_agency.as_deref().unwrap_or("not specified"),
        duration = inputs.duration,
        team_size = inputs.team_size,
        project_type = inputs.project_type,
    );

    if let Some(target) = inputs.target_amount {
        prompt.push_str(&format!("Target Total: ${:.2}\n", target));
    }
    if let Some(outline) = &inputs.outline {
        prompt.push_str(&format!(
            "\nThe budget must support this proposal outline:\n{}\n",
            excerpt(&render_json(outline), 6000)
        ));
    }

    prompt.push_str(
        "
Use these headings: PERSONNEL, EQUIPMENT, TRAVEL, SUPPLIES, OTHER DIRECT COSTS, INDIRECT COSTS.
Under each heading list line items with a dollar amount (for example `- Postdoc salary: $60,000`),
a year-by-year breakdown and a short justification. Finish with category totals.",
    );
    prompt
}

/// Costed lines of a budget response, grouped by category.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParsedBudget {
    items: Vec<(&'static str, Vec<String>)>,
}

impl ParsedBudget {
    /// Scan `text` line by line: a line naming a category switches the current
    /// category, and any line containing `$` is recorded under it.
    pub(crate) fn parse(text: &str) -> Self {
        let mut items: Vec<(&'static str, Vec<String>)> =
            CATEGORIES.iter().map(|c| (*c, Vec::new())).collect();
        let mut current: Option<usize> = None;

        for line in text.lines().map(str::trim) {
            let lower = line.to_lowercase();
            if let Some(idx) = CATEGORIES.iter().position(|c| lower.contains(c)) {
                current = Some(idx);
            }
            if let Some(idx) = current {
                if line.contains('$') {
                    items[idx].1.push(line.to_string());
                }
            }
        }

        Self { items }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.iter().all(|(_, lines)| lines.is_empty())
    }

    fn category_total(lines: &[String]) -> f64 {
        lines
            .iter()
            .flat_map(|line| dollar_amounts(line))
            .fold(0.0, |acc, amount| acc + amount)
    }

    pub(crate) fn total(&self) -> f64 {
        self.items
            .iter()
            .map(|(_, lines)| Self::category_total(lines))
            .fold(0.0, |acc, amount| acc + amount)
    }

    pub(crate) fn details(&self) -> Value {
        let map: Map<String, Value> = self
            .items
            .iter()
            .map(|(category, lines)| (category.to_string(), json!(lines)))
            .collect();
        Value::Object(map)
    }

    /// `<category>_total` per category plus `total_cost` and `currency`.
    pub(crate) fn summary(&self) -> Value {
        let mut map = Map::new();
        for (category, lines) in &self.items {
            map.insert(
                format!("{}_total", category),
                json!(Self::category_total(lines)),
            );
        }
        map.insert("total_cost".into(), json!(self.total()));
        map.insert("currency".into(), json!("USD"));
        Value::Object(map)
    }

    /// Share of the total per category, in percent rounded to two decimals.
    pub(crate) fn breakdown(&self) -> Value {
        let total = self.total();
        let map: Map<String, Value> = self
            .items
            .iter()
            .map(|(category, lines)| {
                let pct = if total > 0.0 {
                    (Self::category_total(lines) / total * 100.0 * 100.0).round() / 100.0
                } else {
                    0.0
                };
                (title_case(category), json!(pct))
            })
            .collect();
        Value::Object(map)
    }
}

fn dollar_amounts(line: &str) -> impl Iterator<Item = f64> + '_ {
    DOLLAR_AMOUNT
        .find_iter(line)
        .map(|m| m.as_str().trim_start_matches('$').replace(',', ""))
        .filter_map(|amount| amount.parse().ok())
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `1234567.5` as `1,234,567.50`.
fn format_usd(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, cents)
}

fn funding_recommendations(agency: &str, total: f64) -> Vec<String> {
    let mut recommendations = Vec::new();
    if total > LARGE_BUDGET {
        recommendations.push(format!(
            "Consider multi-year or collaborative approach for large budget (${})",
            format_usd(total)
        ));
    }
    recommendations.extend([
        format!("Align budget categories with {} priorities", agency),
        "Include detailed cost-share information if required".to_string(),
        "Consider equipment sharing to reduce costs".to_string(),
        "Plan for potential budget cuts (10-15% contingency)".to_string(),
    ]);
    recommendations
}
