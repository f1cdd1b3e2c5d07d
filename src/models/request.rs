use serde::{Deserialize, Serialize};

use super::{AgentKind, ReviewerPerspective};

pub const DEFAULT_DURATION: &str = "3 years";
pub const DEFAULT_TEAM_SIZE: &str = "medium (3-5 people)";
pub const DEFAULT_PROJECT_TYPE: &str = "research";

/// Input for generating a proposal outline. Starts a project if the topic is new.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineRequest {
    pub topic: String,
    pub goals: String,
    pub funding_agency: String,
    /// Defaults to [`DEFAULT_DURATION`].
    #[serde(default)]
    pub duration: Option<String>,
    /// Defaults to [`DEFAULT_TEAM_SIZE`].
    #[serde(default)]
    pub team_size: Option<String>,
    /// Defaults to [`DEFAULT_PROJECT_TYPE`].
    #[serde(default)]
    pub project_type: Option<String>,
}

impl OutlineRequest {
    pub fn new(
        topic: impl Into<String>,
        goals: impl Into<String>,
        funding_agency: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            goals: goals.into(),
            funding_agency: funding_agency.into(),
            duration: None,
            team_size: None,
            project_type: None,
        }
    }
}

/// Input for generating a budget.
///
/// Only `topic` is required. Missing descriptive fields are taken from the
/// latest outline's request when one exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub topic: String,
    /// Total the budget should aim for, in USD.
    #[serde(default)]
    pub target_amount: Option<f64>,
    #[serde(default)]
    pub goals: Option<String>,
    #[serde(default)]
    pub funding_agency: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub team_size: Option<String>,
    #[serde(default)]
    pub project_type: Option<String>,
}

impl BudgetRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }
}

/// Input for simulating a review panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub topic: String,
    /// Reviewers to simulate. `None` means the full panel.
    #[serde(default)]
    pub perspectives: Option<Vec<ReviewerPerspective>>,
}

impl ReviewRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            perspectives: None,
        }
    }
}

/// Input for running outline, budget and review in sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    #[serde(flatten)]
    pub outline: OutlineRequest,
    #[serde(default)]
    pub target_amount: Option<f64>,
    #[serde(default)]
    pub perspectives: Option<Vec<ReviewerPerspective>>,
}

/// Input for refining the latest version of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineRequest {
    pub topic: String,
    /// Which artifact to refine: `outline`, `budget`, `review` or a full kind name.
    pub agent_type: AgentKind,
    pub feedback: String,
}

/// Input for adjusting the latest budget to a target total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustBudgetRequest {
    pub topic: String,
    pub target_amount: f64,
    #[serde(default)]
    pub constraints: Option<String>,
}
