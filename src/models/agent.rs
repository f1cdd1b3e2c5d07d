use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies the agent (or derived operation) that produced a version.
///
/// The set is closed for dispatch purposes, but values read back from storage
/// that this build does not recognise are preserved as [`AgentKind::Other`] so
/// that older binaries can still load histories written by newer ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentKind {
    OutlineDesigner,
    BudgetEstimator,
    ReviewerSimulation,
    Refine,
    BudgetAdjust,
    PanelSummary,
    Other(String),
}

impl AgentKind {
    /// Kinds that have a registered invocation behaviour.
    pub const ALL: [AgentKind; 6] = [
        AgentKind::OutlineDesigner,
        AgentKind::BudgetEstimator,
        AgentKind::ReviewerSimulation,
        AgentKind::Refine,
        AgentKind::BudgetAdjust,
        AgentKind::PanelSummary,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::OutlineDesigner => "OutlineDesigner",
            Self::BudgetEstimator => "BudgetEstimator",
            Self::ReviewerSimulation => "ReviewerSimulation",
            Self::Refine => "Refine",
            Self::BudgetAdjust => "BudgetAdjust",
            Self::PanelSummary => "PanelSummary",
            Self::Other(name) => name,
        }
    }

    /// Parse a known kind, accepting the short request aliases
    /// (`outline`, `budget`, `review`) and the legacy `*Agent` class names.
    pub fn known(s: &str) -> Option<Self> {
        match s {
            "OutlineDesigner" | "OutlineDesignerAgent" | "outline" => Some(Self::OutlineDesigner),
            "BudgetEstimator" | "BudgetEstimatorAgent" | "budget" => Some(Self::BudgetEstimator),
            "ReviewerSimulation" | "ReviewerSimulationAgent" | "review" => {
                Some(Self::ReviewerSimulation)
            }
            "Refine" => Some(Self::Refine),
            "BudgetAdjust" => Some(Self::BudgetAdjust),
            "PanelSummary" => Some(Self::PanelSummary),
            _ => None,
        }
    }

    /// Whether a version of this kind can be the target of a refine operation.
    pub fn is_refinable(&self) -> bool {
        matches!(
            self,
            Self::OutlineDesigner | Self::BudgetEstimator | Self::ReviewerSimulation
        )
    }
}

impl From<String> for AgentKind {
    fn from(s: String) -> Self {
        Self::known(&s).unwrap_or(Self::Other(s))
    }
}

impl From<&str> for AgentKind {
    fn from(s: &str) -> Self {
        Self::known(s).unwrap_or_else(|| Self::Other(s.to_string()))
    }
}

impl From<AgentKind> for String {
    fn from(kind: AgentKind) -> Self {
        match kind {
            AgentKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A simulated reviewer on the grant panel.
///
/// Each perspective produces one independent review per review run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerPerspective {
    TechnicalExpert,
    MethodologySpecialist,
    BudgetAnalyst,
    ImpactAssessor,
    ProgramOfficer,
}

impl ReviewerPerspective {
    /// The full panel, used when a review request does not select perspectives.
    pub const PANEL: [ReviewerPerspective; 5] = [
        ReviewerPerspective::TechnicalExpert,
        ReviewerPerspective::MethodologySpecialist,
        ReviewerPerspective::BudgetAnalyst,
        ReviewerPerspective::ImpactAssessor,
        ReviewerPerspective::ProgramOfficer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechnicalExpert => "technical_expert",
            Self::MethodologySpecialist => "methodology_specialist",
            Self::BudgetAnalyst => "budget_analyst",
            Self::ImpactAssessor => "impact_assessor",
            Self::ProgramOfficer => "program_officer",
        }
    }

    /// Human-readable title used in prompts and review output.
    pub fn title(&self) -> &'static str {
        match self {
            Self::TechnicalExpert => "Technical Expert",
            Self::MethodologySpecialist => "Methodology Specialist",
            Self::BudgetAnalyst => "Budget Analyst",
            Self::ImpactAssessor => "Impact Assessor",
            Self::ProgramOfficer => "Program Officer",
        }
    }

    /// What this reviewer pays most attention to.
    pub fn focus(&self) -> &'static str {
        match self {
            Self::TechnicalExpert => "methodology, feasibility, technical soundness",
            Self::MethodologySpecialist => "research design, data analysis, validity",
            Self::BudgetAnalyst => "cost-effectiveness, budget justification, resource allocation",
            Self::ImpactAssessor => "significance, broader impacts, societal benefits",
            Self::ProgramOfficer => "alignment with agency priorities, strategic value",
        }
    }
}
