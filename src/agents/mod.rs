//! Agents that turn proposal inputs into versioned artifacts.
//!
//! An [`Agent`] builds one or more prompts, sends them through a
//! [`TextGenerator`] and maps the model's text into a structured
//! [`AgentOutput`]. Agents never touch the store; the orchestrator decides what
//! gets recorded.

mod adjust;
mod budget;
pub mod fakes;
mod gemini;
mod outline;
mod panel;
mod refine;
mod review;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{AgentKind, ReviewerPerspective, VersionRecord};

pub use adjust::BudgetAdjustAgent;
pub use budget::BudgetEstimatorAgent;
pub use gemini::GeminiClient;
pub use outline::OutlineDesignerAgent;
pub use panel::PanelSummaryAgent;
pub use refine::RefineAgent;
pub use review::ReviewerSimulationAgent;

pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Failure of the underlying text model.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Model request timed out")]
    Timeout,

    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Model API response could not be read: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Whether the same request may succeed later: network trouble, timeouts,
    /// rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }

    /// What the model API actually answered, when there was an answer.
    pub fn raw(&self) -> &str {
        match self {
            Self::Api { message, .. } => message,
            Self::InvalidResponse(body) => body,
            Self::Transport(_) | Self::Timeout => "",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The model answered but the answer does not fit the agent's schema.
    #[error("Malformed response: {reason}")]
    Malformed { reason: String, raw: String },

    #[error("Agent {agent} cannot handle these inputs")]
    UnsupportedInputs { agent: AgentKind },

    #[error("No agent registered for {0}")]
    Unregistered(AgentKind),
}

impl AgentError {
    pub(crate) fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// A generative text model, reduced to prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// What an agent produced: the payload to record and why.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub output: Value,
    pub rationale: String,
}

#[derive(Debug, Clone)]
pub struct OutlineInputs {
    pub topic: String,
    pub goals: String,
    pub funding_agency: String,
    pub duration: String,
    pub team_size: String,
    pub project_type: String,
}

#[derive(Debug, Clone)]
pub struct BudgetInputs {
    pub topic: String,
    pub goals: Option<String>,
    pub funding_agency: Option<String>,
    pub duration: String,
    pub team_size: String,
    pub project_type: String,
    pub target_amount: Option<f64>,
    /// Output of the outline the budget should follow, if any.
    pub outline: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ReviewInputs {
    pub topic: String,
    pub goals: Option<String>,
    pub funding_agency: Option<String>,
    pub outline: Option<Value>,
    pub budget: Option<Value>,
    /// Never empty; one model call per entry.
    pub perspectives: Vec<ReviewerPerspective>,
}

#[derive(Debug, Clone)]
pub struct RefineInputs {
    pub topic: String,
    pub target: VersionRecord,
    pub feedback: String,
}

#[derive(Debug, Clone)]
pub struct AdjustInputs {
    pub topic: String,
    pub budget: VersionRecord,
    pub target_amount: f64,
    pub constraints: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PanelInputs {
    pub topic: String,
    /// Review versions to summarize, oldest first. Never empty.
    pub reviews: Vec<VersionRecord>,
}

/// Typed inputs, one variant per agent kind.
#[derive(Debug, Clone)]
pub enum AgentInputs {
    Outline(OutlineInputs),
    Budget(BudgetInputs),
    Review(ReviewInputs),
    Refine(RefineInputs),
    BudgetAdjust(AdjustInputs),
    PanelSummary(PanelInputs),
}

impl AgentInputs {
    /// The agent kind these inputs are dispatched to.
    pub fn kind(&self) -> AgentKind {
        match self {
            Self::Outline(_) => AgentKind::OutlineDesigner,
            Self::Budget(_) => AgentKind::BudgetEstimator,
            Self::Review(_) => AgentKind::ReviewerSimulation,
            Self::Refine(_) => AgentKind::Refine,
            Self::BudgetAdjust(_) => AgentKind::BudgetAdjust,
            Self::PanelSummary(_) => AgentKind::PanelSummary,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Self::Outline(i) => &i.topic,
            Self::Budget(i) => &i.topic,
            Self::Review(i) => &i.topic,
            Self::Refine(i) => &i.topic,
            Self::BudgetAdjust(i) => &i.topic,
            Self::PanelSummary(i) => &i.topic,
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    async fn invoke(
        &self,
        generator: &dyn TextGenerator,
        inputs: &AgentInputs,
    ) -> AgentResult<AgentOutput>;
}

/// Lookup table from agent kind to implementation, sharing one generator.
pub struct AgentRegistry {
    generator: Arc<dyn TextGenerator>,
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// A registry with every built-in agent registered.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        let mut registry = Self::empty(generator);
        registry.register(Arc::new(OutlineDesignerAgent));
        registry.register(Arc::new(BudgetEstimatorAgent));
        registry.register(Arc::new(ReviewerSimulationAgent));
        registry.register(Arc::new(RefineAgent));
        registry.register(Arc::new(BudgetAdjustAgent));
        registry.register(Arc::new(PanelSummaryAgent));
        registry
    }

    pub fn empty(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            agents: HashMap::new(),
        }
    }

    /// Register `agent`, replacing any agent previously registered for its kind.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind(), agent);
    }

    /// Registered kinds, in canonical order.
    pub fn kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.agents.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Dispatch `inputs` to the agent registered for their kind.
    ///
    /// Every call reaches the model; nothing is cached.
    pub async fn invoke(&self, inputs: &AgentInputs) -> AgentResult<AgentOutput> {
        let kind = inputs.kind();
        let agent = self
            .agents
            .get(&kind)
            .ok_or_else(|| AgentError::Unregistered(kind.clone()))?;

        tracing::debug!("Invoking {} for topic '{}'", kind, inputs.topic());
        agent.invoke(self.generator.as_ref(), inputs).await
    }
}

/// Pretty JSON for embedding prior artifacts in prompts.
pub(crate) fn render_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// First `max` characters of `text`, with an ellipsis when truncated.
pub(crate) fn excerpt(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Reject blank model responses.
pub(crate) fn require_text(response: String, what: &str) -> AgentResult<String> {
    if response.trim().is_empty() {
        return Err(AgentError::malformed(format!("empty {} response", what), response));
    }
    Ok(response)
}
