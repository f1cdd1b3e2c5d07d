//! Proposal operations: run an agent, then record what it produced.
//!
//! Every operation validates its request before any model call or store
//! mutation. Model calls happen without holding any store lock; the store
//! only serializes the final append.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::agents::{
    AdjustInputs, AgentInputs, AgentOutput, AgentRegistry, BudgetInputs, OutlineInputs,
    PanelInputs, RefineInputs, ReviewInputs,
};
use crate::error::{Error, Result};
use crate::models::{
    AdjustBudgetRequest, AgentKind, BudgetRequest, CompleteRequest, NewVersion, OutlineRequest,
    Project, ProjectSummary, RefineRequest, ReviewRequest, ReviewerPerspective, VersionRecord,
    DEFAULT_DURATION, DEFAULT_PROJECT_TYPE, DEFAULT_TEAM_SIZE,
};
use crate::store::{Store, StoreError};

/// Result of [`Orchestrator::generate_complete`].
///
/// The outline step always succeeded if this value exists. Later steps that
/// did succeed stay recorded even when a subsequent one failed.
#[derive(Debug)]
pub struct CompleteOutcome {
    pub project: Project,
    pub completed: Vec<AgentKind>,
    pub failure: Option<StepFailure>,
}

#[derive(Debug)]
pub struct StepFailure {
    pub agent: AgentKind,
    pub error: Error,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Store,
    agents: Arc<AgentRegistry>,
}

/// Log bracket for one operation.
struct Operation {
    id: Uuid,
    name: &'static str,
    topic: String,
}

impl Operation {
    fn start(name: &'static str, topic: &str) -> Self {
        let op = Self {
            id: Uuid::new_v4(),
            name,
            topic: topic.to_string(),
        };
        tracing::info!("{} started", op);
        op
    }

    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => tracing::info!("{} finished", self),
            Err(e) if e.is_retryable() => tracing::warn!("{} failed: {}", self, e),
            Err(e) => tracing::info!("{} rejected: {}", self, e),
        }
        result
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} '{}'", self.id, self.name, self.topic)
    }
}

impl Orchestrator {
    pub fn new(store: Store, agents: AgentRegistry) -> Self {
        Self {
            store,
            agents: Arc::new(agents),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Agent kinds this orchestrator can dispatch to.
    pub fn agent_kinds(&self) -> Vec<AgentKind> {
        self.agents.kinds()
    }

    // ============================================================
    // Generate
    // ============================================================

    pub async fn generate_outline(&self, request: OutlineRequest) -> Result<Project> {
        let op = Operation::start("generate_outline", &request.topic);
        let result = self.outline_step(&request).await;
        op.finish(result)
    }

    pub async fn generate_budget(&self, request: BudgetRequest) -> Result<Project> {
        let op = Operation::start("generate_budget", &request.topic);
        let result: Result<Project> = async {
            validate_budget(&request)?;
            let outline = self.latest_if_any(&request.topic, &AgentKind::OutlineDesigner);
            self.budget_step(&request, outline.as_ref(), None).await
        }
        .await;
        op.finish(result)
    }

    pub async fn simulate_review(&self, request: ReviewRequest) -> Result<Project> {
        let op = Operation::start("simulate_review", &request.topic);
        let result: Result<Project> = async {
            let perspectives = validate_review(&request)?;
            let outline = self.latest_if_any(&request.topic, &AgentKind::OutlineDesigner);
            let budget = self.latest_if_any(&request.topic, &AgentKind::BudgetEstimator);
            self.review_step(
                &request.topic,
                perspectives,
                outline.as_ref(),
                budget.as_ref(),
                None,
            )
            .await
        }
        .await;
        op.finish(result)
    }

    /// Outline, then budget from that outline, then review of both.
    ///
    /// Fails outright only if the outline step fails. A later failure is
    /// reported in [`CompleteOutcome::failure`] with the earlier versions kept.
    pub async fn generate_complete(&self, request: CompleteRequest) -> Result<CompleteOutcome> {
        let op = Operation::start("generate_complete", &request.outline.topic);

        let budget_request = BudgetRequest {
            topic: request.outline.topic.clone(),
            target_amount: request.target_amount,
            goals: Some(request.outline.goals.clone()),
            funding_agency: Some(request.outline.funding_agency.clone()),
            duration: request.outline.duration.clone(),
            team_size: request.outline.team_size.clone(),
            project_type: request.outline.project_type.clone(),
        };
        let review_request = ReviewRequest {
            topic: request.outline.topic.clone(),
            perspectives: request.perspectives.clone(),
        };

        let validated = validate_outline(&request.outline)
            .and_then(|_| validate_budget(&budget_request))
            .and_then(|_| validate_review(&review_request));
        let perspectives = match validated {
            Ok(perspectives) => perspectives,
            Err(e) => return op.finish(Err(e)),
        };

        let mut project = match self.outline_step(&request.outline).await {
            Ok(project) => project,
            Err(e) => return op.finish(Err(e)),
        };
        let mut completed = vec![AgentKind::OutlineDesigner];
        let outline = project.latest().cloned();

        // Later steps append only to the incarnation the outline step created
        // or extended, so a concurrent delete is not undone.
        let budget_result = self
            .budget_step(&budget_request, outline.as_ref(), Some(&project))
            .await;
        let budget = match budget_result {
            Ok(updated) => {
                project = updated;
                completed.push(AgentKind::BudgetEstimator);
                project.latest().cloned()
            }
            Err(error) => {
                let agent = AgentKind::BudgetEstimator;
                return Ok(partial(&op, project, completed, agent, error));
            }
        };

        let review_result = self
            .review_step(
                &review_request.topic,
                perspectives,
                outline.as_ref(),
                budget.as_ref(),
                Some(&project),
            )
            .await;
        match review_result {
            Ok(updated) => {
                project = updated;
                completed.push(AgentKind::ReviewerSimulation);
            }
            Err(error) => {
                let agent = AgentKind::ReviewerSimulation;
                return Ok(partial(&op, project, completed, agent, error));
            }
        }

        tracing::info!("{} finished", op);
        Ok(CompleteOutcome {
            project,
            completed,
            failure: None,
        })
    }

    async fn outline_step(&self, request: &OutlineRequest) -> Result<Project> {
        validate_outline(request)?;

        let inputs = OutlineInputs {
            topic: request.topic.clone(),
            goals: request.goals.clone(),
            funding_agency: request.funding_agency.clone(),
            duration: or_default(&request.duration, DEFAULT_DURATION),
            team_size: or_default(&request.team_size, DEFAULT_TEAM_SIZE),
            project_type: or_default(&request.project_type, DEFAULT_PROJECT_TYPE),
        };
        let context = json!({
            "topic": inputs.topic,
            "goals": inputs.goals,
            "funding_agency": inputs.funding_agency,
            "duration": inputs.duration,
            "team_size": inputs.team_size,
            "project_type": inputs.project_type,
        });

        let output = self.agents.invoke(&AgentInputs::Outline(inputs)).await?;
        self.record(&request.topic, AgentKind::OutlineDesigner, output, context)
            .await
    }

    async fn budget_step(
        &self,
        request: &BudgetRequest,
        outline: Option<&VersionRecord>,
        within: Option<&Project>,
    ) -> Result<Project> {
        // Descriptive fields fall back to what the outline was generated with.
        let inherited = |own: &Option<String>, key: &str| -> Option<String> {
            non_blank(own).or_else(|| outline.and_then(|o| context_str(o, key)))
        };

        let inputs = BudgetInputs {
            topic: request.topic.clone(),
            goals: inherited(&request.goals, "goals"),
            funding_agency: inherited(&request.funding_agency, "funding_agency"),
            duration: inherited(&request.duration, "duration")
                .unwrap_or_else(|| DEFAULT_DURATION.to_string()),
            team_size: inherited(&request.team_size, "team_size")
                .unwrap_or_else(|| DEFAULT_TEAM_SIZE.to_string()),
            project_type: inherited(&request.project_type, "project_type")
                .unwrap_or_else(|| DEFAULT_PROJECT_TYPE.to_string()),
            target_amount: request.target_amount,
            outline: outline.map(|o| o.output.clone()),
        };

        let mut context = Map::new();
        context.insert("topic".into(), json!(inputs.topic));
        context.insert("goals".into(), json!(inputs.goals));
        context.insert("funding_agency".into(), json!(inputs.funding_agency));
        context.insert("duration".into(), json!(inputs.duration));
        context.insert("team_size".into(), json!(inputs.team_size));
        context.insert("project_type".into(), json!(inputs.project_type));
        if let Some(target) = inputs.target_amount {
            context.insert("target_amount".into(), json!(target));
        }
        if let Some(outline) = outline {
            context.insert("outline_version".into(), json!(outline.version));
        }

        let output = self.agents.invoke(&AgentInputs::Budget(inputs)).await?;
        self.record_step(
            &request.topic,
            within,
            AgentKind::BudgetEstimator,
            output,
            Value::Object(context),
        )
        .await
    }

    async fn review_step(
        &self,
        topic: &str,
        perspectives: Vec<ReviewerPerspective>,
        outline: Option<&VersionRecord>,
        budget: Option<&VersionRecord>,
        within: Option<&Project>,
    ) -> Result<Project> {
        let from_context = |key: &str| {
            outline
                .and_then(|o| context_str(o, key))
                .or_else(|| budget.and_then(|b| context_str(b, key)))
        };

        let mut context = Map::new();
        context.insert("topic".into(), json!(topic));
        context.insert(
            "perspectives".into(),
            json!(perspectives.iter().map(|p| p.as_str()).collect::<Vec<_>>()),
        );
        if let Some(outline) = outline {
            context.insert("outline_version".into(), json!(outline.version));
        }
        if let Some(budget) = budget {
            context.insert("budget_version".into(), json!(budget.version));
        }

        let inputs = ReviewInputs {
            topic: topic.to_string(),
            goals: from_context("goals"),
            funding_agency: from_context("funding_agency"),
            outline: outline.map(|o| o.output.clone()),
            budget: budget.map(|b| b.output.clone()),
            perspectives,
        };

        let output = self.agents.invoke(&AgentInputs::Review(inputs)).await?;
        self.record_step(
            topic,
            within,
            AgentKind::ReviewerSimulation,
            output,
            Value::Object(context),
        )
        .await
    }

    // ============================================================
    // Derived operations
    // ============================================================

    /// Rework the latest outline, budget or review according to `feedback`.
    ///
    /// The new version is tagged with the refined artifact's own kind, so it
    /// becomes the latest of that kind.
    pub async fn refine(&self, request: RefineRequest) -> Result<Project> {
        let op = Operation::start("refine", &request.topic);
        let result: Result<Project> = async {
            validate_topic(&request.topic)?;
            if !request.agent_type.is_refinable() {
                return Err(Error::validation(format!(
                    "Cannot refine {}; expected one of outline, budget, review",
                    request.agent_type
                )));
            }
            require_field("feedback", &request.feedback)?;

            let project = self.store.get(&request.topic)?;
            let target = project
                .latest_of(&request.agent_type)
                .cloned()
                .ok_or_else(|| Error::NoPriorVersion {
                    topic: request.topic.clone(),
                    agent: request.agent_type.clone(),
                })?;

            // The refinement becomes the latest of its kind, so it carries the
            // request fields later steps inherit from that kind.
            let mut context = match &target.input_context {
                Value::Object(fields) => fields.clone(),
                _ => Map::new(),
            };
            context.insert("topic".into(), json!(request.topic));
            context.insert("agent_type".into(), json!(request.agent_type));
            context.insert("refines_version".into(), json!(target.version));
            context.insert("feedback".into(), json!(request.feedback));
            let context = Value::Object(context);
            let output = self
                .agents
                .invoke(&AgentInputs::Refine(RefineInputs {
                    topic: request.topic.clone(),
                    target,
                    feedback: request.feedback.clone(),
                }))
                .await?;

            self.record_derived(
                &project,
                &request.agent_type,
                request.agent_type.clone(),
                output,
                context,
            )
            .await
        }
        .await;
        op.finish(result)
    }

    /// Rework the latest budget to meet `target_amount`.
    pub async fn adjust_budget(&self, request: AdjustBudgetRequest) -> Result<Project> {
        let op = Operation::start("adjust_budget", &request.topic);
        let result: Result<Project> = async {
            validate_topic(&request.topic)?;
            validate_amount(request.target_amount)?;

            let project = self.store.get(&request.topic)?;
            let budget = project
                .latest_of(&AgentKind::BudgetEstimator)
                .cloned()
                .ok_or_else(|| Error::NoPriorVersion {
                    topic: request.topic.clone(),
                    agent: AgentKind::BudgetEstimator,
                })?;

            let constraints = non_blank(&request.constraints);
            let context = json!({
                "topic": request.topic,
                "source_version": budget.version,
                "target_amount": request.target_amount,
                "constraints": constraints,
            });
            let output = self
                .agents
                .invoke(&AgentInputs::BudgetAdjust(AdjustInputs {
                    topic: request.topic.clone(),
                    budget,
                    target_amount: request.target_amount,
                    constraints,
                }))
                .await?;

            self.record_derived(
                &project,
                &AgentKind::BudgetEstimator,
                AgentKind::BudgetAdjust,
                output,
                context,
            )
            .await
        }
        .await;
        op.finish(result)
    }

    /// Summarize every review recorded for `topic`.
    pub async fn generate_panel_summary(&self, topic: &str) -> Result<Project> {
        let op = Operation::start("generate_panel_summary", topic);
        let result: Result<Project> = async {
            validate_topic(topic)?;

            let project = self.store.get(topic)?;
            let reviews = self
                .store
                .versions_of(topic, &AgentKind::ReviewerSimulation)?;
            if reviews.is_empty() {
                return Err(Error::NoPriorVersion {
                    topic: topic.to_string(),
                    agent: AgentKind::ReviewerSimulation,
                });
            }

            let context = json!({
                "topic": topic,
                "review_versions": reviews.iter().map(|r| r.version).collect::<Vec<_>>(),
            });
            let output = self
                .agents
                .invoke(&AgentInputs::PanelSummary(PanelInputs {
                    topic: topic.to_string(),
                    reviews,
                }))
                .await?;

            self.record_derived(
                &project,
                &AgentKind::ReviewerSimulation,
                AgentKind::PanelSummary,
                output,
                context,
            )
            .await
        }
        .await;
        op.finish(result)
    }

    // ============================================================
    // Lifecycle and reads
    // ============================================================

    /// Delete `topic` and its whole history. Irreversible.
    pub async fn delete_topic(&self, topic: &str) -> Result<()> {
        let op = Operation::start("delete_topic", topic);
        let result: Result<()> = async {
            validate_topic(topic)?;
            Ok(self.store.delete(topic).await?)
        }
        .await;
        op.finish(result)
    }

    pub fn list_topics(&self) -> Vec<String> {
        self.store.list()
    }

    pub fn get_project(&self, topic: &str) -> Result<Project> {
        Ok(self.store.get(topic)?)
    }

    pub fn topic_summary(&self, topic: &str) -> Result<ProjectSummary> {
        Ok(self.store.summary(topic)?)
    }

    // ============================================================
    // Helpers
    // ============================================================

    fn latest_if_any(&self, topic: &str, kind: &AgentKind) -> Option<VersionRecord> {
        self.store.latest_version(topic, kind).ok()
    }

    async fn record(
        &self,
        topic: &str,
        agent: AgentKind,
        output: AgentOutput,
        context: Value,
    ) -> Result<Project> {
        let new = NewVersion::new(agent, output.output, output.rationale).with_context(context);
        Ok(self.store.create_or_append(topic, new).await?)
    }

    /// Append a generated version, either freely or tied to the incarnation
    /// of `within` whose outline the step built on.
    async fn record_step(
        &self,
        topic: &str,
        within: Option<&Project>,
        agent: AgentKind,
        output: AgentOutput,
        context: Value,
    ) -> Result<Project> {
        match within {
            Some(source) => {
                self.record_derived(source, &AgentKind::OutlineDesigner, agent, output, context)
                    .await
            }
            None => self.record(topic, agent, output, context).await,
        }
    }

    /// Append to the same incarnation of the topic the source version was read from.
    ///
    /// If the topic was deleted meanwhile, the `source_kind` version the
    /// operation was derived from no longer exists.
    async fn record_derived(
        &self,
        source: &Project,
        source_kind: &AgentKind,
        agent: AgentKind,
        output: AgentOutput,
        context: Value,
    ) -> Result<Project> {
        let new =
            NewVersion::new(agent.clone(), output.output, output.rationale).with_context(context);
        match self
            .store
            .append_existing(&source.topic, source.created_at, new)
            .await
        {
            Ok(project) => Ok(project),
            Err(StoreError::Stale { topic }) => {
                tracing::warn!("Topic '{}' was deleted while {} was running", topic, agent);
                Err(Error::NoPriorVersion {
                    topic,
                    agent: source_kind.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn partial(
    op: &Operation,
    project: Project,
    completed: Vec<AgentKind>,
    agent: AgentKind,
    error: Error,
) -> CompleteOutcome {
    tracing::warn!("{} stopped at {}: {}", op, agent, error);
    CompleteOutcome {
        project,
        completed,
        failure: Some(StepFailure { agent, error }),
    }
}

// ============================================================
// Validation
// ============================================================

fn validate_topic(topic: &str) -> Result<()> {
    require_field("topic", topic)
}

fn require_field(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} must not be empty", name)));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::validation(format!(
            "target_amount must be a positive number, got {}",
            amount
        )));
    }
    Ok(())
}

fn validate_outline(request: &OutlineRequest) -> Result<()> {
    validate_topic(&request.topic)?;
    require_field("goals", &request.goals)?;
    require_field("funding_agency", &request.funding_agency)
}

fn validate_budget(request: &BudgetRequest) -> Result<()> {
    validate_topic(&request.topic)?;
    if let Some(amount) = request.target_amount {
        validate_amount(amount)?;
    }
    Ok(())
}

/// The perspectives to simulate, deduplicated in request order.
fn validate_review(request: &ReviewRequest) -> Result<Vec<ReviewerPerspective>> {
    validate_topic(&request.topic)?;
    match &request.perspectives {
        None => Ok(ReviewerPerspective::PANEL.to_vec()),
        Some(requested) if requested.is_empty() => Err(Error::validation(
            "perspectives must not be empty when given",
        )),
        Some(requested) => {
            let mut unique = Vec::with_capacity(requested.len());
            for p in requested {
                if !unique.contains(p) {
                    unique.push(*p);
                }
            }
            Ok(unique)
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn or_default(value: &Option<String>, default: &str) -> String {
    non_blank(value).unwrap_or_else(|| default.to_string())
}

fn context_str(record: &VersionRecord, key: &str) -> Option<String> {
    record
        .input_context
        .get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}
