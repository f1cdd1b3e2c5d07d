use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};
use crate::models::*;
use crate::orchestrator::{CompleteOutcome, Orchestrator};

// ============================================================
// Error Handling
// ============================================================

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ErrorBody {
    fn from_error(e: &Error) -> Self {
        // Storage failures are logged in full but not echoed to clients.
        let message = match e {
            Error::StoreIo(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };
        Self {
            kind: e.kind(),
            message,
            retryable: e.is_retryable(),
            raw: e.raw_response().map(str::to_string),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<T, ApiError>;

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NoPriorVersion => StatusCode::CONFLICT,
        ErrorKind::GenerationFailure | ErrorKind::MalformedOutput => StatusCode::BAD_GATEWAY,
        ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
        ErrorKind::StoreIoFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: Error) -> ApiError {
    let status = status_for(e.kind());
    if status.is_server_error() {
        tracing::error!("Request failed: {}", e);
    } else {
        tracing::warn!("Request rejected: {}", e);
    }
    (status, Json(ErrorBody::from_error(&e)))
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(orchestrator): State<Orchestrator>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "agents_available": orchestrator.agent_kinds(),
    }))
}

// ============================================================
// Generation
// ============================================================

pub async fn generate_outline(
    State(orchestrator): State<Orchestrator>,
    Json(input): Json<OutlineRequest>,
) -> ApiResult<Json<Project>> {
    orchestrator
        .generate_outline(input)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn generate_budget(
    State(orchestrator): State<Orchestrator>,
    Json(input): Json<BudgetRequest>,
) -> ApiResult<Json<Project>> {
    orchestrator
        .generate_budget(input)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn simulate_review(
    State(orchestrator): State<Orchestrator>,
    Json(input): Json<ReviewRequest>,
) -> ApiResult<Json<Project>> {
    orchestrator
        .simulate_review(input)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Response of `POST /complete`. `failure` is set when a later step failed.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub project: Project,
    pub completed: Vec<AgentKind>,
    pub failure: Option<StepFailureBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepFailureBody {
    pub agent: AgentKind,
    #[serde(flatten)]
    pub error: ErrorBody,
}

impl From<CompleteOutcome> for CompleteResponse {
    fn from(outcome: CompleteOutcome) -> Self {
        Self {
            project: outcome.project,
            completed: outcome.completed,
            failure: outcome.failure.map(|f| StepFailureBody {
                agent: f.agent,
                error: ErrorBody::from_error(&f.error),
            }),
        }
    }
}

pub async fn generate_complete(
    State(orchestrator): State<Orchestrator>,
    Json(input): Json<CompleteRequest>,
) -> ApiResult<Json<CompleteResponse>> {
    orchestrator
        .generate_complete(input)
        .await
        .map(|outcome| Json(outcome.into()))
        .map_err(api_error)
}

// ============================================================
// Derived versions
// ============================================================

pub async fn refine(
    State(orchestrator): State<Orchestrator>,
    Json(input): Json<RefineRequest>,
) -> ApiResult<Json<Project>> {
    orchestrator
        .refine(input)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn adjust_budget(
    State(orchestrator): State<Orchestrator>,
    Json(input): Json<AdjustBudgetRequest>,
) -> ApiResult<Json<Project>> {
    orchestrator
        .adjust_budget(input)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn generate_panel_summary(
    State(orchestrator): State<Orchestrator>,
    Path(topic): Path<String>,
) -> ApiResult<Json<Project>> {
    orchestrator
        .generate_panel_summary(&topic)
        .await
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Topics
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicList {
    pub topics: Vec<String>,
}

pub async fn list_topics(State(orchestrator): State<Orchestrator>) -> Json<TopicList> {
    Json(TopicList {
        topics: orchestrator.list_topics(),
    })
}

pub async fn get_project(
    State(orchestrator): State<Orchestrator>,
    Path(topic): Path<String>,
) -> ApiResult<Json<Project>> {
    orchestrator
        .get_project(&topic)
        .map(Json)
        .map_err(api_error)
}

pub async fn topic_summary(
    State(orchestrator): State<Orchestrator>,
    Path(topic): Path<String>,
) -> ApiResult<Json<ProjectSummary>> {
    orchestrator
        .topic_summary(&topic)
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_topic(
    State(orchestrator): State<Orchestrator>,
    Path(topic): Path<String>,
) -> ApiResult<StatusCode> {
    orchestrator
        .delete_topic(&topic)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(api_error)
}
