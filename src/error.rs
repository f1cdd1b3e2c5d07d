//! Error types surfaced by orchestrator operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::AgentError;
use crate::models::AgentKind;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single orchestrator operation.
///
/// Every variant maps to one [`ErrorKind`] so callers can tell retryable
/// failures (the model call) apart from ones that need different input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Topic not found: {0}")]
    NotFound(String),

    #[error("No prior {agent} version for topic '{topic}'")]
    NoPriorVersion { topic: String, agent: AgentKind },

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Malformed model output: {reason}")]
    MalformedOutput { reason: String, raw: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Store write failed: {0}")]
    StoreIo(String),
}

/// Coarse classification of [`Error`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    NoPriorVersion,
    GenerationFailure,
    MalformedOutput,
    ValidationError,
    StoreIoFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NoPriorVersion => "no_prior_version",
            Self::GenerationFailure => "generation_failure",
            Self::MalformedOutput => "malformed_output",
            Self::ValidationError => "validation_error",
            Self::StoreIoFailure => "store_io_failure",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NoPriorVersion { .. } => ErrorKind::NoPriorVersion,
            Self::GenerationFailure(_) => ErrorKind::GenerationFailure,
            Self::MalformedOutput { .. } => ErrorKind::MalformedOutput,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::StoreIo(_) => ErrorKind::StoreIoFailure,
        }
    }

    /// Whether repeating the same operation unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationFailure(_))
    }

    /// The raw model response, for malformed-output diagnostics.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<AgentError> for Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Generation(e) if e.is_transient() => {
                Error::GenerationFailure(e.to_string())
            }
            AgentError::Generation(e) => Error::MalformedOutput {
                reason: e.to_string(),
                raw: e.raw().to_string(),
            },
            AgentError::Malformed { reason, raw } => Error::MalformedOutput { reason, raw },
            AgentError::UnsupportedInputs { agent } => {
                Error::Validation(format!("Agent {} cannot handle these inputs", agent))
            }
            AgentError::Unregistered(agent) => {
                Error::Validation(format!("No agent registered for {}", agent))
            }
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(topic) => Error::NotFound(topic),
            StoreError::VersionNotFound { topic, agent } => Error::NoPriorVersion { topic, agent },
            StoreError::Stale { topic } => Error::NotFound(topic),
            StoreError::Io(msg) => Error::StoreIo(msg),
            StoreError::Serialization(msg) => Error::StoreIo(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::GenerationError;

    #[test]
    fn only_generation_failures_are_retryable() {
        let transient: Error =
            AgentError::Generation(GenerationError::Transport("reset".into())).into();
        assert_eq!(transient.kind(), ErrorKind::GenerationFailure);
        assert!(transient.is_retryable());

        let malformed: Error = AgentError::Malformed {
            reason: "empty".into(),
            raw: "".into(),
        }
        .into();
        assert!(!malformed.is_retryable());
        assert_eq!(malformed.raw_response(), Some(""));
    }

    fn api_error(status: u16) -> Error {
        AgentError::Generation(GenerationError::Api {
            status,
            message: format!("status {}", status),
        })
        .into()
    }

    #[test]
    fn timeouts_rate_limits_and_server_errors_are_retryable() {
        let timeout: Error = AgentError::Generation(GenerationError::Timeout).into();
        assert!(timeout.is_retryable());

        for status in [429, 500, 503] {
            let err = api_error(status);
            assert_eq!(
                err.kind(),
                ErrorKind::GenerationFailure,
                "status {}",
                status
            );
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn rejected_requests_are_not_retryable() {
        for status in [400, 401, 403, 404] {
            let err = api_error(status);
            assert_eq!(err.kind(), ErrorKind::MalformedOutput, "status {}", status);
            assert!(!err.is_retryable());
            assert_eq!(
                err.raw_response(),
                Some(format!("status {}", status).as_str())
            );
        }
    }

    #[test]
    fn blocked_prompts_are_not_retryable() {
        let err: Error = AgentError::Generation(GenerationError::InvalidResponse(
            "prompt blocked: SAFETY".into(),
        ))
        .into();

        assert_eq!(err.kind(), ErrorKind::MalformedOutput);
        assert!(!err.is_retryable());
        assert_eq!(err.raw_response(), Some("prompt blocked: SAFETY"));
    }

    #[test]
    fn store_errors_map_to_caller_taxonomy() {
        let err: Error = StoreError::NotFound("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: Error = StoreError::Io("disk full".into()).into();
        assert_eq!(err.kind(), ErrorKind::StoreIoFailure);

        let err: Error = StoreError::VersionNotFound {
            topic: "x".into(),
            agent: AgentKind::BudgetEstimator,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NoPriorVersion);
    }
}
