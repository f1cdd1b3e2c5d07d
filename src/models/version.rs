use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AgentKind;

/// One immutable artifact in a project's history.
///
/// Versions are never edited in place. A correction, refinement or adjustment
/// is always a new version with a higher number, and `input_context` points
/// back at the version(s) it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Position in the project history, starting at 1.
    pub version: u32,
    pub agent: AgentKind,
    pub timestamp: DateTime<Utc>,
    /// Agent-specific payload. The store treats it as opaque JSON.
    pub output: Value,
    /// Why this version exists (what changed and why).
    pub rationale: String,
    /// Request parameters and prior-version references that produced `output`.
    #[serde(default)]
    pub input_context: Value,
}

/// Input for appending a version. The store assigns `version` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVersion {
    pub agent: AgentKind,
    pub output: Value,
    pub rationale: String,
    pub input_context: Value,
}

impl NewVersion {
    pub fn new(agent: AgentKind, output: Value, rationale: impl Into<String>) -> Self {
        Self {
            agent,
            output,
            rationale: rationale.into(),
            input_context: Value::Object(Default::default()),
        }
    }

    pub fn with_context(mut self, input_context: Value) -> Self {
        self.input_context = input_context;
        self
    }
}
