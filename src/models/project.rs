use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentKind, NewVersion, VersionRecord};

/// All work done on one grant proposal.
///
/// Projects are created implicitly by the first version appended under a new
/// topic and only ever grow afterwards. The derived fields (`agents_used`,
/// `created_at`, `last_updated`) are recomputed from `versions` on every append
/// and whenever a project is loaded from storage.
///
/// # Invariants
/// - `versions` is never empty and is numbered `1..=n` in creation order.
/// - `created_at <= last_updated`, and `last_updated` is the last version's timestamp.
/// - `agents_used` is exactly the set of distinct `agent` values in `versions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Case-sensitive, non-empty identity of the proposal.
    pub topic: String,
    pub versions: Vec<VersionRecord>,
    #[serde(default)]
    pub agents_used: BTreeSet<AgentKind>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Project {
    /// Start a project whose first version is built from `new`.
    pub(crate) fn start(topic: &str, new: NewVersion, now: DateTime<Utc>) -> Self {
        let first = VersionRecord {
            version: 1,
            agent: new.agent,
            timestamp: now,
            output: new.output,
            rationale: new.rationale,
            input_context: new.input_context,
        };
        let mut project = Self {
            topic: topic.to_string(),
            versions: vec![first],
            agents_used: BTreeSet::new(),
            created_at: now,
            last_updated: now,
        };
        project.refresh_derived();
        project
    }

    /// Append `new` as the next version.
    ///
    /// The timestamp is clamped so it never goes backwards relative to the
    /// previous version, even if the wall clock does.
    pub(crate) fn append(&mut self, new: NewVersion, now: DateTime<Utc>) -> &VersionRecord {
        let (next, floor) = match self.versions.last() {
            Some(last) => (last.version + 1, last.timestamp),
            None => (1, now),
        };
        self.versions.push(VersionRecord {
            version: next,
            agent: new.agent,
            timestamp: now.max(floor),
            output: new.output,
            rationale: new.rationale,
            input_context: new.input_context,
        });
        self.refresh_derived();
        &self.versions[self.versions.len() - 1]
    }

    /// Recompute `agents_used`, `created_at` and `last_updated` from `versions`.
    pub(crate) fn refresh_derived(&mut self) {
        self.agents_used = self.versions.iter().map(|v| v.agent.clone()).collect();
        if let Some(first) = self.versions.first() {
            self.created_at = first.timestamp;
        }
        if let Some(last) = self.versions.last() {
            self.last_updated = last.timestamp;
        }
    }

    pub fn latest(&self) -> Option<&VersionRecord> {
        self.versions.last()
    }

    /// The highest-numbered version produced by `kind`.
    pub fn latest_of(&self, kind: &AgentKind) -> Option<&VersionRecord> {
        self.versions.iter().rev().find(|v| &v.agent == kind)
    }

    /// All versions produced by `kind`, oldest first.
    pub fn versions_of<'a>(
        &'a self,
        kind: &'a AgentKind,
    ) -> impl Iterator<Item = &'a VersionRecord> + 'a {
        self.versions.iter().filter(move |v| &v.agent == kind)
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            topic: self.topic.clone(),
            created_at: self.created_at,
            last_updated: self.last_updated,
            versions: self.versions.len(),
            agents_used: self.agents_used.clone(),
            latest_version: self.latest().cloned(),
        }
    }
}

/// Compact view of a project, used for overview listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Number of versions in the history.
    pub versions: usize,
    pub agents_used: BTreeSet<AgentKind>,
    pub latest_version: Option<VersionRecord>,
}
