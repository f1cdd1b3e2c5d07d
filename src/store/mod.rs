//! The project store.
//!
//! [`Store`] maps topics to [`Project`]s. Reads are served from an in-memory
//! cache; every mutation is written through the injected [`ProjectBackend`]
//! before the cache is updated and before the call returns, so a successful
//! return is durable and a failed write leaves no trace.
//!
//! Mutations on one topic are serialized by a per-topic async mutex. The lock
//! only covers the read-modify-write of a single append or delete; callers are
//! expected to do slow work (model calls) before asking the store to append.

mod json_file;
mod memory;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{AgentKind, NewVersion, Project, ProjectSummary, VersionRecord};

pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Topic not found: {0}")]
    NotFound(String),

    #[error("No {agent} version for topic '{topic}'")]
    VersionNotFound { topic: String, agent: AgentKind },

    /// The topic was deleted (or deleted and recreated) while a derived
    /// operation was running, so the version it was derived from is gone.
    #[error("Topic '{topic}' changed underneath the operation")]
    Stale { topic: String },

    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Storage serialization failed: {0}")]
    Serialization(String),
}

/// Durable storage for whole project documents.
///
/// Implementations must make `save` and `remove` durable before returning
/// `Ok`, and must leave previously stored state untouched when they fail.
pub trait ProjectBackend: Send + Sync {
    /// Load every stored project. Called once when the store opens.
    fn load_all(&self) -> StoreResult<Vec<Project>>;

    /// Insert or replace the project stored under `project.topic`.
    fn save(&self, project: &Project) -> StoreResult<()>;

    /// Remove the project stored under `topic`. Returns whether it existed.
    fn remove(&self, topic: &str) -> StoreResult<bool>;
}

/// Cloneable handle to the shared project store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn ProjectBackend>,
    cache: RwLock<BTreeMap<String, Project>>,
    // Entries are never removed, so every caller racing on a topic
    // (including across a delete) contends on the same mutex.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Store {
    /// Open a store over `backend`, loading all persisted projects into the cache.
    pub fn open(backend: Arc<dyn ProjectBackend>) -> StoreResult<Self> {
        let mut cache = BTreeMap::new();
        for mut project in backend.load_all()? {
            if project.versions.is_empty() {
                tracing::warn!("Skipping stored topic '{}' with no versions", project.topic);
                continue;
            }
            project.refresh_derived();
            cache.insert(project.topic.clone(), project);
        }

        tracing::debug!("Store opened with {} topics", cache.len());
        Ok(Self::from_parts(backend, cache))
    }

    /// A store backed by an empty [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::from_parts(Arc::new(MemoryBackend::new()), BTreeMap::new())
    }

    fn from_parts(backend: Arc<dyn ProjectBackend>, cache: BTreeMap<String, Project>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                cache: RwLock::new(cache),
                locks: DashMap::new(),
            }),
        }
    }

    // ============================================================
    // Mutations
    // ============================================================

    /// Append `new` to `topic`, creating the project at version 1 if the topic is unknown.
    pub async fn create_or_append(&self, topic: &str, new: NewVersion) -> StoreResult<Project> {
        self.spawn_append(topic, new, None).await
    }

    /// Append `new` to `topic` only if it is still the incarnation created at `created_at`.
    ///
    /// Derived operations (refine, adjust, panel summary) read a prior version,
    /// call the model without holding any lock, and then append. If the topic
    /// was deleted in the meantime this fails with [`StoreError::Stale`] rather
    /// than resurrecting the topic with a dangling reference.
    pub async fn append_existing(
        &self,
        topic: &str,
        created_at: DateTime<Utc>,
        new: NewVersion,
    ) -> StoreResult<Project> {
        self.spawn_append(topic, new, Some(created_at)).await
    }

    /// Delete `topic` and its entire history.
    pub async fn delete(&self, topic: &str) -> StoreResult<()> {
        let store = self.clone();
        let topic = topic.to_string();
        // Run to completion even if the caller stops waiting, so the backend
        // and the cache cannot diverge.
        tokio::spawn(async move { store.delete_locked(&topic).await })
            .await
            .map_err(|e| StoreError::Io(format!("Store task failed: {}", e)))?
    }

    async fn spawn_append(
        &self,
        topic: &str,
        new: NewVersion,
        expected: Option<DateTime<Utc>>,
    ) -> StoreResult<Project> {
        let store = self.clone();
        let topic = topic.to_string();
        tokio::spawn(async move { store.append_locked(&topic, new, expected).await })
            .await
            .map_err(|e| StoreError::Io(format!("Store task failed: {}", e)))?
    }

    async fn append_locked(
        &self,
        topic: &str,
        new: NewVersion,
        expected: Option<DateTime<Utc>>,
    ) -> StoreResult<Project> {
        let lock = self.topic_lock(topic);
        let _guard = lock.lock().await;

        let current = self.read_cache().get(topic).cloned();
        let now = Utc::now();
        let project = match (current, expected) {
            (Some(mut project), Some(created_at)) if project.created_at == created_at => {
                project.append(new, now);
                project
            }
            (_, Some(_)) => {
                return Err(StoreError::Stale {
                    topic: topic.to_string(),
                })
            }
            (Some(mut project), None) => {
                project.append(new, now);
                project
            }
            (None, None) => Project::start(topic, new, now),
        };

        self.persist(project.clone()).await?;
        self.write_cache()
            .insert(topic.to_string(), project.clone());

        if let Some(record) = project.latest() {
            tracing::debug!(
                "Appended version {} ({}) to topic '{}'",
                record.version,
                record.agent,
                topic
            );
        }
        Ok(project)
    }

    async fn delete_locked(&self, topic: &str) -> StoreResult<()> {
        let lock = self.topic_lock(topic);
        let _guard = lock.lock().await;

        if !self.read_cache().contains_key(topic) {
            return Err(StoreError::NotFound(topic.to_string()));
        }

        let backend = Arc::clone(&self.inner.backend);
        let key = topic.to_string();
        let existed = tokio::task::spawn_blocking(move || backend.remove(&key))
            .await
            .map_err(|e| StoreError::Io(format!("Storage task failed: {}", e)))??;
        if !existed {
            tracing::warn!("Topic '{}' was cached but missing from storage", topic);
        }

        self.write_cache().remove(topic);
        tracing::debug!("Deleted topic '{}'", topic);
        Ok(())
    }

    async fn persist(&self, project: Project) -> StoreResult<()> {
        let backend = Arc::clone(&self.inner.backend);
        tokio::task::spawn_blocking(move || backend.save(&project))
            .await
            .map_err(|e| StoreError::Io(format!("Storage task failed: {}", e)))?
    }

    fn topic_lock(&self, topic: &str) -> Arc<Mutex<()>> {
        self.inner
            .locks
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn get(&self, topic: &str) -> StoreResult<Project> {
        self.read_cache()
            .get(topic)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(topic.to_string()))
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.read_cache().contains_key(topic)
    }

    /// All topics, in lexicographic order.
    pub fn list(&self) -> Vec<String> {
        self.read_cache().keys().cloned().collect()
    }

    /// The highest-numbered version of `topic` produced by `agent`.
    pub fn latest_version(&self, topic: &str, agent: &AgentKind) -> StoreResult<VersionRecord> {
        let cache = self.read_cache();
        let project = cache
            .get(topic)
            .ok_or_else(|| StoreError::NotFound(topic.to_string()))?;
        project
            .latest_of(agent)
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound {
                topic: topic.to_string(),
                agent: agent.clone(),
            })
    }

    /// Every version of `topic` produced by `agent`, oldest first. May be empty.
    pub fn versions_of(&self, topic: &str, agent: &AgentKind) -> StoreResult<Vec<VersionRecord>> {
        let cache = self.read_cache();
        let project = cache
            .get(topic)
            .ok_or_else(|| StoreError::NotFound(topic.to_string()))?;
        Ok(project.versions_of(agent).cloned().collect())
    }

    pub fn summary(&self, topic: &str) -> StoreResult<ProjectSummary> {
        self.read_cache()
            .get(topic)
            .map(Project::summary)
            .ok_or_else(|| StoreError::NotFound(topic.to_string()))
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, BTreeMap<String, Project>> {
        self.inner.cache.read().expect("store cache lock poisoned")
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Project>> {
        self.inner.cache.write().expect("store cache lock poisoned")
    }
}
