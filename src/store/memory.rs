use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::Project;

use super::{ProjectBackend, StoreError, StoreResult};

/// In-process backend backed by a map. Nothing survives the process.
///
/// Writes can be switched to fail with [`MemoryBackend::fail_writes`] to
/// exercise storage-failure paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    projects: Mutex<BTreeMap<String, Project>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the backend, as if the projects had been persisted earlier.
    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let backend = Self::new();
        {
            let mut map = backend
                .projects
                .lock()
                .expect("memory backend lock poisoned");
            for project in projects {
                map.insert(project.topic.clone(), project);
            }
        }
        backend
    }

    /// Make every subsequent `save`/`remove` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of projects currently persisted.
    pub fn len(&self) -> usize {
        self.projects
            .lock()
            .expect("memory backend lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io("memory backend write disabled".to_string()));
        }
        Ok(())
    }
}

impl ProjectBackend for MemoryBackend {
    fn load_all(&self) -> StoreResult<Vec<Project>> {
        let projects = self.projects.lock().expect("memory backend lock poisoned");
        Ok(projects.values().cloned().collect())
    }

    fn save(&self, project: &Project) -> StoreResult<()> {
        self.check_writable()?;
        let mut projects = self.projects.lock().expect("memory backend lock poisoned");
        projects.insert(project.topic.clone(), project.clone());
        Ok(())
    }

    fn remove(&self, topic: &str) -> StoreResult<bool> {
        self.check_writable()?;
        let mut projects = self.projects.lock().expect("memory backend lock poisoned");
        Ok(projects.remove(topic).is_some())
    }
}
