use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::Project;

use super::{ProjectBackend, StoreError, StoreResult};

/// Single-file backend: one JSON object mapping topic to project.
///
/// Every write rewrites the whole document into a sibling temp file, fsyncs
/// it and renames it over the original, so readers see either the old or the
/// new document and never a torn one.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    projects: Mutex<BTreeMap<String, Project>>,
}

impl JsonFileBackend {
    /// Open (or lazily create) the store file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let projects = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                StoreError::Io(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    StoreError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            projects: Mutex::new(projects),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, projects: &BTreeMap<String, Project>) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(projects)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error("create directory", parent, e))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| io_error("create", &tmp, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| io_error("write", &tmp, e))?;
        file.sync_all().map_err(|e| io_error("sync", &tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| io_error("replace", &self.path, e))?;
        sync_parent_dir(&self.path);
        Ok(())
    }

    /// Apply `change` to a copy of the document and commit it only if the write succeeds.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, Project>) -> T,
    ) -> StoreResult<T> {
        let mut projects = self.projects.lock().expect("json backend lock poisoned");
        let mut next = projects.clone();
        let result = change(&mut next);
        self.write_document(&next)?;
        *projects = next;
        Ok(result)
    }
}

impl ProjectBackend for JsonFileBackend {
    fn load_all(&self) -> StoreResult<Vec<Project>> {
        let projects = self.projects.lock().expect("json backend lock poisoned");
        Ok(projects.values().cloned().collect())
    }

    fn save(&self, project: &Project) -> StoreResult<()> {
        self.commit(|projects| {
            projects.insert(project.topic.clone(), project.clone());
        })
    }

    fn remove(&self, topic: &str) -> StoreResult<bool> {
        self.commit(|projects| projects.remove(topic).is_some())
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io(format!("Failed to {} {}: {}", action, path.display(), e))
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
            tracing::warn!("Failed to sync directory {}: {}", dir.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
