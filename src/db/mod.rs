//! SQLite persistence for projects.
//!
//! Each topic is one row whose `project` column holds the serialized
//! [`Project`]. Writes are synchronous (`synchronous = FULL`) so a successful
//! return means the row survives a crash.

mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::models::Project;
use crate::store::{ProjectBackend, StoreError, StoreResult};

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "grantwright")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("grantwright.db"))
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT topic, project FROM topics ORDER BY topic")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(topic, json)| parse_project(&topic, &json))
            .collect()
    }

    pub fn get_project(&self, topic: &str) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let json: Option<String> = conn
            .query_row(
                "SELECT project FROM topics WHERE topic = ?",
                [topic],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|json| parse_project(topic, &json)).transpose()
    }

    /// Insert or replace the row for `project.topic`.
    pub fn upsert_project(&self, project: &Project) -> Result<()> {
        let json = serde_json::to_string(project)?;
        let conn = self.conn.lock().expect("database lock poisoned");

        conn.execute(
            "INSERT INTO topics (topic, project, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(topic) DO UPDATE SET
                project = excluded.project,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            (
                &project.topic,
                &json,
                project.created_at.to_rfc3339(),
                project.last_updated.to_rfc3339(),
            ),
        )?;

        Ok(())
    }

    pub fn delete_project(&self, topic: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM topics WHERE topic = ?", [topic])?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl ProjectBackend for Database {
    fn load_all(&self) -> StoreResult<Vec<Project>> {
        self.get_all_projects().map_err(io_error)
    }

    fn save(&self, project: &Project) -> StoreResult<()> {
        self.upsert_project(project).map_err(io_error)
    }

    fn remove(&self, topic: &str) -> StoreResult<bool> {
        self.delete_project(topic).map_err(io_error)
    }
}

fn parse_project(topic: &str, json: &str) -> Result<Project> {
    let mut project: Project = serde_json::from_str(json)
        .with_context(|| format!("Corrupt project record for topic '{}'", topic))?;
    project.refresh_derived();
    Ok(project)
}

fn io_error(e: anyhow::Error) -> StoreError {
    StoreError::Io(format!("{:#}", e))
}
