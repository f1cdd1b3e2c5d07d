//! Runtime configuration.
//!
//! Values come from, in increasing priority: built-in defaults, the optional
//! `grantwright/config.json` file in the user's config directory, and
//! environment variables (`GRANTWRIGHT_*`, `GEMINI_API_KEY`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "grantwright";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Usually supplied through `GEMINI_API_KEY` rather than the config file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Per-request timeout. The orchestrator itself never times out a call.
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 120,
            temperature: 0.7,
            max_output_tokens: 4000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Json,
}

impl std::str::FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            other => Err(anyhow::anyhow!("Unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageKind,
    /// Store location. `None` uses the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Ok(path) => Self::from_file(&path)?,
            Err(e) => {
                tracing::warn!("Config file unavailable, using defaults: {}", e);
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read `path`, falling back to defaults when it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override fields from environment-style variables provided by `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = lookup("GRANTWRIGHT_GEMINI_API_KEY").or_else(|| lookup("GEMINI_API_KEY"))
        {
            self.gemini.api_key = Some(key);
        }
        if let Some(model) = lookup("GRANTWRIGHT_MODEL") {
            self.gemini.model = model;
        }
        if let Some(url) = lookup("GRANTWRIGHT_GEMINI_URL") {
            self.gemini.base_url = url;
        }
        if let Some(secs) = lookup("GRANTWRIGHT_TIMEOUT_SECS") {
            self.gemini.timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid GRANTWRIGHT_TIMEOUT_SECS '{}'", secs))?;
        }
        if let Some(backend) = lookup("GRANTWRIGHT_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(path) = lookup("GRANTWRIGHT_STORE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(host) = lookup("GRANTWRIGHT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GRANTWRIGHT_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid GRANTWRIGHT_PORT '{}'", port))?;
        }
        Ok(())
    }
}

fn config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
