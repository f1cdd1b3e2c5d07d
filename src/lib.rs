//! Grantwright: versioned grant proposal drafting backed by generative agents.
//!
//! The [`orchestrator::Orchestrator`] runs agents from [`agents`] and records
//! each result as a new version of a topic in the [`store::Store`]. Storage is
//! pluggable: SQLite ([`db::Database`]), a single JSON file, or memory.

pub mod agents;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod store;

pub use error::{Error, ErrorKind, Result};
pub use orchestrator::{CompleteOutcome, Orchestrator, StepFailure};
