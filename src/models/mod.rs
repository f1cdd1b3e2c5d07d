//! Domain models for Grantwright.
//!
//! # Core Concepts
//!
//! - [`Project`]: Everything produced for one grant proposal, keyed by its topic.
//!   A project is an append-only history of versions plus a few derived fields.
//! - [`VersionRecord`]: One immutable artifact produced by a single agent invocation
//!   (like a commit in `git log` for the proposal).
//! - [`AgentKind`]: Which agent or derived operation produced a version.
//!
//! Requests accepted by the orchestrator live in [`request`] and are re-exported here.

mod agent;
mod project;
mod request;
mod version;

pub use agent::*;
pub use project::*;
pub use request::*;
pub use version::*;
