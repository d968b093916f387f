//! Agent core — report orchestration for Fleetwatch.
//!
//! Submodules:
//! - `orchestrator`: the bounded tool-use loop against the reasoning backend
//! - `catalog`: read-only filtering of discovered tools
//! - `report`: best-effort structured report extraction from assistant text
//! - `types`: run outcome shape shared by the scheduler, CLI, and notifier
//! - `errors`: run-aborting error types

pub mod catalog;
pub mod errors;
pub mod orchestrator;
pub mod report;
pub mod types;

// Re-exports for convenience
pub use catalog::filter_catalog;
pub use errors::AgentError;
pub use orchestrator::{Orchestrator, RunOptions};
pub use report::{extract_report, OverallStatus, StructuredReport};
pub use types::RunOutcome;
