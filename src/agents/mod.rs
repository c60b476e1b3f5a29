//! Review Agents
//!
//! Independent reviewers that read a [`RepositoryFingerprint`] and produce an [`AgentReport`],
//! plus the [`AgentCoordinator`] that runs them in isolation and merges the results.
//!
//! ## Agents
//!
//! - [`CodeAnalyst`]: structural quality (large functions and classes, long parameter lists)
//! - [`SecurityReviewer`]: risk-signal severity mapping and artifact-level security findings
//! - [`PatchAdvisor`]: advisory before/after templates, never applied

pub mod code_analyst;
pub mod coordinator;
pub mod patch_advisor;
pub mod security_reviewer;
pub mod types;

pub use code_analyst::CodeAnalyst;
pub use coordinator::AgentCoordinator;
pub use patch_advisor::PatchAdvisor;
pub use security_reviewer::SecurityReviewer;
pub use types::{
    AGENT_REPORT_RECORD_FIELDS, AgentFinding, AgentReport, AgentReportRecord, ExecutionStatus,
    PatchSuggestion, Severity,
};

use crate::config::AgentsConfig;
use crate::fingerprint::RepositoryFingerprint;
use crate::types::Result;

// =============================================================================
// Agent Trait
// =============================================================================

/// A reviewer over an immutable fingerprint.
///
/// Implementations must not mutate shared state; the coordinator may run them concurrently.
/// The returned report's `agent_name` must equal [`Agent::name`].
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, fingerprint: &RepositoryFingerprint) -> Result<AgentReport>;
}

/// The standard reviewer set, configured from `[agents]`
pub fn default_agents(config: &AgentsConfig) -> Vec<Box<dyn Agent>> {
    vec![
        Box::new(CodeAnalyst::from_config(config)),
        Box::new(SecurityReviewer::new()),
        Box::new(PatchAdvisor::from_config(config)),
    ]
}
