//! Secure Code Reasoner
//!
//! Research toolkit for reasoning about the security posture of a code repository.
//!
//! ## Core Features
//!
//! - **Fingerprinting**: deterministic structural summary of a Python repository with
//!   heuristic risk signals and a reproducible hash
//! - **Review Agents**: independent code-quality, security and patch-advisory reviewers
//!   merged by a coordinator that isolates agent failures
//! - **Execution Tracing**: sandboxed script execution with structured events and a
//!   heuristic risk score
//!
//! Every output carries an explicit status (`fingerprint_status`, `execution_status`) that
//! callers must check before treating it as complete.
//!
//! ## Quick Start
//!
//! ```ignore
//! use secure_code_reasoner::{default_agents, fingerprint, review, trace, TraceOptions};
//! use secure_code_reasoner::config::AgentsConfig;
//!
//! let fp = fingerprint("path/to/repo")?;
//! let report = review(&fp, default_agents(&AgentsConfig::default()))?;
//! let run = trace("script.py", TraceOptions::default()).await?;
//! ```
//!
//! ## Modules
//!
//! - [`analyzer`]: tree-sitter source extraction and repository traversal
//! - [`fingerprint`]: artifacts, dependency graph and the fingerprinter
//! - [`agents`]: agent protocol, concrete agents and the coordinator
//! - [`trace`]: sandboxed execution tracer and risk scoring
//! - [`report`]: text/JSON formatters and output contracts
//! - [`config`]: layered configuration

pub mod agents;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod constants;
pub mod fingerprint;
pub mod report;
pub mod trace;
pub mod types;

use std::path::Path;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, OutputFormat};

// Error Types
pub use types::error::{ErrorCategory, Result, ResultExt, ScrError};

// Fingerprinting
pub use fingerprint::{
    CodeArtifact, DependencyGraph, FingerprintStatus, Fingerprinter, RepositoryFingerprint,
    RiskSignal,
};

// Agents
pub use agents::{
    Agent, AgentCoordinator, AgentFinding, AgentReport, ExecutionStatus, PatchSuggestion,
    Severity, default_agents,
};

// Tracing
pub use trace::{ExecutionTrace, ExecutionTracer, RiskScore, TraceEvent, TraceEventType, TraceOptions};

// Reporting
pub use report::{Formatter, JsonFormatter, Reporter, TextFormatter};

// =============================================================================
// Top-level Operations
// =============================================================================

/// Fingerprint the repository at `path` with default settings
pub fn fingerprint(path: impl AsRef<Path>) -> Result<RepositoryFingerprint> {
    Fingerprinter::new(path)?.fingerprint()
}

/// Review `fingerprint` with `agents`; fails when `agents` is empty
pub fn review(fingerprint: &RepositoryFingerprint, agents: Vec<Box<dyn Agent>>) -> Result<AgentReport> {
    AgentCoordinator::new(agents)?.review(fingerprint)
}

/// Run `path` under the sandboxed tracer
pub async fn trace(path: impl AsRef<Path>, options: TraceOptions) -> Result<ExecutionTrace> {
    ExecutionTracer::new(options)?.trace(path.as_ref(), &[]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_and_review() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "def main():\n    eval('1')\n").unwrap();

        let fp = fingerprint(dir.path()).unwrap();
        assert_eq!(fp.total_functions, 1);
        assert!(fp.status.is_complete());

        let report = review(&fp, default_agents(&config::AgentsConfig::default())).unwrap();
        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Complete);
        assert!(report.findings.iter().any(|f| f.severity == Severity::Critical));
    }

    fn oversized_module() -> String {
        let mut source = String::from("class Everything:\n");
        for i in 0..21 {
            source.push_str(&format!("    def method_{}(self):\n        return {}\n\n", i, i));
        }
        let params: Vec<String> = (0..26).map(|i| format!("p{:02}", i)).collect();
        source.push_str(&format!(
            "\ndef configure({}):\n    return eval(p00)\n",
            params.join(", ")
        ));
        source
    }

    #[test]
    fn test_oversized_module_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.py"), oversized_module()).unwrap();

        let fp = fingerprint(dir.path()).unwrap();
        assert!(fp.status.is_complete());
        assert_eq!(fp.total_classes, 1);
        assert_eq!(fp.total_functions, 22);

        let report = review(&fp, default_agents(&config::AgentsConfig::default())).unwrap();
        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Complete);

        let titles: Vec<&str> = report.findings.iter().map(|f| f.title.as_str()).collect();
        assert!(titles.iter().any(|t| t.starts_with("Large class")));
        assert!(titles.iter().any(|t| t.contains("many parameters")));
        assert!(report.findings.iter().any(|f| {
            f.severity == Severity::Critical && f.title == "Dynamic code execution detected"
        }));
        assert!(report
            .patch_suggestions
            .iter()
            .any(|p| p.description.contains("eval()") && p.description.contains("JSON parsing")));
    }

    #[test]
    fn test_comment_only_file_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("empty.py"), "# comment only\n").unwrap();

        let fp = fingerprint(dir.path()).unwrap();
        assert_eq!(fp.total_files, 1);
        assert_eq!(fp.total_classes, 0);
        assert_eq!(fp.total_functions, 0);
        assert!(fp.risk_signals.is_empty());

        let report = review(&fp, default_agents(&config::AgentsConfig::default())).unwrap();
        assert_eq!(report.execution_status().unwrap(), ExecutionStatus::Complete);
        assert!(report.findings.is_empty());
        assert!(report.patch_suggestions.is_empty());
    }

    #[test]
    fn test_review_requires_agents() {
        let fp = RepositoryFingerprint::assemble("/repo", Vec::new(), Vec::new()).unwrap();
        let err = review(&fp, Vec::new()).unwrap_err();
        assert!(matches!(err, ScrError::Agent(_)));
    }

    #[tokio::test]
    async fn test_trace_rejects_bad_options() {
        let err = trace("script.py", TraceOptions::default().with_timeout(0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrError::Tracing(_)));
    }
}
