//! Analyze Command
//!
//! Fingerprints a repository and runs the review agents over it.
//!
//! Usage:
//!   scr analyze <PATH> [-o FILE] [-f text|json]

use std::path::Path;

use tracing::info;

use crate::agents::{AgentCoordinator, AgentReport, default_agents};
use crate::cli::ui::Output;
use crate::cli::util::agents_report_path;
use crate::config::{Config, OutputFormat};
use crate::fingerprint::{Fingerprinter, RepositoryFingerprint};
use crate::report::{Reporter, enforce_output_contract, enforce_success_predicate};
use crate::types::Result;

/// Fingerprint `path` and review it with the configured agents
pub fn analyze_repository(
    path: &Path,
    config: &Config,
) -> Result<(RepositoryFingerprint, AgentReport)> {
    let fingerprint = Fingerprinter::from_config(path, &config.fingerprint)?.fingerprint()?;
    let coordinator = AgentCoordinator::new(default_agents(&config.agents))?;
    let report = coordinator.review(&fingerprint)?;
    info!(
        "Analyze: {} artifacts, {} findings, status {}",
        fingerprint.artifacts.len(),
        report.findings.len(),
        fingerprint.status
    );
    Ok((fingerprint, report))
}

pub fn run(path: &Path, output: Option<&Path>, format: OutputFormat, config: &Config) -> Result<()> {
    let (fingerprint, report) = analyze_repository(path, config)?;
    let reporter = Reporter::for_format(format);

    match output {
        Some(output) => {
            let agents_path = agents_report_path(output);
            reporter.report_fingerprint(&fingerprint, Some(output))?;
            reporter.report_agent_findings(&report, Some(&agents_path))?;

            let ui = Output::new();
            ui.success(&format!("Fingerprint written to: {}", output.display()));
            ui.success(&format!("Agent report written to: {}", agents_path.display()));
        }
        None => {
            let rendered = format!(
                "{}\n\n\n{}",
                reporter.report_fingerprint(&fingerprint, None)?,
                reporter.report_agent_findings(&report, None)?
            );
            enforce_output_contract(&rendered, format)?;
            println!("{}", rendered);
        }
    }

    enforce_success_predicate(&fingerprint, &report, 0)
}
