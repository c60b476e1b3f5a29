//! Reporting
//!
//! Formatters for fingerprints, agent reports and traces, the [`Reporter`] that writes them,
//! and the output [`contracts`] enforced before a successful exit.

pub mod contracts;
pub mod formatter;

pub use contracts::{
    enforce_output_contract, enforce_proof_obligations, enforce_schema_contract,
    enforce_success_predicate,
};
pub use formatter::{Formatter, JsonFormatter, TextFormatter, formatter_for, rule};

use std::fs;
use std::path::Path;

use tracing::info;

use crate::agents::AgentReport;
use crate::config::OutputFormat;
use crate::fingerprint::RepositoryFingerprint;
use crate::trace::ExecutionTrace;
use crate::types::{Result, ResultExt};

/// Renders reports and optionally writes them to disk
pub struct Reporter {
    formatter: Box<dyn Formatter>,
}

impl Reporter {
    pub fn new(formatter: Box<dyn Formatter>) -> Self {
        Self { formatter }
    }

    pub fn for_format(format: OutputFormat) -> Self {
        Self::new(formatter_for(format))
    }

    pub fn report_fingerprint(
        &self,
        fingerprint: &RepositoryFingerprint,
        output: Option<&Path>,
    ) -> Result<String> {
        let rendered = self.formatter.format_fingerprint(fingerprint)?;
        self.emit(rendered, output)
    }

    pub fn report_agent_findings(
        &self,
        report: &AgentReport,
        output: Option<&Path>,
    ) -> Result<String> {
        let rendered = self.formatter.format_agent_report(report)?;
        self.emit(rendered, output)
    }

    pub fn report_trace(&self, trace: &ExecutionTrace, output: Option<&Path>) -> Result<String> {
        let rendered = self.formatter.format_trace(trace)?;
        self.emit(rendered, output)
    }

    fn emit(&self, rendered: String, output: Option<&Path>) -> Result<String> {
        if let Some(path) = output {
            Self::write_report(path, &rendered)?;
        }
        Ok(rendered)
    }

    /// Write `content` to `path`, creating parent directories
    pub fn write_report(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context_fn(|| format!("Failed to write report to {}", path.display()))?;
        }
        fs::write(path, content)
            .with_context_fn(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report: written to {}", path.display());
        Ok(())
    }
}
