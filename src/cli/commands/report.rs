//! Report Command
//!
//! Writes the fingerprint and the merged agent report into one file.
//!
//! Usage:
//!   scr report <PATH> -o FILE [-f text|json]

use std::path::Path;

use super::analyze::analyze_repository;
use crate::cli::ui::Output;
use crate::config::{Config, OutputFormat};
use crate::report::{Reporter, enforce_output_contract, enforce_success_predicate, rule};
use crate::types::Result;

pub fn run(path: &Path, output: &Path, format: OutputFormat, config: &Config) -> Result<()> {
    let (fingerprint, report) = analyze_repository(path, config)?;
    let reporter = Reporter::for_format(format);

    let fingerprint_text = reporter.report_fingerprint(&fingerprint, None)?;
    let report_text = reporter.report_agent_findings(&report, None)?;

    // JSON stays a stream of documents; text gets a separating rule
    let combined = match format {
        OutputFormat::Json => format!("{}\n{}\n", fingerprint_text, report_text),
        OutputFormat::Text => format!("{}\n\n{}\n\n{}\n", fingerprint_text, rule(), report_text),
    };
    enforce_output_contract(&combined, format)?;

    Reporter::write_report(output, &combined)?;
    Output::new().success(&format!("Report written to: {}", output.display()));

    enforce_success_predicate(&fingerprint, &report, 0)
}
