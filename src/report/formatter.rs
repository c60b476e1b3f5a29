//! Report Formatters
//!
//! Render fingerprints, agent reports and traces as pretty JSON records or as
//! human-readable text blocks framed by `=` rules.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use super::contracts::enforce_schema_contract;
use crate::agents::types::EXECUTION_STATUS_KEY;
use crate::agents::{AGENT_REPORT_RECORD_FIELDS, AgentReport, Severity};
use crate::config::OutputFormat;
use crate::constants::schema::{RULE_WIDTH, SCHEMA_VERSION};
use crate::constants::tracer::TEXT_PREVIEW_CHARS;
use crate::fingerprint::{FINGERPRINT_RECORD_FIELDS, RepositoryFingerprint};
use crate::trace::{ExecutionTrace, TRACE_RECORD_FIELDS};
use crate::types::Result;

/// Renders the three output kinds in one format
pub trait Formatter: Send + Sync {
    fn format_fingerprint(&self, fingerprint: &RepositoryFingerprint) -> Result<String>;

    fn format_agent_report(&self, report: &AgentReport) -> Result<String>;

    fn format_trace(&self, trace: &ExecutionTrace) -> Result<String>;
}

/// Formatter for the configured output format
pub fn formatter_for(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Text => Box::new(TextFormatter),
    }
}

/// `=` rule spanning the report width
pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

// =============================================================================
// JSON
// =============================================================================

/// Pretty-printed schema version 1 records
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    fn render(record: impl Serialize, known_fields: &[&str], context: &str) -> Result<String> {
        let value = serde_json::to_value(record)?;
        enforce_schema_contract(&value, SCHEMA_VERSION, known_fields, context)?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

impl Formatter for JsonFormatter {
    fn format_fingerprint(&self, fingerprint: &RepositoryFingerprint) -> Result<String> {
        Self::render(
            fingerprint.to_record(),
            FINGERPRINT_RECORD_FIELDS,
            "fingerprint",
        )
    }

    fn format_agent_report(&self, report: &AgentReport) -> Result<String> {
        let status = report.execution_status()?;
        let mut value = serde_json::to_value(report.to_record()?)?;
        // Consumers must always see the status, even when the agent left it implicit
        if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata
                .entry(EXECUTION_STATUS_KEY)
                .or_insert_with(|| Value::String(status.as_str().to_string()));
        }
        Self::render(value, AGENT_REPORT_RECORD_FIELDS, "agent_report")
    }

    fn format_trace(&self, trace: &ExecutionTrace) -> Result<String> {
        Self::render(trace.to_record(), TRACE_RECORD_FIELDS, "trace")
    }
}

// =============================================================================
// Text
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_fingerprint(&self, fingerprint: &RepositoryFingerprint) -> Result<String> {
        let mut out = String::new();
        push_banner(&mut out, "Repository Fingerprint");
        let _ = writeln!(out, "Repository: {}", fingerprint.repository_path.display());
        let _ = writeln!(out, "Fingerprint Hash: {}", fingerprint.fingerprint_hash);
        let _ = writeln!(out, "Status: {}", fingerprint.status);
        out.push('\n');

        out.push_str("Statistics:\n");
        let _ = writeln!(out, "  Total Files: {}", fingerprint.total_files);
        let _ = writeln!(out, "  Total Classes: {}", fingerprint.total_classes);
        let _ = writeln!(out, "  Total Functions: {}", fingerprint.total_functions);
        let _ = writeln!(out, "  Total Lines: {}", fingerprint.total_lines);
        out.push('\n');

        out.push_str("Languages:\n");
        for (language, count) in &fingerprint.languages {
            let _ = writeln!(out, "  {}: {}", language, count);
        }

        if !fingerprint.risk_signals.is_empty() {
            out.push_str("\nRisk Signals:\n");
            let mut signals: Vec<_> = fingerprint.risk_signals.iter().collect();
            signals.sort_by(|a, b| b.1.cmp(a.1));
            for (signal, count) in signals {
                let _ = writeln!(out, "  {}: {}", signal, count);
            }
        }

        if !fingerprint.failed_files.is_empty() {
            let _ = writeln!(out, "\nFailed Files ({}):", fingerprint.failed_files.len());
            for path in &fingerprint.failed_files {
                let _ = writeln!(out, "  {}", path);
            }
        }

        out.push('\n');
        out.push_str(&rule());
        Ok(out)
    }

    fn format_agent_report(&self, report: &AgentReport) -> Result<String> {
        let mut out = String::new();
        push_banner(&mut out, &format!("Agent Report: {}", report.agent_name));

        if let Some(summary) = &report.summary {
            let _ = writeln!(out, "Summary: {}\n", summary);
        }

        if !report.findings.is_empty() {
            let _ = writeln!(out, "Findings ({}):\n", report.findings.len());

            for severity in Severity::DESCENDING {
                let findings: Vec<_> = report
                    .findings
                    .iter()
                    .filter(|f| f.severity == severity)
                    .collect();
                if findings.is_empty() {
                    continue;
                }

                let label = severity.as_str().to_uppercase();
                let _ = writeln!(out, "{} ({}):", label, findings.len());
                for finding in findings {
                    let _ = writeln!(out, "  [{}] {}", label, finding.title);
                    let _ = writeln!(out, "      Description: {}", finding.description);
                    if let Some(path) = &finding.file_path {
                        let _ = writeln!(out, "      File: {}", path);
                        if let Some(line) = finding.line_number.filter(|l| *l > 0) {
                            let _ = writeln!(out, "      Line: {}", line);
                        }
                    }
                    if let Some(recommendation) = &finding.recommendation {
                        let _ = writeln!(out, "      Recommendation: {}", recommendation);
                    }
                    out.push('\n');
                }
                out.push('\n');
            }
        }

        if !report.patch_suggestions.is_empty() {
            let _ = writeln!(
                out,
                "Patch Suggestions ({}):\n",
                report.patch_suggestions.len()
            );
            // Already ordered by (file_path, line_start)
            for (i, patch) in report.patch_suggestions.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  {}. {} (lines {}-{})",
                    i + 1,
                    patch.file_path,
                    patch.line_start,
                    patch.line_end
                );
                let _ = writeln!(out, "     Description: {}", patch.description);
                out.push_str("     Original:\n");
                push_indented(&mut out, &patch.original_code, "       ");
                out.push_str("     Suggested:\n");
                push_indented(&mut out, &patch.suggested_code, "       ");
                out.push('\n');
            }
        }

        out.push_str(&rule());
        Ok(out)
    }

    fn format_trace(&self, trace: &ExecutionTrace) -> Result<String> {
        let mut out = String::new();
        push_banner(&mut out, "Execution Trace");
        let _ = writeln!(out, "Script: {}", trace.script_path.display());
        let _ = writeln!(out, "Exit Code: {}", trace.exit_code);
        let _ = writeln!(out, "Execution Time: {:.2}s\n", trace.execution_time);

        if let Some(risk) = &trace.risk_score {
            out.push_str("Risk Score:\n");
            let _ = writeln!(out, "  Score: {:.1}/{:.1}", risk.score, risk.max_score);
            let _ = writeln!(out, "  Normalized: {:.2}%", risk.normalized() * 100.0);
            let _ = writeln!(out, "  Explanation: {}", risk.explanation);
            if !risk.factors.is_empty() {
                out.push_str("  Factors:\n");
                for (factor, value) in &risk.factors {
                    let _ = writeln!(out, "    {}: {:.1}", factor, value);
                }
            }
            out.push('\n');
        }

        if !trace.events.is_empty() {
            let _ = writeln!(out, "Events ({}):", trace.events.len());
            for event in &trace.events {
                let _ = writeln!(out, "  [{}] {:.3}", event.event_type, event.timestamp);
                if let Some(path) = &event.file_path {
                    let _ = writeln!(out, "      File: {}", path);
                }
                if let Some(command) = &event.command {
                    let _ = writeln!(out, "      Command: {}", command);
                }
                if let Some(address) = &event.network_address {
                    match event.network_port {
                        Some(port) => {
                            let _ = writeln!(out, "      Network: {}:{}", address, port);
                        }
                        None => {
                            let _ = writeln!(out, "      Network: {}", address);
                        }
                    }
                }
            }
            out.push('\n');
        }

        push_preview(&mut out, "Stdout", &trace.stdout);
        push_preview(&mut out, "Stderr", &trace.stderr);

        out.push_str(&rule());
        Ok(out)
    }
}

fn push_banner(out: &mut String, title: &str) {
    let rule = rule();
    let _ = writeln!(out, "{}\n{}\n{}", rule, title, rule);
}

fn push_indented(out: &mut String, text: &str, indent: &str) {
    for line in text.lines() {
        let _ = writeln!(out, "{}{}", indent, line);
    }
}

fn push_preview(out: &mut String, label: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", label);
    let preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
    out.push_str(&preview);
    out.push('\n');
    if text.chars().nth(TEXT_PREVIEW_CHARS).is_some() {
        out.push_str("... (truncated)\n");
    }
    out.push('\n');
}
