//! Agent Protocol Types
//!
//! Findings, patch suggestions and reports exchanged between agents and the coordinator.
//!
//! ## Normalization
//!
//! `AgentReport::new` deduplicates findings and patches by full value and stores them in
//! their canonical output order:
//! - findings: descending by `(severity priority, title, agent_name, canonical key)`
//! - patches: ascending by `(file_path, line_start, description, canonical key)`

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::schema::SCHEMA_VERSION;
use crate::fingerprint::artifact::{Metadata, MetadataValue, canonical_metadata};
use crate::types::{Result, ScrError};

// =============================================================================
// Severity
// =============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Highest first, the order used for grouping in reports
    pub const DESCENDING: [Severity; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    /// Numeric priority (higher = more severe)
    pub fn priority(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::Critical => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Execution Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Complete,
    Partial,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "COMPLETE",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ScrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "COMPLETE" => Ok(Self::Complete),
            "PARTIAL" => Ok(Self::Partial),
            "FAILED" => Ok(Self::Failed),
            other => Err(ScrError::validation(format!(
                "unknown execution_status: {}",
                other
            ))),
        }
    }
}

/// Metadata key carrying the execution status of a report
pub const EXECUTION_STATUS_KEY: &str = "execution_status";

// =============================================================================
// Agent Finding
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentFinding {
    pub agent_name: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub code_snippet: Option<String>,
    pub recommendation: Option<String>,
    pub metadata: Metadata,
}

impl AgentFinding {
    pub fn new(
        agent_name: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let finding = Self {
            agent_name: agent_name.into(),
            severity,
            title: title.into(),
            description: description.into(),
            file_path: None,
            line_number: None,
            code_snippet: None,
            recommendation: None,
            metadata: Metadata::new(),
        };
        finding.validate()?;
        Ok(finding)
    }

    /// Attach a source location (line numbers are 1-based)
    pub fn at(mut self, file_path: impl Into<String>, line_number: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.line_number = Some(line_number);
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn with_code_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_name.is_empty() {
            return Err(ScrError::validation("agent_name cannot be empty"));
        }
        if self.title.is_empty() {
            return Err(ScrError::validation("title cannot be empty"));
        }
        if self.description.is_empty() {
            return Err(ScrError::validation("description cannot be empty"));
        }
        if self.line_number == Some(0) {
            return Err(ScrError::validation("line_number must be >= 1 if provided"));
        }
        Ok(())
    }

    /// Full-value rendering used for deduplication and as final tie-breaker
    pub fn canonical_key(&self) -> Result<String> {
        Ok(serde_json::to_string(&(
            &self.agent_name,
            self.severity,
            &self.title,
            &self.description,
            &self.file_path,
            self.line_number,
            &self.code_snippet,
            &self.recommendation,
            canonical_metadata(&self.metadata)?,
        ))?)
    }
}

fn finding_key((canonical, f): &(String, AgentFinding)) -> (u8, &str, &str, &str) {
    (f.severity.priority(), &f.title, &f.agent_name, canonical)
}

fn finding_order(a: &(String, AgentFinding), b: &(String, AgentFinding)) -> Ordering {
    finding_key(b).cmp(&finding_key(a))
}

// =============================================================================
// Patch Suggestion
// =============================================================================

/// Advisory before/after template. Never applied to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchSuggestion {
    pub file_path: String,
    pub original_code: String,
    pub suggested_code: String,
    pub description: String,
    pub line_start: u32,
    pub line_end: u32,
    pub metadata: Metadata,
}

impl PatchSuggestion {
    pub fn new(
        file_path: impl Into<String>,
        original_code: impl Into<String>,
        suggested_code: impl Into<String>,
        description: impl Into<String>,
        line_start: u32,
        line_end: u32,
    ) -> Result<Self> {
        let patch = Self {
            file_path: file_path.into(),
            original_code: original_code.into(),
            suggested_code: suggested_code.into(),
            description: description.into(),
            line_start,
            line_end,
            metadata: Metadata::new(),
        };
        patch.validate()?;
        Ok(patch)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.description.is_empty() {
            return Err(ScrError::validation("description cannot be empty"));
        }
        if self.line_start < 1 {
            return Err(ScrError::validation("line_start must be >= 1"));
        }
        if self.line_end < self.line_start {
            return Err(ScrError::validation("line_end must be >= line_start"));
        }
        if self.original_code.is_empty() {
            return Err(ScrError::validation("original_code cannot be empty"));
        }
        if self.suggested_code.is_empty() {
            return Err(ScrError::validation("suggested_code cannot be empty"));
        }
        Ok(())
    }

    pub fn canonical_key(&self) -> Result<String> {
        Ok(serde_json::to_string(&(
            &self.file_path,
            &self.original_code,
            &self.suggested_code,
            &self.description,
            self.line_start,
            self.line_end,
            canonical_metadata(&self.metadata)?,
        ))?)
    }
}

fn patch_order(a: &(String, PatchSuggestion), b: &(String, PatchSuggestion)) -> Ordering {
    a.1.file_path
        .cmp(&b.1.file_path)
        .then(a.1.line_start.cmp(&b.1.line_start))
        .then_with(|| a.1.description.cmp(&b.1.description))
        .then_with(|| a.0.cmp(&b.0))
}

// =============================================================================
// Agent Report
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReport {
    pub agent_name: String,
    pub findings: Vec<AgentFinding>,
    pub patch_suggestions: Vec<PatchSuggestion>,
    pub summary: Option<String>,
    pub metadata: Metadata,
}

impl AgentReport {
    /// Build a report, deduplicating and ordering findings and patches.
    pub fn new(
        agent_name: impl Into<String>,
        findings: impl IntoIterator<Item = AgentFinding>,
        patch_suggestions: impl IntoIterator<Item = PatchSuggestion>,
        summary: Option<String>,
        metadata: Metadata,
    ) -> Result<Self> {
        let agent_name = agent_name.into();
        if agent_name.is_empty() {
            return Err(ScrError::validation("agent_name cannot be empty"));
        }

        let mut keyed_findings = findings
            .into_iter()
            .map(|f| Ok((f.canonical_key()?, f)))
            .collect::<Result<Vec<_>>>()?;
        keyed_findings.sort_by(finding_order);
        keyed_findings.dedup_by(|a, b| a.0 == b.0);

        let mut keyed_patches = patch_suggestions
            .into_iter()
            .map(|p| Ok((p.canonical_key()?, p)))
            .collect::<Result<Vec<_>>>()?;
        keyed_patches.sort_by(patch_order);
        keyed_patches.dedup_by(|a, b| a.0 == b.0);

        Ok(Self {
            agent_name,
            findings: keyed_findings.into_iter().map(|(_, f)| f).collect(),
            patch_suggestions: keyed_patches.into_iter().map(|(_, p)| p).collect(),
            summary,
            metadata,
        })
    }

    /// `metadata.execution_status`, `COMPLETE` when absent
    pub fn execution_status(&self) -> Result<ExecutionStatus> {
        match self.metadata.get(EXECUTION_STATUS_KEY) {
            None => Ok(ExecutionStatus::Complete),
            Some(value) => value
                .as_str()
                .ok_or_else(|| ScrError::validation("execution_status must be a string"))?
                .parse(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_name.is_empty() {
            return Err(ScrError::validation("agent_name cannot be empty"));
        }
        for finding in &self.findings {
            finding.validate()?;
            finding.canonical_key()?;
        }
        for patch in &self.patch_suggestions {
            patch.validate()?;
            patch.canonical_key()?;
        }
        Ok(())
    }

    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_default() += 1;
        }
        counts
    }

    /// Serializable output record (schema version 1)
    pub fn to_record(&self) -> Result<AgentReportRecord<'_>> {
        let status = self.execution_status()?;
        Ok(AgentReportRecord {
            schema_version: SCHEMA_VERSION,
            agent_name: &self.agent_name,
            findings: &self.findings,
            patch_suggestions: &self.patch_suggestions,
            summary: self.summary.as_deref(),
            metadata: &self.metadata,
            proof_obligations: ReportObligations {
                requires_execution_status_check: true,
                invalid_if_ignored: true,
                findings_invalid_if_failed: status == ExecutionStatus::Failed,
                findings_invalid_if_partial: status == ExecutionStatus::Partial,
                empty_findings_means_failure_not_success: status != ExecutionStatus::Complete,
                contract_violation_if_status_ignored: true,
            },
        })
    }
}

/// Top-level fields of a serialized agent report
pub const AGENT_REPORT_RECORD_FIELDS: &[&str] = &[
    "schema_version",
    "agent_name",
    "findings",
    "patch_suggestions",
    "summary",
    "metadata",
    "proof_obligations",
];

#[derive(Debug, Serialize)]
pub struct AgentReportRecord<'a> {
    pub schema_version: u32,
    pub agent_name: &'a str,
    pub findings: &'a [AgentFinding],
    pub patch_suggestions: &'a [PatchSuggestion],
    pub summary: Option<&'a str>,
    pub metadata: &'a Metadata,
    pub proof_obligations: ReportObligations,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReportObligations {
    pub requires_execution_status_check: bool,
    pub invalid_if_ignored: bool,
    pub findings_invalid_if_failed: bool,
    pub findings_invalid_if_partial: bool,
    pub empty_findings_means_failure_not_success: bool,
    pub contract_violation_if_status_ignored: bool,
}
