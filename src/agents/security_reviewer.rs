use tracing::debug;

use super::Agent;
use super::types::{AgentFinding, AgentReport, Severity};
use crate::fingerprint::{CodeArtifact, Metadata, RepositoryFingerprint, RiskSignal};
use crate::types::Result;

pub const SECURITY_REVIEWER_NAME: &str = "SecurityReviewer";

/// Maps repository risk signals to severities and flags risky artifacts.
#[derive(Debug, Default)]
pub struct SecurityReviewer;

impl SecurityReviewer {
    pub fn new() -> Self {
        Self
    }
}

pub fn signal_severity(signal: RiskSignal) -> Severity {
    match signal {
        RiskSignal::DynamicCodeExecution => Severity::Critical,
        RiskSignal::Deserialization
        | RiskSignal::ProcessExecution
        | RiskSignal::UnsafeMemoryOperations => Severity::High,
        RiskSignal::NetworkAccess | RiskSignal::FileOperations => Severity::Medium,
        RiskSignal::Reflection | RiskSignal::ConfigurationAccess => Severity::Low,
        RiskSignal::CryptographicOperations | RiskSignal::ExternalDependency => Severity::Info,
    }
}

fn signal_recommendation(signal: RiskSignal) -> &'static str {
    match signal {
        RiskSignal::DynamicCodeExecution => {
            "Avoid dynamic code execution. Use static code patterns instead."
        }
        RiskSignal::Deserialization => {
            "Validate and sanitize all deserialized data. Use allowlists for deserialization."
        }
        RiskSignal::NetworkAccess => {
            "Ensure network access is properly authenticated and encrypted."
        }
        RiskSignal::FileOperations => {
            "Validate file paths and use secure file operations. Avoid path traversal vulnerabilities."
        }
        RiskSignal::ProcessExecution => {
            "Validate inputs to subprocess calls. Use allowlists for executable commands."
        }
        RiskSignal::Reflection => "Limit use of reflection. Ensure proper access controls.",
        RiskSignal::CryptographicOperations => {
            "Use well-reviewed cryptographic libraries. Avoid custom crypto implementations."
        }
        RiskSignal::ConfigurationAccess => {
            "Secure configuration storage. Avoid hardcoding secrets."
        }
        RiskSignal::ExternalDependency | RiskSignal::UnsafeMemoryOperations => {
            "Review this code pattern for security implications."
        }
    }
}

struct ArtifactCheck {
    signal: RiskSignal,
    severity: Severity,
    title: &'static str,
    description: &'static str,
    recommendation: &'static str,
}

/// Artifact-level findings; emitted regardless of the aggregate severity filter
const ARTIFACT_CHECKS: &[ArtifactCheck] = &[
    ArtifactCheck {
        signal: RiskSignal::DynamicCodeExecution,
        severity: Severity::Critical,
        title: "Dynamic code execution detected",
        description: "This is a high-risk pattern that can lead to code injection vulnerabilities.",
        recommendation: "Avoid eval(), exec(), or similar dynamic execution. Use static code patterns or safe alternatives like ast.literal_eval() for simple expressions.",
    },
    ArtifactCheck {
        signal: RiskSignal::Deserialization,
        severity: Severity::High,
        title: "Deserialization detected",
        description: "Untrusted data deserialization can lead to arbitrary code execution.",
        recommendation: "Validate and sanitize all deserialized data. Consider using safer serialization formats like JSON, or use restricted unpicklers with allowlists.",
    },
    ArtifactCheck {
        signal: RiskSignal::ProcessExecution,
        severity: Severity::High,
        title: "Process execution detected",
        description: "Ensure proper input validation and sandboxing.",
        recommendation: "Validate all inputs to subprocess calls. Use allowlists for commands. Avoid shell=True when possible.",
    },
];

fn artifact_finding(check: &ArtifactCheck, artifact: &CodeArtifact) -> Result<AgentFinding> {
    Ok(AgentFinding::new(
        SECURITY_REVIEWER_NAME,
        check.severity,
        check.title,
        format!("{} in {}. {}", check.title, artifact.name, check.description),
    )?
    .at(&artifact.path, artifact.start_line)
    .with_recommendation(check.recommendation)
    .with_metadata("artifact_type", artifact.artifact_type.as_str()))
}

impl Agent for SecurityReviewer {
    fn name(&self) -> &str {
        SECURITY_REVIEWER_NAME
    }

    fn analyze(&self, fingerprint: &RepositoryFingerprint) -> Result<AgentReport> {
        let mut findings = Vec::new();

        for (signal, count) in &fingerprint.risk_signals {
            let severity = signal_severity(*signal);
            if severity < Severity::High {
                continue;
            }
            findings.push(
                AgentFinding::new(
                    SECURITY_REVIEWER_NAME,
                    severity,
                    format!("Security risk: {}", signal),
                    format!(
                        "Found {} instances of {} in the codebase. This may indicate security vulnerabilities.",
                        count, signal
                    ),
                )?
                .with_recommendation(signal_recommendation(*signal))
                .with_metadata("signal", signal.as_str())
                .with_metadata("count", *count as i64),
            );
        }

        for artifact in &fingerprint.artifacts {
            for check in ARTIFACT_CHECKS {
                if artifact.has_signal(check.signal) {
                    findings.push(artifact_finding(check, artifact)?);
                }
            }
        }

        let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
        let (critical, high, medium) = (
            count(Severity::Critical),
            count(Severity::High),
            count(Severity::Medium),
        );
        let summary = format!(
            "Security review identified {} security concerns: {} critical, {} high, {} medium severity.",
            findings.len(),
            critical,
            high,
            medium
        );
        debug!("SecurityReviewer: {} findings", findings.len());

        let total_signals: usize = fingerprint.risk_signals.values().sum();
        let mut metadata = Metadata::new();
        metadata.insert("critical_count".into(), (critical as i64).into());
        metadata.insert("high_count".into(), (high as i64).into());
        metadata.insert("medium_count".into(), (medium as i64).into());
        metadata.insert("total_risk_signals".into(), (total_signals as i64).into());

        AgentReport::new(
            SECURITY_REVIEWER_NAME,
            findings,
            Vec::new(),
            Some(summary),
            metadata,
        )
    }
}
