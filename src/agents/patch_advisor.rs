//! Patch Advisor
//!
//! Emits illustrative before/after templates for risky or unwieldy artifacts.
//! Suggestions are advisory only; nothing is ever written to the repository.

use tracing::debug;

use super::Agent;
use super::types::{AgentFinding, AgentReport, PatchSuggestion, Severity};
use crate::config::AgentsConfig;
use crate::fingerprint::{CodeArtifact, Metadata, RepositoryFingerprint, RiskSignal};
use crate::types::Result;

pub const PATCH_ADVISOR_NAME: &str = "PatchAdvisor";

const EVAL_ORIGINAL: &str = "# Example: result = eval(user_input)\nresult = eval(user_input)";
const EVAL_SUGGESTED: &str = "# Use JSON parsing or explicit parsing logic instead\nimport json\nresult = json.loads(user_input)  # Validate input first";

const DESERIALIZE_ORIGINAL: &str =
    "# Example: data = pickle.loads(untrusted_data)\ndata = pickle.loads(untrusted_data)";
const DESERIALIZE_SUGGESTED: &str = "# Use restricted unpickler with allowlist
import pickle
import io
from typing import Any

ALLOWED_CLASSES = {'SafeClass1', 'SafeClass2'}

class RestrictedUnpickler(pickle.Unpickler):
    def find_class(self, module: str, name: str) -> Any:
        if name in ALLOWED_CLASSES:
            return super().find_class(module, name)
        raise pickle.UnpicklingError(f'Class {name} not allowed')

data = RestrictedUnpickler(io.BytesIO(untrusted_data)).load()";

pub struct PatchAdvisor {
    many_parameters: usize,
}

impl PatchAdvisor {
    pub fn new() -> Self {
        Self::from_config(&AgentsConfig::default())
    }

    pub fn from_config(config: &AgentsConfig) -> Self {
        Self {
            many_parameters: config.many_parameters,
        }
    }

    pub fn with_many_parameters(mut self, parameters: usize) -> Self {
        self.many_parameters = parameters;
        self
    }
}

impl Default for PatchAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Title-cases an identifier: a letter is upper-cased when it follows a non-letter,
/// lower-cased otherwise (`fetch_user_data` -> `Fetch_User_Data`).
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut previous_cased = false;
    for c in name.chars() {
        if c.is_alphabetic() {
            if previous_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(c);
            previous_cased = false;
        }
    }
    out
}

fn eval_patch(artifact: &CodeArtifact) -> Result<PatchSuggestion> {
    Ok(PatchSuggestion::new(
        &artifact.path,
        EVAL_ORIGINAL,
        EVAL_SUGGESTED,
        "Replace eval() with safer JSON parsing or explicit parsing logic. Always validate input before parsing.",
        artifact.start_line,
        artifact.end_line,
    )?
    .with_metadata("risk_signal", RiskSignal::DynamicCodeExecution.as_str())
    .with_metadata("artifact_name", artifact.name.as_str()))
}

fn deserialization_patch(artifact: &CodeArtifact) -> Result<PatchSuggestion> {
    Ok(PatchSuggestion::new(
        &artifact.path,
        DESERIALIZE_ORIGINAL,
        DESERIALIZE_SUGGESTED,
        "Use restricted unpickler with allowlist to prevent arbitrary code execution. Only allow deserialization of known safe classes.",
        artifact.start_line,
        artifact.end_line,
    )?
    .with_metadata("risk_signal", RiskSignal::Deserialization.as_str())
    .with_metadata("artifact_name", artifact.name.as_str()))
}

fn parameter_patch(artifact: &CodeArtifact, parameters: usize) -> Result<PatchSuggestion> {
    let parameter_list = artifact
        .as_function()
        .map(|f| f.parameters.iter().map(String::as_str).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    let params_type = format!("{}Params", title_case(&artifact.name));
    let original = format!("def {}({}):\n    # function body", artifact.name, parameter_list);
    let suggested = format!(
        "from dataclasses import dataclass\n\n@dataclass\nclass {params_type}:\n    # Group related parameters\n    pass\n\ndef {}(params: {params_type}):\n    # Access params.field1, params.field2, etc.\n    # function body",
        artifact.name
    );

    Ok(PatchSuggestion::new(
        &artifact.path,
        original,
        suggested,
        format!(
            "Refactor function to use a parameter object (dataclass) to reduce parameter count from {}.",
            parameters
        ),
        artifact.start_line,
        artifact.end_line,
    )?
    .with_metadata("parameter_count", parameters as i64)
    .with_metadata("artifact_name", artifact.name.as_str()))
}

fn patch_finding(
    severity: Severity,
    title: &str,
    description: String,
    recommendation: &str,
    artifact: &CodeArtifact,
) -> Result<AgentFinding> {
    Ok(
        AgentFinding::new(PATCH_ADVISOR_NAME, severity, title, description)?
            .at(&artifact.path, artifact.start_line)
            .with_recommendation(recommendation)
            .with_metadata("patch_available", true),
    )
}

impl Agent for PatchAdvisor {
    fn name(&self) -> &str {
        PATCH_ADVISOR_NAME
    }

    fn analyze(&self, fingerprint: &RepositoryFingerprint) -> Result<AgentReport> {
        let mut findings = Vec::new();
        let mut patches = Vec::new();

        for artifact in &fingerprint.artifacts {
            if artifact.has_signal(RiskSignal::DynamicCodeExecution) {
                patches.push(eval_patch(artifact)?);
                findings.push(patch_finding(
                    Severity::Critical,
                    "Suggested patch for dynamic code execution",
                    format!(
                        "Replace dynamic code execution in {} with safer alternative.",
                        artifact.name
                    ),
                    "Apply the suggested patch to remove dynamic code execution.",
                    artifact,
                )?);
            }

            if artifact.has_signal(RiskSignal::Deserialization) {
                patches.push(deserialization_patch(artifact)?);
                findings.push(patch_finding(
                    Severity::High,
                    "Suggested patch for unsafe deserialization",
                    format!(
                        "Replace unsafe deserialization in {} with safer alternative.",
                        artifact.name
                    ),
                    "Apply the suggested patch to use safe deserialization.",
                    artifact,
                )?);
            }

            if let Some(function) = artifact.as_function() {
                let parameters = function.parameters.len();
                if parameters > self.many_parameters {
                    patches.push(parameter_patch(artifact, parameters)?);
                    findings.push(patch_finding(
                        Severity::Low,
                        "Suggested patch for many parameters",
                        format!("Refactor function {} to use a parameter object.", artifact.name),
                        "Apply the suggested patch to reduce parameter count.",
                        artifact,
                    )?);
                }
            }
        }

        let report = AgentReport::new(PATCH_ADVISOR_NAME, findings, patches, None, Metadata::new())?;
        let patch_count = report.patch_suggestions.len();
        debug!("PatchAdvisor: {} patch suggestions", patch_count);

        let mut metadata = Metadata::new();
        metadata.insert("patch_count".into(), (patch_count as i64).into());
        Ok(AgentReport {
            summary: Some(format!(
                "Generated {} patch suggestions for security and code quality improvements.",
                patch_count
            )),
            metadata,
            ..report
        })
    }
}
