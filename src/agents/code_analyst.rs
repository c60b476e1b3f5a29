use tracing::debug;

use super::Agent;
use super::types::{AgentFinding, AgentReport, Severity};
use crate::config::AgentsConfig;
use crate::fingerprint::{ArtifactKind, FunctionDetails, Metadata, RepositoryFingerprint};
use crate::types::Result;

pub const CODE_ANALYST_NAME: &str = "CodeAnalyst";

/// Structural quality review: large functions, large classes, long parameter lists.
pub struct CodeAnalyst {
    large_function_lines: u32,
    large_class_methods: usize,
    many_parameters: usize,
}

impl CodeAnalyst {
    pub fn new() -> Self {
        Self::from_config(&AgentsConfig::default())
    }

    pub fn from_config(config: &AgentsConfig) -> Self {
        Self {
            large_function_lines: config.large_function_lines,
            large_class_methods: config.large_class_methods,
            many_parameters: config.many_parameters,
        }
    }

    pub fn with_large_function_lines(mut self, lines: u32) -> Self {
        self.large_function_lines = lines;
        self
    }

    pub fn with_large_class_methods(mut self, methods: usize) -> Self {
        self.large_class_methods = methods;
        self
    }

    pub fn with_many_parameters(mut self, parameters: usize) -> Self {
        self.many_parameters = parameters;
        self
    }
}

impl Default for CodeAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

/// `1 + parameters + (1 if async) + decorators`
pub fn complexity(details: &FunctionDetails) -> usize {
    1 + details.parameters.len() + usize::from(details.is_async) + details.decorators.len()
}

impl Agent for CodeAnalyst {
    fn name(&self) -> &str {
        CODE_ANALYST_NAME
    }

    fn analyze(&self, fingerprint: &RepositoryFingerprint) -> Result<AgentReport> {
        let mut findings = Vec::new();
        let mut total_complexity = 0usize;
        let mut function_count = 0usize;
        let (mut large_functions, mut large_classes, mut many_parameters) = (0i64, 0i64, 0i64);

        for artifact in &fingerprint.artifacts {
            match &artifact.kind {
                ArtifactKind::Function(details) => {
                    function_count += 1;
                    let complexity = complexity(details);
                    total_complexity += complexity;

                    let line_count = artifact.end_line - artifact.start_line + 1;
                    if line_count > self.large_function_lines {
                        large_functions += 1;
                        findings.push(
                            AgentFinding::new(
                                CODE_ANALYST_NAME,
                                Severity::Medium,
                                format!("Large function: {}", artifact.name),
                                format!(
                                    "Function '{}' has {} lines. Consider breaking it into smaller functions.",
                                    artifact.name, line_count
                                ),
                            )?
                            .at(&artifact.path, artifact.start_line)
                            .with_recommendation(
                                "Refactor into smaller, focused functions with single responsibilities.",
                            )
                            .with_metadata("line_count", i64::from(line_count))
                            .with_metadata("complexity", complexity as i64),
                        );
                    }

                    let parameter_count = details.parameters.len();
                    if parameter_count > self.many_parameters {
                        many_parameters += 1;
                        findings.push(
                            AgentFinding::new(
                                CODE_ANALYST_NAME,
                                Severity::Low,
                                format!("Function with many parameters: {}", artifact.name),
                                format!(
                                    "Function '{}' has {} parameters. Consider using a data structure.",
                                    artifact.name, parameter_count
                                ),
                            )?
                            .at(&artifact.path, artifact.start_line)
                            .with_recommendation(
                                "Consider using a dataclass or dictionary for parameter grouping.",
                            )
                            .with_metadata("parameter_count", parameter_count as i64),
                        );
                    }
                }
                ArtifactKind::Class(details) => {
                    let method_count = details.methods.len();
                    if method_count > self.large_class_methods {
                        large_classes += 1;
                        findings.push(
                            AgentFinding::new(
                                CODE_ANALYST_NAME,
                                Severity::Medium,
                                format!("Large class: {}", artifact.name),
                                format!(
                                    "Class '{}' has {} methods. Consider splitting responsibilities.",
                                    artifact.name, method_count
                                ),
                            )?
                            .at(&artifact.path, artifact.start_line)
                            .with_recommendation(
                                "Apply Single Responsibility Principle - split into multiple classes.",
                            )
                            .with_metadata("method_count", method_count as i64),
                        );
                    }
                }
                ArtifactKind::File(_) => {}
            }
        }

        let average_complexity = if function_count > 0 {
            total_complexity as f64 / function_count as f64
        } else {
            0.0
        };
        let summary = format!(
            "Analyzed {} functions and {} classes. Average complexity: {:.2}. Found {} large functions, {} large classes, and {} functions with many parameters.",
            function_count,
            fingerprint.total_classes,
            average_complexity,
            large_functions,
            large_classes,
            many_parameters
        );
        debug!("CodeAnalyst: {} findings", findings.len());

        let mut metadata = Metadata::new();
        metadata.insert("total_functions".into(), (function_count as i64).into());
        metadata.insert(
            "total_classes".into(),
            (fingerprint.total_classes as i64).into(),
        );
        metadata.insert("average_complexity".into(), average_complexity.into());
        metadata.insert("large_functions".into(), large_functions.into());
        metadata.insert("large_classes".into(), large_classes.into());
        metadata.insert("many_parameters".into(), many_parameters.into());

        AgentReport::new(
            CODE_ANALYST_NAME,
            findings,
            Vec::new(),
            Some(summary),
            metadata,
        )
    }
}
