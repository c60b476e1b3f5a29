//! Configuration Types
//!
//! All configuration structures with defaults matching the built-in constants.
//! Supports global (~/.config/scr/) and project (.scr/) level configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{agents, tracer, traversal};
use crate::types::{Result, ScrError};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Repository traversal settings
    pub fingerprint: FingerprintConfig,

    /// Review agent thresholds
    pub agents: AgentsConfig,

    /// Execution tracer sandbox settings
    pub tracer: TracerConfig,

    /// Report output settings
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            fingerprint: FingerprintConfig::default(),
            agents: AgentsConfig::default(),
            tracer: TracerConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ScrError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !self.tracer.timeout_secs.is_finite() || self.tracer.timeout_secs <= 0.0 {
            return Err(ScrError::Config(format!(
                "tracer.timeout_secs must be greater than 0, got {}",
                self.tracer.timeout_secs
            )));
        }

        if self.tracer.max_output_bytes == 0 {
            return Err(ScrError::Config(
                "tracer.max_output_bytes must be greater than 0".to_string(),
            ));
        }

        if self.tracer.interpreter.trim().is_empty() {
            return Err(ScrError::Config(
                "tracer.interpreter cannot be empty".to_string(),
            ));
        }

        if self.agents.large_function_lines == 0
            || self.agents.large_class_methods == 0
            || self.agents.many_parameters == 0
        {
            return Err(ScrError::Config(
                "agent thresholds must be greater than 0".to_string(),
            ));
        }

        if self.fingerprint.max_file_size == 0 {
            return Err(ScrError::Config(
                "fingerprint.max_file_size must be greater than 0".to_string(),
            ));
        }

        for pattern in &self.fingerprint.exclude {
            glob::Pattern::new(pattern).map_err(|e| {
                ScrError::Config(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }

        Ok(())
    }
}

// =============================================================================
// Fingerprint Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Extra glob patterns (relative to the repository root) to skip
    pub exclude: Vec<String>,

    /// Supported files larger than this (bytes) are recorded as failed
    pub max_file_size: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            max_file_size: traversal::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

// =============================================================================
// Agents Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Functions spanning more lines than this are "large"
    pub large_function_lines: u32,

    /// Classes with more methods than this are "large"
    pub large_class_methods: usize,

    /// Functions with more parameters than this get a finding and a patch
    pub many_parameters: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            large_function_lines: agents::LARGE_FUNCTION_LINES,
            large_class_methods: agents::LARGE_CLASS_METHODS,
            many_parameters: agents::MANY_PARAMETERS,
        }
    }
}

// =============================================================================
// Tracer Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Wall-clock timeout in seconds
    pub timeout_secs: f64,

    /// Per-stream bound on captured output
    pub max_output_bytes: usize,

    pub allow_network: bool,
    pub allow_file_write: bool,

    /// Interpreter that runs traced scripts
    pub interpreter: String,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: tracer::DEFAULT_TIMEOUT_SECS,
            max_output_bytes: tracer::DEFAULT_MAX_OUTPUT_BYTES,
            allow_network: false,
            allow_file_write: false,
            interpreter: tracer::DEFAULT_INTERPRETER.to_string(),
        }
    }
}

// =============================================================================
// Output Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid format '{}'. Valid values: text, json", s)),
        }
    }
}
