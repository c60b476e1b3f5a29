//! Unified Error Type System
//!
//! Centralized error type for the whole crate.
//!
//! ## Error Taxonomy
//!
//! - **Validation**: bad paths, bad constructor arguments (raised immediately)
//! - **Integrity**: artifact data that cannot be rendered deterministically (always raised)
//! - **Partial data**: unreadable files, syntax errors, failing agents (never raised, recorded
//!   as status metadata by the component that hits them)
//! - **Sandbox**: child process failures while tracing (converted into trace output)

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Coarse classification used in logs and tracer error events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Integrity,
    Io,
    Parse,
    Agent,
    Sandbox,
    Reporting,
    Contract,
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Integrity => "integrity",
            Self::Io => "io",
            Self::Parse => "parse",
            Self::Agent => "agent",
            Self::Sandbox => "sandbox",
            Self::Reporting => "reporting",
            Self::Contract => "contract",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ScrError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Parse error in {path}: {message}")]
    Parse { message: String, path: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Fingerprinting error: {0}")]
    Fingerprinting(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Tracing error: {0}")]
    Tracing(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Reporting error: {0}")]
    Reporting(String),

    #[error("CONTRACT VIOLATION: {0}")]
    ContractViolation(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ScrError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl ScrError {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn fingerprinting(message: impl Into<String>) -> Self {
        Self::Fingerprinting(message.into())
    }

    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent(message.into())
    }

    pub fn tracing(message: impl Into<String>) -> Self {
        Self::Tracing(message.into())
    }

    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::Sandbox(message.into())
    }

    pub fn reporting(message: impl Into<String>) -> Self {
        Self::Reporting(message.into())
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    /// Classify this error for logs and tracer error events
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) => ErrorCategory::Io,
            Self::Json(_) | Self::Parse { .. } => ErrorCategory::Parse,
            Self::Validation(_) | Self::Tracing(_) => ErrorCategory::Validation,
            Self::Fingerprinting(_) => ErrorCategory::Integrity,
            Self::Agent(_) => ErrorCategory::Agent,
            Self::Sandbox(_) => ErrorCategory::Sandbox,
            Self::Reporting(_) => ErrorCategory::Reporting,
            Self::ContractViolation(_) => ErrorCategory::Contract,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Partial-data conditions are absorbed into status, never propagated
    pub fn is_partial_data(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Parse { .. })
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Wrap a foreign error as a reporting error with context
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| ScrError::Reporting(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| ScrError::Reporting(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScrError::fingerprinting("Repository path does not exist: /nope");
        assert_eq!(
            err.to_string(),
            "Fingerprinting error: Repository path does not exist: /nope"
        );

        let err = ScrError::contract("execution_status must be COMPLETE");
        assert_eq!(
            err.to_string(),
            "CONTRACT VIOLATION: execution_status must be COMPLETE"
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            ScrError::fingerprinting("x").category(),
            ErrorCategory::Integrity
        );
        assert_eq!(ScrError::tracing("x").category(), ErrorCategory::Validation);
        assert_eq!(ScrError::sandbox("x").category().as_str(), "sandbox");

        let io = ScrError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(io.category(), ErrorCategory::Io);
        assert!(io.is_partial_data());
        assert!(!ScrError::agent("x").is_partial_data());
    }

    #[test]
    fn test_result_ext_context() {
        let failed: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = failed.with_context("Failed to write report").unwrap_err();
        assert!(matches!(err, ScrError::Reporting(_)));
        assert!(err.to_string().contains("Failed to write report: denied"));
    }
}
