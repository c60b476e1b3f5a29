//! Output Contracts
//!
//! Checks run on the serialized outputs before the CLI reports success.
//!
//! A run may exit 0 only when:
//! - the fingerprint status is complete (`COMPLETE_NO_SKIPS` or `COMPLETE_WITH_SKIPS`)
//! - the merged agent report has `execution_status == COMPLETE`
//! - both records carry a `proof_obligations` object of booleans whose structural
//!   obligations are all `true`

use serde_json::Value;

use crate::agents::{AgentReport, ExecutionStatus};
use crate::config::OutputFormat;
use crate::fingerprint::{FingerprintStatus, RepositoryFingerprint};
use crate::types::{Result, ScrError};

/// Obligations that hold for every record regardless of status
const STRUCTURAL_OBLIGATIONS: &[&str] = &[
    "requires_status_check",
    "invalid_if_ignored",
    "contract_violation_if_status_ignored",
    "requires_execution_status_check",
];

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Every obligation must be a bool; structural ones must be `true`.
pub fn enforce_proof_obligations(obligations: &Value, context: &str) -> Result<()> {
    let map = obligations.as_object().ok_or_else(|| {
        ScrError::contract(format!(
            "[{}] proof_obligations must be an object, got {}",
            context,
            json_type(obligations)
        ))
    })?;

    for (key, value) in map {
        let Some(flag) = value.as_bool() else {
            return Err(ScrError::contract(format!(
                "[{}] proof_obligations[{}] must be bool, got {}",
                context,
                key,
                json_type(value)
            )));
        };
        if STRUCTURAL_OBLIGATIONS.contains(&key.as_str()) && !flag {
            return Err(ScrError::contract(format!(
                "[{}] proof_obligations[{}] must be true (structural obligation), got false",
                context, key
            )));
        }
    }
    Ok(())
}

pub fn enforce_status_contract(
    fingerprint_status: FingerprintStatus,
    execution_status: ExecutionStatus,
) -> Result<()> {
    if !fingerprint_status.is_complete() {
        return Err(ScrError::contract(format!(
            "fingerprint_status must be COMPLETE_NO_SKIPS or COMPLETE_WITH_SKIPS for success, got {}",
            fingerprint_status
        )));
    }
    if execution_status != ExecutionStatus::Complete {
        return Err(ScrError::contract(format!(
            "execution_status must be COMPLETE for success, got {}",
            execution_status.as_str()
        )));
    }
    Ok(())
}

/// Schema version must match and no field outside `known_fields` may appear.
pub fn enforce_schema_contract(
    record: &Value,
    expected_version: u32,
    known_fields: &[&str],
    context: &str,
) -> Result<()> {
    let map = record.as_object().ok_or_else(|| {
        ScrError::contract(format!(
            "[{}] record must be an object, got {}",
            context,
            json_type(record)
        ))
    })?;

    let version = map.get("schema_version").ok_or_else(|| {
        ScrError::contract(format!("[{}] schema_version must be present", context))
    })?;
    if version.as_u64() != Some(u64::from(expected_version)) {
        return Err(ScrError::contract(format!(
            "[{}] schema_version must be {}, got {}",
            context, expected_version, version
        )));
    }

    let mut unknown: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|k| !known_fields.contains(k))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(ScrError::contract(format!(
            "[{}] Unknown fields not allowed: {:?}",
            context, unknown
        )));
    }
    Ok(())
}

fn enforce_record_obligations(record: &Value, context: &str) -> Result<()> {
    let obligations = record.get("proof_obligations").ok_or_else(|| {
        ScrError::contract(format!(
            "{} proof_obligations must be present in output",
            context
        ))
    })?;
    enforce_proof_obligations(obligations, context)
}

/// Success predicate checked before a zero exit code; no-op for other exit codes.
pub fn enforce_success_predicate(
    fingerprint: &RepositoryFingerprint,
    report: &AgentReport,
    exit_code: i32,
) -> Result<()> {
    if exit_code != 0 {
        return Ok(());
    }

    enforce_status_contract(fingerprint.status, report.execution_status()?)?;

    let fingerprint_record = serde_json::to_value(fingerprint.to_record())?;
    enforce_record_obligations(&fingerprint_record, "fingerprint")?;

    let report_record = serde_json::to_value(report.to_record()?)?;
    enforce_record_obligations(&report_record, "agent_report")
}

/// JSON output must parse as one or more concatenated documents (pretty or NDJSON).
pub fn enforce_output_contract(output: &str, format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Json {
        return Ok(());
    }

    for document in serde_json::Deserializer::from_str(output).into_iter::<Value>() {
        document.map_err(|e| {
            ScrError::contract(format!("JSON output must be valid JSON: {}", e))
        })?;
    }
    Ok(())
}
