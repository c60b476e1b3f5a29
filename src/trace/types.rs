//! Trace Model
//!
//! Events observed while a traced script runs, the heuristic risk score derived from them and
//! the aggregate [`ExecutionTrace`].
//!
//! `timestamp` and `execution_time` vary between runs; the record lists them in
//! `_non_deterministic_fields` so consumers can filter them before comparing traces.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::schema::SCHEMA_VERSION;
use crate::fingerprint::artifact::{Metadata, MetadataValue, canonical_metadata};
use crate::types::{Result, ScrError};

// =============================================================================
// Event Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    FileRead,
    FileWrite,
    FileDelete,
    ProcessSpawn,
    NetworkConnect,
    NetworkSend,
    NetworkReceive,
    SystemCall,
    ModuleImport,
}

impl TraceEventType {
    pub const ALL: [TraceEventType; 9] = [
        Self::FileRead,
        Self::FileWrite,
        Self::FileDelete,
        Self::ProcessSpawn,
        Self::NetworkConnect,
        Self::NetworkSend,
        Self::NetworkReceive,
        Self::SystemCall,
        Self::ModuleImport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::FileDelete => "file_delete",
            Self::ProcessSpawn => "process_spawn",
            Self::NetworkConnect => "network_connect",
            Self::NetworkSend => "network_send",
            Self::NetworkReceive => "network_receive",
            Self::SystemCall => "system_call",
            Self::ModuleImport => "module_import",
        }
    }

    pub fn is_file_mutation(&self) -> bool {
        matches!(self, Self::FileWrite | Self::FileDelete)
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::NetworkConnect | Self::NetworkSend | Self::NetworkReceive
        )
    }
}

impl fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraceEventType {
    type Err = ScrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ScrError::tracing(format!("Unknown trace event type: {}", s)))
    }
}

// =============================================================================
// Trace Event
// =============================================================================

/// Metadata key marking a synthetic failure event
pub const ERROR_KEY: &str = "error";
pub const TIMEOUT_ERROR: &str = "timeout";

/// One observed operation of the traced process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub event_type: TraceEventType,
    /// Seconds since the Unix epoch at which the tracer received the event
    pub timestamp: f64,
    pub file_path: Option<String>,
    pub process_id: Option<u32>,
    pub network_address: Option<String>,
    pub network_port: Option<u16>,
    pub command: Option<String>,
    pub module_name: Option<String>,
    pub metadata: Metadata,
}

impl TraceEvent {
    pub fn new(event_type: TraceEventType, timestamp: f64) -> Result<Self> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(ScrError::tracing("timestamp must be >= 0"));
        }
        Ok(Self {
            event_type,
            timestamp,
            file_path: None,
            process_id: None,
            network_address: None,
            network_port: None,
            command: None,
            module_name: None,
            metadata: Metadata::new(),
        })
    }

    /// Event stamped with the current wall-clock time
    pub fn now(event_type: TraceEventType) -> Result<Self> {
        Self::new(event_type, unix_now())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(ScrError::tracing("timestamp must be >= 0"));
        }
        if self.network_port == Some(0) {
            return Err(ScrError::tracing(
                "network_port must be between 1 and 65535 if provided",
            ));
        }
        Ok(())
    }

    pub fn is_timeout(&self) -> bool {
        self.metadata.get(ERROR_KEY).and_then(|v| v.as_str()) == Some(TIMEOUT_ERROR)
    }

    fn canonical_key(&self) -> Result<String> {
        Ok(serde_json::to_string(&(
            self.event_type,
            &self.file_path,
            self.process_id,
            &self.network_address,
            self.network_port,
            &self.command,
            &self.module_name,
            canonical_metadata(&self.metadata)?,
        ))?)
    }
}

pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// =============================================================================
// Risk Score
// =============================================================================

/// Heuristic, deterministic score in `[0, max_score]`
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScore {
    pub score: f64,
    pub max_score: f64,
    pub factors: BTreeMap<String, f64>,
    pub explanation: String,
}

impl RiskScore {
    pub fn new(
        score: f64,
        max_score: f64,
        factors: BTreeMap<String, f64>,
        explanation: impl Into<String>,
    ) -> Result<Self> {
        if max_score.is_nan() || max_score <= 0.0 {
            return Err(ScrError::tracing("max_score must be > 0"));
        }
        if score.is_nan() || score < 0.0 {
            return Err(ScrError::tracing("score must be >= 0"));
        }
        if score > max_score {
            return Err(ScrError::tracing(format!(
                "score ({}) cannot exceed max_score ({})",
                score, max_score
            )));
        }
        if let Some((name, _)) = factors.iter().find(|(_, v)| v.is_nan() || **v < 0.0) {
            return Err(ScrError::tracing(format!(
                "factor '{}' value must be >= 0",
                name
            )));
        }
        Ok(Self {
            score,
            max_score,
            factors,
            explanation: explanation.into(),
        })
    }

    pub fn normalized(&self) -> f64 {
        self.score / self.max_score
    }
}

impl Serialize for RiskScore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("RiskScore", 5)?;
        s.serialize_field("score", &self.score)?;
        s.serialize_field("max_score", &self.max_score)?;
        s.serialize_field("normalized", &self.normalized())?;
        s.serialize_field("factors", &self.factors)?;
        s.serialize_field("explanation", &self.explanation)?;
        s.end()
    }
}

// =============================================================================
// Execution Trace
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionTrace {
    pub script_path: PathBuf,
    /// Deduplicated, ordered by timestamp
    pub events: Vec<TraceEvent>,
    pub exit_code: i32,
    pub execution_time: f64,
    pub risk_score: Option<RiskScore>,
    pub stdout: String,
    pub stderr: String,
    pub metadata: Metadata,
}

impl ExecutionTrace {
    pub fn new(
        script_path: impl Into<PathBuf>,
        events: impl IntoIterator<Item = TraceEvent>,
        exit_code: i32,
        execution_time: f64,
    ) -> Result<Self> {
        if !execution_time.is_finite() || execution_time < 0.0 {
            return Err(ScrError::tracing("execution_time must be >= 0"));
        }

        let mut keyed = events
            .into_iter()
            .map(|e| {
                e.validate()?;
                Ok((e.canonical_key()?, e))
            })
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(event_order);
        keyed.dedup_by(|a, b| a.0 == b.0 && a.1.timestamp == b.1.timestamp);

        Ok(Self {
            script_path: script_path.into(),
            events: keyed.into_iter().map(|(_, e)| e).collect(),
            exit_code,
            execution_time,
            risk_score: None,
            stdout: String::new(),
            stderr: String::new(),
            metadata: Metadata::new(),
        })
    }

    pub fn with_risk_score(mut self, risk_score: RiskScore) -> Self {
        self.risk_score = Some(risk_score);
        self
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn count(&self, predicate: impl Fn(&TraceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    pub fn timed_out(&self) -> bool {
        self.events.iter().any(TraceEvent::is_timeout)
    }

    pub fn to_record(&self) -> TraceRecord<'_> {
        TraceRecord {
            schema_version: SCHEMA_VERSION,
            script_path: self.script_path.to_string_lossy().into_owned(),
            events: &self.events,
            exit_code: self.exit_code,
            execution_time: self.execution_time,
            risk_score: self.risk_score.as_ref(),
            stdout: &self.stdout,
            stderr: &self.stderr,
            metadata: &self.metadata,
            non_deterministic_fields: NON_DETERMINISTIC_FIELDS,
            proof_obligations: TraceObligations::default(),
        }
    }
}

fn event_order(a: &(String, TraceEvent), b: &(String, TraceEvent)) -> Ordering {
    a.1.timestamp
        .total_cmp(&b.1.timestamp)
        .then_with(|| a.0.cmp(&b.0))
}

pub const NON_DETERMINISTIC_FIELDS: &[&str] = &["execution_time", "events[].timestamp"];

/// Top-level fields of a serialized trace
pub const TRACE_RECORD_FIELDS: &[&str] = &[
    "schema_version",
    "script_path",
    "events",
    "exit_code",
    "execution_time",
    "risk_score",
    "stdout",
    "stderr",
    "metadata",
    "_non_deterministic_fields",
    "proof_obligations",
];

#[derive(Debug, Serialize)]
pub struct TraceRecord<'a> {
    pub schema_version: u32,
    pub script_path: String,
    pub events: &'a [TraceEvent],
    pub exit_code: i32,
    pub execution_time: f64,
    pub risk_score: Option<&'a RiskScore>,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub metadata: &'a Metadata,
    #[serde(rename = "_non_deterministic_fields")]
    pub non_deterministic_fields: &'static [&'static str],
    pub proof_obligations: TraceObligations,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TraceObligations {
    pub requires_non_deterministic_filtering: bool,
    pub invalid_comparison_if_not_filtered: bool,
    pub risk_score_is_heuristic_not_security_rating: bool,
    pub execution_time_is_not_performance_metric: bool,
    pub contract_violation_if_fields_ignored: bool,
}

impl Default for TraceObligations {
    fn default() -> Self {
        Self {
            requires_non_deterministic_filtering: true,
            invalid_comparison_if_not_filtered: true,
            risk_score_is_heuristic_not_security_rating: true,
            execution_time_is_not_performance_metric: true,
            contract_violation_if_fields_ignored: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        for t in TraceEventType::ALL {
            assert_eq!(t.as_str().parse::<TraceEventType>().unwrap(), t);
        }
        assert!("file_execute".parse::<TraceEventType>().is_err());
        assert!(TraceEventType::FileDelete.is_file_mutation());
        assert!(TraceEventType::NetworkReceive.is_network());
    }

    #[test]
    fn test_event_validation() {
        assert!(TraceEvent::new(TraceEventType::FileRead, -1.0).is_err());
        assert!(TraceEvent::new(TraceEventType::FileRead, f64::NAN).is_err());

        let mut event = TraceEvent::new(TraceEventType::NetworkConnect, 1.0).unwrap();
        event.network_port = Some(0);
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_timeout_event() {
        let event = TraceEvent::new(TraceEventType::SystemCall, 1.0)
            .unwrap()
            .with_metadata(ERROR_KEY, TIMEOUT_ERROR);
        assert!(event.is_timeout());
    }

    #[test]
    fn test_risk_score_validation() {
        assert!(RiskScore::new(-1.0, 100.0, BTreeMap::new(), "").is_err());
        assert!(RiskScore::new(101.0, 100.0, BTreeMap::new(), "").is_err());
        assert!(RiskScore::new(0.0, 0.0, BTreeMap::new(), "").is_err());

        let factors = BTreeMap::from([("bad".to_string(), -1.0)]);
        assert!(RiskScore::new(0.0, 100.0, factors, "").is_err());

        let score = RiskScore::new(25.0, 100.0, BTreeMap::new(), "").unwrap();
        assert_eq!(score.normalized(), 0.25);
    }

    #[test]
    fn test_trace_orders_and_deduplicates_events() {
        let late = TraceEvent::new(TraceEventType::FileRead, 5.0).unwrap();
        let early = TraceEvent::new(TraceEventType::ModuleImport, 2.0).unwrap();
        let trace =
            ExecutionTrace::new("/tmp/s.py", vec![late.clone(), early.clone(), late], 0, 0.1)
                .unwrap();
        assert_eq!(trace.events, vec![early, TraceEvent::new(TraceEventType::FileRead, 5.0).unwrap()]);
    }

    #[test]
    fn test_trace_rejects_negative_time() {
        assert!(ExecutionTrace::new("/tmp/s.py", Vec::new(), 0, -0.5).is_err());
    }

    #[test]
    fn test_record_shape() {
        let score = RiskScore::new(10.0, 100.0, BTreeMap::new(), "x").unwrap();
        let trace = ExecutionTrace::new("/tmp/s.py", Vec::new(), 1, 0.2)
            .unwrap()
            .with_risk_score(score)
            .with_output("out", "err");
        let value = serde_json::to_value(trace.to_record()).unwrap();

        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        let mut expected = TRACE_RECORD_FIELDS.to_vec();
        expected.sort();
        let mut keys_sorted = keys.clone();
        keys_sorted.sort();
        assert_eq!(keys_sorted, expected);
        assert_eq!(value["risk_score"]["normalized"], 0.1);
        assert_eq!(value["_non_deterministic_fields"][1], "events[].timestamp");
        assert_eq!(value["proof_obligations"]["risk_score_is_heuristic_not_security_rating"], true);
    }
}
