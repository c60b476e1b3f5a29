//! Execution Tracer
//!
//! Sandboxed execution of a script with structured event capture and heuristic risk scoring.
//!
//! ```text
//! Idle -> Launching -> Running -> { Completed | TimedOut | Crashed } -> Scored
//! ```
//!
//! - [`bootstrap`]: instrumentation program run inside the child interpreter
//! - [`protocol`]: `SCR_TRACE:<type>|k=v,...` line parsing
//! - [`scoring`]: deterministic risk score
//! - [`tracer`]: async subprocess runner with timeout and bounded output

pub mod bootstrap;
pub mod protocol;
pub mod scoring;
pub mod tracer;
pub mod types;

pub use scoring::ScoringPolicy;
pub use tracer::{ExecutionTracer, TraceOptions};
pub use types::{
    ExecutionTrace, RiskScore, TRACE_RECORD_FIELDS, TraceEvent, TraceEventType, TraceRecord,
};
