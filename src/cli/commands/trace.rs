//! Trace Command
//!
//! Runs a script under the sandboxed tracer and reports its events and risk score.
//!
//! Usage:
//!   scr trace <SCRIPT> [ARGS...] [-o FILE] [-f text|json] [-t SECS]
//!             [--allow-network] [--allow-file-write] [--interpreter PATH]
//!
//! Once the first script argument is seen, everything after it goes to the script.

use std::path::Path;

use crate::cli::ui::Output;
use crate::config::OutputFormat;
use crate::report::{Reporter, enforce_output_contract};
use crate::trace::{ExecutionTracer, TraceOptions};
use crate::types::Result;

pub async fn run(
    script: &Path,
    args: &[String],
    output: Option<&Path>,
    format: OutputFormat,
    options: TraceOptions,
) -> Result<()> {
    let tracer = ExecutionTracer::new(options)?;
    let trace = tracer.trace(script, args).await?;

    let ui = Output::new();
    if trace.timed_out() {
        ui.warning(&format!(
            "Script timed out after {}s",
            tracer.options().timeout_secs
        ));
    }

    let reporter = Reporter::for_format(format);
    let rendered = reporter.report_trace(&trace, output)?;
    match output {
        Some(path) => ui.success(&format!("Trace written to: {}", path.display())),
        None => {
            enforce_output_contract(&rendered, format)?;
            println!("{}", rendered);
        }
    }
    Ok(())
}
