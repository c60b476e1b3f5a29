//! Execution Tracer
//!
//! Runs a script under the instrumentation bootstrap in a child interpreter, bounded by a
//! wall-clock timeout, and turns whatever happened into an [`ExecutionTrace`].
//!
//! ## Failure handling
//!
//! Only the two preconditions (script exists, script is a regular file) are returned as
//! errors. Timeouts, launch failures and wait failures all become a trace with exit code `-1`,
//! a synthetic `system_call` event and the output captured up to that point.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::bootstrap::BOOTSTRAP;
use super::protocol::LineScanner;
use super::scoring::{self, ScoringPolicy};
use super::types::{ERROR_KEY, ExecutionTrace, TIMEOUT_ERROR, TraceEvent, TraceEventType, unix_now};
use crate::config::TracerConfig;
use crate::constants::tracer::{
    DEFAULT_INTERPRETER, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECS, ENV_NO_FILE_WRITE,
    ENV_NO_NETWORK, ENV_TRACE_MODE, READER_GRACE_MS, SENTINEL_EXIT_CODE,
};
use crate::fingerprint::Metadata;
use crate::types::{Result, ScrError};

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TraceOptions {
    pub timeout_secs: f64,
    pub max_output_bytes: usize,
    pub allow_network: bool,
    pub allow_file_write: bool,
    pub interpreter: String,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            allow_network: false,
            allow_file_write: false,
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }
}

impl TraceOptions {
    pub fn from_config(config: &TracerConfig) -> Self {
        Self {
            timeout_secs: config.timeout_secs,
            max_output_bytes: config.max_output_bytes,
            allow_network: config.allow_network,
            allow_file_write: config.allow_file_write,
            interpreter: config.interpreter.clone(),
        }
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    pub fn with_file_write(mut self, allow: bool) -> Self {
        self.allow_file_write = allow;
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(ScrError::tracing("timeout must be > 0"));
        }
        self.timeout()?;
        if self.max_output_bytes == 0 {
            return Err(ScrError::tracing("max_output_size must be > 0"));
        }
        if self.interpreter.trim().is_empty() {
            return Err(ScrError::tracing("interpreter cannot be empty"));
        }
        Ok(())
    }

    fn timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout_secs).map_err(|e| {
            ScrError::tracing(format!("timeout {}s is out of range: {}", self.timeout_secs, e))
        })
    }

    fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            allow_network: self.allow_network,
            allow_file_write: self.allow_file_write,
            timeout_secs: self.timeout_secs,
        }
    }
}

// =============================================================================
// Output Capture
// =============================================================================

/// One child stream: bounded text plus the protocol events found in it
#[derive(Debug)]
struct OutputCapture {
    limit: usize,
    bytes: Vec<u8>,
    truncated: bool,
    scanner: LineScanner,
}

impl OutputCapture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            bytes: Vec::new(),
            truncated: false,
            scanner: LineScanner::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.scanner.push(chunk, unix_now());
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn finish(self) -> (String, Vec<TraceEvent>) {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(&format!("\n... (truncated, max {} bytes)", self.limit));
        }
        (text, self.scanner.finish(unix_now()))
    }
}

type SharedCapture = Arc<Mutex<OutputCapture>>;

fn pump<R>(mut reader: R, capture: SharedCapture) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => capture.lock().await.push(&buf[..n]),
                Err(e) => {
                    debug!("Tracer: output stream closed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Wait for a reader, abandoning it after the grace period (grandchildren may keep pipes open).
async fn drain(handle: JoinHandle<()>, capture: SharedCapture, limit: usize) -> OutputCapture {
    let abort = handle.abort_handle();
    if tokio::time::timeout(Duration::from_millis(READER_GRACE_MS), handle)
        .await
        .is_err()
    {
        debug!("Tracer: output reader did not finish, abandoning");
        abort.abort();
    }
    let mut guard = capture.lock().await;
    std::mem::replace(&mut *guard, OutputCapture::new(limit))
}

// =============================================================================
// Tracer
// =============================================================================

enum Termination {
    Exited(i32),
    TimedOut,
    Failed(ScrError),
}

struct Execution {
    termination: Termination,
    stdout: OutputCapture,
    stderr: OutputCapture,
}

pub struct ExecutionTracer {
    options: TraceOptions,
}

impl ExecutionTracer {
    pub fn new(options: TraceOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    /// Trace one run of `script_path` with `args`.
    pub async fn trace(&self, script_path: &Path, args: &[String]) -> Result<ExecutionTrace> {
        let script = resolve_script(script_path)?;
        info!("Tracer: tracing execution of {}", script.display());

        let started = Instant::now();
        let mut events = Vec::new();

        let (exit_code, stdout, stderr) = match self.execute(&script, args).await {
            Ok(execution) => {
                let (stdout, stdout_events) = execution.stdout.finish();
                let (stderr, stderr_events) = execution.stderr.finish();
                events.extend(stdout_events);
                events.extend(stderr_events);

                match execution.termination {
                    Termination::Exited(code) => (code, stdout, stderr),
                    Termination::TimedOut => {
                        warn!(
                            "Tracer: execution timed out after {:.2}s",
                            started.elapsed().as_secs_f64()
                        );
                        events.push(
                            TraceEvent::now(TraceEventType::SystemCall)?
                                .with_metadata(ERROR_KEY, TIMEOUT_ERROR)
                                .with_metadata("timeout_seconds", self.options.timeout_secs),
                        );
                        let stderr = format!(
                            "{}\nExecution timed out after {:?}s",
                            stderr, self.options.timeout_secs
                        );
                        (SENTINEL_EXIT_CODE, stdout, stderr)
                    }
                    Termination::Failed(e) => {
                        error!("Tracer: execution failed: {}", e);
                        events.push(failure_event(&e)?);
                        let stderr = if stderr.is_empty() {
                            e.to_string()
                        } else {
                            format!("{}\n{}", stderr, e)
                        };
                        (SENTINEL_EXIT_CODE, stdout, stderr)
                    }
                }
            }
            Err(e) => {
                error!("Tracer: execution failed: {}", e);
                events.push(failure_event(&e)?);
                (SENTINEL_EXIT_CODE, String::new(), e.to_string())
            }
        };

        let execution_time = started.elapsed().as_secs_f64();
        let trace = self.assemble(&script, events, exit_code, execution_time)?;
        Ok(trace.with_output(stdout, stderr))
    }

    /// Score the raw observations, then collapse them into the trace's event set.
    fn assemble(
        &self,
        script: &Path,
        events: Vec<TraceEvent>,
        exit_code: i32,
        execution_time: f64,
    ) -> Result<ExecutionTrace> {
        let risk = scoring::score(
            &events,
            exit_code,
            execution_time,
            &self.options.scoring_policy(),
        )?;
        let trace = ExecutionTrace::new(script, events, exit_code, execution_time)?;
        info!(
            "Tracer: exit code {}, {} events, risk {:.1}/{:.0}",
            exit_code,
            trace.events.len(),
            risk.score,
            risk.max_score
        );

        let mut metadata = Metadata::new();
        metadata.insert("timeout".into(), self.options.timeout_secs.into());
        metadata.insert("allow_network".into(), self.options.allow_network.into());
        metadata.insert("allow_file_write".into(), self.options.allow_file_write.into());

        Ok(trace.with_risk_score(risk).with_metadata(metadata))
    }

    fn command(&self, script: &Path, args: &[String]) -> Command {
        let flag = |on: bool| if on { "1" } else { "0" };

        let mut cmd = Command::new(&self.options.interpreter);
        cmd.arg("-c")
            .arg(BOOTSTRAP)
            .arg(script)
            .args(args)
            .env(ENV_NO_NETWORK, flag(!self.options.allow_network))
            .env(ENV_NO_FILE_WRITE, flag(!self.options.allow_file_write))
            .env(ENV_TRACE_MODE, "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = script.parent() {
            cmd.current_dir(dir);
        }
        cmd
    }

    async fn execute(&self, script: &Path, args: &[String]) -> Result<Execution> {
        let limit = self.options.max_output_bytes;
        let mut child = self.command(script, args).spawn().map_err(|e| {
            ScrError::sandbox(format!(
                "Sandbox execution failed: could not launch {}: {}",
                self.options.interpreter, e
            ))
        })?;
        debug!("Tracer: spawned pid {:?}", child.id());

        let stdout_capture = Arc::new(Mutex::new(OutputCapture::new(limit)));
        let stderr_capture = Arc::new(Mutex::new(OutputCapture::new(limit)));
        let stdout_reader = child
            .stdout
            .take()
            .map(|out| pump(out, Arc::clone(&stdout_capture)));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| pump(err, Arc::clone(&stderr_capture)));

        let timeout = self.options.timeout()?;
        let termination = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => Termination::Exited(exit_code(status)),
            Ok(Err(e)) => Termination::Failed(ScrError::sandbox(format!(
                "Sandbox execution failed: {}",
                e
            ))),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Tracer: failed to kill timed-out child: {}", e);
                }
                Termination::TimedOut
            }
        };

        let stdout = match stdout_reader {
            Some(handle) => drain(handle, stdout_capture, limit).await,
            None => OutputCapture::new(limit),
        };
        let stderr = match stderr_reader {
            Some(handle) => drain(handle, stderr_capture, limit).await,
            None => OutputCapture::new(limit),
        };

        Ok(Execution {
            termination,
            stdout,
            stderr,
        })
    }
}

fn resolve_script(script_path: &Path) -> Result<PathBuf> {
    if !script_path.exists() {
        return Err(ScrError::tracing(format!(
            "Script path does not exist: {}",
            script_path.display()
        )));
    }
    let script = script_path.canonicalize().map_err(|e| {
        ScrError::tracing(format!(
            "Cannot resolve script path {}: {}",
            script_path.display(),
            e
        ))
    })?;
    if !script.is_file() {
        return Err(ScrError::tracing(format!(
            "Script path is not a file: {}",
            script.display()
        )));
    }
    Ok(script)
}

fn failure_event(e: &ScrError) -> Result<TraceEvent> {
    Ok(TraceEvent::now(TraceEventType::SystemCall)?
        .with_metadata(ERROR_KEY, e.to_string())
        .with_metadata("error_type", e.category().as_str()))
}

/// Exit code of the child; a signal-terminated child reports `-signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    SENTINEL_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn python_available() -> bool {
        std::process::Command::new(DEFAULT_INTERPRETER)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn tracer(options: TraceOptions) -> ExecutionTracer {
        ExecutionTracer::new(options).unwrap()
    }

    #[test]
    fn test_option_validation() {
        assert!(ExecutionTracer::new(TraceOptions::default().with_timeout(0.0)).is_err());
        assert!(ExecutionTracer::new(TraceOptions::default().with_timeout(f64::NAN)).is_err());
        assert!(ExecutionTracer::new(TraceOptions::default().with_max_output_bytes(0)).is_err());
        assert!(ExecutionTracer::new(TraceOptions::default().with_interpreter(" ")).is_err());
        assert!(ExecutionTracer::new(TraceOptions::default()).is_ok());
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let err = ExecutionTracer::new(TraceOptions::default().with_timeout(1e20))
            .err()
            .unwrap();
        assert!(matches!(err, ScrError::Tracing(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_repeated_operations_are_all_scored() {
        let mut capture = OutputCapture::new(1024);
        capture.push(b"SCR_TRACE:file_write|file=out.txt\n".repeat(4).as_slice());
        let (_, events) = capture.finish();
        assert_eq!(events.len(), 4);

        let trace = tracer(TraceOptions::default())
            .assemble(Path::new("/tmp/s.py"), events, 0, 0.1)
            .unwrap();
        let risk = trace.risk_score.unwrap();
        assert_eq!(risk.factors.get("unauthorized_file_operations"), Some(&20.0));
        assert_eq!(risk.score, 20.0);
    }

    #[test]
    fn test_output_capture_truncates() {
        let mut capture = OutputCapture::new(5);
        capture.push(b"abc");
        capture.push(b"defgh");
        let (text, events) = capture.finish();
        assert_eq!(text, "abcde\n... (truncated, max 5 bytes)");
        assert!(events.is_empty());
    }

    #[test]
    fn test_output_capture_parses_beyond_limit() {
        let mut capture = OutputCapture::new(4);
        capture.push(b"noise\nSCR_TRACE:file_read|file=x.txt\n");
        let (text, events) = capture.finish();
        assert!(text.starts_with("nois\n..."));
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_script() {
        let err = tracer(TraceOptions::default())
            .trace(Path::new("/nonexistent/script.py"), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Script path does not exist"));
    }

    #[tokio::test]
    async fn test_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = tracer(TraceOptions::default())
            .trace(dir.path(), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Script path is not a file"));
    }

    #[tokio::test]
    async fn test_launch_failure_becomes_trace() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "s.py", "print('hi')\n");
        let trace = tracer(TraceOptions::default().with_interpreter("/nonexistent/python"))
            .trace(&path, &[])
            .await
            .unwrap();

        assert_eq!(trace.exit_code, -1);
        assert_eq!(trace.events.len(), 1);
        let event = &trace.events[0];
        assert_eq!(event.event_type, TraceEventType::SystemCall);
        assert_eq!(
            event.metadata.get("error_type").and_then(|v| v.as_str()),
            Some("sandbox")
        );
        assert!(trace.stderr.contains("could not launch"));
        let risk = trace.risk_score.unwrap();
        assert_eq!(risk.factors.get("non_zero_exit"), Some(&10.0));
    }

    #[tokio::test]
    async fn test_simple_script() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "hello.py", "import sys\nprint('hello', sys.argv[1:])\n");
        let trace = tracer(TraceOptions::default())
            .trace(&path, &["x".to_string()])
            .await
            .unwrap();

        assert_eq!(trace.exit_code, 0);
        assert_eq!(trace.stdout.trim(), "hello ['x']");
        assert_eq!(trace.metadata.get("allow_network").and_then(|v| match v {
            crate::fingerprint::MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }), Some(false));
        assert!(trace.risk_score.unwrap().factors.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_write_and_spawn() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = script(
            &dir,
            "risky.py",
            "import subprocess, sys\n\
             try:\n    open('out.txt', 'w')\nexcept PermissionError:\n    print('blocked')\n\
             subprocess.run([sys.executable, '-c', 'pass'])\n",
        );
        let trace = tracer(TraceOptions::default()).trace(&path, &[]).await.unwrap();

        assert_eq!(trace.exit_code, 0);
        assert!(trace.stdout.contains("blocked"));
        assert!(!dir.path().join("out.txt").exists());
        assert_eq!(trace.count(|e| e.event_type == TraceEventType::FileWrite), 1);
        assert!(trace.count(|e| e.event_type == TraceEventType::ProcessSpawn) >= 1);

        let risk = trace.risk_score.unwrap();
        assert_eq!(risk.factors.get("unauthorized_file_operations"), Some(&5.0));
        assert!(risk.factors.contains_key("process_execution"));
    }

    #[tokio::test]
    async fn test_repeated_blocked_writes() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = script(
            &dir,
            "writes.py",
            "for _ in range(4):\n    try:\n        open('out.txt', 'w')\n    except PermissionError:\n        pass\n",
        );
        let trace = tracer(TraceOptions::default()).trace(&path, &[]).await.unwrap();

        assert_eq!(trace.exit_code, 0);
        let risk = trace.risk_score.unwrap();
        assert_eq!(risk.factors.get("unauthorized_file_operations"), Some(&20.0));
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "fail.py", "raise SystemExit(3)\n");
        let trace = tracer(TraceOptions::default()).trace(&path, &[]).await.unwrap();
        assert_eq!(trace.exit_code, 3);
        assert_eq!(trace.risk_score.unwrap().factors.get("non_zero_exit"), Some(&10.0));
    }

    #[tokio::test]
    async fn test_timeout() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "sleepy.py", "import time\nprint('start', flush=True)\ntime.sleep(30)\n");
        let started = Instant::now();
        let trace = tracer(TraceOptions::default().with_timeout(1.0))
            .trace(&path, &[])
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2) + Duration::from_millis(READER_GRACE_MS * 2));
        assert_eq!(trace.exit_code, -1);
        assert!(trace.timed_out());
        assert!(trace.stdout.contains("start"));
        assert!(trace.stderr.ends_with("Execution timed out after 1.0s"));
        let risk = trace.risk_score.unwrap();
        assert_eq!(risk.factors.get("timeout"), Some(&20.0));
        assert_eq!(risk.factors.get("near_timeout"), Some(&5.0));
    }

    #[tokio::test]
    async fn test_output_is_bounded() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "loud.py", "print('x' * 10000)\n");
        let trace = tracer(TraceOptions::default().with_max_output_bytes(100))
            .trace(&path, &[])
            .await
            .unwrap();
        assert!(trace.stdout.ends_with("\n... (truncated, max 100 bytes)"));
        assert_eq!(trace.stdout.len(), 100 + "\n... (truncated, max 100 bytes)".len());
    }
}
