//! `SCR_TRACE` Line Protocol
//!
//! The instrumented child writes one line per intercepted operation:
//!
//! ```text
//! SCR_TRACE:<event_type>|<key>=<value>,<key>=<value>,...
//! ```
//!
//! Known keys (`file`, `pid`, `addr`, `port`, `cmd`, `module`) fill the typed event fields; any
//! other key lands in the event metadata. Lines with an unknown event type, an out-of-range pid
//! or port, or no `|` separator are skipped. A non-numeric pid or port keeps the fields parsed so
//! far and stores the raw field string under `raw`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::types::{TraceEvent, TraceEventType};
use crate::constants::tracer::TRACE_MARKER;

static TRACE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SCR_TRACE:([^|]*)\|([^|]*)").expect("literal trace line pattern"));

/// Longest line kept for protocol parsing; longer lines are still captured as output
pub const MAX_TRACE_LINE_BYTES: usize = 64 * 1024;

/// Parse one output line into an event stamped with `timestamp`.
pub fn parse_line(line: &str, timestamp: f64) -> Option<TraceEvent> {
    if !line.contains(TRACE_MARKER) {
        return None;
    }
    let Some(captures) = TRACE_LINE.captures(line) else {
        debug!("Tracer: malformed trace line: {}", line);
        return None;
    };

    let type_str = captures.get(1).map_or("", |m| m.as_str()).trim();
    let fields = captures.get(2).map_or("", |m| m.as_str()).trim();

    let event_type = match type_str.parse::<TraceEventType>() {
        Ok(t) => t,
        Err(_) => {
            debug!("Tracer: unknown event type: {}", type_str);
            return None;
        }
    };

    let event = match TraceEvent::new(event_type, timestamp) {
        Ok(e) => e,
        Err(e) => {
            debug!("Tracer: rejected trace line {}: {}", line, e);
            return None;
        }
    };

    match apply_fields(event, fields) {
        Ok(event) => Some(event),
        Err(reason) => {
            debug!("Tracer: rejected trace line {}: {}", line, reason);
            None
        }
    }
}

fn apply_fields(mut event: TraceEvent, fields: &str) -> Result<TraceEvent, String> {
    for part in fields.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        match key {
            "file" => event.file_path = Some(value.to_string()),
            "addr" => event.network_address = Some(value.to_string()),
            "cmd" => event.command = Some(value.to_string()),
            "module" => event.module_name = Some(value.to_string()),
            "pid" | "port" => {
                let Ok(number) = value.parse::<i64>() else {
                    event.metadata.insert("raw".into(), fields.into());
                    break;
                };
                if key == "pid" {
                    let pid = u32::try_from(number)
                        .map_err(|_| "process_id must be >= 0 if provided".to_string())?;
                    event.process_id = Some(pid);
                } else {
                    let port = u16::try_from(number)
                        .ok()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| {
                            "network_port must be between 1 and 65535 if provided".to_string()
                        })?;
                    event.network_port = Some(port);
                }
            }
            _ => {
                event.metadata.insert(key.to_string(), value.into());
            }
        }
    }
    Ok(event)
}

/// Incremental line splitter over a byte stream.
///
/// Bytes arrive in arbitrary chunks; complete lines are parsed as they close. A line that grows
/// past [`MAX_TRACE_LINE_BYTES`] is discarded up to its newline.
#[derive(Debug, Default)]
pub struct LineScanner {
    pending: Vec<u8>,
    overflowed: bool,
    events: Vec<TraceEvent>,
}

impl LineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8], timestamp: f64) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.append(&rest[..pos]);
            self.close_line(timestamp);
            rest = &rest[pos + 1..];
        }
        self.append(rest);
    }

    /// Flush a trailing unterminated line and return all parsed events.
    pub fn finish(mut self, timestamp: f64) -> Vec<TraceEvent> {
        if !self.pending.is_empty() {
            self.close_line(timestamp);
        }
        self.events
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.overflowed {
            return;
        }
        if self.pending.len() + bytes.len() > MAX_TRACE_LINE_BYTES {
            self.pending.clear();
            self.overflowed = true;
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    fn close_line(&mut self, timestamp: f64) {
        if !self.overflowed {
            let line = String::from_utf8_lossy(&self.pending);
            if let Some(event) = parse_line(line.trim_end_matches('\r'), timestamp) {
                self.events.push(event);
            }
        }
        self.pending.clear();
        self.overflowed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MetadataValue;

    #[test]
    fn test_parse_file_event() {
        let event = parse_line("SCR_TRACE:file_write|file=/tmp/out.txt", 1.5).unwrap();
        assert_eq!(event.event_type, TraceEventType::FileWrite);
        assert_eq!(event.file_path.as_deref(), Some("/tmp/out.txt"));
        assert_eq!(event.timestamp, 1.5);
    }

    #[test]
    fn test_parse_network_event_with_extra_metadata() {
        let event =
            parse_line("noise SCR_TRACE:network_connect|addr=10.0.0.1, port=443,blocked=1", 1.0)
                .unwrap();
        assert_eq!(event.network_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(event.network_port, Some(443));
        assert_eq!(
            event.metadata.get("blocked"),
            Some(&MetadataValue::Text("1".into()))
        );
    }

    #[test]
    fn test_parse_process_and_module() {
        let spawn = parse_line("SCR_TRACE:process_spawn|cmd=ls -la,pid=42", 1.0).unwrap();
        assert_eq!(spawn.command.as_deref(), Some("ls -la"));
        assert_eq!(spawn.process_id, Some(42));

        let import = parse_line("SCR_TRACE:module_import|module=json", 1.0).unwrap();
        assert_eq!(import.module_name.as_deref(), Some("json"));
    }

    #[test]
    fn test_skips_unknown_and_malformed_lines() {
        assert!(parse_line("plain output", 1.0).is_none());
        assert!(parse_line("SCR_TRACE:teleport|file=x", 1.0).is_none());
        assert!(parse_line("SCR_TRACE:file_read", 1.0).is_none());
        assert!(parse_line("SCR_TRACE:network_connect|addr=h,port=70000", 1.0).is_none());
        assert!(parse_line("SCR_TRACE:network_connect|addr=h,port=0", 1.0).is_none());
        assert!(parse_line("SCR_TRACE:process_spawn|pid=-3", 1.0).is_none());
    }

    #[test]
    fn test_fields_end_at_next_separator() {
        let event = parse_line("SCR_TRACE:file_read|file=a.txt|trailing", 1.0).unwrap();
        assert_eq!(event.file_path.as_deref(), Some("a.txt"));
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_non_numeric_pid_keeps_raw_fields() {
        let event = parse_line("SCR_TRACE:process_spawn|cmd=x,pid=abc,other=1", 1.0).unwrap();
        assert_eq!(event.command.as_deref(), Some("x"));
        assert_eq!(event.process_id, None);
        assert_eq!(
            event.metadata.get("raw").and_then(|v| v.as_str()),
            Some("cmd=x,pid=abc,other=1")
        );
        assert!(!event.metadata.contains_key("other"));
    }

    #[test]
    fn test_empty_fields() {
        let event = parse_line("SCR_TRACE:system_call|", 1.0).unwrap();
        assert_eq!(event.event_type, TraceEventType::SystemCall);
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_scanner_handles_split_chunks() {
        let mut scanner = LineScanner::new();
        scanner.push(b"hello\nSCR_TRACE:file_re", 1.0);
        scanner.push(b"ad|file=a.txt\r\nSCR_TRACE:module_import|module=os", 2.0);
        let events = scanner.finish(3.0);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].file_path.as_deref(), Some("a.txt"));
        assert_eq!(events[0].timestamp, 2.0);
        assert_eq!(events[1].module_name.as_deref(), Some("os"));
        assert_eq!(events[1].timestamp, 3.0);
    }

    #[test]
    fn test_scanner_drops_oversized_line() {
        let mut scanner = LineScanner::new();
        let mut long = b"SCR_TRACE:file_read|file=".to_vec();
        long.extend(std::iter::repeat_n(b'a', MAX_TRACE_LINE_BYTES));
        scanner.push(&long, 1.0);
        scanner.push(b"\nSCR_TRACE:file_read|file=short\n", 1.0);
        let events = scanner.finish(1.0);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].file_path.as_deref(), Some("short"));
    }
}
