//! Structured event log.
//!
//! Events are one JSON object per line (JSONL):
//! `{"timestamp_ms":..,"level":"info","event":"thread_create","thread":3}`.
//! Emission is gated by [`crate::config::log_level`] and goes to a
//! process-wide sink, stderr unless replaced with [`set_sink`].
//!
//! The emit path takes no lock other than the sink's and never touches
//! thread-local storage, so it is usable from thread-exit destructors.

use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{self, LogLevel};

/// Canonical structured log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub event: String,
    /// Control-block id of the thread the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<u64>,
    /// Primitive kind or key the event concerns (`"mutex"`, `"key:3"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_ms(),
            level,
            event: event.into(),
            thread: None,
            object: None,
            errno: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn with_thread(mut self, id: u64) -> Self {
        self.thread = Some(id);
        self
    }

    #[must_use]
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Serializes to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

type Sink = Box<dyn Write + Send>;

static SINK: Mutex<Option<Sink>> = Mutex::new(None);

/// Replaces the process-wide sink, returning the previous one (`None` means stderr).
pub fn set_sink(sink: Sink) -> Option<Sink> {
    SINK.lock().replace(sink)
}

/// Restores the default stderr sink.
pub fn reset_sink() -> Option<Sink> {
    SINK.lock().take()
}

/// Writes one entry to the sink. Serialization or I/O failures are dropped.
pub fn emit(entry: &LogEntry) {
    let Ok(line) = entry.to_jsonl() else {
        return;
    };
    let mut sink = SINK.lock();
    let _ = match sink.as_mut() {
        Some(w) => writeln!(w, "{line}").and_then(|()| w.flush()),
        None => writeln!(std::io::stderr().lock(), "{line}"),
    };
}

/// Emits an event if `level` passes the configured threshold.
///
/// The builder only runs when the event will actually be written.
pub fn record(level: LogLevel, event: &str, build: impl FnOnce(LogEntry) -> LogEntry) {
    if config::log_enabled(level) {
        emit(&build(LogEntry::new(level, event)));
    }
}

/// In-memory sink, shareable between the logger and a reader.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every complete line written so far. Malformed lines are skipped.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        let buf = self.buf.lock();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
