// crates/witness-core/src/logging.rs
// ============================================================================
// Module: Structured Logging
// Description: JSON-lines log events and pluggable sinks.
// Purpose: Emit run, export, and verification events without a hard
//          dependency on a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Components emit [`LogEvent`] values through a shared [`LogSink`]. Sinks
//! serialize each event as one JSON line. Deployments choose stderr, an
//! append-only file, or nothing; tests capture events in memory.
//!
//! Security posture: callers must not place secrets in event fields. Token
//! values and key material are never logged by this workspace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Tolerated problems.
    Warn,
    /// Failures.
    Error,
}

impl LogLevel {
    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Structured log event payload.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event severity.
    pub level: LogLevel,
    /// Emitting component label.
    pub component: String,
    /// Human-readable message.
    pub message: String,
    /// Additional structured fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl LogEvent {
    /// Creates a new event with a consistent timestamp.
    #[must_use]
    pub fn new(
        event: &'static str,
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            level,
            component: component.into(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Attaches a structured field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink receiving structured log events.
pub trait LogSink: Send + Sync {
    /// Record a log event.
    fn record(&self, event: &LogEvent);
}

/// Shared handle to a log sink.
pub type SharedLogSink = Arc<dyn LogSink>;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink that writes JSON lines to stderr.
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileLogSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileLogSink {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink that drops every event.
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn record(&self, _event: &LogEvent) {}
}

/// Sink that keeps events in memory.
#[derive(Default)]
pub struct MemoryLogSink {
    /// Captured events in arrival order.
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryLogSink {
    /// Creates an empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the captured events.
    #[must_use]
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns true when an event with the identifier was captured.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|captured| captured.event == event)
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Sink that forwards events at or above a minimum level.
pub struct LevelFilterSink {
    /// Minimum level forwarded.
    min_level: LogLevel,
    /// Downstream sink.
    inner: SharedLogSink,
}

impl LevelFilterSink {
    /// Wraps a sink with a minimum level.
    #[must_use]
    pub fn new(min_level: LogLevel, inner: SharedLogSink) -> Self {
        Self {
            min_level,
            inner,
        }
    }
}

impl LogSink for LevelFilterSink {
    fn record(&self, event: &LogEvent) {
        if event.level >= self.min_level {
            self.inner.record(event);
        }
    }
}
