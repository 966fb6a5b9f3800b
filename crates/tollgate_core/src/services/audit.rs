//! Append-only compliance audit log.
//!
//! [`AuditLog::record`] never fails from the caller's point of view: a sink
//! error is logged at WARN and dropped so that connect, load, accept and export
//! carry on regardless of audit-sink health.
//!
//! Sinks are pluggable through [`AuditSink`]:
//! - [`StdoutSink`] - one line per event on standard output
//! - [`FileSink`] - append-only local file
//! - [`TracingSink`] - the `audit` tracing target
//! - [`MemorySink`] - in-process capture

use crate::config::{AuditSinkKind, SessionConfig};
use crate::error::TollgateError;
use crate::models::{AuditDetails, AuditEvent, AuditEventType};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// AuditSink Trait
// ============================================================================

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Write one event. Each call produces exactly one line or entry.
    fn write(&self, event: &AuditEvent) -> Result<(), TollgateError>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Writes formatted lines to standard output.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl AuditSink for StdoutSink {
    fn write(&self, event: &AuditEvent) -> Result<(), TollgateError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", event.to_line())?;
        stdout.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "StdoutSink"
    }
}

/// Appends formatted lines to a local file. Existing content is never rewritten.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) the file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TollgateError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).map_err(|e| {
            TollgateError::storage(
                format!("Failed to open audit file '{}': {e}", path.display()),
                Some("Check permissions for the audit log directory"),
            )
        })?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Path of the audit file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileSink {
    fn write(&self, event: &AuditEvent) -> Result<(), TollgateError> {
        let mut file = self.file.lock();
        writeln!(file, "{}", event.to_line())?;
        file.flush()?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FileSink"
    }
}

/// Tracing target used by [`TracingSink`].
pub const AUDIT_TARGET: &str = "audit";

/// Emits events on the [`AUDIT_TARGET`] tracing target, for platform-managed
/// log collection.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn write(&self, event: &AuditEvent) -> Result<(), TollgateError> {
        tracing::info!(
            target: AUDIT_TARGET,
            timestamp = %event.timestamp.to_rfc3339(),
            actor = %event.actor,
            event = %event.event_type,
            details = %event.details,
            "audit event"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TracingSink"
    }
}

/// Keeps events in memory. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, in order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Recorded events of one type.
    pub fn events_of(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.event_type == event_type).cloned().collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemorySink {
    fn write(&self, event: &AuditEvent) -> Result<(), TollgateError> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MemorySink"
    }
}

// ============================================================================
// AuditLog
// ============================================================================

/// Process-wide audit log, shared across sessions.
pub struct AuditLog {
    sink: Box<dyn AuditSink>,
    /// Last timestamp handed out; keeps ordering monotonic under clock skew.
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl AuditLog {
    /// Create a log writing to `sink`.
    pub fn new(sink: impl AuditSink + 'static) -> Self {
        Self { sink: Box::new(sink), last_timestamp: Mutex::new(None) }
    }

    /// Build the sink selected in configuration.
    ///
    /// A file sink that cannot be opened falls back to stdout.
    pub fn from_config(config: &SessionConfig) -> Self {
        match config.audit_sink {
            AuditSinkKind::Stdout => Self::new(StdoutSink),
            AuditSinkKind::Tracing => Self::new(TracingSink),
            AuditSinkKind::File => {
                let path = config.audit_file_path();
                match FileSink::open(&path) {
                    Ok(sink) => Self::new(sink),
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Audit file unavailable, using stdout"
                        );
                        Self::new(StdoutSink)
                    }
                }
            }
        }
    }

    /// Record one event. Never fails; sink errors are logged and swallowed.
    pub fn record(&self, event_type: AuditEventType, details: AuditDetails, actor: &str) {
        let event = AuditEvent {
            timestamp: self.next_timestamp(),
            actor: actor.to_string(),
            event_type,
            details,
        };

        if let Err(e) = self.sink.write(&event) {
            tracing::warn!(
                sink = self.sink.name(),
                event = %event_type,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Name of the active sink.
    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.lock();
        let now = Utc::now();
        let timestamp = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(timestamp);
        timestamp
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").field("sink", &self.sink.name()).finish()
    }
}

/// Best-effort identity of the process owner.
///
/// Checks `LOGNAME`, `USER`, `LNAME` and `USERNAME` in that order.
pub fn process_owner() -> String {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}
