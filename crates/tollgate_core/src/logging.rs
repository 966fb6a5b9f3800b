//! Structured logging setup.
//!
//! Application logs go to the console and, when stdout is not a terminal, to
//! a daily rolling `tollgate.*.log` under the data directory. The filter can be
//! overridden with `TOLLGATE_LOG` or `RUST_LOG`.
//!
//! Audit events emitted on the [`AUDIT_TARGET`] (see
//! [`TracingSink`](crate::services::TracingSink)) can additionally be split
//! into their own daily `audit.*.log`, independent of the application filter.

use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub use crate::services::audit::AUDIT_TARGET;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is a terminal
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
    /// Directory for the dedicated audit file, if audit events should get one
    pub audit_dir: Option<PathBuf>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            is_pty: atty::is(atty::Stream::Stdout),
            log_filter: None,
            audit_dir: None,
        }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Write `audit` target events to `audit.*.log` in `dir`.
    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = Some(dir.into());
        self
    }
}

/// Guard that must be held for the lifetime of the application.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guards: Vec<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// A log or audit directory that cannot be created is reported on stderr and
/// skipped; console output always works.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let file = if config.is_pty {
        None
    } else {
        match rolling_writer(&config.log_dir, "tollgate") {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
                None
            }
        }
    };

    let filter = build_env_filter(config.log_filter.as_deref());
    match file {
        Some((writer, guard)) => {
            guards.push(guard);
            // Console only sees INFO and above
            let stdout = std::io::stdout.with_max_level(Level::INFO);
            layers.push(
                fmt::layer()
                    .with_writer(stdout.and(writer))
                    .with_ansi(false)
                    .with_target(true)
                    .with_filter(filter)
                    .boxed(),
            );
        }
        None => {
            layers.push(
                fmt::layer()
                    .with_ansi(config.is_pty)
                    .with_target(false)
                    .with_filter(filter)
                    .boxed(),
            );
        }
    }

    if let Some(dir) = &config.audit_dir {
        match rolling_writer(dir, "audit") {
            Ok((writer, guard)) => {
                guards.push(guard);
                layers.push(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false)
                        .with_level(false)
                        .with_filter(audit_filter())
                        .boxed(),
                );
            }
            Err(e) => eprintln!("Warning: Failed to open audit log in {}: {}", dir.display(), e),
        }
    }

    tracing_subscriber::registry().with(layers).init();
    LoggingGuard { _worker_guards: guards }
}

fn rolling_writer(
    dir: &Path,
    prefix: &str,
) -> Result<(NonBlocking, WorkerGuard), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Passes only audit events, whatever the application filter says.
fn audit_filter() -> Targets {
    Targets::new().with_target(AUDIT_TARGET, Level::INFO)
}

/// Build the environment filter from config or defaults.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    // custom filter > TOLLGATE_LOG > RUST_LOG > default
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env("TOLLGATE_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Default filter for the current build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,tollgate=trace,tollgate_core=trace,audit=info,hyper=warn,reqwest=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,tollgate=info,tollgate_core=info,audit=info,hyper=warn,reqwest=warn"
    }
}

/// Get the default log directory.
pub fn log_dir() -> PathBuf {
    crate::config::default_data_dir().join("logs")
}

/// Get the default directory for the dedicated audit file.
pub fn audit_log_dir() -> PathBuf {
    crate::config::default_data_dir().join("audit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(default_log_filter()).is_ok());
    }

    #[test]
    fn test_log_dir_under_data_dir() {
        assert!(log_dir().ends_with("logs"));
        assert!(log_dir().starts_with(crate::config::default_data_dir()));
        assert!(audit_log_dir().starts_with(crate::config::default_data_dir()));
    }

    #[test]
    fn test_audit_filter_only_passes_audit_target() {
        let filter = audit_filter();
        assert!(filter.would_enable(AUDIT_TARGET, &Level::INFO));
        assert!(!filter.would_enable("tollgate_core::services::warehouse", &Level::INFO));
        assert!(!filter.would_enable(AUDIT_TARGET, &Level::DEBUG));
    }

    #[test]
    fn test_custom_filter_wins() {
        let config = LogConfig::new(PathBuf::from("logs")).with_filter("warn");
        assert_eq!(config.log_filter.as_deref(), Some("warn"));
        assert!(build_env_filter(config.log_filter.as_deref()).to_string().contains("warn"));
    }
}
