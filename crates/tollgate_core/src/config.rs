//! Session configuration.
//!
//! Defaults cover the common case; a JSON file and a few environment
//! variables can override them. Precedence: environment > file > defaults.

use crate::error::TollgateError;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest accepted row limit for a table load.
pub const MIN_ROW_LIMIT: u32 = 1;

/// Largest accepted row limit for a table load.
pub const MAX_ROW_LIMIT: u32 = 100_000;

/// Environment variable overriding the default row limit.
const ROW_LIMIT_ENV: &str = "TOLLGATE_ROW_LIMIT";

/// Environment variable selecting the audit sink.
const AUDIT_SINK_ENV: &str = "TOLLGATE_AUDIT_SINK";

/// Environment variable naming the audit file.
const AUDIT_FILE_ENV: &str = "TOLLGATE_AUDIT_FILE";

/// Where audit lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Process standard output (collected by the hosting platform)
    #[default]
    Stdout,
    /// Append-only local file
    File,
    /// The `audit` tracing target
    Tracing,
}

impl AuditSinkKind {
    /// Parse from a string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "stdout" => Some(Self::Stdout),
            "file" => Some(Self::File),
            "tracing" | "log" => Some(Self::Tracing),
            _ => None,
        }
    }
}

/// How the warehouse returns statement results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultDisposition {
    /// Rows in the response body. The service caps inline results at 25 MiB.
    #[default]
    Inline,
    /// Rows in files behind presigned URLs, for results above the inline cap
    ExternalLinks,
}

impl ResultDisposition {
    /// Wire value for the `disposition` request field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "INLINE",
            Self::ExternalLinks => "EXTERNAL_LINKS",
        }
    }
}

/// Per-session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Server-side wait per statement before polling, in seconds
    pub statement_wait_secs: u64,
    /// Upper bound on polling a pending statement, in seconds
    pub max_poll_secs: u64,
    /// Row limit used when the caller does not pick one
    pub default_row_limit: u32,
    /// Result transfer mode
    pub result_disposition: ResultDisposition,
    /// Catalogs to pre-select when present, in priority order
    pub preferred_catalogs: Vec<String>,
    /// Schemas to pre-select when present, in priority order
    pub preferred_schemas: Vec<String>,
    /// Tables to pre-select when present, in priority order
    pub preferred_tables: Vec<String>,
    /// Audit destination
    pub audit_sink: AuditSinkKind,
    /// Audit file path (used when `audit_sink` is `file`)
    pub audit_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            statement_wait_secs: 30,
            max_poll_secs: 300,
            default_row_limit: 1000,
            result_disposition: ResultDisposition::Inline,
            preferred_catalogs: Vec::new(),
            preferred_schemas: Vec::new(),
            preferred_tables: Vec::new(),
            audit_sink: AuditSinkKind::Stdout,
            audit_file: None,
        }
    }
}

impl SessionConfig {
    /// Load from a JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, TollgateError> {
        let config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    TollgateError::config(format!(
                        "Failed to read config file '{}': {e}",
                        path.display()
                    ))
                })?;
                serde_json::from_str(&contents).map_err(|e| {
                    TollgateError::config(format!("Invalid config file '{}': {e}", path.display()))
                })?
            }
            None => Self::default(),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TollgateError> {
        if let Some(value) = lookup(ROW_LIMIT_ENV) {
            self.default_row_limit = value.trim().parse().map_err(|_| {
                TollgateError::config(format!("{ROW_LIMIT_ENV} must be a number, got '{value}'"))
            })?;
        }
        if let Some(value) = lookup(AUDIT_SINK_ENV) {
            self.audit_sink = AuditSinkKind::parse(&value).ok_or_else(|| {
                TollgateError::config(format!(
                    "{AUDIT_SINK_ENV} must be stdout, file or tracing, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = lookup(AUDIT_FILE_ENV) {
            self.audit_file = Some(PathBuf::from(value));
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), TollgateError> {
        if !(MIN_ROW_LIMIT..=MAX_ROW_LIMIT).contains(&self.default_row_limit) {
            return Err(TollgateError::config(format!(
                "default_row_limit must be between {MIN_ROW_LIMIT} and {MAX_ROW_LIMIT}"
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(TollgateError::config("connect_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set the default row limit.
    pub fn with_default_row_limit(mut self, limit: u32) -> Self {
        self.default_row_limit = limit;
        self
    }

    /// Set preferred catalogs.
    pub fn with_preferred_catalogs(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.preferred_catalogs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set preferred schemas.
    pub fn with_preferred_schemas(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.preferred_schemas = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set preferred tables.
    pub fn with_preferred_tables(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.preferred_tables = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the result transfer mode.
    pub fn with_result_disposition(mut self, disposition: ResultDisposition) -> Self {
        self.result_disposition = disposition;
        self
    }

    /// Set the audit sink.
    pub fn with_audit_sink(mut self, sink: AuditSinkKind) -> Self {
        self.audit_sink = sink;
        self
    }

    /// Audit file path, falling back to `<data dir>/audit.log`.
    pub fn audit_file_path(&self) -> PathBuf {
        self.audit_file.clone().unwrap_or_else(|| default_data_dir().join("audit.log"))
    }
}

/// Get the default data directory for the application.
///
/// Debug builds use `./tollgate_data` in the current directory.
pub fn default_data_dir() -> PathBuf {
    #[cfg(debug_assertions)]
    {
        PathBuf::from("./tollgate_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| d.join("tollgate"))
            .unwrap_or_else(|| PathBuf::from("./tollgate_data"))
    }
}
