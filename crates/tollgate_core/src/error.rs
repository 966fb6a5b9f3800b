//! Error types for Tollgate.
//!
//! Connection failures carry a classified [`ConnectErrorKind`] so the front end
//! can show a remediation hint. Discovery and data queries fail with `Query`;
//! misuse of the session (bad row limit, export before acceptance, selecting a
//! table before a schema) fails with `Precondition`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectErrorKind {
    /// Token expired, revoked or malformed.
    AuthInvalid,
    /// The HTTP path or warehouse does not exist.
    NotFound,
    /// The hostname could not be resolved or reached.
    HostUnreachable,
    /// The warehouse did not answer in time.
    Timeout,
    /// Anything else.
    Unknown,
}

impl ConnectErrorKind {
    /// Classify from an HTTP status code, if it is one we recognise.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(Self::AuthInvalid),
            404 => Some(Self::NotFound),
            408 | 504 => Some(Self::Timeout),
            _ => None,
        }
    }

    /// Classify from raw error text.
    ///
    /// Checks run in a fixed order; the first match wins.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if message.contains("Invalid access token")
            || message.contains("401")
            || message.contains("INVALID_TOKEN")
        {
            Self::AuthInvalid
        } else if message.contains("404") || lower.contains("not found") {
            Self::NotFound
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else if lower.contains("host") || lower.contains("hostname") {
            Self::HostUnreachable
        } else {
            Self::Unknown
        }
    }

    /// Short label used in audit details.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthInvalid => "auth_invalid",
            Self::NotFound => "not_found",
            Self::HostUnreachable => "host_unreachable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Remediation hint shown next to the failure.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AuthInvalid => Some(
                "The access token may be expired or invalid. Generate a new token under \
                 User Settings > Access Tokens and try again",
            ),
            Self::NotFound => Some(
                "Check that the HTTP Path is correct. Find it in SQL Warehouses > \
                 Your Warehouse > Connection Details",
            ),
            Self::HostUnreachable => Some("Verify the server hostname is correct"),
            Self::Timeout => Some(
                "Connection timed out. Check that the SQL Warehouse is running, \
                 network connectivity and firewall settings",
            ),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for Tollgate.
#[derive(Debug, Error)]
pub enum TollgateError {
    /// Connecting to the warehouse failed.
    #[error("Connection error: {message}")]
    Connect {
        /// Classified failure kind.
        kind: ConnectErrorKind,
        /// Raw message from the transport.
        message: String,
    },

    /// A discovery or data query failed.
    #[error("Query error: {message}")]
    Query {
        /// Raw message from the warehouse.
        message: String,
    },

    /// An operation was invoked in a state that does not permit it.
    #[error("Precondition failed: {message}")]
    Precondition {
        /// What was violated.
        message: String,
    },

    /// Credentials are incomplete; no connection was attempted.
    #[error("Missing: {}", missing.join(", "))]
    NotConfigured {
        /// Human-readable names of the missing fields.
        missing: Vec<&'static str>,
    },

    /// The transport layer failed before a result was produced.
    #[error("Transport error: {message}")]
    Transport {
        /// HTTP status, when the failure came from a response.
        status: Option<u16>,
        /// Human-readable error message.
        message: String,
    },

    /// Local file error (audit file, export output).
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl TollgateError {
    // ========== Constructors ==========

    /// Create a connection error with an explicit kind.
    pub fn connect(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        Self::Connect { kind, message: message.into() }
    }

    /// Create a connection error, classifying the message text.
    pub fn connect_classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Connect { kind: ConnectErrorKind::classify(&message), message }
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query { message: message.into() }
    }

    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition { message: message.into() }
    }

    /// Create a transport error.
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport { status, message: message.into() }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Storage { message: message.into(), hint: hint.map(String::from), source: None }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    // ========== Methods ==========

    /// Turn a transport failure raised while connecting into a classified
    /// connection error. Structured status wins over message text.
    pub fn into_connect(self) -> Self {
        match self {
            Self::Transport { status, message } => {
                let kind = status
                    .and_then(ConnectErrorKind::from_status)
                    .unwrap_or_else(|| ConnectErrorKind::classify(&message));
                Self::Connect { kind, message }
            }
            Self::Query { message } => Self::connect_classified(message),
            other => other,
        }
    }

    /// Turn a transport failure raised by a discovery or data query into a
    /// query error.
    pub fn into_query(self) -> Self {
        match self {
            Self::Transport { message, .. } => Self::Query { message },
            other => other,
        }
    }

    /// Connection failure kind, if this is a connection error.
    pub fn connect_kind(&self) -> Option<ConnectErrorKind> {
        match self {
            Self::Connect { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if this is a precondition failure.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. } | Self::NotConfigured { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "Connection",
            Self::Query { .. } => "Query",
            Self::Precondition { .. } => "Precondition",
            Self::NotConfigured { .. } => "Credentials",
            Self::Transport { .. } => "Transport",
            Self::Storage { .. } => "Storage",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connect { kind, .. } => kind.hint(),
            Self::Query { .. } => None,
            Self::Precondition { .. } => None,
            Self::NotConfigured { .. } => {
                Some("Enter the server hostname, HTTP path and access token")
            }
            Self::Transport { .. } => Some("Check network connectivity"),
            Self::Storage { hint, .. } => hint.as_deref(),
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Connect { kind, .. } => Some(format!("Kind: {kind}")),
            Self::Transport { status: Some(status), .. } => Some(format!("HTTP status: {status}")),
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for "Show Details" expansion.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from reqwest::Error to TollgateError.
impl From<reqwest::Error> for TollgateError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            format!("Request timed out: {err}")
        } else if err.is_connect() {
            format!("Could not reach host: {err}")
        } else {
            err.to_string()
        };
        TollgateError::Transport { status, message }
    }
}

/// Convert from std::io::Error to TollgateError.
impl From<std::io::Error> for TollgateError {
    fn from(err: std::io::Error) -> Self {
        TollgateError::Storage {
            message: err.to_string(),
            hint: Some("Check file permissions and disk space".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from serde_json::Error to TollgateError.
impl From<serde_json::Error> for TollgateError {
    fn from(err: serde_json::Error) -> Self {
        TollgateError::Storage {
            message: format!("JSON error: {err}"),
            hint: Some("Data may be corrupted".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from csv::Error to TollgateError.
impl From<csv::Error> for TollgateError {
    fn from(err: csv::Error) -> Self {
        TollgateError::Internal { message: format!("CSV encoding failed: {err}") }
    }
}
