//! Compliance audit event models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    /// Connect check succeeded
    ConnectionSuccess,
    /// Connect attempt failed
    ConnectionFailure,
    /// A table was loaded into the session
    DataLoaded,
    /// The user accepted the export terms for the loaded data
    TermsAccepted,
    /// CSV payload produced
    ExportCsv,
    /// JSON payload produced
    ExportJson,
}

impl AuditEventType {
    /// Wire name used in audit lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionSuccess => "CONNECTION_SUCCESS",
            Self::ConnectionFailure => "CONNECTION_FAILURE",
            Self::DataLoaded => "DATA_LOADED",
            Self::TermsAccepted => "TERMS_ACCEPTED",
            Self::ExportCsv => "EXPORT_CSV",
            Self::ExportJson => "EXPORT_JSON",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered `key=value` details attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDetails(Vec<(String, String)>);

impl AuditDetails {
    /// Empty details.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair, keeping insertion order.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    /// Look up the first value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Iterate pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AuditDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Best-effort identity of the user
    pub actor: String,
    /// What happened
    pub event_type: AuditEventType,
    /// Event-specific details
    pub details: AuditDetails,
}

impl AuditEvent {
    /// Render the single-line sink format:
    /// `[<timestamp>] USER=<actor> EVENT=<type> DETAILS=<k=v, ...>`.
    pub fn to_line(&self) -> String {
        format!(
            "[{}] USER={} EVENT={} DETAILS={}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.actor,
            self.event_type,
            self.details
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_format() {
        let event = AuditEvent {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            actor: "ana@example.com".to_string(),
            event_type: AuditEventType::DataLoaded,
            details: AuditDetails::new()
                .with("table", "samples.nyctaxi.trips")
                .with("rows", 10)
                .with("columns", 6),
        };
        assert_eq!(
            event.to_line(),
            "[2025-03-01T12:30:00.000000Z] USER=ana@example.com EVENT=DATA_LOADED \
             DETAILS=table=samples.nyctaxi.trips, rows=10, columns=6"
        );
    }

    #[test]
    fn test_details_lookup() {
        let details = AuditDetails::new().with("rows", 3).with("rows", 4);
        assert_eq!(details.get("rows"), Some("3"));
        assert_eq!(details.len(), 2);
        assert_eq!(details.get("missing"), None);
    }
}
