//! Credential and connection state models.

use serde::{Deserialize, Serialize};

/// Where a set of credentials came from.
///
/// Only used for audit labelling; the session never branches on it otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSourceKind {
    /// Typed in by the user
    Manual,
    /// Read from environment variables
    EnvVar,
    /// Read from a local CLI profile
    CliProfile,
    /// Forwarded by the hosting platform's app authentication
    ForwardedAppAuth,
}

impl CredentialSourceKind {
    /// Value for the `method` audit detail.
    pub fn method_label(&self) -> &'static str {
        match self {
            Self::Manual => "Manual Entry",
            Self::EnvVar => "Environment Variables",
            Self::CliProfile => "CLI Profile",
            Self::ForwardedAppAuth => "Databricks App",
        }
    }

    /// Value for the `auth_type` audit detail.
    pub fn auth_type_label(&self) -> &'static str {
        match self {
            Self::ForwardedAppAuth => "DatabricksApp",
            _ => "Token",
        }
    }
}

/// An access token. Never printed, never serialized.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value, for the transport only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check whether the token is empty.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

/// Resolved warehouse credentials.
///
/// Immutable once built; a credential change means a new value and a reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    host: String,
    http_path: String,
    token: SecretToken,
    source: CredentialSourceKind,
    /// Identity forwarded alongside the token, if any
    user: Option<String>,
}

impl Credentials {
    /// Create credentials. The host is normalized (scheme and trailing `/` removed).
    pub fn new(
        host: impl Into<String>,
        http_path: impl Into<String>,
        token: impl Into<String>,
        source: CredentialSourceKind,
    ) -> Self {
        Self {
            host: normalize_host(&host.into()),
            http_path: http_path.into().trim().to_string(),
            token: SecretToken::new(token),
            source,
            user: None,
        }
    }

    /// Attach the identity the platform forwarded with these credentials.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        let user = user.into();
        self.user = if user.trim().is_empty() { None } else { Some(user) };
        self
    }

    /// Warehouse hostname, without scheme.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Warehouse HTTP path (e.g. `/sql/1.0/warehouses/abc123`).
    pub fn http_path(&self) -> &str {
        &self.http_path
    }

    /// The access token.
    pub fn token(&self) -> &SecretToken {
        &self.token
    }

    /// Where these credentials came from.
    pub fn source(&self) -> CredentialSourceKind {
        self.source
    }

    /// Forwarded user identity, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Warehouse id, taken from the last segment of the HTTP path.
    pub fn warehouse_id(&self) -> Option<&str> {
        self.http_path.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("Server Hostname");
        }
        if self.http_path.is_empty() {
            missing.push("HTTP Path");
        }
        if self.token.is_empty() {
            missing.push("Access Token");
        }
        missing
    }

    /// Check if every required field is present.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Strip scheme and trailing slashes from a hostname.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host);
    host.trim_end_matches('/').to_string()
}

/// Lifecycle of the warehouse connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No active connection
    #[default]
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Connect check succeeded, connection usable
    Connected,
    /// Connection attempt failed; the user must re-trigger connect
    Failed {
        /// Human-readable reason
        reason: String,
    },
}

impl ConnectionStatus {
    /// Create a failed status.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }

    /// Check if the connection is usable.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the last attempt failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_normalized() {
        let creds = Credentials::new(
            "https://adb-123.azuredatabricks.net/",
            "/sql/1.0/warehouses/abc",
            "dapi123",
            CredentialSourceKind::Manual,
        );
        assert_eq!(creds.host(), "adb-123.azuredatabricks.net");
        assert_eq!(creds.warehouse_id(), Some("abc"));
    }

    #[test]
    fn test_missing_fields() {
        let creds = Credentials::new("", "/sql/1.0/warehouses/abc", "  ", CredentialSourceKind::Manual);
        assert_eq!(creds.missing_fields(), vec!["Server Hostname", "Access Token"]);
        assert!(!creds.is_complete());
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let creds =
            Credentials::new("host", "/sql/1.0/warehouses/abc", "dapi-secret", CredentialSourceKind::EnvVar);
        let debug = format!("{creds:?}");
        assert!(!debug.contains("dapi-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_blank_user_is_dropped() {
        let creds = Credentials::new("h", "p", "t", CredentialSourceKind::ForwardedAppAuth).with_user(" ");
        assert_eq!(creds.user(), None);
    }
}
