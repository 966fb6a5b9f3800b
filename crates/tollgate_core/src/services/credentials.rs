//! Credential sources.
//!
//! Every way of obtaining warehouse credentials implements
//! [`CredentialSource`]. The session only sees the resulting [`Credentials`];
//! the source kind is carried along for audit labelling.
//!
//! ## Sources
//!
//! - [`ManualCredentials`] - values typed in by the user
//! - [`EnvCredentials`] - `DATABRICKS_HOST`, `DATABRICKS_HTTP_PATH` (or
//!   `DATABRICKS_WAREHOUSE_ID`) and `DATABRICKS_TOKEN`
//! - [`ForwardedAuthCredentials`] - headers forwarded by the app platform
//! - [`StaticCredentials`] - a value already produced elsewhere, e.g. by a CLI
//!   profile reader

use crate::error::TollgateError;
use crate::models::{CredentialSourceKind, Credentials};

use std::collections::HashMap;

/// Environment variable holding the workspace host.
pub const HOST_ENV: &str = "DATABRICKS_HOST";

/// Environment variable holding the warehouse HTTP path.
pub const HTTP_PATH_ENV: &str = "DATABRICKS_HTTP_PATH";

/// Environment variable holding the warehouse id.
pub const WAREHOUSE_ID_ENV: &str = "DATABRICKS_WAREHOUSE_ID";

/// Environment variable holding the access token.
pub const TOKEN_ENV: &str = "DATABRICKS_TOKEN";

/// Header carrying the signed-in user's email.
pub const FORWARDED_EMAIL_HEADER: &str = "X-Forwarded-Email";

/// Header carrying the signed-in user's access token.
pub const FORWARDED_TOKEN_HEADER: &str = "X-Forwarded-Access-Token";

/// Header carrying the workspace host.
pub const FORWARDED_HOST_HEADER: &str = "X-Forwarded-Host";

/// Build the warehouse HTTP path for a warehouse id.
pub fn warehouse_http_path(warehouse_id: &str) -> String {
    format!("/sql/1.0/warehouses/{}", warehouse_id.trim())
}

/// A way of obtaining credentials.
pub trait CredentialSource: Send + Sync {
    /// Produce complete credentials, or report which fields are missing.
    fn resolve(&self) -> Result<Credentials, TollgateError>;

    /// Which kind of source this is.
    fn kind(&self) -> CredentialSourceKind;
}

fn complete(credentials: Credentials) -> Result<Credentials, TollgateError> {
    let missing = credentials.missing_fields();
    if missing.is_empty() {
        Ok(credentials)
    } else {
        tracing::debug!(missing = ?missing, "Credentials incomplete");
        Err(TollgateError::NotConfigured { missing })
    }
}

// ============================================================================
// ManualCredentials
// ============================================================================

/// Values entered by the user.
#[derive(Clone, Default)]
pub struct ManualCredentials {
    /// Server hostname
    pub host: String,
    /// Warehouse HTTP path
    pub http_path: String,
    /// Personal access token
    pub token: String,
}

impl ManualCredentials {
    /// Create from entered values.
    pub fn new(
        host: impl Into<String>,
        http_path: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self { host: host.into(), http_path: http_path.into(), token: token.into() }
    }
}

impl std::fmt::Debug for ManualCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualCredentials")
            .field("host", &self.host)
            .field("http_path", &self.http_path)
            .finish_non_exhaustive()
    }
}

impl CredentialSource for ManualCredentials {
    fn resolve(&self) -> Result<Credentials, TollgateError> {
        complete(Credentials::new(&self.host, &self.http_path, &self.token, self.kind()))
    }

    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::Manual
    }
}

// ============================================================================
// EnvCredentials
// ============================================================================

/// Credentials from environment variables.
///
/// `DATABRICKS_HTTP_PATH` wins over `DATABRICKS_WAREHOUSE_ID` when both are set.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    vars: HashMap<String, String>,
}

impl EnvCredentials {
    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        let vars = [HOST_ENV, HTTP_PATH_ENV, WAREHOUSE_ID_ENV, TOKEN_ENV]
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self { vars }
    }

    /// Use an explicit variable map.
    pub fn from_vars<K: Into<String>, V: Into<String>>(
        vars: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self { vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }
}

impl CredentialSource for EnvCredentials {
    fn resolve(&self) -> Result<Credentials, TollgateError> {
        let http_path = self
            .var(HTTP_PATH_ENV)
            .map(String::from)
            .or_else(|| self.var(WAREHOUSE_ID_ENV).map(warehouse_http_path))
            .unwrap_or_default();
        complete(Credentials::new(
            self.var(HOST_ENV).unwrap_or_default(),
            http_path,
            self.var(TOKEN_ENV).unwrap_or_default(),
            self.kind(),
        ))
    }

    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::EnvVar
    }
}

// ============================================================================
// ForwardedAuthCredentials
// ============================================================================

/// Credentials forwarded by the app platform in request headers.
///
/// The host falls back to the configured workspace host, and the HTTP path is
/// built from the configured warehouse id.
#[derive(Debug, Clone, Default)]
pub struct ForwardedAuthCredentials {
    headers: HashMap<String, String>,
    fallback_host: Option<String>,
    warehouse_id: Option<String>,
}

impl ForwardedAuthCredentials {
    /// Create from request headers. Header names match case-insensitively.
    pub fn new<K: AsRef<str>, V: Into<String>>(headers: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            fallback_host: None,
            warehouse_id: None,
        }
    }

    /// Host to use when `X-Forwarded-Host` is absent.
    pub fn with_fallback_host(mut self, host: impl Into<String>) -> Self {
        self.fallback_host = Some(host.into());
        self
    }

    /// Warehouse to connect to.
    pub fn with_warehouse_id(mut self, warehouse_id: impl Into<String>) -> Self {
        self.warehouse_id = Some(warehouse_id.into());
        self
    }

    /// Fill host fallback and warehouse id from the process environment.
    pub fn with_env_defaults(mut self) -> Self {
        if self.fallback_host.is_none() {
            self.fallback_host = std::env::var(HOST_ENV).ok();
        }
        if self.warehouse_id.is_none() {
            self.warehouse_id = std::env::var(WAREHOUSE_ID_ENV).ok();
        }
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Whether the platform forwarded a token, i.e. the app runs behind
    /// platform authentication.
    pub fn is_forwarded(&self) -> bool {
        self.header(FORWARDED_TOKEN_HEADER).is_some()
    }

    /// Forwarded user email, if any.
    pub fn email(&self) -> Option<&str> {
        self.header(FORWARDED_EMAIL_HEADER)
    }
}

impl CredentialSource for ForwardedAuthCredentials {
    fn resolve(&self) -> Result<Credentials, TollgateError> {
        let host = self
            .header(FORWARDED_HOST_HEADER)
            .map(String::from)
            .or_else(|| self.fallback_host.clone())
            .unwrap_or_default();
        let http_path = self
            .warehouse_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map(warehouse_http_path)
            .unwrap_or_default();
        let credentials = Credentials::new(
            host,
            http_path,
            self.header(FORWARDED_TOKEN_HEADER).unwrap_or_default(),
            self.kind(),
        )
        .with_user(self.email().unwrap_or_default());
        complete(credentials)
    }

    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::ForwardedAppAuth
    }
}

// ============================================================================
// StaticCredentials
// ============================================================================

/// Credentials resolved by an external reader (e.g. a CLI profile).
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Wrap already-resolved credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialSource for StaticCredentials {
    fn resolve(&self) -> Result<Credentials, TollgateError> {
        complete(self.credentials.clone())
    }

    fn kind(&self) -> CredentialSourceKind {
        self.credentials.source()
    }
}

// ============================================================================
// Tests
// ============================================================================
