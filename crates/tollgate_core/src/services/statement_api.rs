//! SQL warehouse connector over the Statement Execution REST API.
//!
//! Each statement is submitted with `format=JSON_ARRAY` and the configured
//! disposition: `INLINE` (rows in the response, capped at 25 MiB by the
//! service) or `EXTERNAL_LINKS` (rows in files behind presigned URLs).
//! Pending statements are polled until they finish or the poll deadline
//! passes, and every result chunk is followed so the caller always receives a
//! fully drained [`ResultSet`].

use crate::config::{ResultDisposition, SessionConfig};
use crate::error::TollgateError;
use crate::models::{ColumnInfo, Credentials, ResultSet};
use crate::services::transport::{Connector, WarehouseConnection};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::time::{Duration, Instant};

/// API path for statement submission.
const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

/// The API accepts `0s` or a wait between 5 and 50 seconds.
const MIN_WAIT_SECS: u64 = 5;
const MAX_WAIT_SECS: u64 = 50;

/// First poll interval; doubles up to `MAX_POLL_INTERVAL`.
const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Transport options for [`StatementApiConnector`].
#[derive(Debug, Clone)]
pub struct StatementApiOptions {
    /// URL scheme (`https` outside of tests)
    pub scheme: String,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// Server-side wait before a statement is returned as pending
    pub statement_wait: Duration,
    /// Upper bound on polling a pending statement
    pub max_poll: Duration,
    /// Result transfer mode
    pub disposition: ResultDisposition,
}

impl Default for StatementApiOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl StatementApiOptions {
    /// Derive transport options from session configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            scheme: "https".to_string(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            statement_wait: Duration::from_secs(config.statement_wait_secs),
            max_poll: Duration::from_secs(config.max_poll_secs),
            disposition: config.result_disposition,
        }
    }

    /// Use plain HTTP (local test servers).
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    fn wait_timeout_param(&self) -> String {
        let secs = self.statement_wait.as_secs().clamp(MIN_WAIT_SECS, MAX_WAIT_SECS);
        format!("{secs}s")
    }
}

/// Opens [`StatementApiConnection`]s.
#[derive(Debug, Clone, Default)]
pub struct StatementApiConnector {
    options: StatementApiOptions,
}

impl StatementApiConnector {
    /// Create a connector with the given options.
    pub fn new(options: StatementApiOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for StatementApiConnector {
    async fn open(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn WarehouseConnection>, TollgateError> {
        let warehouse_id = credentials.warehouse_id().ok_or_else(|| {
            TollgateError::transport(
                None,
                format!("Warehouse not found in HTTP path '{}'", credentials.http_path()),
            )
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("tollgate/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(self.options.connect_timeout)
            .timeout(self.options.connect_timeout + self.options.statement_wait)
            .build()?;

        tracing::debug!(
            host = %credentials.host(),
            warehouse_id = %warehouse_id,
            "Opened statement API connection"
        );

        Ok(Box::new(StatementApiConnection {
            client,
            base_url: format!("{}://{}", self.options.scheme, credentials.host()),
            warehouse_id: warehouse_id.to_string(),
            token: credentials.token().expose().to_string(),
            options: self.options.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "StatementApiConnector"
    }
}

/// One logical connection: an HTTP client bound to a warehouse and token.
pub struct StatementApiConnection {
    client: reqwest::Client,
    base_url: String,
    warehouse_id: String,
    token: String,
    options: StatementApiOptions,
}

impl std::fmt::Debug for StatementApiConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementApiConnection")
            .field("base_url", &self.base_url)
            .field("warehouse_id", &self.warehouse_id)
            .finish()
    }
}

impl StatementApiConnection {
    async fn submit(&self, sql: &str) -> Result<StatementResponse, TollgateError> {
        let request = ExecuteStatementRequest {
            warehouse_id: &self.warehouse_id,
            statement: sql,
            wait_timeout: self.options.wait_timeout_param(),
            on_wait_timeout: "CONTINUE",
            disposition: self.options.disposition.as_str(),
            format: "JSON_ARRAY",
        };
        let response = self
            .client
            .post(format!("{}{}", self.base_url, STATEMENTS_PATH))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, TollgateError> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await?)
    }

    async fn wait_for_completion(
        &self,
        mut response: StatementResponse,
    ) -> Result<StatementResponse, TollgateError> {
        let started = Instant::now();
        let mut interval = INITIAL_POLL_INTERVAL;

        while response.status.state.is_pending() {
            if started.elapsed() >= self.options.max_poll {
                return Err(TollgateError::transport(
                    None,
                    format!(
                        "Statement {} timed out after {}s",
                        response.statement_id,
                        self.options.max_poll.as_secs()
                    ),
                ));
            }
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(MAX_POLL_INTERVAL);

            let path = format!("{}/{}", STATEMENTS_PATH, response.statement_id);
            response = read_json(self.get(&path).await?).await?;
        }

        Ok(response)
    }

    /// Append a chunk's rows, inline or downloaded, and return the link to
    /// the next chunk.
    async fn drain_chunk(
        &self,
        chunk: ResultChunk,
        columns: &[ColumnInfo],
        rows: &mut Vec<Vec<Value>>,
    ) -> Result<Option<String>, TollgateError> {
        append_rows(rows, columns, chunk.data_array);
        let mut next = chunk.next_chunk_internal_link;

        for link in chunk.external_links.unwrap_or_default() {
            // Presigned URL; the bearer token must not be sent along
            let response = self.client.get(&link.external_link).send().await?;
            let data: Vec<Vec<Option<String>>> = read_json(response).await?;
            append_rows(rows, columns, Some(data));
            if link.next_chunk_internal_link.is_some() {
                next = link.next_chunk_internal_link;
            }
        }
        Ok(next)
    }
}

#[async_trait]
impl WarehouseConnection for StatementApiConnection {
    async fn execute(&self, sql: &str) -> Result<ResultSet, TollgateError> {
        let response = self.submit(sql).await?;
        let response = self.wait_for_completion(response).await?;

        match response.status.state {
            StatementState::Succeeded => {}
            state => {
                let message = response
                    .status
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("Statement ended in state {state:?}"));
                return Err(TollgateError::transport(None, message));
            }
        }

        let columns: Vec<ColumnInfo> = response
            .manifest
            .map(|m| m.schema.columns)
            .unwrap_or_default()
            .into_iter()
            .map(|c| ColumnInfo::new(c.name, c.type_name))
            .collect();

        let mut rows = Vec::new();
        let mut next = match response.result {
            Some(chunk) => self.drain_chunk(chunk, &columns, &mut rows).await?,
            None => None,
        };
        while let Some(link) = next {
            let chunk: ResultChunk = read_json(self.get(&link).await?).await?;
            next = self.drain_chunk(chunk, &columns, &mut rows).await?;
        }

        tracing::trace!(
            statement_id = %response.statement_id,
            rows = rows.len(),
            "Statement drained"
        );

        Ok(ResultSet { columns, rows })
    }

    async fn close(&self) {
        tracing::debug!(warehouse_id = %self.warehouse_id, "Closed statement API connection");
    }
}

/// Read a JSON body, turning non-2xx responses into transport errors that
/// keep the HTTP status.
async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, TollgateError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ServiceError>(&body)
            .map(|e| e.to_string())
            .unwrap_or(body);
        return Err(TollgateError::transport(
            Some(status.as_u16()),
            format!("{status}: {detail}"),
        ));
    }
    Ok(response.json::<T>().await?)
}

fn append_rows(rows: &mut Vec<Vec<Value>>, columns: &[ColumnInfo], data: Option<Vec<Vec<Option<String>>>>) {
    for raw in data.unwrap_or_default() {
        let row = raw
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                let type_name = columns.get(i).map(|c| c.type_name.as_str()).unwrap_or("STRING");
                typed_value(cell, type_name)
            })
            .collect();
        rows.push(row);
    }
}

/// Convert a `JSON_ARRAY` cell (always a string or null) to a typed value.
///
/// Text that does not parse as the column type is kept as a string. DECIMAL
/// values become numbers only when `f64` holds them exactly.
fn typed_value(cell: Option<String>, type_name: &str) -> Value {
    let Some(text) = cell else {
        return Value::Null;
    };
    let base = type_name.split('(').next().unwrap_or(type_name).trim().to_ascii_uppercase();
    let typed = match base.as_str() {
        "BYTE" | "TINYINT" | "SHORT" | "SMALLINT" | "INT" | "INTEGER" | "LONG" | "BIGINT" => {
            text.parse::<i64>().ok().map(Value::from)
        }
        "FLOAT" | "DOUBLE" => {
            text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
        }
        "DECIMAL" | "DEC" | "NUMERIC" => exact_decimal(&text),
        "BOOLEAN" => text.parse::<bool>().ok().map(Value::Bool),
        _ => None,
    };
    typed.unwrap_or(Value::String(text))
}

fn exact_decimal(text: &str) -> Option<Value> {
    let parsed = text.trim().parse::<f64>().ok().filter(|f| f.is_finite())?;
    if canonical_decimal(text) != canonical_decimal(&parsed.to_string()) {
        return None;
    }
    Number::from_f64(parsed).map(Value::Number)
}

/// Decimal text without sign prefix `+` or trailing fractional zeros.
fn canonical_decimal(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

// ========== Wire Types ==========

#[derive(Debug, Serialize)]
struct ExecuteStatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    disposition: &'static str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<ResultManifest>,
    #[serde(default)]
    result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
}

impl StatementState {
    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.error_code, &self.message) {
            (Some(code), Some(message)) => write!(f, "{code}: {message}"),
            (Some(code), None) => f.write_str(code),
            (None, Some(message)) => f.write_str(message),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultManifest {
    schema: ResultSchema,
}

#[derive(Debug, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    columns: Vec<ResultColumn>,
}

#[derive(Debug, Deserialize)]
struct ResultColumn {
    name: String,
    #[serde(default = "default_type_name")]
    type_name: String,
}

fn default_type_name() -> String {
    "STRING".to_string()
}

#[derive(Debug, Deserialize)]
struct ResultChunk {
    #[serde(default)]
    data_array: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
    #[serde(default)]
    external_links: Option<Vec<ExternalLink>>,
}

#[derive(Debug, Deserialize)]
struct ExternalLink {
    external_link: String,
    #[serde(default)]
    next_chunk_internal_link: Option<String>,
}
