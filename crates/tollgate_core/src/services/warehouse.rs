//! Warehouse session: one live connection plus discovery and data loads.
//!
//! At most one connection handle is open at a time. Reconnecting closes the
//! previous handle before a new one is opened; there is no pooling.

use crate::config::{MAX_ROW_LIMIT, MIN_ROW_LIMIT};
use crate::error::TollgateError;
use crate::models::dataset::quote_identifier;
use crate::models::{ConnectionStatus, Credentials, Dataset, QualifiedName};
use crate::services::transport::{Connector, WarehouseConnection};

use std::sync::Arc;
use std::time::Instant;

/// Statement issued on connect; its result is the catalog list.
pub const SHOW_CATALOGS: &str = "SHOW CATALOGS";

/// Build the schema listing statement.
pub fn show_schemas_sql(catalog: &str) -> String {
    format!("SHOW SCHEMAS IN {}", quote_identifier(catalog))
}

/// Build the table listing statement.
pub fn show_tables_sql(catalog: &str, schema: &str) -> String {
    format!("SHOW TABLES IN {}.{}", quote_identifier(catalog), quote_identifier(schema))
}

/// Build the bounded data load statement.
pub fn select_sql(table: &QualifiedName, row_limit: u32) -> String {
    format!("SELECT * FROM {table} LIMIT {row_limit}")
}

/// Reject row limits outside `[MIN_ROW_LIMIT, MAX_ROW_LIMIT]`.
pub fn check_row_limit(row_limit: u32) -> Result<(), TollgateError> {
    if (MIN_ROW_LIMIT..=MAX_ROW_LIMIT).contains(&row_limit) {
        Ok(())
    } else {
        Err(TollgateError::precondition(format!(
            "Row limit must be between {MIN_ROW_LIMIT} and {MAX_ROW_LIMIT}, got {row_limit}"
        )))
    }
}

/// The user's single warehouse connection.
pub struct WarehouseSession {
    connector: Arc<dyn Connector>,
    credentials: Option<Credentials>,
    connection: Option<Box<dyn WarehouseConnection>>,
    status: ConnectionStatus,
    catalogs: Vec<String>,
}

impl WarehouseSession {
    /// Create a disconnected session that opens connections through `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            credentials: None,
            connection: None,
            status: ConnectionStatus::Disconnected,
            catalogs: Vec::new(),
        }
    }

    /// Connect with `credentials` and verify it with `SHOW CATALOGS`.
    ///
    /// Any previous connection is closed first. On failure the session is left
    /// in `Failed` with no live handle.
    pub async fn connect(&mut self, credentials: Credentials) -> Result<(), TollgateError> {
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return Err(TollgateError::NotConfigured { missing });
        }

        self.disconnect().await;
        self.status = ConnectionStatus::Connecting;
        tracing::debug!(
            host = %credentials.host(),
            http_path = %credentials.http_path(),
            connector = self.connector.name(),
            "Connecting to warehouse"
        );

        let result = self.open_and_verify(&credentials).await;
        self.credentials = Some(credentials);

        match result {
            Ok((connection, catalogs)) => {
                tracing::info!(catalogs = catalogs.len(), "Connected to warehouse");
                self.connection = Some(connection);
                self.catalogs = catalogs;
                self.status = ConnectionStatus::Connected;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Warehouse connection failed");
                self.status = ConnectionStatus::failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn open_and_verify(
        &self,
        credentials: &Credentials,
    ) -> Result<(Box<dyn WarehouseConnection>, Vec<String>), TollgateError> {
        let connection =
            self.connector.open(credentials).await.map_err(TollgateError::into_connect)?;

        match connection.execute(SHOW_CATALOGS).await {
            Ok(result) => Ok((connection, result.text_column(0))),
            Err(e) => {
                connection.close().await;
                Err(e.into_connect())
            }
        }
    }

    /// Close the live connection, if any, and forget the catalog list.
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
            tracing::debug!("Released previous warehouse connection");
        }
        self.catalogs.clear();
        self.status = ConnectionStatus::Disconnected;
    }

    /// List schemas in `catalog`.
    pub async fn list_schemas(&self, catalog: &str) -> Result<Vec<String>, TollgateError> {
        let result = self.execute(&show_schemas_sql(catalog)).await?;
        Ok(result.text_column(0))
    }

    /// List tables in `catalog.schema`. The table name is the second field.
    pub async fn list_tables(
        &self,
        catalog: &str,
        schema: &str,
    ) -> Result<Vec<String>, TollgateError> {
        let result = self.execute(&show_tables_sql(catalog, schema)).await?;
        Ok(result.text_column(1))
    }

    /// Load at most `row_limit` rows of `table`.
    ///
    /// The limit is validated before any request is made.
    pub async fn query(
        &self,
        table: &QualifiedName,
        row_limit: u32,
    ) -> Result<Dataset, TollgateError> {
        check_row_limit(row_limit)?;
        let sql = select_sql(table, row_limit);

        let started = Instant::now();
        let result = self.execute(&sql).await?;
        let dataset = Dataset::new(table.clone(), result);

        tracing::debug!(
            table = %table,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Table loaded"
        );
        Ok(dataset)
    }

    async fn execute(&self, sql: &str) -> Result<crate::models::ResultSet, TollgateError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| TollgateError::precondition("Not connected to a warehouse"))?;
        tracing::trace!(sql = %sql, "Executing statement");
        connection.execute(sql).await.map_err(|e| {
            tracing::warn!(error = %e, "Statement failed");
            e.into_query()
        })
    }

    /// Current connection status.
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Check if the session is connected.
    pub fn is_connected(&self) -> bool {
        self.status.is_connected() && self.connection.is_some()
    }

    /// Catalogs returned by the connect check.
    pub fn catalogs(&self) -> &[String] {
        &self.catalogs
    }

    /// Credentials of the last connect attempt.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl std::fmt::Debug for WarehouseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseSession")
            .field("connector", &self.connector.name())
            .field("status", &self.status)
            .field("catalogs", &self.catalogs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectErrorKind;
    use crate::models::CredentialSourceKind;
    use crate::testing::FakeWarehouse;

    fn creds() -> Credentials {
        Credentials::new(
            "adb-1.cloud.databricks.com",
            "/sql/1.0/warehouses/abc",
            "dapi-token",
            CredentialSourceKind::Manual,
        )
    }

    #[test]
    fn test_statement_shapes() {
        assert_eq!(show_schemas_sql("samples"), "SHOW SCHEMAS IN samples");
        assert_eq!(show_tables_sql("samples", "nyctaxi"), "SHOW TABLES IN samples.nyctaxi");
        assert_eq!(
            select_sql(&QualifiedName::new("samples", "nyctaxi", "trips"), 10),
            "SELECT * FROM samples.nyctaxi.trips LIMIT 10"
        );
    }

    #[test]
    fn test_row_limit_bounds() {
        assert!(check_row_limit(1).is_ok());
        assert!(check_row_limit(100_000).is_ok());
        assert!(check_row_limit(0).unwrap_err().is_precondition());
        assert!(check_row_limit(100_001).unwrap_err().is_precondition());
    }

    #[tokio::test]
    async fn test_connect_lists_catalogs() {
        let fake = FakeWarehouse::sample();
        let mut session = WarehouseSession::new(fake.connector());

        session.connect(creds()).await.unwrap();
        assert!(session.is_connected());
        assert_eq!(session.catalogs(), &["main".to_string(), "samples".to_string()]);
        assert_eq!(fake.statements(), vec![SHOW_CATALOGS.to_string()]);
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_handle() {
        let fake = FakeWarehouse::sample();
        let mut session = WarehouseSession::new(fake.connector());

        session.connect(creds()).await.unwrap();
        session.connect(creds()).await.unwrap();
        assert_eq!(fake.opened(), 2);
        assert_eq!(fake.closed(), 1);
        assert_eq!(fake.open_now(), 1);
    }

    #[tokio::test]
    async fn test_connect_check_failure_is_classified_and_released() {
        let fake = FakeWarehouse::sample().fail_on(SHOW_CATALOGS, Some(401), "Invalid access token");
        let mut session = WarehouseSession::new(fake.connector());

        let err = session.connect(creds()).await.unwrap_err();
        assert_eq!(err.connect_kind(), Some(ConnectErrorKind::AuthInvalid));
        assert!(session.status().is_failed());
        assert!(!session.is_connected());
        assert_eq!(fake.open_now(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_credentials_never_open() {
        let fake = FakeWarehouse::sample();
        let mut session = WarehouseSession::new(fake.connector());
        let incomplete = Credentials::new("", "/sql/1.0/warehouses/abc", "t", CredentialSourceKind::Manual);

        let err = session.connect(incomplete).await.unwrap_err();
        assert!(matches!(err, TollgateError::NotConfigured { .. }));
        assert_eq!(fake.opened(), 0);
    }

    #[tokio::test]
    async fn test_listings_use_positional_fields() {
        let fake = FakeWarehouse::sample();
        let mut session = WarehouseSession::new(fake.connector());
        session.connect(creds()).await.unwrap();

        assert_eq!(session.list_schemas("samples").await.unwrap(), vec!["nyctaxi", "tpch"]);
        assert_eq!(
            session.list_tables("samples", "nyctaxi").await.unwrap(),
            vec!["trips", "zones"]
        );
    }

    #[tokio::test]
    async fn test_query_rejects_limit_before_request() {
        let fake = FakeWarehouse::sample();
        let mut session = WarehouseSession::new(fake.connector());
        session.connect(creds()).await.unwrap();
        let table = QualifiedName::new("samples", "nyctaxi", "trips");

        let err = session.query(&table, 0).await.unwrap_err();
        assert!(err.is_precondition());
        let err = session.query(&table, 100_001).await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(fake.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_is_query_error() {
        let fake = FakeWarehouse::sample().fail_on(
            "SELECT * FROM samples.nyctaxi.trips LIMIT 5",
            None,
            "TABLE_OR_VIEW_NOT_FOUND",
        );
        let mut session = WarehouseSession::new(fake.connector());
        session.connect(creds()).await.unwrap();

        let err = session
            .query(&QualifiedName::new("samples", "nyctaxi", "trips"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::Query { .. }));
        assert!(session.is_connected());
    }
}
