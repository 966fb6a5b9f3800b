//! Per-user session state and the registry that holds it.
//!
//! A [`UserSession`] owns everything one user touches: the warehouse
//! connection, the browse selection, the loaded dataset and its export gate.
//! Nothing here is process-global except the shared [`AuditLog`] and
//! [`Connector`], so concurrent users never see each other's state.

use crate::config::SessionConfig;
use crate::error::TollgateError;
use crate::models::{AuditDetails, AuditEventType, ConnectionStatus, Credentials, Dataset};
use crate::services::audit::process_owner;
use crate::services::browse::{BrowseState, SelectionPreferences};
use crate::services::credentials::CredentialSource;
use crate::services::export::{ExportArtifact, ExportFormat};
use crate::services::gate::{ExportGate, GateTransition};
use crate::services::statement_api::{StatementApiConnector, StatementApiOptions};
use crate::services::transport::Connector;
use crate::services::warehouse::{check_row_limit, WarehouseSession};
use crate::services::AuditLog;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

// ============================================================================
// UserSession
// ============================================================================

/// One user's connection, selection, dataset and gate.
pub struct UserSession {
    id: Uuid,
    config: SessionConfig,
    audit: Arc<AuditLog>,
    warehouse: WarehouseSession,
    browse: BrowseState,
    dataset: Option<Dataset>,
    gate: ExportGate,
}

impl UserSession {
    /// Create a disconnected session.
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>, audit: Arc<AuditLog>) -> Self {
        let browse = BrowseState::new(SelectionPreferences::from_config(&config));
        Self {
            id: Uuid::new_v4(),
            config,
            audit,
            warehouse: WarehouseSession::new(connector),
            browse,
            dataset: None,
            gate: ExportGate::new(),
        }
    }

    // ========== Connection ==========

    /// Resolve credentials from `source` and connect.
    ///
    /// Incomplete credentials are reported without a connection attempt or an
    /// audit event.
    pub async fn connect(&mut self, source: &dyn CredentialSource) -> Result<(), TollgateError> {
        let credentials = source.resolve()?;
        self.connect_with(credentials).await
    }

    /// Connect with already-resolved credentials.
    ///
    /// Any previous connection, selection and dataset are discarded. On success
    /// the default catalog, schema and table are pre-selected. A discovery
    /// failure during that step does not fail the connect: the affected list
    /// is left empty and the error is kept on [`BrowseState`].
    pub async fn connect_with(&mut self, credentials: Credentials) -> Result<(), TollgateError> {
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return Err(TollgateError::NotConfigured { missing });
        }

        self.browse.reset();
        self.dataset = None;
        self.gate = ExportGate::new();

        let host = credentials.host().to_string();
        let source = credentials.source();
        let actor = credentials.user().map(String::from).unwrap_or_else(process_owner);

        match self.warehouse.connect(credentials).await {
            Ok(()) => {
                self.audit.record(
                    AuditEventType::ConnectionSuccess,
                    AuditDetails::new()
                        .with("host", &host)
                        .with("method", source.method_label())
                        .with("auth_type", source.auth_type_label()),
                    &actor,
                );
                if let Some(catalog) = self.browse.default_catalog(self.warehouse.catalogs()) {
                    let catalog = catalog.to_string();
                    if let Err(e) = self.select_catalog(&catalog).await {
                        tracing::warn!(session_id = %self.id, error = %e, "Default selection incomplete");
                    }
                }
                Ok(())
            }
            Err(e) => {
                let reason = e.connect_kind().map(|k| k.as_str()).unwrap_or(e.category());
                self.audit.record(
                    AuditEventType::ConnectionFailure,
                    AuditDetails::new()
                        .with("host", &host)
                        .with("method", source.method_label())
                        .with("reason", reason),
                    &actor,
                );
                Err(e)
            }
        }
    }

    /// Close the connection and forget all state.
    pub async fn disconnect(&mut self) {
        self.warehouse.disconnect().await;
        self.browse.reset();
        self.dataset = None;
        self.gate = ExportGate::new();
    }

    // ========== Browsing ==========

    /// Select a catalog, list its schemas and pre-select the default one.
    ///
    /// A listing failure leaves the catalog selected with an empty schema list
    /// and is returned to the caller.
    pub async fn select_catalog(&mut self, name: &str) -> Result<(), TollgateError> {
        self.require_connected()?;
        self.browse.select_catalog(name);

        match self.warehouse.list_schemas(name).await {
            Ok(schemas) => self.browse.set_schema_options(schemas),
            Err(e) => {
                tracing::warn!(catalog = %name, error = %e, "Error fetching schemas");
                self.browse.schema_listing_failed(e.to_string());
                return Err(e);
            }
        }

        match self.browse.default_schema() {
            Some(schema) => self.select_schema(&schema).await,
            None => Ok(()),
        }
    }

    /// Select a schema, list its tables and pre-select the default one.
    ///
    /// A listing failure leaves the schema selected with an empty table list
    /// and is returned to the caller.
    pub async fn select_schema(&mut self, name: &str) -> Result<(), TollgateError> {
        self.require_connected()?;
        self.browse.select_schema(name)?;
        let catalog = self.browse.catalog().unwrap_or_default().to_string();

        match self.warehouse.list_tables(&catalog, name).await {
            Ok(tables) => self.browse.set_table_options(tables),
            Err(e) => {
                tracing::warn!(catalog = %catalog, schema = %name, error = %e, "Error fetching tables");
                self.browse.table_listing_failed(e.to_string());
                return Err(e);
            }
        }

        if let Some(table) = self.browse.default_table() {
            self.browse.select_table(table)?;
        }
        Ok(())
    }

    /// Select a table.
    pub fn select_table(&mut self, name: &str) -> Result<(), TollgateError> {
        self.browse.select_table(name)
    }

    // ========== Loading ==========

    /// Load the selected table with the configured default row limit.
    pub async fn load_default(&mut self) -> Result<&Dataset, TollgateError> {
        self.load(self.config.default_row_limit).await
    }

    /// Load at most `row_limit` rows of the selected table.
    ///
    /// On success the export gate is rebound (and closed) before the dataset
    /// becomes visible. On failure the previous dataset is kept.
    pub async fn load(&mut self, row_limit: u32) -> Result<&Dataset, TollgateError> {
        check_row_limit(row_limit)?;
        let table = self
            .browse
            .qualified_table()
            .ok_or_else(|| TollgateError::precondition("Select a catalog, schema and table first"))?;

        let dataset = self.warehouse.query(&table, row_limit).await?;
        self.gate.on_dataset_loaded(dataset.id());

        self.audit.record(
            AuditEventType::DataLoaded,
            AuditDetails::new()
                .with("table", dataset.source_table())
                .with("rows", dataset.row_count())
                .with("columns", dataset.column_count()),
            &self.actor(),
        );

        Ok(self.dataset.insert(dataset))
    }

    // ========== Terms & Export ==========

    /// Set terms acceptance for the loaded dataset `dataset_id`.
    ///
    /// Only a false -> true change records `TERMS_ACCEPTED`. A stale id is
    /// ignored.
    pub fn set_terms_accepted(
        &mut self,
        dataset_id: Uuid,
        accepted: bool,
    ) -> Result<GateTransition, TollgateError> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| TollgateError::precondition("No data loaded"))?;

        let transition = self.gate.set_accepted(dataset_id, accepted);
        if transition == GateTransition::Accepted {
            self.audit.record(
                AuditEventType::TermsAccepted,
                AuditDetails::new()
                    .with("table", dataset.source_table())
                    .with("rows", dataset.row_count()),
                &self.actor(),
            );
        }
        Ok(transition)
    }

    /// Whether the loaded dataset may be exported.
    pub fn is_export_allowed(&self) -> bool {
        self.dataset.as_ref().is_some_and(|d| self.gate.is_export_allowed(d.id()))
    }

    /// Encode the loaded dataset.
    ///
    /// Refused, without encoding anything, unless terms were accepted for this
    /// dataset.
    pub fn export(&self, format: ExportFormat) -> Result<ExportArtifact, TollgateError> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| TollgateError::precondition("No data loaded"))?;
        if !self.gate.is_export_allowed(dataset.id()) {
            return Err(TollgateError::precondition(
                "Accept the Terms of Use before downloading data",
            ));
        }

        let artifact = ExportArtifact::build(dataset, format);
        self.audit.record(
            format.audit_event(),
            AuditDetails::new()
                .with("table", dataset.source_table())
                .with("rows", dataset.row_count())
                .with("file", &artifact.file_name),
            &self.actor(),
        );
        tracing::info!(
            session_id = %self.id,
            file = %artifact.file_name,
            bytes = artifact.bytes.len(),
            "Export produced"
        );
        Ok(artifact)
    }

    // ========== Accessors ==========

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Best-effort identity for audit records.
    pub fn actor(&self) -> String {
        self.warehouse
            .credentials()
            .and_then(|c| c.user())
            .map(String::from)
            .unwrap_or_else(process_owner)
    }

    /// Connection status.
    pub fn status(&self) -> &ConnectionStatus {
        self.warehouse.status()
    }

    /// Catalogs from the connect check.
    pub fn catalogs(&self) -> &[String] {
        self.warehouse.catalogs()
    }

    /// Browse selection and listings.
    pub fn browse(&self) -> &BrowseState {
        &self.browse
    }

    /// The loaded dataset, if any.
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// The export gate.
    pub fn gate(&self) -> &ExportGate {
        &self.gate
    }

    fn require_connected(&self) -> Result<(), TollgateError> {
        if self.warehouse.is_connected() {
            Ok(())
        } else {
            Err(TollgateError::precondition("Not connected to a warehouse"))
        }
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("id", &self.id)
            .field("warehouse", &self.warehouse)
            .field("browse", &self.browse)
            .field("dataset_rows", &self.dataset.as_ref().map(Dataset::row_count))
            .field("gate", &self.gate)
            .finish()
    }
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Shared handle to one user's session. Holding the lock serializes that
/// user's actions.
pub type SharedSession = Arc<Mutex<UserSession>>;

/// All live user sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    audit: Arc<AuditLog>,
}

impl SessionRegistry {
    /// Create a registry with an explicit connector and audit log.
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>, audit: Arc<AuditLog>) -> Self {
        tracing::info!(
            connector = connector.name(),
            audit_sink = audit.sink_name(),
            "SessionRegistry initialized"
        );
        Self { sessions: RwLock::new(HashMap::new()), config, connector, audit }
    }

    /// Create a registry using the HTTP connector and the configured audit sink.
    pub fn from_config(config: SessionConfig) -> Self {
        let connector = Arc::new(StatementApiConnector::new(StatementApiOptions::from_config(&config)));
        let audit = Arc::new(AuditLog::from_config(&config));
        Self::new(config, connector, audit)
    }

    /// Start a new session.
    pub fn create_session(&self) -> SharedSession {
        let session = UserSession::new(self.config.clone(), self.connector.clone(), self.audit.clone());
        let id = session.id();
        let session = Arc::new(Mutex::new(session));
        self.sessions.write().insert(id, session.clone());
        tracing::debug!(session_id = %id, "Session created");
        session
    }

    /// Get a session by ID.
    pub fn get_session(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session and release its connection.
    pub async fn close_session(&self, id: &Uuid) -> bool {
        let session = self.sessions.write().remove(id);
        match session {
            Some(session) => {
                session.lock().await.disconnect().await;
                tracing::debug!(session_id = %id, "Session closed");
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// The shared audit log.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }
}
