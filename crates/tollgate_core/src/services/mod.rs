//! Backend services for Tollgate.
//!
//! This module contains all service layer abstractions:
//! - `transport` - Connector / connection traits for the warehouse
//! - `statement_api` - HTTP connector for the SQL Statement Execution API
//! - `warehouse` - The single live warehouse connection, discovery and loads
//! - `browse` - Catalog/schema/table selection state machine
//! - `gate` - Terms-of-use export gate
//! - `export` - CSV and JSON encoding
//! - `audit` - Append-only compliance audit log
//! - `credentials` - Credential sources

pub mod audit;
pub mod browse;
pub mod credentials;
pub mod export;
pub mod gate;
pub mod statement_api;
pub mod transport;
pub mod warehouse;

pub use audit::{AuditLog, AuditSink, FileSink, MemorySink, StdoutSink, TracingSink};
pub use browse::{BrowseState, SelectionPreferences};
pub use credentials::{
    CredentialSource, EnvCredentials, ForwardedAuthCredentials, ManualCredentials,
    StaticCredentials,
};
pub use export::{ExportArtifact, ExportFormat};
pub use gate::{ExportGate, GateTransition, TERMS_OF_USE};
pub use statement_api::{StatementApiConnector, StatementApiOptions};
pub use transport::{Connector, WarehouseConnection};
pub use warehouse::WarehouseSession;
