//! Core types and services for Tollgate, a gated warehouse export tool.
//!
//! This crate provides the backend service layer for Tollgate:
//!
//! - **error**: Error handling with connection failure classification
//! - **models**: Credentials, datasets and audit events
//! - **services**: Warehouse transport, browsing, terms gate, export codecs, audit log
//! - **state**: Per-user sessions and the session registry
//! - **config**: Session configuration
//! - **logging**: Structured logging setup

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::{AuditSinkKind, ResultDisposition, SessionConfig};
pub use error::{ConnectErrorKind, ErrorInfo, TollgateError};
pub use models::{
    AuditDetails, AuditEvent, AuditEventType, ColumnInfo, ConnectionStatus, CredentialSourceKind,
    Credentials, Dataset, QualifiedName, ResultSet,
};
pub use services::{
    AuditLog, BrowseState, CredentialSource, ExportArtifact, ExportFormat, ExportGate,
    GateTransition, StatementApiConnector, WarehouseSession, TERMS_OF_USE,
};
pub use state::{SessionRegistry, SharedSession, UserSession};
