//! Data models for Tollgate.
//!
//! This module contains all data structures used throughout the application:
//! - `connection` - Credentials and connection status
//! - `dataset` - Result sets, qualified table names and the loaded dataset
//! - `audit` - Compliance audit events

pub mod audit;
pub mod connection;
pub mod dataset;

pub use audit::{AuditDetails, AuditEvent, AuditEventType};
pub use connection::{ConnectionStatus, CredentialSourceKind, Credentials, SecretToken};
pub use dataset::{ColumnInfo, Dataset, QualifiedName, ResultSet};
