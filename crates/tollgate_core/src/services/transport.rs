//! Warehouse transport seam.
//!
//! The session only needs two capabilities from the warehouse: open a
//! connection for a set of credentials, and run one statement to completion.
//! Failures surface as [`TollgateError::Transport`] so callers can classify
//! them for their own context (connect vs. query).

use crate::error::TollgateError;
use crate::models::{Credentials, ResultSet};

use async_trait::async_trait;

/// A live connection to a SQL warehouse.
#[async_trait]
pub trait WarehouseConnection: Send + Sync {
    /// Execute one statement and drain every row before returning.
    async fn execute(&self, sql: &str) -> Result<ResultSet, TollgateError>;

    /// Release the connection. Called exactly once before the handle is dropped.
    async fn close(&self);
}

/// Opens warehouse connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection. No statement is issued here; the session checks
    /// reachability itself.
    async fn open(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn WarehouseConnection>, TollgateError>;

    /// Connector name for logging.
    fn name(&self) -> &'static str;
}
