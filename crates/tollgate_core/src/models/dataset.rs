//! Tabular result models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Column metadata from a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Warehouse type name (e.g. "INT", "STRING")
    pub type_name: String,
}

impl ColumnInfo {
    /// Create column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into() }
    }
}

/// Fully drained result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column descriptors, in result order
    pub columns: Vec<ColumnInfo>,
    /// Rows, each aligned with `columns`
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Text of the cell at `index` in every row, skipping rows that lack it.
    pub fn text_column(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index))
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()
    }
}

/// `catalog.schema.table` address of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Catalog name
    pub catalog: String,
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
}

impl QualifiedName {
    /// Create a qualified name.
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self { catalog: catalog.into(), schema: schema.into(), table: table.into() }
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            quote_identifier(&self.catalog),
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }
}

/// Render an identifier for SQL.
///
/// Plain `[A-Za-z0-9_]` names are emitted verbatim; anything else is
/// backtick-quoted with embedded backticks doubled.
pub fn quote_identifier(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// The active, in-memory result of a table load.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: Uuid,
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    source_table: QualifiedName,
    loaded_at: DateTime<Utc>,
}

impl Dataset {
    /// Materialize a result set as a dataset with a fresh identifier.
    pub fn new(source_table: QualifiedName, result: ResultSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            columns: result.columns,
            rows: result.rows,
            source_table,
            loaded_at: Utc::now(),
        }
    }

    /// Identifier the export gate binds to.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Column metadata.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows, each aligned with `columns`.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// At most the first `n` rows, for previews.
    pub fn head(&self, n: usize) -> &[Vec<Value>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// The table this dataset was loaded from.
    pub fn source_table(&self) -> &QualifiedName {
        &self.source_table
    }

    /// When the load completed.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rough in-memory footprint of the cell data, in bytes.
    pub fn approx_size_bytes(&self) -> usize {
        self.rows.iter().flatten().map(value_size).sum()
    }
}

fn value_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 1,
        Value::Number(_) => 8,
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(value_size).sum(),
        Value::Object(map) => map.iter().map(|(k, v)| k.len() + value_size(v)).sum(),
    }
}
