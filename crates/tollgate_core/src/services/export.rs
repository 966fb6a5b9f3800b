//! CSV and JSON encoding of a loaded dataset.
//!
//! Both encoders are pure functions of the in-memory [`Dataset`]; they never
//! touch the gate or the audit log. Callers check the gate first.

use crate::error::TollgateError;
use crate::models::{AuditEventType, Dataset};

use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Pretty-printed array of row objects
    Json,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// MIME type of the payload.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }

    /// Audit event recorded when this format is produced.
    pub fn audit_event(&self) -> AuditEventType {
        match self {
            Self::Csv => AuditEventType::ExportCsv,
            Self::Json => AuditEventType::ExportJson,
        }
    }

    /// Parse from a string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Encode `dataset` in this format.
    pub fn encode(&self, dataset: &Dataset) -> Vec<u8> {
        match self {
            Self::Csv => to_csv(dataset),
            Self::Json => to_json(dataset),
        }
    }
}

/// An encoded export ready to hand to the user.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// `<table>.<ext>`
    pub file_name: String,
    /// MIME type
    pub mime_type: &'static str,
    /// Encoded payload
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// Encode `dataset` and name the file after its source table.
    pub fn build(dataset: &Dataset, format: ExportFormat) -> Self {
        Self {
            file_name: format!("{}.{}", file_stem(&dataset.source_table().table), format.extension()),
            mime_type: format.mime_type(),
            bytes: format.encode(dataset),
        }
    }

    /// Write the payload into `dir`, returning the full path.
    ///
    /// `file_name` must be a bare file name; anything that would resolve
    /// outside `dir` is refused.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, TollgateError> {
        let name = Path::new(&self.file_name);
        if !matches!(name.components().collect::<Vec<_>>().as_slice(), [Component::Normal(_)]) {
            return Err(TollgateError::precondition(format!(
                "Refusing to write export with file name '{}'",
                self.file_name
            )));
        }
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// File stem for a table name: path separators and control characters
/// become `_`, leading dots are dropped.
fn file_stem(table: &str) -> String {
    let stem: String = table
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_control() { '_' } else { c })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "export".to_string()
    } else {
        stem.to_string()
    }
}

/// Encode as CSV: header of column names, no index column, standard quoting.
/// Nulls become empty fields.
pub fn to_csv(dataset: &Dataset) -> Vec<u8> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    // Writing into a Vec only fails on inconsistent record lengths, which the
    // padding below rules out.
    if let Err(e) = write_csv(&mut writer, dataset) {
        tracing::error!(error = %e, "CSV encoding failed");
    }
    writer.into_inner().unwrap_or_else(|e| e.into_inner().get_ref().clone())
}

fn write_csv(writer: &mut csv::Writer<Vec<u8>>, dataset: &Dataset) -> Result<(), TollgateError> {
    let width = dataset.column_count();
    writer.write_record(dataset.column_names())?;
    for row in dataset.rows() {
        let fields = (0..width).map(|i| row.get(i).map(csv_field).unwrap_or_default());
        writer.write_record(fields)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode as a pretty-printed JSON array of row objects keyed by column name,
/// in column order. Numbers, booleans and nulls keep their JSON types.
pub fn to_json(dataset: &Dataset) -> Vec<u8> {
    let records: Vec<Value> = dataset
        .rows()
        .iter()
        .map(|row| {
            let object: Map<String, Value> = dataset
                .columns()
                .iter()
                .enumerate()
                .map(|(i, column)| (column.name.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(object)
        })
        .collect();
    // Serializing a Value tree cannot fail
    serde_json::to_vec_pretty(&Value::Array(records)).unwrap_or_else(|_| b"[]".to_vec())
}
