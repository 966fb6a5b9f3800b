//! Scripted in-memory warehouse for unit tests.

use crate::error::TollgateError;
use crate::models::{ColumnInfo, Credentials, ResultSet};
use crate::services::transport::{Connector, WarehouseConnection};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Failure = (Option<u16>, String);

#[derive(Default)]
struct Script {
    results: Mutex<HashMap<String, ResultSet>>,
    tables: Mutex<HashMap<String, ResultSet>>,
    failures: Mutex<HashMap<String, Failure>>,
    open_failure: Mutex<Option<Failure>>,
    statements: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Fake warehouse. Clones share the same script and counters.
#[derive(Clone, Default)]
pub struct FakeWarehouse {
    script: Arc<Script>,
}

impl FakeWarehouse {
    /// A warehouse with `main` and `samples` catalogs and a 25-row
    /// `samples.nyctaxi.trips` table.
    pub fn sample() -> Self {
        let fake = Self::default()
            .with_result("SHOW CATALOGS", listing(&["catalog"], &[&["main"], &["samples"]]))
            .with_result(
                "SHOW SCHEMAS IN samples",
                listing(&["databaseName"], &[&["nyctaxi"], &["tpch"]]),
            )
            .with_result(
                "SHOW SCHEMAS IN main",
                listing(&["databaseName"], &[&["default"], &["sales"]]),
            )
            .with_result(
                "SHOW TABLES IN samples.nyctaxi",
                listing(
                    &["database", "tableName", "isTemporary"],
                    &[&["nyctaxi", "trips", "false"], &["nyctaxi", "zones", "false"]],
                ),
            )
            .with_result(
                "SHOW TABLES IN samples.tpch",
                listing(&["database", "tableName", "isTemporary"], &[&["tpch", "orders", "false"]]),
            )
            .with_result("SHOW TABLES IN main.default", listing(&["database", "tableName"], &[]))
            .with_result("SHOW TABLES IN main.sales", listing(&["database", "tableName"], &[]));

        let trips = ResultSet {
            columns: vec![
                ColumnInfo::new("tpep_pickup_datetime", "TIMESTAMP"),
                ColumnInfo::new("tpep_dropoff_datetime", "TIMESTAMP"),
                ColumnInfo::new("trip_distance", "DOUBLE"),
                ColumnInfo::new("fare_amount", "DOUBLE"),
                ColumnInfo::new("pickup_zip", "INT"),
                ColumnInfo::new("dropoff_zip", "INT"),
            ],
            rows: (0..25)
                .map(|i| {
                    vec![
                        json!(format!("2016-02-{:02}T10:00:00Z", i % 28 + 1)),
                        json!(format!("2016-02-{:02}T10:20:00Z", i % 28 + 1)),
                        json!(1.5 + i as f64),
                        json!(8.0 + i as f64 / 2.0),
                        json!(10001 + i),
                        if i % 5 == 0 { Value::Null } else { json!(10100 + i) },
                    ]
                })
                .collect(),
        };
        let zones = ResultSet {
            columns: vec![ColumnInfo::new("zip", "INT"), ColumnInfo::new("borough", "STRING")],
            rows: vec![
                vec![json!(10001), json!("Manhattan")],
                vec![json!(11201), json!("Brooklyn")],
                vec![json!(10451), json!("Bronx")],
            ],
        };
        fake.with_table("samples.nyctaxi.trips", trips).with_table("samples.nyctaxi.zones", zones)
    }

    /// Answer `sql` with `result`.
    pub fn with_result(self, sql: &str, result: ResultSet) -> Self {
        self.script.results.lock().insert(sql.to_string(), result);
        self
    }

    /// Serve `SELECT * FROM <name> LIMIT n` from `rows`, truncated to `n`.
    pub fn with_table(self, name: &str, rows: ResultSet) -> Self {
        self.script.tables.lock().insert(name.to_string(), rows);
        self
    }

    /// Fail `sql` with a transport error.
    pub fn fail_on(self, sql: &str, status: Option<u16>, message: &str) -> Self {
        self.script.failures.lock().insert(sql.to_string(), (status, message.to_string()));
        self
    }

    /// Fail every `open` with a transport error.
    pub fn fail_open(self, status: Option<u16>, message: &str) -> Self {
        *self.script.open_failure.lock() = Some((status, message.to_string()));
        self
    }

    /// A connector backed by this script.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector { script: self.script.clone() })
    }

    /// Every statement executed, in order.
    pub fn statements(&self) -> Vec<String> {
        self.script.statements.lock().clone()
    }

    /// Number of connections opened.
    pub fn opened(&self) -> usize {
        self.script.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed.
    pub fn closed(&self) -> usize {
        self.script.closed.load(Ordering::SeqCst)
    }

    /// Connections currently open.
    pub fn open_now(&self) -> usize {
        self.opened() - self.closed()
    }
}

fn listing(columns: &[&str], rows: &[&[&str]]) -> ResultSet {
    ResultSet {
        columns: columns.iter().map(|c| ColumnInfo::new(*c, "STRING")).collect(),
        rows: rows.iter().map(|r| r.iter().map(|v| json!(v)).collect()).collect(),
    }
}

struct FakeConnector {
    script: Arc<Script>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        _credentials: &Credentials,
    ) -> Result<Box<dyn WarehouseConnection>, TollgateError> {
        if let Some((status, message)) = self.script.open_failure.lock().clone() {
            return Err(TollgateError::transport(status, message));
        }
        self.script.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection { script: self.script.clone() }))
    }

    fn name(&self) -> &'static str {
        "FakeConnector"
    }
}

struct FakeConnection {
    script: Arc<Script>,
}

#[async_trait]
impl WarehouseConnection for FakeConnection {
    async fn execute(&self, sql: &str) -> Result<ResultSet, TollgateError> {
        self.script.statements.lock().push(sql.to_string());

        if let Some((status, message)) = self.script.failures.lock().get(sql).cloned() {
            return Err(TollgateError::transport(status, message));
        }
        if let Some(result) = self.script.results.lock().get(sql).cloned() {
            return Ok(result);
        }
        if let Some((name, limit)) = sql
            .strip_prefix("SELECT * FROM ")
            .and_then(|rest| rest.rsplit_once(" LIMIT "))
        {
            if let (Some(table), Ok(limit)) =
                (self.script.tables.lock().get(name).cloned(), limit.parse::<usize>())
            {
                let rows = table.rows.into_iter().take(limit).collect();
                return Ok(ResultSet { columns: table.columns, rows });
            }
        }
        Err(TollgateError::transport(None, format!("[TABLE_OR_VIEW_NOT_FOUND] {sql}")))
    }

    async fn close(&self) {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
    }
}
