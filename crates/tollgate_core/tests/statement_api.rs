//! Statement Execution API transport against a local mock server.

use std::sync::Arc;

use serde_json::{json, Value};
use tollgate_core::models::{AuditEventType, CredentialSourceKind, Credentials};
use tollgate_core::services::credentials::ManualCredentials;
use tollgate_core::services::{
    AuditLog, Connector, ExportFormat, MemorySink, StatementApiConnector, StatementApiOptions,
    WarehouseConnection,
};
use tollgate_core::{ConnectErrorKind, ResultDisposition, SessionConfig, TollgateError, UserSession};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAREHOUSE_PATH: &str = "/sql/1.0/warehouses/wh-1";

fn connector() -> StatementApiConnector {
    StatementApiConnector::new(StatementApiOptions::default().with_scheme("http"))
}

fn credentials(server: &MockServer, token: &str) -> Credentials {
    Credentials::new(server.uri(), WAREHOUSE_PATH, token, CredentialSourceKind::Manual)
}

fn succeeded(id: &str, columns: &[(&str, &str)], rows: Value) -> Value {
    json!({
        "statement_id": id,
        "status": { "state": "SUCCEEDED" },
        "manifest": {
            "schema": {
                "columns": columns
                    .iter()
                    .map(|(name, type_name)| json!({ "name": name, "type_name": type_name }))
                    .collect::<Vec<_>>()
            }
        },
        "result": { "data_array": rows }
    })
}

async fn answer(server: &MockServer, sql: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .and(body_partial_json(json!({ "statement": sql })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_inline_result_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .and(header("authorization", "Bearer dapi-secret"))
        .and(body_partial_json(json!({
            "warehouse_id": "wh-1",
            "statement": "SELECT * FROM samples.nyctaxi.trips LIMIT 2",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
            "on_wait_timeout": "CONTINUE",
            "wait_timeout": "30s"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded(
            "s-1",
            &[("trip_distance", "DOUBLE"), ("pickup_zip", "INT"), ("vendor", "STRING")],
            json!([["1.5", "10001", "CMT"], ["2.25", null, "VTS"]]),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let connection = connector().open(&credentials(&server, "dapi-secret")).await.unwrap();
    let result = connection.execute("SELECT * FROM samples.nyctaxi.trips LIMIT 2").await.unwrap();

    assert_eq!(result.columns.len(), 3);
    assert_eq!(result.columns[1].type_name, "INT");
    assert_eq!(result.rows[0], vec![json!(1.5), json!(10001), json!("CMT")]);
    assert_eq!(result.rows[1][1], Value::Null);
}

#[tokio::test]
async fn test_pending_statement_is_polled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statement_id": "s-2",
            "status": { "state": "PENDING" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/sql/statements/s-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded(
            "s-2",
            &[("catalog", "STRING")],
            json!([["main"], ["samples"]]),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let connection = connector().open(&credentials(&server, "dapi")).await.unwrap();
    let result = connection.execute("SHOW CATALOGS").await.unwrap();

    assert_eq!(result.text_column(0), vec!["main", "samples"]);
}

#[tokio::test]
async fn test_result_chunks_are_followed() {
    let server = MockServer::start().await;
    let mut first = succeeded("s-3", &[("n", "BIGINT")], json!([["1"], ["2"]]));
    first["result"]["next_chunk_internal_link"] =
        json!("/api/2.0/sql/statements/s-3/result/chunks/1");
    answer(&server, "SELECT * FROM t LIMIT 3", first).await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/sql/statements/s-3/result/chunks/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chunk_index": 1,
            "data_array": [["3"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let connection = connector().open(&credentials(&server, "dapi")).await.unwrap();
    let result = connection.execute("SELECT * FROM t LIMIT 3").await.unwrap();

    let values: Vec<Value> = result.rows.into_iter().map(|mut r| r.remove(0)).collect();
    assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn test_external_links_are_downloaded_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .and(body_partial_json(json!({ "disposition": "EXTERNAL_LINKS" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statement_id": "s-5",
            "status": { "state": "SUCCEEDED" },
            "manifest": { "schema": { "columns": [{ "name": "n", "type_name": "INT" }] } },
            "result": {
                "external_links": [{
                    "chunk_index": 0,
                    "external_link": format!("{}/files/chunk-0", server.uri()),
                    "next_chunk_internal_link": "/api/2.0/sql/statements/s-5/result/chunks/1"
                }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/sql/statements/s-5/result/chunks/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "external_links": [{
                "chunk_index": 1,
                "external_link": format!("{}/files/chunk-1", server.uri())
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/chunk-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([["1"], ["2"]])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/chunk-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([["3"]])))
        .mount(&server)
        .await;

    let options = StatementApiOptions::from_config(
        &SessionConfig::default().with_result_disposition(ResultDisposition::ExternalLinks),
    )
    .with_scheme("http");
    let connection =
        StatementApiConnector::new(options).open(&credentials(&server, "dapi")).await.unwrap();
    let result = connection.execute("SELECT * FROM big LIMIT 100000").await.unwrap();

    let values: Vec<Value> = result.rows.into_iter().map(|mut r| r.remove(0)).collect();
    assert_eq!(values, vec![json!(1), json!(2), json!(3)]);

    let requests = server.received_requests().await.unwrap_or_default();
    let downloads: Vec<_> = requests.iter().filter(|r| r.url.path().starts_with("/files/")).collect();
    assert_eq!(downloads.len(), 2);
    assert!(downloads.iter().all(|r| !r.headers.contains_key("authorization")));
}

#[tokio::test]
async fn test_rejected_token_is_auth_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error_code": "INVALID_TOKEN",
            "message": "Invalid access token."
        })))
        .mount(&server)
        .await;

    let connection = connector().open(&credentials(&server, "expired")).await.unwrap();
    let err = connection.execute("SHOW CATALOGS").await.unwrap_err();

    assert!(matches!(err, TollgateError::Transport { status: Some(401), .. }));
    assert!(err.to_string().contains("INVALID_TOKEN"));
    assert_eq!(err.into_connect().connect_kind(), Some(ConnectErrorKind::AuthInvalid));
}

#[tokio::test]
async fn test_failed_statement_carries_service_message() {
    let server = MockServer::start().await;
    answer(
        &server,
        "SELECT * FROM missing LIMIT 1",
        json!({
            "statement_id": "s-4",
            "status": {
                "state": "FAILED",
                "error": {
                    "error_code": "TABLE_OR_VIEW_NOT_FOUND",
                    "message": "The table or view `missing` cannot be found."
                }
            }
        }),
    )
    .await;

    let connection = connector().open(&credentials(&server, "dapi")).await.unwrap();
    let err = connection.execute("SELECT * FROM missing LIMIT 1").await.unwrap_err();

    let query = err.into_query();
    assert!(matches!(query, TollgateError::Query { .. }));
    assert!(query.to_string().contains("TABLE_OR_VIEW_NOT_FOUND"));
}

#[tokio::test]
async fn test_http_path_without_warehouse_is_rejected() {
    let server = MockServer::start().await;
    let creds = Credentials::new(server.uri(), "/", "dapi", CredentialSourceKind::Manual);

    assert!(connector().open(&creds).await.is_err());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_session_flow_over_http() {
    let server = MockServer::start().await;
    answer(&server, "SHOW CATALOGS", succeeded("c", &[("catalog", "STRING")], json!([["samples"]])))
        .await;
    answer(
        &server,
        "SHOW SCHEMAS IN samples",
        succeeded("s", &[("databaseName", "STRING")], json!([["nyctaxi"]])),
    )
    .await;
    answer(
        &server,
        "SHOW TABLES IN samples.nyctaxi",
        succeeded(
            "t",
            &[("database", "STRING"), ("tableName", "STRING"), ("isTemporary", "BOOLEAN")],
            json!([["nyctaxi", "trips", "false"]]),
        ),
    )
    .await;
    answer(
        &server,
        "SELECT * FROM samples.nyctaxi.trips LIMIT 2",
        succeeded(
            "q",
            &[("trip_distance", "DOUBLE"), ("pickup_zip", "INT")],
            json!([["1.5", "10001"], ["3.0", "10002"]]),
        ),
    )
    .await;

    let sink = MemorySink::new();
    let mut session = UserSession::new(
        SessionConfig::default(),
        Arc::new(connector()),
        Arc::new(AuditLog::new(sink.clone())),
    );
    session
        .connect(&ManualCredentials::new(server.uri(), WAREHOUSE_PATH, "dapi"))
        .await
        .unwrap();
    assert_eq!(session.browse().table(), Some("trips"));

    let id = session.load(2).await.unwrap().id();
    assert!(session.export(ExportFormat::Csv).is_err());
    session.set_terms_accepted(id, true).unwrap();

    let artifact = session.export(ExportFormat::Csv).unwrap();
    assert_eq!(String::from_utf8(artifact.bytes).unwrap(), "trip_distance,pickup_zip\n1.5,10001\n3.0,10002\n");

    let kinds: Vec<AuditEventType> = sink.events().into_iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            AuditEventType::ConnectionSuccess,
            AuditEventType::DataLoaded,
            AuditEventType::TermsAccepted,
            AuditEventType::ExportCsv,
        ]
    );
}
