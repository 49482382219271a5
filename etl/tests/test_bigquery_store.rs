use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};
use xrpl_etl::{
    cursor,
    row::{ColumnValue, Row},
    schema::SchemaRegistry,
    store::{
        self, BigQueryOptions, BigQueryStore, Credentials, InsertOutcome, Store, StoreError,
        TokenSource,
    },
};

const TABLES_PATH: &str = "/bigquery/v2/projects/xrpl-history/datasets/xrpl/tables";

fn new_store(server: &MockServer, access_token: Option<&str>) -> BigQueryStore {
    BigQueryStore::new(BigQueryOptions {
        base_url: server.uri(),
        project_id: "xrpl-history".to_string(),
        dataset: "xrpl".to_string(),
        credentials: access_token
            .map(|token| Credentials::AccessToken(token.to_string()))
            .unwrap_or(Credentials::Anonymous),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

/// Hands out tokens in order, like a provider refreshing an expired token.
struct RotatingTokens {
    tokens: Mutex<VecDeque<String>>,
}

#[async_trait]
impl TokenSource for RotatingTokens {
    async fn token(&self) -> error_stack::Result<String, StoreError> {
        let mut tokens = self.tokens.lock().unwrap();
        let token = if tokens.len() > 1 {
            tokens.pop_front()
        } else {
            tokens.front().cloned()
        };
        Ok(token.unwrap())
    }
}

fn payment_row(sequence: u64, fee: i64) -> Row {
    let mut row = Row::new();
    row.insert("TransactionType", ColumnValue::String("Payment".to_string()));
    row.insert("Fee", ColumnValue::Integer(fee));
    let inserted_at = Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap();
    row.stamp(sequence, inserted_at)
}

#[tokio::test]
async fn test_create_table() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TABLES_PATH))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "tableReference": {
                "projectId": "xrpl-history",
                "datasetId": "xrpl",
                "tableId": "transactions",
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = SchemaRegistry::load().unwrap();
    let store = new_store(&server, Some("secret"));
    store
        .create_table("transactions", registry.transactions())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let fields = body["schema"]["fields"].as_array().unwrap();
    assert!(fields.iter().any(|field| field["name"] == "LedgerIndex"));
    assert!(fields.iter().any(|field| field["name"] == "Memos"));
}

#[tokio::test]
async fn test_apply_table_drops_missing_table() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{TABLES_PATH}/ledgers")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TABLES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = SchemaRegistry::load().unwrap();
    let store = new_store(&server, None);
    store::apply_table(&store, "ledgers", registry.ledgers(), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_table_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TABLES_PATH))
        .and(body_partial_json(json!({ "tableReference": { "tableId": "ledgers" } })))
        .respond_with(ResponseTemplate::new(403).set_body_string("access denied"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TABLES_PATH))
        .and(body_partial_json(json!({ "tableReference": { "tableId": "transactions" } })))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = SchemaRegistry::load().unwrap();
    let store = new_store(&server, None);

    let err = store
        .create_table("ledgers", registry.ledgers())
        .await
        .unwrap_err();
    assert_matches!(err.current_context(), StoreError::Rejected);

    let err = store
        .create_table("transactions", registry.transactions())
        .await
        .unwrap_err();
    assert_matches!(err.current_context(), StoreError::Request);
}

#[tokio::test]
async fn test_insert_accepted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{TABLES_PATH}/transactions/insertAll")))
        .and(body_partial_json(json!({
            "skipInvalidRows": false,
            "ignoreUnknownValues": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "bigquery#tableDataInsertAllResponse",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = new_store(&server, None);
    let rows = vec![payment_row(32570, 10), payment_row(32570, 12)];
    let outcome = store.insert("transactions", &rows).await.unwrap();
    assert_eq!(outcome, InsertOutcome::Accepted);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["json"]["LedgerIndex"], json!(32570));
    assert_eq!(rows[1]["json"]["Fee"], json!(12));
    assert_eq!(
        rows[0]["json"]["_InsertedAt"],
        json!("2023-05-01 12:00:00.000000")
    );
}

#[tokio::test]
async fn test_insert_with_refreshed_token() {
    let server = MockServer::start().await;

    for token in ["first", "second"] {
        Mock::given(method("POST"))
            .and(path(format!("{TABLES_PATH}/transactions/insertAll")))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "bigquery#tableDataInsertAllResponse",
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let tokens = RotatingTokens {
        tokens: Mutex::new(VecDeque::from(["first".to_string(), "second".to_string()])),
    };
    let store = new_store(&server, Some("stale")).with_token_source(Arc::new(tokens));

    let outcome = store
        .insert("transactions", &[payment_row(32570, 10)])
        .await
        .unwrap();
    assert_eq!(outcome, InsertOutcome::Accepted);

    let outcome = store
        .insert("transactions", &[payment_row(32571, 10)])
        .await
        .unwrap();
    assert_eq!(outcome, InsertOutcome::Accepted);
}

#[tokio::test]
async fn test_insert_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = new_store(&server, None);
    let outcome = store.insert("transactions", &[]).await.unwrap();
    assert_eq!(outcome, InsertOutcome::Accepted);
}

#[tokio::test]
async fn test_insert_partial_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{TABLES_PATH}/transactions/insertAll")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "bigquery#tableDataInsertAllResponse",
            "insertErrors": [
                {
                    "index": 1,
                    "errors": [
                        {
                            "reason": "invalid",
                            "location": "Fee",
                            "message": "Cannot convert value to integer",
                        }
                    ],
                },
            ],
        })))
        .mount(&server)
        .await;

    let store = new_store(&server, None);
    let rows = vec![payment_row(32570, 10), payment_row(32570, 12)];
    let outcome = store.insert("transactions", &rows).await.unwrap();

    let InsertOutcome::PartialFailure(rejections) = outcome else {
        panic!("expected partial failure");
    };
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].index, 1);
    assert_eq!(
        rejections[0].reasons,
        vec!["invalid at Fee: Cannot convert value to integer".to_string()]
    );
}

#[tokio::test]
async fn test_resume_from_stored_ledgers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/xrpl-history/queries"))
        .and(body_partial_json(json!({
            "query": "SELECT MAX(LedgerIndex) AS MaxLedger FROM `xrpl-history.xrpl.transactions`",
            "useLegacySql": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": { "fields": [{ "name": "MaxLedger", "type": "INTEGER" }] },
            "rows": [{ "f": [{ "v": "32999" }] }],
        })))
        .mount(&server)
        .await;

    let store = new_store(&server, None);

    let cursor = cursor::resolve_from_store(&store, "transactions", 32570)
        .await
        .unwrap();
    assert_eq!(cursor, 32999);

    let cursor = cursor::resolve_from_store(&store, "transactions", 40000)
        .await
        .unwrap();
    assert_eq!(cursor, 39999);
}

#[tokio::test]
async fn test_resume_from_empty_table() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/xrpl-history/queries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": { "fields": [{ "name": "MaxLedger", "type": "INTEGER" }] },
            "rows": [{ "f": [{ "v": null }] }],
        })))
        .mount(&server)
        .await;

    let store = new_store(&server, None);
    let cursor = cursor::resolve_from_store(&store, "ledgers", 32570)
        .await
        .unwrap();
    assert_eq!(cursor, 32569);
}

#[tokio::test]
async fn test_incomplete_query_is_temporary() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bigquery/v2/projects/xrpl-history/queries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": false,
        })))
        .mount(&server)
        .await;

    let store = new_store(&server, None);
    let err = store.query("SELECT 1").await.unwrap_err();
    assert_matches!(err.current_context(), StoreError::Request);
}
