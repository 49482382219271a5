use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use error_stack::{report, Result, ResultExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::{row::Row, schema::TableSchema};

use super::{
    auth::{Credentials, TokenSource},
    InsertOutcome, RowRejection, Store, StoreError,
};

pub const DEFAULT_BIGQUERY_URL: &str = "https://bigquery.googleapis.com";

#[derive(Debug, Clone)]
pub struct BigQueryOptions {
    /// Base url of the REST api.
    pub base_url: String,
    pub project_id: String,
    pub dataset: String,
    pub credentials: Credentials,
    /// Timeout of each request.
    pub timeout: Duration,
}

/// A [Store] backed by the BigQuery REST api.
pub struct BigQueryStore {
    client: Client,
    options: BigQueryOptions,
    tokens: Option<Arc<dyn TokenSource>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertError>,
}

#[derive(Debug, Deserialize)]
struct InsertError {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<QuerySchema>,
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Deserialize)]
struct QuerySchema {
    fields: Vec<QueryField>,
}

#[derive(Debug, Deserialize)]
struct QueryField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    f: Vec<QueryCell>,
}

#[derive(Debug, Deserialize)]
struct QueryCell {
    #[serde(default)]
    v: Value,
}

impl BigQueryStore {
    pub fn new(options: BigQueryOptions) -> Result<Self, StoreError> {
        if options.project_id.is_empty() || options.dataset.is_empty() {
            return Err(StoreError::Configuration)
                .attach_printable("project id and dataset are required");
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .change_context(StoreError::Configuration)
            .attach_printable("failed to build http client")?;

        let tokens = options.credentials.token_source();

        Ok(Self {
            client,
            options,
            tokens,
        })
    }

    /// Replaces the source of bearer tokens.
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn project_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}",
            self.options.base_url.trim_end_matches('/'),
            self.options.project_id
        )
    }

    fn tables_url(&self) -> String {
        format!(
            "{}/datasets/{}/tables",
            self.project_url(),
            self.options.dataset
        )
    }

    /// Signs the request with a fresh token.
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        let Some(tokens) = &self.tokens else {
            return Ok(request);
        };

        let token = tokens.token().await?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.authorize(request)
            .await?
            .send()
            .await
            .change_context(StoreError::Request)
            .attach_printable("failed to send request to bigquery")
    }
}

/// Fails on non-success status codes, keeping the response body as attachment.
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let context = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StoreError::Request
    } else {
        StoreError::Rejected
    };

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read response body".to_string());

    Err(report!(context))
        .attach_printable(format!("status code: {status}"))
        .attach_printable(body)
}

#[async_trait]
impl Store for BigQueryStore {
    #[instrument(skip(self, schema), err(Debug))]
    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), StoreError> {
        let body = json!({
            "tableReference": {
                "projectId": self.options.project_id,
                "datasetId": self.options.dataset,
                "tableId": table,
            },
            "schema": schema,
        });

        let response = self
            .send(self.client.post(self.tables_url()).json(&body))
            .await?;
        check_status(response)
            .await
            .attach_printable_lazy(|| format!("failed to create table {table}"))?;

        Ok(())
    }

    #[instrument(skip(self), err(Debug))]
    async fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.tables_url(), table);
        let response = self.send(self.client.delete(url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(table, "table does not exist");
            return Ok(());
        }

        check_status(response)
            .await
            .attach_printable_lazy(|| format!("failed to delete table {table}"))?;

        Ok(())
    }

    #[instrument(skip(self), err(Debug))]
    async fn query(&self, sql: &str) -> Result<Vec<Map<String, Value>>, StoreError> {
        let body = json!({
            "query": sql,
            "useLegacySql": false,
        });

        let response = self
            .send(
                self.client
                    .post(format!("{}/queries", self.project_url()))
                    .json(&body),
            )
            .await?;
        let response = check_status(response).await?;

        let response = response
            .json::<QueryResponse>()
            .await
            .change_context(StoreError::Response)
            .attach_printable("failed to parse query response")?;

        if !response.job_complete {
            return Err(StoreError::Request).attach_printable("query did not complete in time");
        }

        let fields = response.schema.map(|schema| schema.fields).unwrap_or_default();

        let rows = response
            .rows
            .into_iter()
            .map(|row| {
                fields
                    .iter()
                    .zip(row.f)
                    .map(|(field, cell)| (field.name.clone(), cell.v))
                    .collect::<Map<String, Value>>()
            })
            .collect();

        Ok(rows)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()), err(Debug))]
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<InsertOutcome, StoreError> {
        if rows.is_empty() {
            return Ok(InsertOutcome::Accepted);
        }

        let body = json!({
            "skipInvalidRows": false,
            "ignoreUnknownValues": false,
            "rows": rows.iter().map(|row| json!({ "json": row })).collect::<Vec<_>>(),
        });

        let url = format!("{}/{}/insertAll", self.tables_url(), table);
        let response = self.send(self.client.post(url).json(&body)).await?;
        let response = check_status(response)
            .await
            .attach_printable_lazy(|| format!("failed to insert into table {table}"))?;

        let response = response
            .json::<InsertAllResponse>()
            .await
            .change_context(StoreError::Response)
            .attach_printable("failed to parse insert response")?;

        if response.insert_errors.is_empty() {
            return Ok(InsertOutcome::Accepted);
        }

        let rejections = response
            .insert_errors
            .into_iter()
            .map(|error| RowRejection {
                index: error.index,
                reasons: error.errors.into_iter().map(describe_error).collect(),
            })
            .collect();

        Ok(InsertOutcome::PartialFailure(rejections))
    }

    fn table_reference(&self, table: &str) -> String {
        format!(
            "`{}.{}.{}`",
            self.options.project_id, self.options.dataset, table
        )
    }
}

fn describe_error(error: ErrorProto) -> String {
    let reason = error.reason.unwrap_or_else(|| "unknown".to_string());
    match (error.location, error.message) {
        (Some(location), Some(message)) => format!("{reason} at {location}: {message}"),
        (None, Some(message)) => format!("{reason}: {message}"),
        (Some(location), None) => format!("{reason} at {location}"),
        (None, None) => reason,
    }
}
