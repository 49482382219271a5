//! Analytical store client.
mod auth;
mod bigquery;

use std::fmt;

use async_trait::async_trait;
use error_stack::{Report, Result};
use serde_json::{Map, Value};
use tracing::info;

use crate::{row::Row, schema::TableSchema};

pub use self::auth::{Credentials, DefaultCredentials, StaticToken, TokenSource};
pub use self::bigquery::{BigQueryOptions, BigQueryStore, DEFAULT_BIGQUERY_URL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Transport failure or retryable status (429, 5xx).
    Request,
    /// The store refused the request, for example because of missing permissions.
    Rejected,
    /// The response doesn't have the expected shape.
    Response,
    Configuration,
}

impl error_stack::Context for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Request => write!(f, "failed to send request to store"),
            StoreError::Rejected => write!(f, "store rejected request"),
            StoreError::Response => write!(f, "malformed store response"),
            StoreError::Configuration => write!(f, "store configuration error"),
        }
    }
}

pub trait StoreErrorExt {
    fn is_temporary(&self) -> bool;
}

impl StoreErrorExt for Report<StoreError> {
    fn is_temporary(&self) -> bool {
        matches!(self.current_context(), StoreError::Request)
    }
}

/// A row refused by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    /// Position of the row in the inserted batch.
    pub index: usize,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// All rows were stored.
    Accepted,
    /// Some rows were refused, the others may have been stored.
    PartialFailure(Vec<RowRejection>),
}

/// Creates tables and appends rows to them.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), StoreError>;

    /// Deletes the table. Deleting a missing table is not an error.
    async fn delete_table(&self, table: &str) -> Result<(), StoreError>;

    /// Runs a query, returning rows as column name to value maps.
    async fn query(&self, sql: &str) -> Result<Vec<Map<String, Value>>, StoreError>;

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<InsertOutcome, StoreError>;

    /// How `table` is referenced in queries.
    fn table_reference(&self, table: &str) -> String {
        table.to_string()
    }
}

/// Creates `table` from `schema`, deleting it first if `drop_existing` is set.
pub async fn apply_table<S: Store + ?Sized>(
    store: &S,
    table: &str,
    schema: &TableSchema,
    drop_existing: bool,
) -> Result<(), StoreError> {
    if drop_existing {
        store.delete_table(table).await?;
        info!(table, "table deleted");
    }

    store.create_table(table, schema).await?;
    info!(table, kind = %schema.kind(), "table created");

    Ok(())
}
