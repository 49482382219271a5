//! Ingests XRP Ledger history into an analytical store.
//!
//! Ledgers are walked in order, mapped to rows with a fixed schema and appended to the store.
//! The starting point is recomputed from the store on every start, so a run can always be
//! resumed by starting it again.
pub mod cli;
pub mod client;
pub mod configuration;
pub mod cursor;
pub mod error;
pub mod fetcher;
pub mod mapper;
pub mod model;
pub mod row;
pub mod runner;
pub mod schema;
pub mod store;

use std::sync::Arc;

use error_stack::{Report, Result, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    client::JsonRpcClient,
    configuration::{IngestionOptions, StoreOptions},
    error::EtlErrorReportExt,
    fetcher::LedgerFetcher,
    mapper::RowMapper,
    runner::{Ingestor, IngestorOptions, RunContext},
    schema::{RowKind, SchemaRegistry},
    store::{BigQueryStore, StoreError, StoreErrorExt},
};

pub use self::error::{EtlError, ReportExt};
pub use self::model::LedgerSequence;

/// Runs the ingestion pipeline until it's stopped, reaches the end ledger, or fails.
///
/// Returns the last ledger stored. On every exit after the cursor is resolved, logs the ledger
/// to resume from.
pub async fn run_ingestion(
    ingestion: IngestionOptions,
    store: StoreOptions,
    ct: CancellationToken,
) -> Result<LedgerSequence, EtlError> {
    let ingestion = ingestion.to_ingestion_configuration()?;
    let store_configuration = store.to_store_configuration()?;
    let registry = load_registry()?;

    let client = JsonRpcClient::new(ingestion.node_url.clone(), ingestion.client.clone())
        .map_err(|err| err.configuration("failed to create node client"))?;
    let store = BigQueryStore::new(store_configuration.bigquery.clone())
        .map_err(|err| err.configuration("failed to create store client"))?;

    let table = store_configuration.table(ingestion.mode).to_string();
    let cursor = cursor::resolve_from_store(&store, &table, ingestion.start_ledger)
        .await
        .map_err(|err| store_error(err, "failed to resolve starting ledger"))?;

    let fetcher = LedgerFetcher::new(client, ingestion.fetcher);
    let mapper = RowMapper::new(registry).with_memo_layout(ingestion.memo_layout);
    let ingestor = Ingestor::new(
        fetcher,
        mapper,
        store,
        IngestorOptions {
            mode: ingestion.mode,
            table,
            retry: ingestion.retry,
        },
    );

    let ctx = ingestor
        .run(RunContext::new(cursor, ingestion.end_ledger), ct)
        .await;

    info!(
        last_ledger = ctx.cursor,
        state = ?ctx.state,
        "resume with --start-ledger {} (LEDGER={})",
        ctx.next_ledger(),
        ctx.next_ledger()
    );

    ctx.into_result()
}

/// Creates the ledger and transaction tables.
pub async fn apply_schema(store: StoreOptions, drop_existing: bool) -> Result<(), EtlError> {
    let configuration = store.to_store_configuration()?;
    let registry = load_registry()?;
    let store = BigQueryStore::new(configuration.bigquery.clone())
        .map_err(|err| err.configuration("failed to create store client"))?;

    let ledgers = store::apply_table(
        &store,
        configuration.table(RowKind::Ledgers),
        registry.ledgers(),
        drop_existing,
    );
    let transactions = store::apply_table(
        &store,
        configuration.table(RowKind::Transactions),
        registry.transactions(),
        drop_existing,
    );

    tokio::try_join!(ledgers, transactions)
        .map_err(|err| store_error(err, "failed to apply schema"))?;

    Ok(())
}

/// Returns the destination schema of `kind`, as JSON.
pub fn print_schema(kind: RowKind) -> Result<String, EtlError> {
    let registry = load_registry()?;
    serde_json::to_string_pretty(registry.get(kind))
        .change_context(EtlError::Fatal)
        .attach_printable("failed to serialize schema")
}

fn load_registry() -> Result<Arc<SchemaRegistry>, EtlError> {
    let registry =
        SchemaRegistry::load().map_err(|err| err.configuration("invalid destination schema"))?;
    Ok(Arc::new(registry))
}

fn store_error(err: Report<StoreError>, reason: &str) -> Report<EtlError> {
    if err.is_temporary() {
        err.temporary(reason)
    } else if *err.current_context() == StoreError::Configuration {
        err.configuration(reason)
    } else {
        err.fatal(reason)
    }
}
