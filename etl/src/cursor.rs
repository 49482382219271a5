//! Resume position.
//!
//! The cursor is the last ledger the store is known to contain. It's recomputed from the store
//! on every start and never persisted anywhere else.
use error_stack::{report, Result, ResultExt};
use serde_json::Value;
use tracing::info;

use crate::{model::LedgerSequence, row::LEDGER_INDEX_COLUMN, store::Store, store::StoreError};

const MAX_LEDGER_COLUMN: &str = "MaxLedger";

/// Returns the cursor to start from, that is the ledger before the first one to fetch.
///
/// If the store already contains `requested` or later ledgers, ingestion resumes after the
/// highest stored ledger.
pub fn resolve_start(
    requested: LedgerSequence,
    store_max: Option<LedgerSequence>,
) -> LedgerSequence {
    match store_max {
        Some(max) if max >= requested => max,
        _ => requested.max(1) - 1,
    }
}

/// Returns the highest ledger in `table`, or `None` if the table is empty.
pub async fn store_max_sequence<S: Store + ?Sized>(
    store: &S,
    table: &str,
) -> Result<Option<LedgerSequence>, StoreError> {
    let sql = format!(
        "SELECT MAX({LEDGER_INDEX_COLUMN}) AS {MAX_LEDGER_COLUMN} FROM {}",
        store.table_reference(table)
    );

    let rows = store
        .query(&sql)
        .await
        .attach_printable("failed to query highest stored ledger")?;

    let Some(value) = rows.first().and_then(|row| row.get(MAX_LEDGER_COLUMN)) else {
        return Ok(None);
    };

    match value {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_u64()),
        Value::String(s) => s.trim().parse().map(Some).map_err(|_| {
            report!(StoreError::Response).attach_printable(format!("invalid max ledger: {s}"))
        }),
        _ => Err(report!(StoreError::Response))
            .attach_printable(format!("invalid max ledger: {value}")),
    }
}

/// Queries the store and resolves the starting cursor.
pub async fn resolve_from_store<S: Store + ?Sized>(
    store: &S,
    table: &str,
    requested: LedgerSequence,
) -> Result<LedgerSequence, StoreError> {
    let store_max = store_max_sequence(store, table).await?;
    let cursor = resolve_start(requested, store_max);

    info!(
        requested,
        store_max = ?store_max,
        next = cursor + 1,
        "resolved starting ledger"
    );

    Ok(cursor)
}
