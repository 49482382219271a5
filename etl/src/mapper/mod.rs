//! Maps native ledgers and transactions to destination rows.
//!
//! Mapping is pure and total: malformed or missing source fields degrade to missing columns,
//! they never fail the batch.
mod ledger;
mod transaction;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::trace;

use crate::{
    model::{resolve_path, Field, LedgerSequence, RawLedger, RawTransaction},
    row::{ColumnValue, Row},
    schema::{ColumnKind, SchemaRegistry, TableSchema},
};

/// How memo fields are laid out in the `Memos` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoLayout {
    /// Keep a single field per memo, stored under `MemoData`.
    ///
    /// The value is the memo type if present, then the memo format, then the memo data. This
    /// is the layout existing tables were populated with.
    #[default]
    Collapsed,
    /// Store each memo field under its own column.
    Separate,
}

#[derive(Debug, Clone)]
pub struct RowMapper {
    registry: Arc<SchemaRegistry>,
    memo_layout: MemoLayout,
}

impl RowMapper {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            memo_layout: MemoLayout::default(),
        }
    }

    pub fn with_memo_layout(mut self, memo_layout: MemoLayout) -> Self {
        self.memo_layout = memo_layout;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Maps one transaction of ledger `sequence`.
    ///
    /// `LedgerIndex` and `_InsertedAt` are not set, see [Row::stamp].
    pub fn map_transaction(&self, tx: &RawTransaction, sequence: LedgerSequence) -> Row {
        transaction::map_transaction(
            self.registry.transactions(),
            self.memo_layout,
            tx,
            sequence,
        )
    }

    /// Maps a ledger header to its summary row.
    ///
    /// `LedgerIndex` and `_InsertedAt` are not set, see [Row::stamp].
    pub fn map_ledger_summary(&self, ledger: &RawLedger) -> Row {
        ledger::map_ledger_summary(self.registry.ledgers(), ledger)
    }
}

/// Copies every scalar column whose source path resolves to a scalar value.
fn copy_scalars(schema: &TableSchema, source: &Map<String, Value>, row: &mut Row) {
    for (column, path) in schema.copied_columns() {
        let Field::Scalar(value) = resolve_path(source, path) else {
            continue;
        };

        match coerce(value, &column.kind) {
            Some(value) => row.insert(column.name.clone(), value),
            None => trace!(column = %column.name, value = %value, "dropping unconvertible value"),
        }
    }
}

/// Converts a scalar JSON value to the column kind.
///
/// Strings are parsed for numeric columns. Values that don't convert are dropped.
pub fn coerce(value: &Value, kind: &ColumnKind) -> Option<ColumnValue> {
    match kind {
        ColumnKind::Integer => to_integer(value).map(ColumnValue::Integer),
        ColumnKind::Float => to_float(value).map(ColumnValue::Float),
        ColumnKind::String => to_string(value).map(ColumnValue::String),
        ColumnKind::Timestamp => to_timestamp(value).map(ColumnValue::Timestamp),
        ColumnKind::Record(_) => None,
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            let float = number.as_f64()?;
            if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
                Some(float as i64)
            } else {
                None
            }
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    let float = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    // NaN and infinities have no JSON representation.
    float.is_finite().then_some(float)
}

fn to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(number) => Utc.timestamp_opt(number.as_i64()?, 0).single(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::coerce;
    use crate::{row::ColumnValue, schema::ColumnKind};

    #[test]
    fn test_coerce_integer() {
        assert_eq!(
            coerce(&json!("1000000"), &ColumnKind::Integer),
            Some(ColumnValue::Integer(1_000_000))
        );
        assert_eq!(
            coerce(&json!(12), &ColumnKind::Integer),
            Some(ColumnValue::Integer(12))
        );
        assert_eq!(
            coerce(&json!(12.0), &ColumnKind::Integer),
            Some(ColumnValue::Integer(12))
        );
        assert_eq!(coerce(&json!(12.5), &ColumnKind::Integer), None);
        assert_eq!(coerce(&json!("abc"), &ColumnKind::Integer), None);
        assert_eq!(coerce(&json!(true), &ColumnKind::Integer), None);
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(
            coerce(&json!("12.5"), &ColumnKind::Float),
            Some(ColumnValue::Float(12.5))
        );
        assert_eq!(coerce(&json!("NaN"), &ColumnKind::Float), None);
        assert_eq!(coerce(&json!("inf"), &ColumnKind::Float), None);
    }

    #[test]
    fn test_coerce_string() {
        assert_eq!(
            coerce(&json!("rAccount"), &ColumnKind::String),
            Some(ColumnValue::String("rAccount".to_string()))
        );
        assert_eq!(
            coerce(&json!(42), &ColumnKind::String),
            Some(ColumnValue::String("42".to_string()))
        );
        assert_eq!(coerce(&json!(null), &ColumnKind::String), None);
    }

    #[test]
    fn test_coerce_never_builds_records() {
        assert_eq!(coerce(&json!("x"), &ColumnKind::Record(Vec::new())), None);
    }
}
