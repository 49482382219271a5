//! Destination rows.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::model::LedgerSequence;

pub const LEDGER_INDEX_COLUMN: &str = "LedgerIndex";
pub const INSERTED_AT_COLUMN: &str = "_InsertedAt";

/// Timestamp layout accepted by the analytical store for `TIMESTAMP` columns.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Record(Row),
    Repeated(Vec<ColumnValue>),
}

/// A flat row, from column name to value.
///
/// Absent columns are omitted, the store treats them as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, ColumnValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: ColumnValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Sets the two synthetic columns every row carries.
    pub fn stamp(mut self, sequence: LedgerSequence, inserted_at: DateTime<Utc>) -> Self {
        // ledger indices are far below i64::MAX
        let sequence = i64::try_from(sequence).unwrap_or(i64::MAX);
        self.insert(LEDGER_INDEX_COLUMN, ColumnValue::Integer(sequence));
        self.insert(INSERTED_AT_COLUMN, ColumnValue::Timestamp(inserted_at));
        self
    }
}

impl ColumnValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Row> {
        match self {
            ColumnValue::Record(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_repeated(&self) -> Option<&[ColumnValue]> {
        match self {
            ColumnValue::Repeated(values) => Some(values),
            _ => None,
        }
    }
}

impl From<Row> for ColumnValue {
    fn from(row: Row) -> Self {
        ColumnValue::Record(row)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Serialize for ColumnValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ColumnValue::Integer(value) => serializer.serialize_i64(*value),
            ColumnValue::Float(value) => serializer.serialize_f64(*value),
            ColumnValue::String(value) => serializer.serialize_str(value),
            ColumnValue::Timestamp(value) => {
                let formatted = value.format(TIMESTAMP_FORMAT).to_string();
                serializer.serialize_str(&formatted)
            }
            ColumnValue::Record(row) => row.serialize(serializer),
            ColumnValue::Repeated(values) => values.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{ColumnValue, Row};

    #[test]
    fn test_serialize_nested_row() {
        let mut amount = Row::new();
        amount.insert("currency", ColumnValue::String("USD".to_string()));
        amount.insert("value", ColumnValue::Float(12.5));

        let mut row = Row::new();
        row.insert("Fee", ColumnValue::Integer(12));
        row.insert("AmountDEX", amount.into());
        row.insert(
            "NFTokenOffers",
            ColumnValue::Repeated(vec![ColumnValue::String("A".to_string())]),
        );

        let inserted_at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        let row = row.stamp(32570, inserted_at);

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(
            value,
            json!({
                "AmountDEX": { "currency": "USD", "value": 12.5 },
                "Fee": 12,
                "LedgerIndex": 32570,
                "NFTokenOffers": ["A"],
                "_InsertedAt": "2023-01-02 03:04:05.000000",
            })
        );
    }
}
