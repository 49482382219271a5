//! Destination table schemas.
//!
//! The registry is static: it's built once at startup, validated, and shared read-only by the
//! mapper and the store.
mod ledgers;
mod transactions;

use std::{collections::HashSet, fmt};

use clap::ValueEnum;
use error_stack::{Report, Result};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

use crate::row::{ColumnValue, Row, INSERTED_AT_COLUMN, LEDGER_INDEX_COLUMN};

pub use self::transactions::{dex_column, xrp_column, CURRENCY_FIELDS};

#[derive(Debug)]
pub struct SchemaError;
impl error_stack::Context for SchemaError {}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid schema")
    }
}

/// The two row shapes ingested by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    /// One summary row per ledger.
    Ledgers,
    /// One row per transaction.
    Transactions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Integer,
    Float,
    String,
    Timestamp,
    Record(Vec<Column>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMode {
    Nullable,
    Repeated,
}

/// Where a column value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Copied from a dotted path into the native object.
    Path(&'static str),
    /// Computed by a dedicated mapping rule.
    Derived,
    /// Set by the run loop after mapping.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub mode: ColumnMode,
    pub source: Source,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    kind: RowKind,
    columns: Vec<Column>,
    amount_fields: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    ledgers: TableSchema,
    transactions: TableSchema,
}

impl SchemaRegistry {
    /// Loads and validates the built-in schemas.
    pub fn load() -> Result<Self, SchemaError> {
        let ledgers = ledgers::ledger_schema();
        ledgers.validate()?;
        let transactions = transactions::transaction_schema();
        transactions.validate()?;
        Ok(Self {
            ledgers,
            transactions,
        })
    }

    pub fn get(&self, kind: RowKind) -> &TableSchema {
        match kind {
            RowKind::Ledgers => &self.ledgers,
            RowKind::Transactions => &self.transactions,
        }
    }

    pub fn ledgers(&self) -> &TableSchema {
        &self.ledgers
    }

    pub fn transactions(&self) -> &TableSchema {
        &self.transactions
    }
}

impl TableSchema {
    pub fn new(kind: RowKind, columns: Vec<Column>, amount_fields: Vec<&'static str>) -> Self {
        Self {
            kind,
            columns,
            amount_fields,
        }
    }

    pub fn kind(&self) -> RowKind {
        self.kind
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Source fields holding either a native amount or an issued currency amount.
    pub fn amount_fields(&self) -> &[&'static str] {
        &self.amount_fields
    }

    /// Scalar columns filled by copying a source path.
    pub fn copied_columns(&self) -> impl Iterator<Item = (&Column, &'static str)> {
        self.columns.iter().filter_map(|column| match column.source {
            Source::Path(path) if column.is_scalar() => Some((column, path)),
            _ => None,
        })
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_unique_names(&self.columns)?;

        for synthetic in [LEDGER_INDEX_COLUMN, INSERTED_AT_COLUMN] {
            match self.column(synthetic) {
                Some(column) if column.source == Source::Synthetic => {}
                _ => {
                    return Err(Report::new(SchemaError).attach_printable(format!(
                        "{:?} schema is missing synthetic column {synthetic}",
                        self.kind
                    )))
                }
            }
        }

        for field in &self.amount_fields {
            let has_xrp = matches!(
                self.column(&xrp_column(field)).map(|c| &c.kind),
                Some(ColumnKind::Integer)
            );
            let has_dex = matches!(
                self.column(&dex_column(field)).map(|c| &c.kind),
                Some(ColumnKind::Record(_))
            );
            if !has_xrp || !has_dex {
                return Err(Report::new(SchemaError)
                    .attach_printable(format!("amount field {field} lacks derived columns")));
            }
        }

        Ok(())
    }

    /// Checks that every column of the row, nested records included, is part of this schema.
    pub fn check_row(&self, row: &Row) -> Result<(), SchemaError> {
        check_row_columns(&self.columns, row)
    }
}

fn validate_unique_names(columns: &[Column]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(Report::new(SchemaError)
                .attach_printable(format!("duplicate column {}", column.name)));
        }
        if let ColumnKind::Record(fields) = &column.kind {
            validate_unique_names(fields)?;
        }
    }
    Ok(())
}

fn check_row_columns(columns: &[Column], row: &Row) -> Result<(), SchemaError> {
    for (name, value) in row.columns() {
        let Some(column) = columns.iter().find(|column| column.name == name) else {
            return Err(
                Report::new(SchemaError).attach_printable(format!("unknown column {name}"))
            );
        };
        check_value(column, value)?;
    }
    Ok(())
}

fn check_value(column: &Column, value: &ColumnValue) -> Result<(), SchemaError> {
    match (&column.kind, value) {
        (_, ColumnValue::Repeated(values)) if column.mode == ColumnMode::Repeated => {
            for value in values {
                check_value(&column.as_element(), value)?;
            }
            Ok(())
        }
        (ColumnKind::Record(fields), ColumnValue::Record(row)) => check_row_columns(fields, row),
        (ColumnKind::Integer, ColumnValue::Integer(_))
        | (ColumnKind::Float, ColumnValue::Float(_))
        | (ColumnKind::String, ColumnValue::String(_))
        | (ColumnKind::Timestamp, ColumnValue::Timestamp(_)) => Ok(()),
        _ => Err(Report::new(SchemaError).attach_printable(format!(
            "value of column {} doesn't match its kind",
            column.name
        ))),
    }
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, source: Source) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            kind,
            mode: ColumnMode::Nullable,
            source,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.mode = ColumnMode::Repeated;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self.kind, ColumnKind::Record(_)) && self.mode == ColumnMode::Nullable
    }

    /// The same column, viewed as one element of a repeated column.
    fn as_element(&self) -> Column {
        Column {
            mode: ColumnMode::Nullable,
            ..self.clone()
        }
    }

    fn type_name(&self) -> &'static str {
        match self.kind {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Float => "FLOAT",
            ColumnKind::String => "STRING",
            ColumnKind::Timestamp => "TIMESTAMP",
            ColumnKind::Record(_) => "RECORD",
        }
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("type", self.type_name())?;
        let mode = match self.mode {
            ColumnMode::Nullable => "NULLABLE",
            ColumnMode::Repeated => "REPEATED",
        };
        map.serialize_entry("mode", mode)?;
        map.serialize_entry("description", &self.description)?;
        if let ColumnKind::Record(fields) = &self.kind {
            map.serialize_entry("fields", fields)?;
        }
        map.end()
    }
}

impl Serialize for TableSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("fields", &self.columns)?;
        map.end()
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKind::Ledgers => f.write_str("ledgers"),
            RowKind::Transactions => f.write_str("transactions"),
        }
    }
}
