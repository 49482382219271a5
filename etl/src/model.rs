//! Native ledger objects as returned by the network.
//!
//! Transactions of different types carry different optional fields, so both ledgers and
//! transactions are kept as JSON objects and inspected through [Field].
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A ledger index. Ledgers are processed one at a time, in increasing order.
pub type LedgerSequence = u64;

/// A field looked up on a native object, tagged by its JSON shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// The field is not present.
    Absent,
    /// The field is present with a `null` value.
    Null,
    /// A string, number or boolean.
    Scalar(&'a Value),
    /// A nested object.
    Object(&'a Map<String, Value>),
    /// A list of values.
    List(&'a [Value]),
}

impl<'a> Field<'a> {
    pub fn from_value(value: Option<&'a Value>) -> Self {
        match value {
            None => Field::Absent,
            Some(Value::Null) => Field::Null,
            Some(Value::Object(object)) => Field::Object(object),
            Some(Value::Array(list)) => Field::List(list.as_slice()),
            Some(scalar) => Field::Scalar(scalar),
        }
    }

    /// Returns `true` if the field is present and not `null`.
    pub fn is_present(&self) -> bool {
        !matches!(self, Field::Absent | Field::Null)
    }

    pub fn as_scalar(&self) -> Option<&'a Value> {
        match self {
            Field::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.as_scalar().and_then(Value::as_str)
    }

    pub fn as_object(&self) -> Option<&'a Map<String, Value>> {
        match self {
            Field::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&'a [Value]> {
        match self {
            Field::List(list) => Some(list),
            _ => None,
        }
    }
}

/// Looks up a dotted path (`metaData.TransactionResult`) inside a JSON object.
pub fn resolve_path<'a>(object: &'a Map<String, Value>, path: &str) -> Field<'a> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Field::Absent;
    };

    let mut current = object.get(first);
    for segment in segments {
        current = match current {
            Some(Value::Object(inner)) => inner.get(segment),
            _ => None,
        };
    }

    Field::from_value(current)
}

/// A transaction as returned by the network, together with its execution metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTransaction(Map<String, Value>);

impl RawTransaction {
    pub const METADATA: &'static str = "metaData";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builds a transaction from a JSON value. Returns `None` if the value is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Field<'_> {
        Field::from_value(self.0.get(name))
    }

    pub fn path(&self, path: &str) -> Field<'_> {
        resolve_path(&self.0, path)
    }

    /// The execution metadata, if present.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.field(Self::METADATA).as_object()
    }

    pub fn metadata_field(&self, name: &str) -> Field<'_> {
        match self.metadata() {
            Some(meta) => Field::from_value(meta.get(name)),
            None => Field::Absent,
        }
    }

    /// Attaches execution metadata, replacing any existing one.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.0.insert(Self::METADATA.to_string(), metadata);
        self
    }

    pub fn hash(&self) -> Option<&str> {
        self.field("hash").as_str()
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// A ledger header as returned by the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawLedger(Map<String, Value>);

impl RawLedger {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Field<'_> {
        Field::from_value(self.0.get(name))
    }

    /// The ledger index, which older servers report as a string.
    pub fn ledger_index(&self) -> Option<LedgerSequence> {
        match self.field("ledger_index").as_scalar()? {
            Value::Number(number) => number.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Embedded transactions, either hashes or expanded bodies.
    pub fn transactions(&self) -> Option<&[Value]> {
        self.field("transactions").as_list()
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// The transactions of one ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransactions {
    pub sequence: LedgerSequence,
    pub transactions: Vec<RawTransaction>,
}

impl LedgerTransactions {
    pub fn empty(sequence: LedgerSequence) -> Self {
        Self {
            sequence,
            transactions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }
}

impl fmt::Display for LedgerTransactions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LedgerTransactions(ledger={}, count={})",
            self.sequence,
            self.transactions.len()
        )
    }
}
