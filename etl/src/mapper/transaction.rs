use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    model::{Field, LedgerSequence, RawTransaction},
    row::{ColumnValue, Row},
    schema::{dex_column, xrp_column, ColumnKind, TableSchema},
};

use super::{coerce, copy_scalars, MemoLayout};

const MEMO_FIELDS: [&str; 3] = ["MemoData", "MemoFormat", "MemoType"];

pub fn map_transaction(
    schema: &TableSchema,
    memo_layout: MemoLayout,
    tx: &RawTransaction,
    sequence: LedgerSequence,
) -> Row {
    let mut row = Row::new();

    copy_scalars(schema, tx.as_object(), &mut row);

    if let Some(amount) = delivered_amount(tx) {
        row.insert("DeliveredAmount", ColumnValue::Integer(amount));
    } else if tx.metadata_field("DeliveredAmount").is_present() {
        debug!(ledger = sequence, hash = ?tx.hash(), "delivered amount is not numeric");
    }

    if let Some(memos) = tx.field("Memos").as_list() {
        let memos = memos
            .iter()
            .map(|memo| map_memo(memo, memo_layout).into())
            .collect();
        row.insert("Memos", ColumnValue::Repeated(memos));
    }

    if let Some(entries) = tx.field("SignerEntries").as_list() {
        let entries = map_wrapped_records(entries, "SignerEntry", |entry| {
            let mut record = Row::new();
            copy_string(entry, "Account", &mut record);
            if let Some(weight) = entry
                .get("SignerWeight")
                .and_then(|value| coerce(value, &ColumnKind::Integer))
            {
                record.insert("SignerWeight", weight);
            }
            record
        });
        row.insert("SignerEntries", ColumnValue::Repeated(entries));
    }

    if let Some(signers) = tx.field("Signers").as_list() {
        let signers = map_wrapped_records(signers, "Signer", |signer| {
            let mut record = Row::new();
            for name in ["Account", "SigningPubKey", "TxnSignature"] {
                copy_string(signer, name, &mut record);
            }
            record
        });
        row.insert("Signers", ColumnValue::Repeated(signers));
    }

    if let Some(offers) = tx.field("NFTokenOffers").as_list() {
        let offers = offers
            .iter()
            .filter_map(|offer| coerce(offer, &ColumnKind::String))
            .collect();
        row.insert("NFTokenOffers", ColumnValue::Repeated(offers));
    }

    if let Some(metadata) = tx.metadata() {
        match serde_json::to_string(metadata) {
            Ok(json) => row.insert("Metadata", ColumnValue::String(json)),
            Err(err) => debug!(ledger = sequence, error = %err, "failed to serialize metadata"),
        }
    }

    for field in schema.amount_fields() {
        match tx.field(field) {
            Field::Scalar(Value::String(drops)) => match drops.trim().parse::<i64>() {
                Ok(drops) => row.insert(xrp_column(field), ColumnValue::Integer(drops)),
                Err(_) => debug!(ledger = sequence, field, "native amount is not numeric"),
            },
            Field::Object(amount) if amount.contains_key("currency") => {
                row.insert(dex_column(field), map_issued_amount(amount).into());
            }
            _ => {}
        }
    }

    row
}

/// The delivered amount, read from the legacy `delivered_amount` if `DeliveredAmount` is missing.
///
/// Only native amounts are kept: issued currency amounts have no integer rendering.
fn delivered_amount(tx: &RawTransaction) -> Option<i64> {
    let field = match tx.metadata_field("DeliveredAmount") {
        Field::Absent => tx.metadata_field("delivered_amount"),
        field => field,
    };

    match coerce(field.as_scalar()?, &ColumnKind::Integer)? {
        ColumnValue::Integer(amount) => Some(amount),
        _ => None,
    }
}

fn map_memo(memo: &Value, layout: MemoLayout) -> Row {
    let mut record = Row::new();

    let Some(fields) = memo.get("Memo").and_then(Value::as_object) else {
        record.insert("Memo", Row::new().into());
        return record;
    };

    let mut inner = Row::new();
    match layout {
        MemoLayout::Collapsed => {
            // MemoType wins over MemoFormat, which wins over MemoData.
            let value = MEMO_FIELDS.iter().rev().find_map(|name| {
                fields
                    .get(*name)
                    .and_then(|value| coerce(value, &ColumnKind::String))
            });
            if let Some(value) = value {
                inner.insert("MemoData", value);
            }
        }
        MemoLayout::Separate => {
            for name in MEMO_FIELDS {
                copy_string(fields, name, &mut inner);
            }
        }
    }

    record.insert("Memo", inner.into());
    record
}

/// Maps a list of `{wrapper: {...}}` objects to records of the same shape.
fn map_wrapped_records(
    list: &[Value],
    wrapper: &str,
    map: impl Fn(&Map<String, Value>) -> Row,
) -> Vec<ColumnValue> {
    list.iter()
        .map(|item| {
            let inner = match item.get(wrapper).and_then(Value::as_object) {
                Some(fields) => map(fields),
                None => Row::new(),
            };
            let mut record = Row::new();
            record.insert(wrapper, inner.into());
            record.into()
        })
        .collect()
}

fn map_issued_amount(amount: &Map<String, Value>) -> Row {
    let mut record = Row::new();
    copy_string(amount, "currency", &mut record);
    copy_string(amount, "issuer", &mut record);
    if let Some(value) = amount
        .get("value")
        .and_then(|value| coerce(value, &ColumnKind::Float))
    {
        record.insert("value", value);
    }
    record
}

fn copy_string(source: &Map<String, Value>, name: &str, record: &mut Row) {
    if let Some(value) = source
        .get(name)
        .and_then(|value| coerce(value, &ColumnKind::String))
    {
        record.insert(name, value);
    }
}
