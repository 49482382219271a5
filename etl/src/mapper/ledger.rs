use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::{
    model::RawLedger,
    row::{ColumnValue, Row},
    schema::{ColumnKind, TableSchema},
};

use super::{coerce, copy_scalars};

/// Seconds between the unix epoch and the network epoch (2000-01-01T00:00:00Z).
pub const NETWORK_EPOCH_OFFSET: i64 = 946_684_800;

/// Layout of `close_time_human`, for example `2013-Jan-01 03:21:10.000000000 UTC`.
const HUMAN_TIME_FORMAT: &str = "%Y-%b-%d %H:%M:%S%.f";

pub fn map_ledger_summary(schema: &TableSchema, ledger: &RawLedger) -> Row {
    let mut row = Row::new();

    copy_scalars(schema, ledger.as_object(), &mut row);

    if !row.contains("hash") {
        if let Some(hash) = ledger
            .field("ledger_hash")
            .as_scalar()
            .and_then(|value| coerce(value, &ColumnKind::String))
        {
            row.insert("hash", hash);
        }
    }

    if let Some(close_time) = close_time(ledger) {
        row.insert("CloseTime", ColumnValue::Timestamp(close_time));
    }

    let total_coins = ["total_coins", "totalCoins"]
        .into_iter()
        .find_map(|name| ledger.field(name).as_scalar())
        .and_then(|value| coerce(value, &ColumnKind::Integer));
    if let Some(total_coins) = total_coins {
        row.insert("TotalCoins", total_coins);
    }

    row
}

fn close_time(ledger: &RawLedger) -> Option<DateTime<Utc>> {
    if let Some(human) = ledger.field("close_time_human").as_str() {
        let human = human.trim().trim_end_matches("UTC").trim_end();
        if let Ok(parsed) = NaiveDateTime::parse_from_str(human, HUMAN_TIME_FORMAT) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }

    if let Some(iso) = ledger.field("close_time_iso").as_str() {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(iso) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    match ledger.field("close_time").as_scalar()? {
        Value::Number(number) => {
            let seconds = number.as_i64()?.checked_add(NETWORK_EPOCH_OFFSET)?;
            Utc.timestamp_opt(seconds, 0).single()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::{
        mapper::RowMapper,
        model::RawLedger,
        row::ColumnValue,
        schema::SchemaRegistry,
    };

    fn mapper() -> RowMapper {
        RowMapper::new(Arc::new(SchemaRegistry::load().unwrap()))
    }

    #[test]
    fn test_ledger_summary() {
        let ledger = RawLedger::from_value(json!({
            "ledger_index": "32570",
            "hash": "4109C6F2045FC7EFF4CDE8F9905D19C28820D86304080FF886B299F0206E42B5",
            "close_time": 410313600,
            "close_time_human": "2013-Jan-01 00:00:00.000000000 UTC",
            "total_coins": "99999999999996320",
            "parent_hash": "60A01EBF11537D8394EA1235253293508BDA7131D5F8710EFE9413AA129653A2",
            "account_hash": "A",
            "transaction_hash": "B",
            "closed": true,
        }))
        .unwrap();

        let mapper = mapper();
        let row = mapper.map_ledger_summary(&ledger);
        assert!(mapper.registry().ledgers().check_row(&row).is_ok());

        assert_eq!(
            row.get("CloseTime"),
            Some(&ColumnValue::Timestamp(
                Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap()
            ))
        );
        assert_eq!(
            row.get("CloseTimeTimestamp").and_then(ColumnValue::as_i64),
            Some(410313600)
        );
        assert_eq!(
            row.get("TotalCoins").and_then(ColumnValue::as_i64),
            Some(99999999999996320)
        );
        assert_eq!(
            row.get("ParentHash").and_then(ColumnValue::as_str),
            Some("60A01EBF11537D8394EA1235253293508BDA7131D5F8710EFE9413AA129653A2")
        );
        assert!(!row.contains("LedgerIndex"));
    }

    #[test]
    fn test_close_time_falls_back_to_network_epoch() {
        let ledger = RawLedger::from_value(json!({
            "close_time": 410313600,
            "close_time_human": "not a date",
            "totalCoins": "100",
        }))
        .unwrap();

        let row = mapper().map_ledger_summary(&ledger);
        assert_eq!(
            row.get("CloseTime"),
            Some(&ColumnValue::Timestamp(
                Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap()
            ))
        );
        assert_eq!(row.get("TotalCoins").and_then(ColumnValue::as_i64), Some(100));
    }

    #[test]
    fn test_ledger_hash_fallback() {
        let ledger = RawLedger::from_value(json!({ "ledger_hash": "ABC" })).unwrap();
        let row = mapper().map_ledger_summary(&ledger);
        assert_eq!(row.get("hash").and_then(ColumnValue::as_str), Some("ABC"));
        assert!(!row.contains("CloseTime"));
    }
}
