use super::{Column, ColumnKind, RowKind, Source, TableSchema};

pub fn ledger_schema() -> TableSchema {
    let columns = vec![
        Column::new("LedgerIndex", ColumnKind::Integer, Source::Synthetic)
            .with_description("XRPL ledger index"),
        Column::new("hash", ColumnKind::String, Source::Path("hash")),
        Column::new("CloseTime", ColumnKind::Timestamp, Source::Derived)
            .with_description("close_time_human, as a timestamp"),
        Column::new(
            "CloseTimeTimestamp",
            ColumnKind::Integer,
            Source::Path("close_time"),
        )
        .with_description("close_time, seconds since the network epoch"),
        Column::new(
            "CloseTimeHuman",
            ColumnKind::String,
            Source::Path("close_time_human"),
        )
        .with_description("close_time_human"),
        Column::new("TotalCoins", ColumnKind::Integer, Source::Derived)
            .with_description("total_coins, in drops"),
        Column::new("ParentHash", ColumnKind::String, Source::Path("parent_hash"))
            .with_description("parent_hash"),
        Column::new("AccountHash", ColumnKind::String, Source::Path("account_hash"))
            .with_description("account_hash"),
        Column::new(
            "TransactionHash",
            ColumnKind::String,
            Source::Path("transaction_hash"),
        )
        .with_description("transaction_hash"),
        Column::new("_InsertedAt", ColumnKind::Timestamp, Source::Synthetic)
            .with_description("When row was inserted"),
    ];

    TableSchema::new(RowKind::Ledgers, columns, Vec::new())
}
