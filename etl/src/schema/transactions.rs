use super::{Column, ColumnKind, RowKind, Source, TableSchema};

/// Fields holding either native drops (a plain string) or an issued currency amount.
pub const CURRENCY_FIELDS: [&str; 8] = [
    "Amount",
    "TakerGets",
    "TakerPays",
    "SendMax",
    "LimitAmount",
    "SendMin",
    "DeliverMin",
    "NFTokenBrokerFee",
];

const COMMON_FIELDS: &[(&str, FieldType)] = &[
    ("TransactionType", FieldType::String),
    ("Account", FieldType::String),
    ("hash", FieldType::String),
    ("Destination", FieldType::String),
    ("Fee", FieldType::Integer),
    ("Flags", FieldType::Integer),
    ("DestinationTag", FieldType::Integer),
    ("SourceTag", FieldType::Integer),
    ("InvoiceID", FieldType::String),
    ("Sequence", FieldType::Integer),
];

const TYPE_SPECIFIC_FIELDS: &[(&str, FieldType)] = &[
    ("SigningPubKey", FieldType::String),
    ("TxnSignature", FieldType::String),
    ("AccountTxnID", FieldType::String),
    ("SignerQuorum", FieldType::Integer),
    ("ClearFlag", FieldType::Integer),
    ("Domain", FieldType::String),
    ("EmailHash", FieldType::String),
    ("MessageKey", FieldType::String),
    ("SetFlag", FieldType::Integer),
    ("TransferRate", FieldType::Integer),
    ("TickSize", FieldType::Integer),
    ("CheckID", FieldType::String),
    ("Expiration", FieldType::Integer),
    ("Authorize", FieldType::String),
    ("Owner", FieldType::String),
    ("OfferSequence", FieldType::Integer),
    ("Condition", FieldType::String),
    ("FinishAfter", FieldType::Integer),
    ("CancelAfter", FieldType::Integer),
    ("Fulfillment", FieldType::String),
    ("LastLedgerSequence", FieldType::Integer),
    ("SettleDelay", FieldType::Integer),
    ("RegularKey", FieldType::String),
    ("QualityIn", FieldType::Integer),
    ("QualityOut", FieldType::Integer),
    ("Amendment", FieldType::String),
    ("LedgerSequence", FieldType::Integer),
    ("BaseFee", FieldType::Integer),
    ("ReferenceFeeUnits", FieldType::Integer),
    ("ReserveBase", FieldType::Integer),
    ("ReserveIncrement", FieldType::Integer),
    ("NFTokenTaxon", FieldType::Integer),
    ("URI", FieldType::String),
    ("Issuer", FieldType::String),
    ("TransferFee", FieldType::Integer),
    ("NFTokenID", FieldType::String),
    ("NFTokenSellOffer", FieldType::String),
    ("NFTokenBuyOffer", FieldType::String),
];

#[derive(Clone, Copy)]
enum FieldType {
    Integer,
    String,
}

pub fn xrp_column(field: &str) -> String {
    format!("{field}XRP")
}

pub fn dex_column(field: &str) -> String {
    format!("{field}DEX")
}

pub fn transaction_schema() -> TableSchema {
    let mut columns = vec![Column::new(
        "LedgerIndex",
        ColumnKind::Integer,
        Source::Synthetic,
    )
    .with_description("XRPL ledger index")];

    columns.extend(COMMON_FIELDS.iter().map(|(name, ty)| copied(*name, *ty)));

    columns.extend(CURRENCY_FIELDS.iter().map(|field| {
        Column::new(xrp_column(field), ColumnKind::Integer, Source::Derived)
            .with_description(format!("{field} (drops)"))
    }));

    columns.extend([
        Column::new(
            "TransactionResult",
            ColumnKind::String,
            Source::Path("metaData.TransactionResult"),
        )
        .with_description("metaData.TransactionResult"),
        Column::new(
            "TransactionIndex",
            ColumnKind::Integer,
            Source::Path("metaData.TransactionIndex"),
        )
        .with_description("metaData.TransactionIndex"),
        Column::new("DeliveredAmount", ColumnKind::Integer, Source::Derived)
            .with_description("metaData.DeliveredAmount"),
        Column::new("_InsertedAt", ColumnKind::Timestamp, Source::Synthetic)
            .with_description("When row was inserted"),
        memos_column(),
        signer_entries_column(),
        signers_column(),
        Column::new("NFTokenOffers", ColumnKind::String, Source::Derived).repeated(),
    ]);

    columns.extend(TYPE_SPECIFIC_FIELDS.iter().map(|(name, ty)| copied(*name, *ty)));

    columns.extend(CURRENCY_FIELDS.iter().map(|field| {
        Column::new(
            dex_column(field),
            ColumnKind::Record(vec![
                Column::new("currency", ColumnKind::String, Source::Derived)
                    .with_description(format!("{field}.currency")),
                Column::new("issuer", ColumnKind::String, Source::Derived)
                    .with_description(format!("{field}.issuer")),
                Column::new("value", ColumnKind::Float, Source::Derived)
                    .with_description(format!("{field}.value")),
            ]),
            Source::Derived,
        )
        .with_description(format!("{field} (issued currency)"))
    }));

    columns.push(
        Column::new("Metadata", ColumnKind::String, Source::Derived)
            .with_description("metaData, serialized as JSON"),
    );

    TableSchema::new(RowKind::Transactions, columns, CURRENCY_FIELDS.to_vec())
}

fn copied(name: &'static str, ty: FieldType) -> Column {
    let kind = match ty {
        FieldType::Integer => ColumnKind::Integer,
        FieldType::String => ColumnKind::String,
    };
    Column::new(name, kind, Source::Path(name))
}

fn memos_column() -> Column {
    let memo = Column::new(
        "Memo",
        ColumnKind::Record(vec![
            Column::new("MemoData", ColumnKind::String, Source::Derived)
                .with_description("Memos[].Memo.MemoData"),
            Column::new("MemoFormat", ColumnKind::String, Source::Derived)
                .with_description("Memos[].Memo.MemoFormat"),
            Column::new("MemoType", ColumnKind::String, Source::Derived)
                .with_description("Memos[].Memo.MemoType"),
        ]),
        Source::Derived,
    )
    .with_description("Memos[].Memo");

    Column::new("Memos", ColumnKind::Record(vec![memo]), Source::Derived).repeated()
}

fn signer_entries_column() -> Column {
    let entry = Column::new(
        "SignerEntry",
        ColumnKind::Record(vec![
            Column::new("Account", ColumnKind::String, Source::Derived)
                .with_description("SignerEntries[].SignerEntry.Account"),
            Column::new("SignerWeight", ColumnKind::Integer, Source::Derived)
                .with_description("SignerEntries[].SignerEntry.SignerWeight"),
        ]),
        Source::Derived,
    )
    .with_description("SignerEntries[].SignerEntry");

    Column::new("SignerEntries", ColumnKind::Record(vec![entry]), Source::Derived).repeated()
}

fn signers_column() -> Column {
    let signer = Column::new(
        "Signer",
        ColumnKind::Record(vec![
            Column::new("Account", ColumnKind::String, Source::Derived)
                .with_description("Signers[].Signer.Account"),
            Column::new("SigningPubKey", ColumnKind::String, Source::Derived)
                .with_description("Signers[].Signer.SigningPubKey"),
            Column::new("TxnSignature", ColumnKind::String, Source::Derived)
                .with_description("Signers[].Signer.TxnSignature"),
        ]),
        Source::Derived,
    )
    .with_description("Signers[].Signer");

    Column::new("Signers", ColumnKind::Record(vec![signer]), Source::Derived).repeated()
}
