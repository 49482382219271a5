//! Fetches ledgers and their transactions.
//!
//! Small ledgers are fetched with a single expanded `ledger` request. Ledgers with more
//! transactions than the expand threshold are fetched one transaction at a time, which keeps
//! the size of each response bounded.
use std::fmt;

use error_stack::{report, Report, Result, ResultExt};
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    client::{ClientError, LedgerClient, Request},
    model::{LedgerSequence, LedgerTransactions, RawLedger, RawTransaction},
};

/// Error code returned by the node for ledgers that are not closed yet.
const LEDGER_NOT_FOUND: &str = "lgrNotFound";

/// Error codes of an overloaded or out of sync node.
const NODE_UNAVAILABLE: &[&str] = &["tooBusy", "slowDown", "noCurrent", "noNetwork", "noClosed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure or timeout. Retrying may succeed.
    Temporary,
    /// The ledger is not closed yet.
    LedgerNotFound,
    /// The node reported an error.
    Remote,
    /// The response doesn't have the expected shape.
    Malformed,
}

impl error_stack::Context for FetchError {}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Temporary => write!(f, "temporary fetch error"),
            FetchError::LedgerNotFound => write!(f, "ledger not found"),
            FetchError::Remote => write!(f, "node reported an error"),
            FetchError::Malformed => write!(f, "malformed node response"),
        }
    }
}

pub trait FetchErrorExt {
    fn is_ledger_not_found(&self) -> bool;
    fn is_temporary(&self) -> bool;
}

impl FetchErrorExt for Report<FetchError> {
    fn is_ledger_not_found(&self) -> bool {
        matches!(self.current_context(), FetchError::LedgerNotFound)
    }

    fn is_temporary(&self) -> bool {
        matches!(self.current_context(), FetchError::Temporary)
    }
}

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Ledgers with at most this many transactions are fetched with a single request.
    pub expand_threshold: usize,
    /// Maximum number of concurrent transaction requests. Unbounded if `None`.
    pub fan_out_concurrency: Option<usize>,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            expand_threshold: 200,
            fan_out_concurrency: None,
        }
    }
}

pub struct LedgerFetcher<C: LedgerClient> {
    client: C,
    options: FetcherOptions,
}

impl<C> LedgerFetcher<C>
where
    C: LedgerClient,
{
    pub fn new(client: C, options: FetcherOptions) -> Self {
        Self { client, options }
    }

    /// Fetches all transactions of the ledger, with their metadata.
    ///
    /// Failures are returned as is, retrying is up to the caller.
    #[instrument(skip(self), err(Debug), level = "debug")]
    pub async fn fetch_transactions(
        &self,
        sequence: LedgerSequence,
    ) -> Result<LedgerTransactions, FetchError> {
        let ledger = self.request_ledger(sequence, true, false).await?;

        let Some(hashes) = ledger.transactions() else {
            return Ok(LedgerTransactions::empty(sequence));
        };

        if hashes.is_empty() {
            return Ok(LedgerTransactions::empty(sequence));
        }

        let transactions = if hashes.len() <= self.options.expand_threshold {
            self.fetch_expanded(sequence, hashes.len()).await?
        } else {
            debug!(
                ledger = sequence,
                count = hashes.len(),
                "fetching transactions one by one"
            );
            self.fetch_one_by_one(sequence, hashes).await?
        };

        Ok(LedgerTransactions {
            sequence,
            transactions,
        })
    }

    /// Fetches the ledger header, without transactions.
    #[instrument(skip(self), err(Debug), level = "debug")]
    pub async fn fetch_ledger(&self, sequence: LedgerSequence) -> Result<RawLedger, FetchError> {
        self.request_ledger(sequence, false, false).await
    }

    /// Fetches the ledger with inlined transactions. The ledger must contain exactly `expected`
    /// transactions.
    async fn fetch_expanded(
        &self,
        sequence: LedgerSequence,
        expected: usize,
    ) -> Result<Vec<RawTransaction>, FetchError> {
        let ledger = self.request_ledger(sequence, true, true).await?;

        let Some(transactions) = ledger.transactions() else {
            return Err(report!(FetchError::Malformed))
                .attach_printable("expanded ledger has no transactions")
                .attach_printable(format!("expected: {expected}"))
                .attach_printable(format!("ledger: {sequence}"));
        };

        if transactions.len() != expected {
            return Err(report!(FetchError::Malformed))
                .attach_printable("expanded ledger has a different number of transactions")
                .attach_printable(format!("expected: {expected}"))
                .attach_printable(format!("received: {}", transactions.len()))
                .attach_printable(format!("ledger: {sequence}"));
        }

        transactions
            .iter()
            .map(|tx| {
                RawTransaction::from_value(tx.clone()).ok_or_else(|| {
                    report!(FetchError::Malformed)
                        .attach_printable("expanded transaction is not an object")
                        .attach_printable(format!("ledger: {sequence}"))
                })
            })
            .collect()
    }

    async fn fetch_one_by_one(
        &self,
        sequence: LedgerSequence,
        hashes: &[Value],
    ) -> Result<Vec<RawTransaction>, FetchError> {
        let requests = hashes
            .iter()
            .map(|hash| match hash.as_str() {
                Some(hash) => Ok(self.request_transaction(hash.to_string())),
                None => Err(report!(FetchError::Malformed)
                    .attach_printable("transaction hash is not a string")
                    .attach_printable(format!("ledger: {sequence}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let responses = match self.options.fan_out_concurrency {
            None => futures::future::try_join_all(requests).await?,
            Some(concurrency) => {
                stream::iter(requests)
                    .buffered(concurrency.max(1))
                    .try_collect::<Vec<_>>()
                    .await?
            }
        };

        let requested = responses.len();
        let transactions = responses
            .into_iter()
            .filter_map(with_metadata)
            .collect::<Vec<_>>();

        if transactions.len() < requested {
            warn!(
                ledger = sequence,
                requested,
                kept = transactions.len(),
                "dropped transactions without metadata"
            );
        }

        Ok(transactions)
    }

    async fn request_transaction(&self, hash: String) -> Result<Value, FetchError> {
        let response = self
            .client
            .send(Request::Tx {
                transaction: hash.clone(),
            })
            .await
            .map_err(from_client_error)?;

        if let Some(code) = node_unavailable(&response) {
            return Err(report!(FetchError::Temporary))
                .attach_printable(format!("error: {code}"))
                .attach_printable(format!("transaction: {hash}"));
        }

        Ok(response)
    }

    async fn request_ledger(
        &self,
        sequence: LedgerSequence,
        transactions: bool,
        expand: bool,
    ) -> Result<RawLedger, FetchError> {
        let response = self
            .client
            .send(Request::Ledger {
                ledger_index: sequence,
                transactions,
                expand,
            })
            .await
            .map_err(from_client_error)
            .attach_printable_lazy(|| format!("ledger: {sequence}"))?;

        if let Some(error) = response.get("error") {
            let context = if error.as_str() == Some(LEDGER_NOT_FOUND) {
                FetchError::LedgerNotFound
            } else if node_unavailable(&response).is_some() {
                FetchError::Temporary
            } else {
                FetchError::Remote
            };
            let message = response
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(report!(context))
                .attach_printable(format!("error: {error} {message}"))
                .attach_printable(format!("ledger: {sequence}"));
        }

        response
            .get("ledger")
            .cloned()
            .and_then(RawLedger::from_value)
            .ok_or_else(|| {
                report!(FetchError::Malformed)
                    .attach_printable("response has no ledger")
                    .attach_printable(format!("ledger: {sequence}"))
            })
    }
}

/// Keeps a transaction response only if it has no error and carries its execution result,
/// moving `meta` to `metaData`.
fn with_metadata(response: Value) -> Option<RawTransaction> {
    let Value::Object(mut fields) = response else {
        return None;
    };

    if fields.contains_key("error") {
        return None;
    }

    let meta = fields.remove("meta")?;
    if !meta.get("TransactionResult").is_some_and(|result| !result.is_null()) {
        return None;
    }

    Some(RawTransaction::new(fields).with_metadata(meta))
}

/// Returns the error code if the node reported that it can't serve requests right now.
fn node_unavailable(response: &Value) -> Option<&str> {
    response
        .get("error")
        .and_then(Value::as_str)
        .filter(|code| NODE_UNAVAILABLE.contains(code))
}

fn from_client_error(err: Report<ClientError>) -> Report<FetchError> {
    let context = match err.current_context() {
        ClientError::Request | ClientError::Timeout => FetchError::Temporary,
        ClientError::Rejected | ClientError::Configuration => FetchError::Remote,
        ClientError::Response => FetchError::Malformed,
    };
    err.change_context(context)
}
