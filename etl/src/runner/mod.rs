//! Run loop.
//!
//! Ledgers are processed one at a time: fetch, map, append, then advance the cursor. A ledger
//! is retried until it is stored, the retry budget is exhausted, or a fatal error occurs. The
//! loop never skips a ledger.
mod retry;

use std::fmt;

use chrono::Utc;
use error_stack::{Report, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::LedgerClient,
    error::{EtlError, EtlErrorReportExt},
    fetcher::{FetchError, FetchErrorExt, LedgerFetcher},
    mapper::RowMapper,
    model::LedgerSequence,
    row::Row,
    schema::RowKind,
    store::{InsertOutcome, RowRejection, Store, StoreErrorExt},
};

pub use self::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Cancellation was requested, the loop stops before the next ledger.
    Stopping,
    Stopped,
    Failed,
}

/// State of a run, owned by the run loop.
#[derive(Debug)]
pub struct RunContext {
    /// Last ledger fully stored.
    pub cursor: LedgerSequence,
    pub state: RunState,
    /// Stop before this ledger, if set.
    pub end_ledger: Option<LedgerSequence>,
    /// Why the run failed.
    pub error: Option<Report<EtlError>>,
}

impl RunContext {
    pub fn new(cursor: LedgerSequence, end_ledger: Option<LedgerSequence>) -> Self {
        Self {
            cursor,
            state: RunState::Running,
            end_ledger,
            error: None,
        }
    }

    pub fn next_ledger(&self) -> LedgerSequence {
        self.cursor + 1
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, RunState::Stopped | RunState::Failed)
    }

    /// Returns the last stored ledger, or the error if the run failed.
    pub fn into_result(self) -> Result<LedgerSequence, EtlError> {
        match (self.state, self.error) {
            (RunState::Failed, Some(err)) => Err(err),
            (RunState::Failed, None) => Err(EtlError::fatal("run failed")),
            _ => Ok(self.cursor),
        }
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunContext(cursor={}, state={:?})", self.cursor, self.state)
    }
}

#[derive(Debug, Clone)]
pub struct IngestorOptions {
    pub mode: RowKind,
    /// Destination table.
    pub table: String,
    pub retry: RetryPolicy,
}

/// Outcome of one attempt at a ledger.
enum Attempt {
    /// The ledger is stored.
    Stored { rows: usize },
    /// The ledger is not closed yet.
    NotReady,
}

pub struct Ingestor<C: LedgerClient, S: Store> {
    fetcher: LedgerFetcher<C>,
    mapper: RowMapper,
    store: S,
    options: IngestorOptions,
}

impl<C, S> Ingestor<C, S>
where
    C: LedgerClient,
    S: Store,
{
    pub fn new(
        fetcher: LedgerFetcher<C>,
        mapper: RowMapper,
        store: S,
        options: IngestorOptions,
    ) -> Self {
        Self {
            fetcher,
            mapper,
            store,
            options,
        }
    }

    /// Runs until cancelled, the end ledger is reached, or a ledger fails.
    pub async fn run(&self, mut ctx: RunContext, ct: CancellationToken) -> RunContext {
        info!(
            mode = %self.options.mode,
            table = %self.options.table,
            next = ctx.next_ledger(),
            "starting ingestion"
        );

        while !ctx.is_done() {
            ctx = self.step(ctx, &ct).await;
        }

        ctx
    }

    /// Processes the next ledger, or moves the run towards a final state.
    pub async fn step(&self, mut ctx: RunContext, ct: &CancellationToken) -> RunContext {
        if ctx.state == RunState::Running && ct.is_cancelled() {
            ctx.state = RunState::Stopping;
        }

        match ctx.state {
            RunState::Running => {}
            RunState::Stopping => {
                info!(last_ledger = ctx.cursor, "ingestion stopped");
                ctx.state = RunState::Stopped;
                return ctx;
            }
            RunState::Stopped | RunState::Failed => return ctx,
        }

        let sequence = ctx.next_ledger();
        if ctx.end_ledger.is_some_and(|end| sequence >= end) {
            info!(last_ledger = ctx.cursor, "reached ending ledger");
            ctx.state = RunState::Stopped;
            return ctx;
        }

        match self.process_with_retry(sequence).await {
            Ok(Attempt::Stored { rows }) => {
                ctx.cursor = sequence;
                info!(ledger = sequence, rows, "ledger stored");
            }
            Ok(Attempt::NotReady) => {
                debug!(ledger = sequence, "waiting for ledger to close");
                tokio::select! {
                    _ = tokio::time::sleep(self.options.retry.tip_poll_interval) => {},
                    _ = ct.cancelled() => {},
                }
            }
            Err(err) => {
                error!(ledger = sequence, last_ledger = ctx.cursor, err = ?err, "ingestion failed");
                ctx.error = Some(err);
                ctx.state = RunState::Failed;
            }
        }

        ctx
    }

    /// Attempts the ledger until it succeeds or fails with a non-temporary error.
    ///
    /// Cancellation is not observed here: a ledger that started processing is completed.
    async fn process_with_retry(&self, sequence: LedgerSequence) -> Result<Attempt, EtlError> {
        let mut backoff = self.options.retry.backoff();

        loop {
            let err = match self.process(sequence).await {
                Ok(attempt) => return Ok(attempt),
                Err(err) if *err.current_context() == EtlError::Temporary => err,
                Err(err) => return Err(err),
            };

            let Some(delay) = backoff.next() else {
                return Err(err
                    .change_context(EtlError::Fatal)
                    .attach_printable("ledger failed after retry")
                    .attach_printable(format!("ledger: {sequence}")));
            };

            warn!(ledger = sequence, err = ?err, delay = ?delay, "retrying ledger");
            tokio::time::sleep(delay).await;
        }
    }

    async fn process(&self, sequence: LedgerSequence) -> Result<Attempt, EtlError> {
        let rows = match self.fetch_rows(sequence).await {
            Ok(rows) => rows,
            Err(err) if err.is_ledger_not_found() => return Ok(Attempt::NotReady),
            Err(err) if err.is_temporary() => {
                return Err(err.temporary("failed to fetch ledger"));
            }
            Err(err) => return Err(err.fatal("failed to fetch ledger")),
        };

        let inserted_at = Utc::now();
        let rows = rows
            .into_iter()
            .map(|row| row.stamp(sequence, inserted_at))
            .collect::<Vec<_>>();

        if rows.is_empty() {
            return Ok(Attempt::Stored { rows: 0 });
        }

        let outcome = match self.store.insert(&self.options.table, &rows).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_temporary() => {
                return Err(err.temporary("failed to insert rows"));
            }
            Err(err) => return Err(err.fatal("failed to insert rows")),
        };

        match outcome {
            InsertOutcome::Accepted => Ok(Attempt::Stored { rows: rows.len() }),
            InsertOutcome::PartialFailure(rejections) => {
                Err(partial_failure(sequence, rows.len(), &rejections))
            }
        }
    }

    async fn fetch_rows(&self, sequence: LedgerSequence) -> Result<Vec<Row>, FetchError> {
        match self.options.mode {
            RowKind::Ledgers => {
                let ledger = self.fetcher.fetch_ledger(sequence).await?;
                Ok(vec![self.mapper.map_ledger_summary(&ledger)])
            }
            RowKind::Transactions => {
                let ledger = self.fetcher.fetch_transactions(sequence).await?;
                Ok(ledger
                    .transactions
                    .iter()
                    .map(|tx| self.mapper.map_transaction(tx, sequence))
                    .collect())
            }
        }
    }
}

fn partial_failure(
    sequence: LedgerSequence,
    total: usize,
    rejections: &[RowRejection],
) -> Report<EtlError> {
    for rejection in rejections {
        error!(
            ledger = sequence,
            index = rejection.index,
            reasons = ?rejection.reasons,
            "row rejected"
        );
    }

    let mut report = EtlError::fatal("store rejected rows")
        .attach_printable(format!("ledger: {sequence}"))
        .attach_printable(format!("rejected {} of {total} rows", rejections.len()));
    for rejection in rejections {
        report = report.attach_printable(format!(
            "row {}: {}",
            rejection.index,
            rejection.reasons.join(", ")
        ));
    }
    report
}
