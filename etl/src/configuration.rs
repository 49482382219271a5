//! Command line options and the validated configuration built from them.
use std::time::Duration;

use clap::Args;
use error_stack::Result;
use url::Url;

use crate::{
    client::JsonRpcClientOptions,
    error::{EtlError, EtlErrorOptionExt, EtlErrorResultExt},
    fetcher::FetcherOptions,
    mapper::MemoLayout,
    model::LedgerSequence,
    runner::RetryPolicy,
    schema::RowKind,
    store::{BigQueryOptions, Credentials, DEFAULT_BIGQUERY_URL},
};

pub const DEFAULT_START_LEDGER: LedgerSequence = 32570;
pub const DEFAULT_NODE_URL: &str = "https://s2.ripple.com:51234/";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_EXPAND_THRESHOLD: usize = 200;
const DEFAULT_RETRY_MIN_DELAY_MS: u64 = 100;
const DEFAULT_RETRY_MAX_DELAY_SECONDS: u64 = 30;
const DEFAULT_TIP_POLL_INTERVAL_SECONDS: u64 = 4;

#[derive(Debug, Args, Default)]
pub struct StoreOptions {
    /// Project containing the dataset.
    #[arg(long, env = "BIGQUERY_PROJECT_ID")]
    pub project_id: Option<String>,
    /// Dataset containing the ledger and transaction tables.
    #[arg(long, env = "BIGQUERY_DATASET")]
    pub dataset: Option<String>,
    /// Table of ledger summaries.
    #[arg(long, env = "BIGQUERY_LEDGER_TABLE")]
    pub ledger_table: Option<String>,
    /// Table of transactions.
    #[arg(long, env = "BIGQUERY_TRANSACTION_TABLE")]
    pub transaction_table: Option<String>,
    /// OAuth2 access token used instead of the application default credentials.
    ///
    /// The token is never refreshed.
    #[arg(long, env = "BIGQUERY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    /// Send unauthenticated requests, for example to a local emulator.
    #[arg(long, conflicts_with = "access_token")]
    pub anonymous: bool,
    /// Base url of the BigQuery REST api.
    #[arg(long, env = "BIGQUERY_URL")]
    pub bigquery_url: Option<String>,
    /// Timeout of each store request, in seconds.
    #[arg(long)]
    pub store_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default)]
pub struct IngestionOptions {
    /// Which rows to ingest.
    #[arg(long, env = "ETL_MODE", value_enum)]
    pub mode: Option<RowKind>,
    /// First ledger to ingest, unless the table already contains later ledgers.
    #[arg(long, env = "LEDGER")]
    pub start_ledger: Option<LedgerSequence>,
    /// Stop before this ledger.
    #[arg(long, env = "END_LEDGER")]
    pub end_ledger: Option<LedgerSequence>,
    /// JSON-RPC url of the node.
    #[arg(long, env = "NODE")]
    pub node_url: Option<String>,
    /// Timeout of each node request, in seconds.
    #[arg(long)]
    pub request_timeout_seconds: Option<u64>,
    /// Ledgers with more transactions are fetched one transaction at a time.
    #[arg(long)]
    pub expand_threshold: Option<usize>,
    /// Maximum number of concurrent transaction requests. Unbounded by default.
    #[arg(long)]
    pub fan_out_concurrency: Option<usize>,
    /// How memo fields are stored.
    #[arg(long, value_enum)]
    pub memo_layout: Option<MemoLayout>,
    /// Delay before the first retry of a failed ledger, in milliseconds.
    #[arg(long)]
    pub retry_min_delay_ms: Option<u64>,
    /// Maximum delay between retries, in seconds.
    #[arg(long)]
    pub retry_max_delay_seconds: Option<u64>,
    /// Maximum number of retries of one ledger. Unbounded by default.
    #[arg(long)]
    pub max_retries: Option<usize>,
    /// How often to poll for a ledger that is not closed yet, in seconds.
    #[arg(long)]
    pub tip_poll_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StoreConfiguration {
    pub bigquery: BigQueryOptions,
    pub ledger_table: String,
    pub transaction_table: String,
}

#[derive(Debug, Clone)]
pub struct IngestionConfiguration {
    pub mode: RowKind,
    pub start_ledger: LedgerSequence,
    pub end_ledger: Option<LedgerSequence>,
    pub node_url: Url,
    pub client: JsonRpcClientOptions,
    pub fetcher: FetcherOptions,
    pub memo_layout: MemoLayout,
    pub retry: RetryPolicy,
}

impl StoreConfiguration {
    pub fn table(&self, kind: RowKind) -> &str {
        match kind {
            RowKind::Ledgers => &self.ledger_table,
            RowKind::Transactions => &self.transaction_table,
        }
    }
}

impl StoreOptions {
    pub fn to_store_configuration(self) -> Result<StoreConfiguration, EtlError> {
        let project_id = self.project_id.configuration("missing project id")?;
        let dataset = self.dataset.configuration("missing dataset")?;

        let base_url = self
            .bigquery_url
            .unwrap_or_else(|| DEFAULT_BIGQUERY_URL.to_string());
        Url::parse(&base_url).configuration("invalid bigquery url")?;

        let ledger_table = self.ledger_table.unwrap_or_else(|| "ledgers".to_string());
        let transaction_table = self
            .transaction_table
            .unwrap_or_else(|| "transactions".to_string());
        if ledger_table == transaction_table {
            return Err(EtlError::configuration(
                "ledger and transaction tables must be different",
            ));
        }

        let timeout = Duration::from_secs(
            self.store_timeout_seconds
                .unwrap_or(DEFAULT_STORE_TIMEOUT_SECONDS),
        );

        let credentials = match (self.access_token, self.anonymous) {
            (Some(token), _) => Credentials::AccessToken(token),
            (None, true) => Credentials::Anonymous,
            (None, false) => Credentials::ApplicationDefault,
        };

        Ok(StoreConfiguration {
            bigquery: BigQueryOptions {
                base_url,
                project_id,
                dataset,
                credentials,
                timeout,
            },
            ledger_table,
            transaction_table,
        })
    }
}

impl IngestionOptions {
    pub fn to_ingestion_configuration(self) -> Result<IngestionConfiguration, EtlError> {
        let mode = self
            .mode
            .configuration("missing mode, expected ledgers or transactions")?;

        let start_ledger = self.start_ledger.unwrap_or(DEFAULT_START_LEDGER);
        if let Some(end_ledger) = self.end_ledger {
            if end_ledger <= start_ledger {
                return Err(EtlError::configuration(
                    "end ledger must be after the start ledger",
                ));
            }
        }

        let node_url = self
            .node_url
            .unwrap_or_else(|| DEFAULT_NODE_URL.to_string());
        let node_url = Url::parse(&node_url).configuration("invalid node url")?;

        let timeout = Duration::from_secs(
            self.request_timeout_seconds
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        );
        if timeout.is_zero() {
            return Err(EtlError::configuration("request timeout must be positive"));
        }

        if self.fan_out_concurrency == Some(0) {
            return Err(EtlError::configuration(
                "fan out concurrency must be positive",
            ));
        }

        let retry = RetryPolicy {
            min_delay: Duration::from_millis(
                self.retry_min_delay_ms
                    .unwrap_or(DEFAULT_RETRY_MIN_DELAY_MS),
            ),
            max_delay: Duration::from_secs(
                self.retry_max_delay_seconds
                    .unwrap_or(DEFAULT_RETRY_MAX_DELAY_SECONDS),
            ),
            max_retries: self.max_retries,
            tip_poll_interval: Duration::from_secs(
                self.tip_poll_interval_seconds
                    .unwrap_or(DEFAULT_TIP_POLL_INTERVAL_SECONDS),
            ),
        };
        if retry.min_delay > retry.max_delay {
            return Err(EtlError::configuration(
                "retry min delay must not exceed the max delay",
            ));
        }

        Ok(IngestionConfiguration {
            mode,
            start_ledger,
            end_ledger: self.end_ledger,
            node_url,
            client: JsonRpcClientOptions { timeout },
            fetcher: FetcherOptions {
                expand_threshold: self.expand_threshold.unwrap_or(DEFAULT_EXPAND_THRESHOLD),
                fan_out_concurrency: self.fan_out_concurrency,
            },
            memo_layout: self.memo_layout.unwrap_or_default(),
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::{IngestionOptions, StoreOptions};
    use crate::{error::EtlError, mapper::MemoLayout, schema::RowKind, store::Credentials};

    fn store_options() -> StoreOptions {
        StoreOptions {
            project_id: Some("project".to_string()),
            dataset: Some("xrpl".to_string()),
            ..StoreOptions::default()
        }
    }

    #[test]
    fn test_ingestion_defaults() {
        let config = IngestionOptions {
            mode: Some(RowKind::Transactions),
            ..IngestionOptions::default()
        }
        .to_ingestion_configuration()
        .unwrap();

        assert_eq!(config.start_ledger, 32570);
        assert_eq!(config.end_ledger, None);
        assert_eq!(config.node_url.as_str(), "https://s2.ripple.com:51234/");
        assert_eq!(config.client.timeout, Duration::from_secs(30));
        assert_eq!(config.fetcher.expand_threshold, 200);
        assert_eq!(config.fetcher.fan_out_concurrency, None);
        assert_eq!(config.memo_layout, MemoLayout::Collapsed);
        assert_eq!(config.retry.min_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, None);
        assert_eq!(config.retry.tip_poll_interval, Duration::from_secs(4));
    }

    #[test]
    fn test_missing_mode() {
        let err = IngestionOptions::default()
            .to_ingestion_configuration()
            .unwrap_err();
        assert_matches!(err.current_context(), EtlError::Configuration);
    }

    #[test]
    fn test_invalid_ingestion_options() {
        let options = || IngestionOptions {
            mode: Some(RowKind::Ledgers),
            ..IngestionOptions::default()
        };

        let err = IngestionOptions {
            start_ledger: Some(100),
            end_ledger: Some(100),
            ..options()
        }
        .to_ingestion_configuration()
        .unwrap_err();
        assert_matches!(err.current_context(), EtlError::Configuration);

        assert!(IngestionOptions {
            node_url: Some("not a url".to_string()),
            ..options()
        }
        .to_ingestion_configuration()
        .is_err());

        assert!(IngestionOptions {
            fan_out_concurrency: Some(0),
            ..options()
        }
        .to_ingestion_configuration()
        .is_err());

        assert!(IngestionOptions {
            retry_min_delay_ms: Some(60_000),
            retry_max_delay_seconds: Some(1),
            ..options()
        }
        .to_ingestion_configuration()
        .is_err());
    }

    #[test]
    fn test_store_configuration() {
        let config = store_options().to_store_configuration().unwrap();
        assert_eq!(config.table(RowKind::Ledgers), "ledgers");
        assert_eq!(config.table(RowKind::Transactions), "transactions");
        assert_eq!(config.bigquery.base_url, "https://bigquery.googleapis.com");
        assert_eq!(config.bigquery.credentials, Credentials::ApplicationDefault);
    }

    #[test]
    fn test_store_credentials() {
        let config = StoreOptions {
            access_token: Some("secret".to_string()),
            ..store_options()
        }
        .to_store_configuration()
        .unwrap();
        assert_eq!(
            config.bigquery.credentials,
            Credentials::AccessToken("secret".to_string())
        );

        let config = StoreOptions {
            anonymous: true,
            ..store_options()
        }
        .to_store_configuration()
        .unwrap();
        assert_eq!(config.bigquery.credentials, Credentials::Anonymous);
    }

    #[test]
    fn test_store_requires_project_and_dataset() {
        let err = StoreOptions::default().to_store_configuration().unwrap_err();
        assert_matches!(err.current_context(), EtlError::Configuration);

        let err = StoreOptions {
            ledger_table: Some("rows".to_string()),
            transaction_table: Some("rows".to_string()),
            ..store_options()
        }
        .to_store_configuration()
        .unwrap_err();
        assert_matches!(err.current_context(), EtlError::Configuration);
    }
}
