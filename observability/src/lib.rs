//! # Logging helpers
//!
//! Installs the process-wide `tracing` subscriber used by the ETL binary.

mod log_fmt;

use error_stack::{Result, ResultExt};
use tracing::Subscriber;
use tracing_subscriber::{prelude::*, registry::LookupSpan, EnvFilter, Layer};

pub use self::log_fmt::EtlFormat;

const RUST_LOG: &str = "RUST_LOG";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug)]
pub struct TracingInitError;
impl error_stack::Context for TracingInitError {}

impl std::fmt::Display for TracingInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to initialize tracing")
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact, colored, human readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Reads the format from the `RUST_LOG_FORMAT` environment variable.
    pub fn from_env() -> Self {
        match std::env::var(RUST_LOG_FORMAT) {
            Ok(value) if value == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initialize tracing.
///
/// The log level is controlled by `RUST_LOG` (defaults to `info`) and the output format by
/// `RUST_LOG_FORMAT`. It should be called once during the application startup.
///
/// ```rs
/// use xrpl_etl_observability::init_tracing;
///
/// init_tracing().unwrap();
/// ```
pub fn init_tracing() -> Result<(), TracingInitError> {
    let format = LogFormat::from_env();

    tracing_subscriber::registry()
        .with(stdout(format))
        .try_init()
        .change_context(TracingInitError)
        .attach_printable("a global subscriber is already installed")?;

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(RUST_LOG).unwrap_or_else(|_| EnvFilter::new("INFO"))
}

fn stdout<S>(format: LogFormat) -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(env_filter())
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .event_format(EtlFormat::default())
            .with_filter(env_filter())
            .boxed(),
    }
}
