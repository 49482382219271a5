use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use error_stack::Result;
use tokio_util::sync::CancellationToken;
use xrpl_etl::{
    apply_schema,
    cli::{etl_cli_style, set_ctrlc_handler},
    configuration::{IngestionOptions, StoreOptions},
    error::EtlErrorReportExt,
    print_schema, run_ingestion,
    schema::RowKind,
    EtlError, ReportExt,
};
use xrpl_etl_observability::init_tracing;

#[cfg(not(windows))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, styles = etl_cli_style())]
struct Cli {
    #[command(subcommand)]
    subcommand: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest ledgers or transactions into the store.
    Run(RunArgs),
    /// Create the destination tables.
    ApplySchema(ApplySchemaArgs),
    /// Print the destination schema as JSON.
    PrintSchema(PrintSchemaArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    ingestion: IngestionOptions,
    #[command(flatten)]
    store: StoreOptions,
}

#[derive(Args, Debug)]
struct ApplySchemaArgs {
    /// Delete existing tables first. All their rows are lost.
    #[arg(long)]
    drop_existing: bool,
    #[command(flatten)]
    store: StoreOptions,
}

#[derive(Args, Debug)]
struct PrintSchemaArgs {
    /// Which table schema to print.
    #[arg(value_enum)]
    kind: RowKind,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Variables from `.env` are visible to the env fallbacks of the options.
    let _ = dotenvy::dotenv();

    let args = Cli::parse();
    run_with_args(args).await.to_exit_code()
}

async fn run_with_args(args: Cli) -> Result<(), EtlError> {
    init_tracing().map_err(|err| err.configuration("failed to initialize tracing"))?;

    match args.subcommand {
        Command::Run(args) => {
            let ct = CancellationToken::new();
            set_ctrlc_handler(ct.clone())
                .map_err(|err| err.fatal("failed to setup ctrl-c handler"))?;
            run_ingestion(args.ingestion, args.store, ct).await?;
            Ok(())
        }
        Command::ApplySchema(args) => apply_schema(args.store, args.drop_existing).await,
        Command::PrintSchema(args) => {
            let schema = print_schema(args.kind)?;
            println!("{schema}");
            Ok(())
        }
    }
}
