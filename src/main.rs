use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use subledger::domain::ports::EntityStoreBox;
use subledger::infrastructure::in_memory::InMemoryStore;
use subledger::interfaces::csv::command_reader::CommandReader;
use subledger::interfaces::csv::replay::Replay;
use subledger::interfaces::csv::subscription_writer::SubscriptionWriter;
use subledger::telemetry;
use tracing::error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log filter directives, e.g. `info` or `subledger=debug`. Overrides RUST_LOG.
    #[arg(long)]
    log_filter: Option<String>,
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<EntityStoreBox> {
    use subledger::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(Box::new(RocksDBStore::open(path).into_diagnostic()?)),
        None => Ok(Box::new(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<EntityStoreBox> {
    if db_path.is_some() {
        tracing::warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_filter.as_deref());

    let replay = Replay::new(open_store(cli.db_path)?);

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (line, command) in reader.commands().enumerate() {
        match command {
            Ok(command) => {
                if let Err(e) = replay.apply(command).await {
                    error!(row = line + 1, error = %e, "Error processing command");
                }
            }
            Err(e) => {
                error!(row = line + 1, error = %e, "Error reading command");
            }
        }
    }

    let subscriptions = replay.engine().all_subscriptions().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = SubscriptionWriter::new(stdout.lock());
    writer.write_subscriptions(subscriptions).into_diagnostic()?;

    Ok(())
}
