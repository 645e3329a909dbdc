use clap::{Parser, ValueEnum};
use marketplace_settlement::application::{Marketplace, DEFAULT_CURRENCY};
use marketplace_settlement::domain::ports::Stores;
use marketplace_settlement::infrastructure::gateway::HmacGateway;
use marketplace_settlement::infrastructure::in_memory::in_memory_stores;
use marketplace_settlement::interfaces::csv::ledger_writer::LedgerWriter;
use marketplace_settlement::interfaces::script::command_reader::CommandReader;
use marketplace_settlement::interfaces::script::runner::ScriptRunner;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Output {
    /// One row per user: spendable, locked and ledger length
    Balances,
    /// Every wallet transaction
    Ledger,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON-lines script of marketplace commands
    script: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "MARKETPLACE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Public key id handed to the hosted checkout
    #[arg(long, env = "GATEWAY_KEY_ID", default_value = "rzp_test_local")]
    gateway_key_id: String,

    /// Secret used to sign and verify gateway payments
    #[arg(
        long,
        env = "GATEWAY_KEY_SECRET",
        default_value = "local-secret",
        hide_env_values = true
    )]
    gateway_key_secret: String,

    #[arg(long, default_value = DEFAULT_CURRENCY)]
    currency: String,

    /// What to print once the script has run
    #[arg(long, value_enum, default_value_t = Output::Balances)]
    output: Output,
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use marketplace_settlement::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using RocksDB storage");
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(store.stores())
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if let Some(path) = db_path {
        tracing::warn!(
            path = %path.display(),
            "built without the storage-rocksdb feature, falling back to in-memory storage"
        );
    }
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let stores = open_stores(cli.db_path)?;
    let gateway = HmacGateway::new(cli.gateway_key_id, cli.gateway_key_secret);
    let marketplace =
        Marketplace::new(stores, Box::new(gateway.clone())).with_currency(cli.currency);
    let mut runner = ScriptRunner::new(marketplace).with_signer(gateway);

    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                let name = command.name();
                if let Err(e) = runner.apply(command).await {
                    error!(command = name, code = e.code(), "{e}");
                }
            }
            Err(e) => {
                error!(code = e.code(), "Error reading command: {e}");
            }
        }
    }

    let marketplace = runner.into_marketplace();
    let stores = marketplace.stores();
    let users = stores.users.all_users().await.into_diagnostic()?;

    match cli.output {
        Output::Balances => {
            let mut rows = Vec::with_capacity(users.len());
            for user in users {
                let transactions = stores.ledger.history(&user.id).await.into_diagnostic()?.len();
                rows.push((user, transactions));
            }
            let stdout = io::stdout();
            let mut writer = LedgerWriter::new(stdout.lock());
            writer.write_balances(rows).into_diagnostic()?;
        }
        Output::Ledger => {
            let mut entries = Vec::with_capacity(users.len());
            for user in users {
                let history = stores.ledger.history(&user.id).await.into_diagnostic()?;
                entries.push((user.id, history));
            }
            let stdout = io::stdout();
            let mut writer = LedgerWriter::new(stdout.lock());
            writer.write_ledger(entries).into_diagnostic()?;
        }
    }

    Ok(())
}
