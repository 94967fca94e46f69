use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payments_ledger::application::middleware::LoggingMiddleware;
use payments_ledger::application::service::compose;
use payments_ledger::config::LockConfig;
use payments_ledger::domain::ports::{LockFactoryRef, UnitOfWorkFactoryRef};
use payments_ledger::infrastructure::in_memory::{InMemoryLockFactory, InMemoryStore};
use payments_ledger::interfaces::csv::account_writer::AccountWriter;
use payments_ledger::interfaces::csv::command_reader::CommandReader;
use payments_ledger::logging;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input ledger commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Redis URL for account locks shared between processes (optional).
    #[arg(long)]
    redis_url: Option<String>,

    /// Lease of a Redis lock whose holder disappeared.
    #[arg(long)]
    lock_expiry_ms: Option<u64>,

    /// Attempts made to acquire one account lock.
    #[arg(long)]
    lock_tries: Option<u32>,

    #[arg(long)]
    lock_retry_delay_ms: Option<u64>,

    /// Log filter, e.g. `info` or `payments_ledger=debug`. Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn lock_config(&self) -> LockConfig {
        let defaults = LockConfig::default();
        LockConfig {
            expiry: self
                .lock_expiry_ms
                .map_or(defaults.expiry, Duration::from_millis),
            tries: self.lock_tries.unwrap_or(defaults.tries),
            retry_delay: self
                .lock_retry_delay_ms
                .map_or(defaults.retry_delay, Duration::from_millis),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<UnitOfWorkFactoryRef> {
    use payments_ledger::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<UnitOfWorkFactoryRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryStore::new()))
}

#[cfg(feature = "lock-redis")]
fn lock_factory(redis_url: Option<&str>, config: LockConfig) -> Result<LockFactoryRef> {
    use payments_ledger::infrastructure::redis::RedisLockFactory;

    match redis_url {
        Some(url) => Ok(Arc::new(
            RedisLockFactory::from_url(url, config).into_diagnostic()?,
        )),
        None => Ok(Arc::new(InMemoryLockFactory::new(config))),
    }
}

#[cfg(not(feature = "lock-redis"))]
fn lock_factory(redis_url: Option<&str>, config: LockConfig) -> Result<LockFactoryRef> {
    if redis_url.is_some() {
        eprintln!(
            "WARNING: Distributed locking requested via --redis-url, but 'lock-redis' feature is not enabled. Falling back to In-Process locks."
        );
    }
    Ok(Arc::new(InMemoryLockFactory::new(config)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let store = open_store(cli.db_path.as_deref())?;
    let locks = lock_factory(cli.redis_url.as_deref(), cli.lock_config())?;
    let service = compose(locks, store, vec![LoggingMiddleware::layer()]);

    // Process commands
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = command.apply(service.as_ref()).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let accounts = service.get_accounts().await.into_diagnostic()?;

    // Output final state
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}
