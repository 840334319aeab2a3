use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walletdb::{
    FileStorage, InitReport, ReadOptions, StorageEngine, StoreConfig, WalletDb, wallet_migrations,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Operator tooling for the wallet store", long_about = None)]
#[command(name = "walletdb")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory of the store
    #[arg(long, global = true, env = "WALLETDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Store name
    #[arg(long, global = true, env = "WALLETDB_NAME")]
    name: Option<String>,

    /// Passphrase for encrypted fields
    #[arg(long, global = true, env = "WALLETDB_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the store, migrating it to the current version
    Init,
    /// Show installed and target version without migrating
    Status,
    /// List registered migration steps
    Steps,
    /// Show tables and record counts
    Tables,
    /// Print the records of a table as JSON
    Dump {
        table: String,
        /// Print stored values without decrypting
        #[arg(long)]
        raw: bool,
    },
    /// Delete the store and its catalog entry
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = build_config(&cli)?;

    match cli.command {
        Command::Init => init(config).await,
        Command::Status => status(config).await,
        Command::Steps => steps(),
        Command::Tables => tables(config).await,
        Command::Dump { table, raw } => dump(config, &table, raw).await,
        Command::Reset => reset(config).await,
    }
}

fn build_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = StoreConfig::from_env().context("Failed to read WALLETDB_* configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(name) = &cli.name {
        config.name = name.clone();
    }
    if let Some(key) = &cli.encryption_key {
        config.encryption_key = Some(key.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn storage(config: &StoreConfig) -> Result<Arc<FileStorage>> {
    let storage = FileStorage::open(&config.data_dir, config.durability)
        .with_context(|| format!("Failed to open data directory '{}'", config.data_dir.display()))?;
    Ok(Arc::new(storage))
}

async fn open(config: StoreConfig) -> Result<WalletDb> {
    let name = config.name.clone();
    WalletDb::open(config)
        .await
        .with_context(|| format!("Failed to open store '{}'", name))
}

fn print_report(report: &InitReport) {
    match report.installed_version {
        None => println!("Created store at version {}", report.target_version),
        Some(v) if v == report.target_version => println!("Store is at version {}", v),
        Some(v) => println!("Upgraded store from version {} to {}", v, report.target_version),
    }
    if !report.executed_steps.is_empty() {
        let steps: Vec<String> = report.executed_steps.iter().map(u32::to_string).collect();
        println!("Executed steps: {}", steps.join(", "));
    }
}

async fn init(config: StoreConfig) -> Result<()> {
    let db = open(config).await?;
    print_report(db.report());
    db.close().await?;
    Ok(())
}

async fn status(config: StoreConfig) -> Result<()> {
    let engine = storage(&config)?;
    let status = WalletDb::status(engine, &config).await?;
    let installed = status
        .installed_version
        .map(|v| v.to_string())
        .unwrap_or_else(|| "not installed".to_string());
    println!("Store:     {}", status.name);
    println!("Installed: {}", installed);
    println!("Target:    {}", status.target_version);
    if let Some(v) = status.installed_version
        && v > status.target_version
    {
        println!("Installed version is newer than this build supports");
    }
    for (version, description) in &status.pending_steps {
        println!("Pending:   v{} {}", version, description);
    }
    Ok(())
}

fn steps() -> Result<()> {
    let migrations = wallet_migrations()?;
    println!("Target version: {}", migrations.target_version());
    for step in migrations.steps() {
        println!("  v{:<3} {}", step.version, step.description);
    }
    Ok(())
}

async fn tables(config: StoreConfig) -> Result<()> {
    let db = open(config).await?;
    let conn = db.connection();
    println!("Version {}", conn.version().await);
    for table in conn.table_names().await {
        println!("  {:<22} {}", table, conn.count(&table).await?);
    }
    db.close().await?;
    Ok(())
}

async fn dump(config: StoreConfig, table: &str, raw: bool) -> Result<()> {
    let db = open(config).await?;
    let options = if raw { ReadOptions::raw() } else { ReadOptions::default() };
    let records = db
        .connection()
        .all_with(table, options)
        .await
        .with_context(|| format!("Failed to read table '{}'", table))?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    db.close().await?;
    Ok(())
}

async fn reset(config: StoreConfig) -> Result<()> {
    let engine = storage(&config)?;
    let databases = engine.databases().await?;
    if !databases.iter().any(|db| db.name == config.name) {
        bail!("Store '{}' does not exist", config.name);
    }
    engine.delete_database(&config.name).await?;
    println!("Deleted store '{}'", config.name);
    Ok(())
}
