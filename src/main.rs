use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portal_sync::session::MAX_DAYS_IN_PAST;
use portal_sync::{Record, RecordStore, SqliteStore, SyncConfig, start_date};

#[derive(Parser)]
#[command(name = "portal-sync", version)]
#[command(about = "Idempotent school-portal record sync", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./portal-sync.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist a JSON array of records into a table
    Import {
        /// Destination table
        table: String,

        /// JSON file holding an array of objects, each with an Id
        file: PathBuf,
    },

    /// Inspect or update the shared portal session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Print the date the next portal fetch should start from
    StartDate {
        /// Look-back window when there is no session history
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..=MAX_DAYS_IN_PAST))]
        days: Option<i64>,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show the session state and record
    Show,
    /// Store a new session token
    SetToken { token: String },
    /// Clear a recorded failure without probing the token
    ClearFailure,
    /// Record that the token worked
    MarkSuccess,
    /// Record that the token failed
    MarkFailure,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse().expect("valid log directive"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_records(file: &Path) -> Result<Vec<Record>> {
    let json =
        std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let records: Vec<Record> = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a JSON array of objects", file.display()))?;
    Ok(records)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Precedence: CLI > env > config file > defaults
    let mut config = SyncConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }

    let db_path = config.database_path();
    let store: Arc<dyn RecordStore> = Arc::new(
        SqliteStore::new(&db_path)
            .with_context(|| format!("failed to open store at {}", db_path.display()))?,
    );

    match cli.command {
        Commands::Import { table, file } => {
            let records = read_records(&file)?;
            info!(table = %table, count = records.len(), "importing records");

            let engine = config.engine(store);
            match engine.persist(&table, records).await {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                Err(e) => {
                    error!(error = %e, "import aborted");
                    println!("{}", serde_json::to_string_pretty(&e.partial)?);
                    anyhow::bail!("import failed: {}", e);
                }
            }
        }

        Commands::Session { action } => {
            let session = config.session_manager(store)?;
            match action {
                SessionAction::Show => {}
                SessionAction::SetToken { token } => session.set_token(token).await,
                SessionAction::ClearFailure => session.clear_failure().await,
                SessionAction::MarkSuccess => session.mark_success().await,
                SessionAction::MarkFailure => session.mark_failure().await,
            }

            let record = session.record().await;
            println!("state: {}", session.state().await);
            match record {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No session stored."),
            }
        }

        Commands::StartDate { days } => {
            let session = config.session_manager(store)?;
            let days = days.unwrap_or(config.default_days_in_past);
            let since = start_date(session.record().await.as_ref(), days, Utc::now());
            println!("{}", since.to_rfc3339());
        }
    }

    Ok(())
}
