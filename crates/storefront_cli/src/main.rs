//! Operator CLI for the annual closing subsystem.
//!
//! # Responsibility
//! - Parse operator commands and forward them to `storefront_core::api`.
//! - Print each response envelope as pretty JSON on stdout.
//!
//! # Invariants
//! - Exit status is `0` only when the envelope reports `success`.
//! - Setup failures (db, config, logging) go to stderr with exit status `2`.

use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use storefront_core::db::open_db;
use storefront_core::{api, ClosingService, CoreConfig, Fields, RecordService, SqliteDocumentStore};

#[derive(Parser)]
#[command(name = "storefront", about = "Storefront annual closing console")]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "STOREFRONT_DB", default_value = "storefront.db")]
    db: PathBuf,

    /// TOML configuration file with an optional `[closing]` table
    #[arg(long, env = "STOREFRONT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for rolling log files; logging stays off when omitted
    #[arg(long, env = "STOREFRONT_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive every record of a year and purge the originals
    Close { year: i32 },
    /// Restore a closed year from its archive (spends one revert)
    Revert { year: i32 },
    /// Permanently discard the archive of a year
    DeleteArchive { year: i32 },
    /// Show remaining reverts
    RevertCount,
    /// Spend one revert without restoring anything
    DecrementRevertCount,
    /// Show the closing status of a year
    Status { year: i32 },
    /// List live archives
    ListArchives,
    /// Finish an interrupted closing and report stragglers
    Reconcile { year: i32 },
    /// Import live records from a JSON array file
    Import {
        collection: String,
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(message) => {
            eprintln!("storefront: {message}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<bool, String> {
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path).map_err(|err| err.to_string())?,
        None => CoreConfig::default(),
    };
    if let Some(log_dir) = &cli.log_dir {
        let level = cli
            .log_level
            .as_deref()
            .unwrap_or_else(|| storefront_core::default_log_level());
        storefront_core::init_logging(level, &absolute_dir(log_dir)?)
            .map_err(|err| err.to_string())?;
    }

    let conn = open_db(&cli.db).map_err(|err| err.to_string())?;
    let store = SqliteDocumentStore::new(&conn).with_max_batch_ops(config.max_batch_ops);
    info!(
        "event=cli_start module=cli status=ok db={} version={}",
        cli.db.display(),
        storefront_core::core_version()
    );

    let service = ClosingService::with_config(&store, config);
    match cli.command {
        Commands::Close { year } => print(&api::perform_annual_closing(&service, year)),
        Commands::Revert { year } => print(&api::revert_annual_closing(&service, year)),
        Commands::DeleteArchive { year } => print(&api::delete_closing_archive(&service, year)),
        Commands::RevertCount => print(&api::get_revert_count(&service)),
        Commands::DecrementRevertCount => print(&api::decrement_revert_count(&service)),
        Commands::Status { year } => print(&api::get_closing_status(&service, year)),
        Commands::ListArchives => print(&api::list_closing_archives(&service)),
        Commands::Reconcile { year } => print(&api::reconcile_annual_closing(&service, year)),
        Commands::Import { collection, file } => {
            let records = read_records(&file)?;
            let records_service = RecordService::new(&store);
            print(&api::import_records(&records_service, &collection, records))
        }
    }
}

/// Envelopes all carry `success`; it decides the exit status.
fn print<T: Serialize>(response: &T) -> Result<bool, String> {
    let value = serde_json::to_value(response).map_err(|err| err.to_string())?;
    let rendered = serde_json::to_string_pretty(&value).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(value
        .get("success")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false))
}

fn read_records(path: &Path) -> Result<Vec<Fields>, String> {
    let source = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    serde_json::from_str(&source)
        .map_err(|err| format!("{} must hold a JSON array of objects: {err}", path.display()))
}

fn absolute_dir(path: &Path) -> Result<String, String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| format!("failed to resolve current directory: {err}"))?
            .join(path)
    };
    Ok(absolute.to_string_lossy().into_owned())
}
