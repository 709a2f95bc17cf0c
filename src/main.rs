//! Callwatch - directory-watch ingestion engine for radio-scanner calls.
//!
//! Entry point for the callwatch server.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use callwatch::access::Apikeys;
use callwatch::ingest::Ingestor;
use callwatch::observability::init_tracing;
use callwatch::storage::{init_storage, Database};
use callwatch::watch::Dirwatches;
use callwatch::{Config, Result};
use clap::{Parser, Subcommand};

/// Callwatch - radio-scanner call ingestion server
///
/// Watches configured directories for newly recorded calls, extracts
/// per-call metadata, and feeds validated calls to the archival pipeline.
#[derive(Parser, Debug)]
#[command(name = "callwatch")]
#[command(version)]
#[command(about = "Directory-watch ingestion engine for radio-scanner calls")]
struct Cli {
    /// Data directory for the `SQLite` database
    #[arg(
        short,
        long,
        env = "CALLWATCH_DATA_DIR",
        default_value = "./data",
        global = true
    )]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CALLWATCH_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "CALLWATCH_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the ingestion server
    ///
    /// Loads the watch and API key registries from the database, starts
    /// every enabled directory watch, and runs until interrupted.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("callwatch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Serve) | None => serve_command(cli.data_dir, cli.log_level).await,
    }
}

/// Serve command: run the ingestion engine until interrupted.
async fn serve_command(data_dir: PathBuf, log_level: String) -> Result<()> {
    let config = Config {
        data_dir,
        log_level,
    };
    config.validate()?;

    let db = Database::open(config.database_path())?;
    init_storage(&db)?;

    let (ingestor, mut calls) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let apikeys = Apikeys::new();
    apikeys.read(&db)?;
    tracing::info!(keys = apikeys.snapshot().len(), "API keys loaded");

    let watches = Dirwatches::new();
    watches.read(&db)?;
    tracing::info!(watches = watches.snapshot().len(), "watches loaded");

    watches.start_all(&ingestor);

    // Drain the ingest channel. The archival/broadcast pipeline sits behind
    // this receiver; here the server logs each validated call it hands off.
    let drain = tokio::spawn(async move {
        while let Some(call) = calls.recv().await {
            tracing::info!(
                system = call.system,
                talkgroup = call.talkgroup,
                audio = %call.audio_name,
                bytes = call.audio.len(),
                "call ingested"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    watches.stop_all();
    drop(ingestor);
    let _ = drain.await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_serve() {
        let cli = Cli::try_parse_from(["callwatch", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["callwatch"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.data_dir, PathBuf::from("./data"));
        assert_eq!(cli.log_level, "info");
        assert!(!cli.log_json);
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "callwatch",
            "--data-dir",
            "/var/lib/callwatch",
            "--log-level",
            "debug",
            "--log-json",
            "serve",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/var/lib/callwatch"));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.log_json);
    }
}
