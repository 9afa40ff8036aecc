//! mongo-mcp: MCP server exposing MongoDB collections to AI assistants
//!
//! Connects to MongoDB, verifies the connection, then serves MCP over stdio
//! until the client disconnects or a termination signal arrives.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mongo_mcp::bridge::ExecutionBridge;
use mongo_mcp::config::{self, Config};
use mongo_mcp::db::ConnectionManager;
use mongo_mcp::error::ServerError;
use mongo_mcp::handlers;
use mongo_mcp::mcp::server::McpServer;

/// MCP server exposing MongoDB collections to AI assistants.
///
/// Provides resources to read documents and collections, tools to insert and
/// delete documents, and prompt templates.
#[derive(Parser, Debug)]
#[command(name = "mongo-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Connects, serves until shutdown, then releases the connection.
async fn run(cfg: Config) -> Result<(), ServerError> {
    let registry = handlers::builtin_registry()?;
    let bridge = ExecutionBridge::new(cfg.server.request_timeout());
    let manager = ConnectionManager::new(bridge);

    let connection = manager
        .start(&cfg.mongodb.uri, &cfg.mongodb.database)
        .await?;

    let server = McpServer::new(registry, connection.clone(), bridge);
    info!("MCP server ready, waiting for client connection...");
    let result = server.run().await;
    drop(server);

    info!("MCP server shutting down");
    manager.stop(connection).await;
    result.map_err(ServerError::from)
}

/// Entry point for the mongo-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig read from: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "mongo-mcp {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %cfg.mongodb.database,
        "Starting mongo-mcp server"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cfg));
    // The stdin reader can still be parked on a blocking thread.
    runtime.shutdown_background();

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
