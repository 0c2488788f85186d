//! prefsync CLI
//!
//! Command-line tools for prefsync stores and sync sessions.
//!
//! # Commands
//!
//! - `inspect` - Display the preferences held in a local store file
//! - `migrate` - Upgrade a store file to the current schema
//! - `simulate` - Run a sync session against an in-process server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// prefsync command-line tools.
#[derive(Parser)]
#[command(name = "prefsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local store file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the preferences held in a local store file
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Upgrade a store file to the current schema
    Migrate {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Run a sync session against an in-process server
    Simulate {
        /// Number of favorites writes to make
        #[arg(short, long, default_value = "5")]
        writes: usize,

        /// Debounce delay for every type, in milliseconds
        #[arg(long, default_value = "200")]
        debounce_ms: u64,

        /// Maximum retries per failed flush
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Require signed bearer tokens on the server
        #[arg(long)]
        auth: bool,

        /// Identity the client acts for
        #[arg(long, default_value = "demo")]
        identity: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Migrate { dry_run } => {
            let path = cli.path.ok_or("Store path required for migrate")?;
            commands::migrate::run(&path, dry_run)?;
        }
        Commands::Simulate {
            writes,
            debounce_ms,
            max_retries,
            auth,
            identity,
        } => {
            let options = commands::simulate::SimulateOptions {
                store_path: cli.path,
                writes,
                debounce_ms,
                max_retries,
                auth,
                identity,
            };
            commands::simulate::run(&options)?;
        }
        Commands::Version => {
            println!("prefsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Store schema v{}",
                prefsync_store::CURRENT_SCHEMA_VERSION
            );
        }
    }

    Ok(())
}
