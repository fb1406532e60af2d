//! txscope CLI
//!
//! Command-line tools for inspecting and exercising transaction-scope
//! propagation.
//!
//! # Commands
//!
//! - `table` - Print the propagation decision table
//! - `check` - Validate a transaction options file
//! - `simulate` - Run a nested scenario against the in-memory provider

mod commands;
mod schema;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// txscope command-line tools.
#[derive(Parser)]
#[command(name = "txscope")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the propagation decision table
    Table {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate a transaction options file
    Check {
        /// Path to the JSON options file
        path: PathBuf,
    },

    /// Run a nested scenario against the in-memory provider
    Simulate {
        /// Path to the JSON scenario file
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Table { format } => commands::table::run(&format)?,
        Commands::Check { path } => commands::check::run(&path)?,
        Commands::Simulate { path, format } => commands::simulate::run(&path, &format)?,
        Commands::Version => {
            println!("txscope CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
