//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Insignia - deduplicating media store with named, expiring links
#[derive(Parser, Debug)]
#[command(name = "insignia")]
#[command(about = "Deduplicating media store with named, expiring links", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file applied over the default and user files
    #[arg(short, long, global = true, env = "INSIGNIA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Run the expiry sweeper on its configured schedule until interrupted
    Serve,

    /// Remove expired links once and exit
    Sweep {
        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Store a file under a name
    Store {
        /// Media class, e.g. team-logo
        media_class: String,

        /// File to store
        file: PathBuf,

        /// Link name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Write the content behind a name to a file or stdout
    Retrieve {
        /// Media class
        media_class: String,

        /// Link name
        name: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a name, and its content if nothing else names it
    Delete {
        /// Media class
        media_class: String,

        /// Link name
        name: String,
    },
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
