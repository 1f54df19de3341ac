//! CLI command definitions.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Server connection flags, accepted before or after the subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Server host name
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// User name
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Password
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Default database for the connection
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Network timeout in seconds, applied to every server call
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Capture the resident buffer pool pages into an image
    Save {
        /// Image file to write
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Image format (json, yaml, sqlite)
        #[arg(long)]
        format: Option<String>,
    },

    /// Replay an image against the server to re-warm its buffer pool
    Restore {
        /// Image file to read
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Image format. Detected from the file when omitted
        #[arg(long)]
        format: Option<String>,

        /// Pages per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Concurrent page fetches within a batch
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Print an image's metadata without connecting to a server
    Inspect {
        /// Image file to read
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Image format. Detected from the file when omitted
        #[arg(long)]
        format: Option<String>,

        /// Also list the first N pages
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },

    /// List the supported image formats
    Formats,
}
