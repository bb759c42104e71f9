//! Command-line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// lake-ingest - data lake ingestion orchestrator
#[derive(Parser, Debug)]
#[command(name = "lake-ingest")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML); LAKE_* environment variables override it
    #[arg(short, long, env = "LAKE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a directory and ingest new files until interrupted
    Watch {
        /// Directory to watch (overrides watch.dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Seconds between snapshots (overrides watch.interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Upload a single dataset file after pre-flight checks
    Upload {
        /// Absolute path of the file
        path: PathBuf,

        /// Target bucket (defaults to lake.raw_bucket)
        #[arg(short, long)]
        bucket: Option<String>,

        /// Object key (defaults to the file name)
        #[arg(short, long)]
        key: Option<String>,

        /// Upload the file even if it is empty
        #[arg(long)]
        allow_empty: bool,
    },

    /// Process an S3 event notification read from a JSON file
    HandleEvent {
        /// Event document ("-" for stdin)
        file: PathBuf,
    },

    /// Run discovery and transform for one object already in the raw zone
    Trigger {
        /// Object key
        key: String,
    },

    /// Push the lines of a file into the record stream
    Stream {
        /// File to read, one record per line
        file: PathBuf,

        /// Partition key (defaults to stream.partition_key)
        #[arg(short, long)]
        partition_key: Option<String>,

        /// Send records in batch calls instead of one at a time
        #[arg(short, long)]
        batch: bool,
    },

    /// Wait until the record stream and delivery buffer are active
    WaitActive,
}
