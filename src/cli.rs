use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::search::DEFAULT_MATCH_LIMIT;

#[derive(Debug, Clone, Parser)]
#[command(name = "jarscope")]
#[command(about = "Index Java classes inside JAR/WAR files (nested JARs included) and search them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Index file (default: $JARSCOPE_DB, then ~/.jarscope/index.lmdb)
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Index every .jar/.war under a directory
    Index {
        directory: PathBuf,

        /// Only look at the directory itself, not its subdirectories
        #[arg(long)]
        no_recursive: bool,

        /// Detect changes with a SHA-256 of each archive instead of mtime + size
        #[arg(long)]
        hash: bool,

        /// Forget archives under the directory that no longer exist
        #[arg(long)]
        prune: bool,

        /// No progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Case-insensitive class name lookup
    Query {
        text: String,

        /// Match the start of the class name instead of any part of it
        #[arg(long)]
        prefix: bool,

        #[arg(short = 'n', long, value_name = "N")]
        limit: Option<usize>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Archives containing exactly this class
    Archives {
        class_name: String,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Interactive search prompt
    Search {
        #[arg(short = 'n', long, value_name = "N", default_value_t = DEFAULT_MATCH_LIMIT)]
        limit: usize,
    },
    Stats,
    Clear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
