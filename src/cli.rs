//! CLI argument parsing for replitrace

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for analysis reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "replitrace")]
#[command(version)]
#[command(about = "Multi-process replication trace aggregator", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Aggregate a main capture and its peers into one replication timeline
    Analyze(AnalyzeArgs),
    /// List the captures found in a catalog directory
    List {
        /// Directory holding *.ndjson captures
        catalog: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct AnalyzeArgs {
    /// Directory holding *.ndjson captures
    pub catalog: PathBuf,

    /// Id of the capture whose timeline is the global axis
    #[arg(long = "main", value_name = "ID")]
    pub main: u32,

    /// TOML analysis configuration
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Aggregate peer captures (overrides the configuration file)
    #[arg(long = "drain-peers")]
    pub drain_peers: bool,

    /// Capture discovery tolerance in seconds (overrides the configuration file)
    #[arg(long = "tolerance", value_name = "SECS")]
    pub tolerance: Option<f64>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}
