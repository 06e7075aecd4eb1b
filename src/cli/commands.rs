//! CLI argument definitions using clap.
//!
//! Flags override the matching config file values:
//! - format: output serialization
//! - interval-ms: pacing between fed records
//! - timeout-secs: overall run deadline

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use streamprint::sink::OutputFormat;

use crate::config::Config;

/// Streamprint - print a transactional record stream as JSON lines
#[derive(Parser, Debug)]
#[command(name = "streamprint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Newline-delimited JSON input; reads stdin when omitted or "-"
    pub input: Option<PathBuf>,

    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Output format (json, yaml)
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Delay between fed records in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Input path, or None for stdin.
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|p| p.as_os_str() != "-")
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Apply flag overrides on top of loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.feed.interval_ms = interval_ms;
        }
    }
}
