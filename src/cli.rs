//! Command-line interface definitions.
//!
//! Every pipeline flag is optional; unset flags fall back to the layered
//! configuration (config file, then `CHUNKSIM_*` environment variables,
//! then built-in defaults).
//!
//! # Example
//!
//! ```bash
//! # Compare three files with the default 1 KiB chunks
//! chunksim a.bin b.bin c.bin
//!
//! # Larger chunks, streaming pipeline, JSON report
//! chunksim --chunk-size 4KiB --mode streaming --output json *.bin
//!
//! # Serial comparison, results as they finish
//! chunksim --serial --order completion a.bin b.bin
//!
//! # Whole-file sums and groups of files with equal sums
//! chunksim --sums *.bin
//!
//! # Persist the effective settings for later runs
//! chunksim --chunk-size 4KiB --save-config ~/.config/chunksim/config.toml a.bin b.bin
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{Config, ConfigError};
use crate::pipeline::Mode;
use crate::similarity::OrderPolicy;

/// Pairwise file similarity from fixed-size chunk checksums.
///
/// Every file is split into chunks, each chunk is summed, and every pair of
/// files is scored by the fraction of positions whose sums agree.
#[derive(Debug, Parser)]
#[command(name = "chunksim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Files to compare (at least two distinct paths, or one with --sums)
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Bytes per chunk (e.g., 1024, 4KiB, 1MB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB
    #[arg(short = 'c', long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Number of threads loading and reducing files
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Number of threads comparing pairs (0 = one per core, barrier mode only)
    #[arg(long, value_name = "N", conflicts_with = "serial")]
    pub compare_threads: Option<usize>,

    /// Compare pairs on a single thread (barrier mode only)
    #[arg(long)]
    pub serial: bool,

    /// Report whole-file byte sums and files sharing a sum instead of
    /// pairwise similarity
    #[arg(long, conflicts_with_all = ["mode", "order", "serial", "compare_threads"])]
    pub sums: bool,

    /// How fingerprinting and comparison are wired together
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Order of the emitted results
    #[arg(long, value_enum)]
    pub order: Option<OrderPolicy>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Memory-map files at least this large (0 disables)
    ///
    /// Use 0 when inputs may be truncated during the run: a mapped file
    /// that shrinks kills the process with SIGBUS.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub mmap_threshold: Option<u64>,

    /// Abandon the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Configuration file to use instead of the platform default
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to PATH before running
    #[arg(long, value_name = "PATH")]
    pub save_config: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Print errors as JSON objects on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and results
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Apply the flags that were given on top of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ChunkSizeTooLarge`] if the chunk size does not
    /// fit the platform's `usize`.
    pub fn apply_to(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(size) = self.chunk_size {
            config.chunk_size =
                usize::try_from(size).map_err(|_| ConfigError::ChunkSizeTooLarge(size))?;
        }
        if let Some(threads) = self.io_threads {
            config.io_threads = threads;
        }
        if self.serial {
            config.compare_threads = 1;
        } else if let Some(threads) = self.compare_threads {
            config.compare_threads = threads;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(order) = self.order {
            config.order = order;
        }
        if let Some(threshold) = self.mmap_threshold {
            config.mmap_threshold = threshold;
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Whether progress bars should be drawn.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress && self.output == OutputFormat::Text
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per pair
    Text,
    /// A single JSON report
    Json,
    /// One CSV row per pair
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB (case-insensitive).
/// Numbers without suffix are bytes.
///
/// # Examples
///
/// ```
/// use chunksim::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("4KiB").unwrap(), 4096);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number or
/// an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
