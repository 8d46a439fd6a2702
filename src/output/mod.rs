//! Output formatters for similarity results.
//!
//! - [`text`]: one line per pair, written as results arrive
//! - [`json`]: a single report for automation
//! - [`csv`]: one row per pair for spreadsheets
//!
//! Each format also has a writer for the whole-file sum report.
//!
//! # Example
//!
//! ```no_run
//! use chunksim::output::text::TextOutput;
//! use chunksim::pipeline::{Pipeline, PipelineConfig};
//! use std::path::PathBuf;
//!
//! let paths = vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")];
//! let mut out = TextOutput::new(std::io::stdout().lock());
//! Pipeline::new(PipelineConfig::default())
//!     .run_with(&paths, |result| {
//!         let _ = out.write_result(&result);
//!     })
//!     .unwrap();
//! ```

pub mod csv;
pub mod json;
pub mod text;

use thiserror::Error;

pub use self::csv::{CsvOutput, CsvSums};
pub use self::json::{JsonOutput, JsonSums};
pub use self::text::{write_sums, TextOutput};

/// Errors that can occur while writing results.
#[derive(Debug, Error)]
pub enum OutputError {
    /// I/O error during writing.
    #[error("I/O error while writing output: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization error.
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
}
