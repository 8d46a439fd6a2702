//! CSV output, one row per compared pair.
//!
//! # Columns
//!
//! - `path_a`: first path, in input order
//! - `path_b`: second path
//! - `similarity`: percentage with six decimals
//!
//! Whole-file sum reports use [`CsvSums`] with columns `path,sum`.

use std::io;

use serde::Serialize;

use super::OutputError;
use crate::similarity::SimilarityResult;
use crate::sums::FileSum;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    path_a: std::borrow::Cow<'a, str>,
    path_b: std::borrow::Cow<'a, str>,
    similarity: String,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    results: &'a [SimilarityResult],
}

impl<'a> CsvOutput<'a> {
    #[must_use]
    pub fn new(results: &'a [SimilarityResult]) -> Self {
        Self { results }
    }

    /// Write a header row and one row per result.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), OutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        if self.results.is_empty() {
            csv_writer.write_record(["path_a", "path_b", "similarity"])?;
        }

        for result in self.results {
            csv_writer.serialize(CsvRow {
                path_a: result.path_a.to_string_lossy(),
                path_b: result.path_b.to_string_lossy(),
                similarity: format!("{:.6}", result.percent()),
            })?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string(&self) -> Result<String, OutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[derive(Debug, Serialize)]
struct CsvSumRow<'a> {
    path: std::borrow::Cow<'a, str>,
    sum: u64,
}

/// CSV formatter for whole-file sums, one row per file.
pub struct CsvSums<'a> {
    sums: &'a [FileSum],
}

impl<'a> CsvSums<'a> {
    #[must_use]
    pub fn new(sums: &'a [FileSum]) -> Self {
        Self { sums }
    }

    /// Write a header row and one row per file.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), OutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        if self.sums.is_empty() {
            csv_writer.write_record(["path", "sum"])?;
        }
        for entry in self.sums {
            csv_writer.serialize(CsvSumRow {
                path: entry.path.to_string_lossy(),
                sum: entry.sum,
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
