//! Plain text output, one line per pair:
//!
//! ```text
//! Similarity between a.bin and b.bin: 100.000000%
//! ```
//!
//! The whole-file sum report prints the total and then every sum shared by
//! more than one file:
//!
//! ```text
//! Total: 43
//! Sum 20: [a.bin, b.bin]
//! ```

use std::io::Write;

use super::OutputError;
use crate::similarity::SimilarityResult;
use crate::sums::SumReport;

/// Line-per-result writer.
pub struct TextOutput<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> TextOutput<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write one result line.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn write_result(&mut self, result: &SimilarityResult) -> Result<(), OutputError> {
        writeln!(self.writer, "{result}")?;
        self.written += 1;
        Ok(())
    }

    /// Number of lines written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn finish(mut self) -> Result<W, OutputError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write a whole-file sum report.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn write_sums<W: Write>(mut writer: W, report: &SumReport) -> Result<(), OutputError> {
    writeln!(writer, "Total: {}", report.total)?;
    for (sum, paths) in report.shared() {
        let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        writeln!(writer, "Sum {sum}: [{}]", names.join(", "))?;
    }
    writer.flush()?;
    Ok(())
}
