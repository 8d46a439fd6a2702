//! JSON report for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "generated_at": "2024-01-01T12:00:00Z",
//!   "chunk_size": 1024,
//!   "mode": "barrier",
//!   "results": [
//!     { "path_a": "a.bin", "path_b": "b.bin", "similarity": 1.0, "percent": "100.000000" }
//!   ],
//!   "failures": [
//!     { "path": "missing.bin", "error": "File not found: missing.bin" }
//!   ],
//!   "summary": {
//!     "input_files": 3,
//!     "fingerprinted_files": 2,
//!     "failed_files": 1,
//!     "bytes_read": 2048,
//!     "pairs_compared": 1,
//!     "fingerprint_duration_ms": 3,
//!     "compare_duration_ms": 1,
//!     "total_duration_ms": 4,
//!     "exit_code": 3,
//!     "exit_code_name": "CS003"
//!   }
//! }
//! ```

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::OutputError;
use crate::error::ExitCode;
use crate::fingerprint::LoadError;
use crate::pipeline::{Mode, PipelineReport};
use crate::similarity::SimilarityResult;
use crate::sums::SumReport;

/// One compared pair.
#[derive(Debug, Clone, Serialize)]
pub struct JsonResult {
    pub path_a: String,
    pub path_b: String,
    /// Ratio in `[0.0, 1.0]`
    pub similarity: f64,
    /// Percentage with six decimals, as printed by the text output
    pub percent: String,
}

impl From<&SimilarityResult> for JsonResult {
    fn from(result: &SimilarityResult) -> Self {
        Self {
            path_a: result.path_a.to_string_lossy().into_owned(),
            path_b: result.path_b.to_string_lossy().into_owned(),
            similarity: result.ratio,
            percent: format!("{:.6}", result.percent()),
        }
    }
}

/// A path that could not be fingerprinted.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFailure {
    pub path: String,
    pub error: String,
}

impl From<&LoadError> for JsonFailure {
    fn from(err: &LoadError) -> Self {
        Self {
            path: err.path().to_string_lossy().into_owned(),
            error: err.to_string(),
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Distinct paths submitted
    pub input_files: usize,
    /// Paths that were fingerprinted
    pub fingerprinted_files: usize,
    /// Paths that failed to load
    pub failed_files: usize,
    /// Bytes read across all loaded files
    pub bytes_read: u64,
    /// Chunks across all fingerprints
    pub total_chunks: usize,
    /// Pairs compared
    pub pairs_compared: usize,
    pub fingerprint_duration_ms: u64,
    pub compare_duration_ms: u64,
    pub total_duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "CS000")
    pub exit_code_name: String,
}

impl JsonSummary {
    #[must_use]
    pub fn from_report(report: &PipelineReport, exit_code: ExitCode) -> Self {
        Self {
            input_files: report.fingerprint.input_files,
            fingerprinted_files: report.fingerprint.fingerprinted_files,
            failed_files: report.fingerprint.failed_files,
            bytes_read: report.fingerprint.bytes_read,
            total_chunks: report.fingerprint.total_chunks,
            pairs_compared: report.compare.pairs_compared,
            fingerprint_duration_ms: report.fingerprint.duration.as_millis() as u64,
            compare_duration_ms: report.compare.duration.as_millis() as u64,
            total_duration_ms: report.duration.as_millis() as u64,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    pub generated_at: DateTime<Utc>,
    pub chunk_size: usize,
    pub mode: Mode,
    pub results: Vec<JsonResult>,
    pub failures: Vec<JsonFailure>,
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the report for a finished run.
    #[must_use]
    pub fn new(results: &[SimilarityResult], report: &PipelineReport, exit_code: ExitCode) -> Self {
        Self {
            generated_at: Utc::now(),
            chunk_size: report.chunk_size.get(),
            mode: report.mode,
            results: results.iter().map(JsonResult::from).collect(),
            failures: report.failures.iter().map(JsonFailure::from).collect(),
            summary: JsonSummary::from_report(report, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), OutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// One file's whole-file sum.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFileSum {
    pub path: String,
    pub sum: u64,
}

/// Files sharing one sum.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSumGroup {
    pub sum: u64,
    pub paths: Vec<String>,
}

/// JSON report of a whole-file sum run.
///
/// ```json
/// {
///   "generated_at": "2024-01-01T12:00:00Z",
///   "total": 43,
///   "files": [ { "path": "a.bin", "sum": 20 } ],
///   "groups": [ { "sum": 20, "paths": ["a.bin", "b.bin"] } ],
///   "failures": [],
///   "exit_code": 0,
///   "exit_code_name": "CS000"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct JsonSums {
    pub generated_at: DateTime<Utc>,
    pub total: u64,
    pub files: Vec<JsonFileSum>,
    /// Sums shared by two or more files
    pub groups: Vec<JsonSumGroup>,
    pub failures: Vec<JsonFailure>,
    pub exit_code: i32,
    pub exit_code_name: String,
}

impl JsonSums {
    #[must_use]
    pub fn new(report: &SumReport, exit_code: ExitCode) -> Self {
        let lossy = |p: &std::path::Path| p.to_string_lossy().into_owned();
        Self {
            generated_at: Utc::now(),
            total: report.total,
            files: report
                .sums
                .iter()
                .map(|entry| JsonFileSum {
                    path: lossy(&entry.path),
                    sum: entry.sum,
                })
                .collect(),
            groups: report
                .shared()
                .map(|(sum, paths)| JsonSumGroup {
                    sum,
                    paths: paths.iter().map(|p| lossy(p)).collect(),
                })
                .collect(),
            failures: report.failures.iter().map(JsonFailure::from).collect(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Write pretty-printed JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), OutputError> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::stage::{FingerprintStats, FingerprintTable};
    use crate::fingerprint::DEFAULT_CHUNK_SIZE;
    use crate::similarity::CompareStats;
    use std::path::PathBuf;
    use std::time::Duration;

    fn create_test_report() -> PipelineReport {
        PipelineReport {
            mode: Mode::Streaming,
            chunk_size: DEFAULT_CHUNK_SIZE,
            table: FingerprintTable::new(),
            failures: vec![LoadError::NotFound(PathBuf::from("missing.bin"))],
            fingerprint: FingerprintStats {
                input_files: 3,
                fingerprinted_files: 2,
                failed_files: 1,
                bytes_read: 2048,
                total_chunks: 2,
                duration: Duration::from_millis(12),
                ..Default::default()
            },
            compare: CompareStats {
                pairs_total: 1,
                pairs_compared: 1,
                duration: Duration::from_millis(3),
                ..Default::default()
            },
            duration: Duration::from_millis(15),
        }
    }

    fn create_test_results() -> Vec<SimilarityResult> {
        vec![SimilarityResult {
            path_a: PathBuf::from("a.bin"),
            path_b: PathBuf::from("c.bin"),
            index_a: 0,
            index_b: 2,
            ratio: 0.5,
        }]
    }

    #[test]
    fn test_json_output_structure() {
        let output = JsonOutput::new(
            &create_test_results(),
            &create_test_report(),
            ExitCode::PartialSuccess,
        );

        assert_eq!(output.chunk_size, 1024);
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].percent, "50.000000");
        assert_eq!(output.failures[0].path, "missing.bin");
        assert_eq!(output.summary.exit_code, 3);
        assert_eq!(output.summary.exit_code_name, "CS003");
        assert_eq!(output.summary.total_duration_ms, 15);
    }

    #[test]
    fn test_json_is_valid() {
        let output = JsonOutput::new(&create_test_results(), &create_test_report(), ExitCode::Success);
        let json = output.to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "streaming");
        assert_eq!(value["results"][0]["path_a"], "a.bin");
        assert_eq!(value["results"][0]["similarity"], 0.5);
        assert!(value["generated_at"].is_string());
        assert!(value["summary"]["pairs_compared"].is_number());
    }

    #[test]
    fn test_json_sums() {
        let table: FingerprintTable = [
            (PathBuf::from("a.bin"), crate::fingerprint::Fingerprint::new(vec![20])),
            (PathBuf::from("b.bin"), crate::fingerprint::Fingerprint::new(vec![5, 15])),
            (PathBuf::from("c.bin"), crate::fingerprint::Fingerprint::new(vec![3])),
        ]
        .into_iter()
        .collect();
        let mut report = SumReport::from_table(&table);
        report.failures = vec![LoadError::NotFound(PathBuf::from("missing.bin"))];

        let mut buffer = Vec::new();
        JsonSums::new(&report, ExitCode::PartialSuccess)
            .write_to(&mut buffer)
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["total"], 43);
        assert_eq!(value["files"].as_array().unwrap().len(), 3);
        assert_eq!(value["groups"].as_array().unwrap().len(), 1);
        assert_eq!(value["groups"][0]["sum"], 20);
        assert_eq!(value["groups"][0]["paths"][1], "b.bin");
        assert_eq!(value["failures"][0]["path"], "missing.bin");
        assert_eq!(value["exit_code_name"], "CS003");
    }

    #[test]
    fn test_write_to_pretty() {
        let output = JsonOutput::new(&[], &create_test_report(), ExitCode::Success);
        let mut buffer = Vec::new();
        output.write_to(&mut buffer, true).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains('\n'));
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\"results\": []"));
    }
}
