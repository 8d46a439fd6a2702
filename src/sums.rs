//! Whole-file byte sums.
//!
//! Every file is reduced to the sum of all of its byte values, the sums are
//! totalled, and files that share a sum are grouped. A file's sum is the
//! total of its chunk checksums, so this runs on the fingerprint stage
//! unchanged: same pool, loader, cancellation and failure reporting.
//!
//! # Example
//!
//! ```no_run
//! use chunksim::fingerprint::FingerprintConfig;
//! use chunksim::sums::sum_all;
//! use std::path::PathBuf;
//!
//! let paths = vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")];
//! let report = sum_all(&paths, &FingerprintConfig::default());
//!
//! println!("Total: {}", report.total);
//! for (sum, files) in report.shared() {
//!     println!("Sum {sum}: {} files", files.len());
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::fingerprint::stage::{fingerprint_all, FingerprintConfig, FingerprintStats, FingerprintTable};
use crate::fingerprint::LoadError;

/// Byte sum of one loaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSum {
    pub path: PathBuf,
    pub sum: u64,
}

/// Everything [`sum_all`] produced.
#[derive(Debug, Default)]
pub struct SumReport {
    /// Sum over every loaded file
    pub total: u64,
    /// One entry per loaded file, ordered by path
    pub sums: Vec<FileSum>,
    /// Loaded files keyed by their sum, paths sorted
    pub groups: BTreeMap<u64, Vec<PathBuf>>,
    /// Load failures, in input order
    pub failures: Vec<LoadError>,
    pub stats: FingerprintStats,
}

impl SumReport {
    /// Build sums, total and groups from a fingerprint table.
    #[must_use]
    pub fn from_table(table: &FingerprintTable) -> Self {
        let mut sums: Vec<FileSum> = table
            .iter()
            .map(|(path, fp)| FileSum {
                path: path.clone(),
                sum: fp.total(),
            })
            .collect();
        sums.sort_by(|a, b| a.path.cmp(&b.path));

        let mut groups: BTreeMap<u64, Vec<PathBuf>> = BTreeMap::new();
        for entry in &sums {
            groups.entry(entry.sum).or_default().push(entry.path.clone());
        }

        Self {
            total: sums.iter().map(|entry| entry.sum).sum(),
            sums,
            groups,
            ..Default::default()
        }
    }

    /// Groups holding two or more files, in ascending sum order.
    pub fn shared(&self) -> impl Iterator<Item = (u64, &[PathBuf])> {
        self.groups
            .iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|(sum, paths)| (*sum, paths.as_slice()))
    }

    /// True if some paths could not be loaded.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Sum every path in parallel and group equal sums.
#[must_use]
pub fn sum_all(paths: &[PathBuf], config: &FingerprintConfig) -> SumReport {
    let outcome = fingerprint_all(paths, config);
    let mut report = SumReport::from_table(&outcome.table);
    report.failures = outcome.failures;
    report.stats = outcome.stats;

    log::info!(
        "Summed {} files: total {}, {} shared sum(s)",
        report.sums.len(),
        report.total,
        report.shared().count()
    );
    report
}
