//! Parallel fingerprinting of a set of paths.
//!
//! Every path is one independent unit of work: load, reduce, drop the
//! content. Units run on a rayon pool bounded by
//! [`FingerprintConfig::io_threads`]. Each worker folds its units into a
//! private [`FingerprintTable`], and the partial tables are merged pairwise
//! as workers finish, so no lock guards the table.
//!
//! # Example
//!
//! ```no_run
//! use chunksim::fingerprint::{fingerprint_all, FingerprintConfig};
//! use std::path::PathBuf;
//!
//! let paths = vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")];
//! let outcome = fingerprint_all(&paths, &FingerprintConfig::default());
//!
//! println!(
//!     "{} fingerprinted, {} failed",
//!     outcome.table.len(),
//!     outcome.failures.len()
//! );
//! ```

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::{reduce, Fingerprint, Loader, LoadError, DEFAULT_CHUNK_SIZE};
use crate::pool::run_in_pool;
use crate::progress::{ProgressCallback, PHASE_FINGERPRINT};
use crate::signal::CancelToken;

/// Configuration for the fingerprint stage.
#[derive(Clone)]
pub struct FingerprintConfig {
    /// Bytes per chunk.
    pub chunk_size: NonZeroUsize,
    /// Number of I/O threads. `0` uses the global rayon pool.
    pub io_threads: usize,
    /// Loader used for every path.
    pub loader: Loader,
    /// Cancellation checked before each unit starts.
    pub cancel: CancelToken,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FingerprintConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintConfig")
            .field("chunk_size", &self.chunk_size)
            .field("io_threads", &self.io_threads)
            .field("loader", &self.loader)
            .field("cancel", &self.cancel)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_threads: 4,
            loader: Loader::default(),
            cancel: CancelToken::new(),
            progress_callback: None,
        }
    }
}

impl FingerprintConfig {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the I/O thread count (`0` = global pool).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Mapping from path to fingerprint.
///
/// A path is present iff its load and reduction succeeded. Entries are
/// write-once: a second insert for the same path is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintTable {
    entries: HashMap<PathBuf, Fingerprint>,
}

impl FingerprintTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `fingerprint` for `path`.
    ///
    /// Returns `false` and leaves the existing entry untouched if `path` is
    /// already present.
    pub fn insert(&mut self, path: PathBuf, fingerprint: Fingerprint) -> bool {
        match self.entries.entry(path) {
            std::collections::hash_map::Entry::Occupied(existing) => {
                log::debug!(
                    "Ignoring second fingerprint for {}",
                    existing.key().display()
                );
                false
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(fingerprint);
                true
            }
        }
    }

    /// Merge another table into this one, keeping existing entries.
    ///
    /// Returns the number of entries added.
    pub fn merge(&mut self, other: FingerprintTable) -> usize {
        let mut added = 0;
        for (path, fp) in other.entries {
            if self.insert(path, fp) {
                added += 1;
            }
        }
        added
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Fingerprint> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Fingerprint)> {
        self.entries.iter()
    }
}

impl FromIterator<(PathBuf, Fingerprint)> for FingerprintTable {
    fn from_iter<I: IntoIterator<Item = (PathBuf, Fingerprint)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (path, fp) in iter {
            table.insert(path, fp);
        }
        table
    }
}

/// Statistics from the fingerprint stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintStats {
    /// Distinct paths submitted
    pub input_files: usize,
    /// Paths that made it into the table
    pub fingerprinted_files: usize,
    /// Paths that failed to load
    pub failed_files: usize,
    /// Paths never started because the run was cancelled
    pub skipped_files: usize,
    /// Bytes read across all successful loads
    pub bytes_read: u64,
    /// Chunks across all fingerprints
    pub total_chunks: usize,
    /// Whether cancellation cut the stage short
    pub interrupted: bool,
    /// Wall time of the stage
    pub duration: Duration,
}

/// Result of one successful fingerprint unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprinted {
    pub fingerprint: Fingerprint,
    /// Size of the content that was reduced
    pub bytes: u64,
}

/// Everything [`fingerprint_all`] produced.
#[derive(Debug, Default)]
pub struct FingerprintOutcome {
    pub table: FingerprintTable,
    /// Load failures, in input order
    pub failures: Vec<LoadError>,
    pub stats: FingerprintStats,
}

/// Drop repeated paths, keeping the first occurrence and the input order.
#[must_use]
pub fn unique_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::with_capacity(paths.len());
    let mut unique = Vec::with_capacity(paths.len());
    for path in paths {
        if seen.insert(path.as_path()) {
            unique.push(path.clone());
        }
    }
    unique
}

/// Load and reduce a single path.
///
/// The content is dropped before returning; only the fingerprint survives.
///
/// # Errors
///
/// Returns [`LoadError::Cancelled`] if the token tripped before the unit
/// started, otherwise whatever the loader reported.
pub fn fingerprint_one(path: &Path, config: &FingerprintConfig) -> Result<Fingerprinted, LoadError> {
    if config.cancel.is_cancelled() {
        return Err(LoadError::Cancelled(path.to_path_buf()));
    }

    let content = config.loader.load(path)?;
    let fingerprint = reduce(&content, config.chunk_size);
    log::trace!(
        "Fingerprinted {}: {} bytes, {} chunks",
        path.display(),
        content.len(),
        fingerprint.len()
    );

    Ok(Fingerprinted {
        fingerprint,
        bytes: content.len() as u64,
    })
}

/// What one worker accumulated before the merge.
#[derive(Default)]
struct PartialOutcome {
    table: FingerprintTable,
    /// Failures tagged with their input position
    failures: Vec<(usize, LoadError)>,
    bytes_read: u64,
    total_chunks: usize,
    skipped_files: usize,
}

impl PartialOutcome {
    fn record(mut self, idx: usize, path: &Path, result: Result<Fingerprinted, LoadError>) -> Self {
        match result {
            Ok(unit) => {
                self.bytes_read += unit.bytes;
                self.total_chunks += unit.fingerprint.len();
                self.table.insert(path.to_path_buf(), unit.fingerprint);
            }
            Err(LoadError::Cancelled(_)) => self.skipped_files += 1,
            Err(e) => self.failures.push((idx, e)),
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.table.merge(other.table);
        self.failures.extend(other.failures);
        self.bytes_read += other.bytes_read;
        self.total_chunks += other.total_chunks;
        self.skipped_files += other.skipped_files;
        self
    }
}

/// Log a unit failure. Cancellations are routine and only traced.
pub(crate) fn report_failure(err: &LoadError) {
    match err {
        LoadError::Cancelled(path) => log::trace!("Skipped {} after cancellation", path.display()),
        other => log::warn!("Skipping {}: {}", other.path().display(), other),
    }
}

/// Fingerprint every path in parallel.
///
/// Returns only after every unit has either inserted its entry or recorded
/// its failure. Repeated paths are fingerprinted once.
#[must_use]
pub fn fingerprint_all(paths: &[PathBuf], config: &FingerprintConfig) -> FingerprintOutcome {
    let start = Instant::now();
    let paths = unique_paths(paths);
    let mut stats = FingerprintStats {
        input_files: paths.len(),
        ..Default::default()
    };

    if paths.is_empty() {
        log::debug!("Fingerprint stage: no paths to process");
        return FingerprintOutcome {
            stats,
            ..Default::default()
        };
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start(PHASE_FINGERPRINT, paths.len());
    }

    log::info!(
        "Fingerprinting {} files (chunk size {} bytes)",
        paths.len(),
        config.chunk_size
    );

    let merged = run_in_pool(config.io_threads, "fingerprint", || {
        paths
            .par_iter()
            .enumerate()
            .fold(PartialOutcome::default, |acc, (idx, path)| {
                let result = fingerprint_one(path, config);
                if let Err(ref e) = result {
                    report_failure(e);
                }
                if let Some(ref callback) = config.progress_callback {
                    callback.on_progress(PHASE_FINGERPRINT, path.to_string_lossy().as_ref());
                }
                acc.record(idx, path, result)
            })
            .reduce(PartialOutcome::default, PartialOutcome::merge)
    });

    // Barrier: every unit has returned and every partial table is merged.
    let PartialOutcome {
        table,
        mut failures,
        bytes_read,
        total_chunks,
        skipped_files,
    } = merged;
    failures.sort_by_key(|(idx, _)| *idx);
    let failures: Vec<LoadError> = failures.into_iter().map(|(_, e)| e).collect();

    stats.fingerprinted_files = table.len();
    stats.failed_files = failures.len();
    stats.bytes_read = bytes_read;
    stats.total_chunks = total_chunks;
    stats.skipped_files = skipped_files;
    stats.interrupted = stats.skipped_files > 0;
    stats.duration = start.elapsed();

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end(PHASE_FINGERPRINT);
    }

    if stats.interrupted {
        log::info!(
            "Fingerprint stage interrupted: {} files skipped",
            stats.skipped_files
        );
    }
    log::info!(
        "Fingerprint stage complete: {} of {} files fingerprinted, {} failed ({:?})",
        stats.fingerprinted_files,
        stats.input_files,
        stats.failed_files,
        stats.duration
    );

    FingerprintOutcome {
        table,
        failures,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_fingerprint_config_default() {
        let config = FingerprintConfig::default();
        assert_eq!(config.chunk_size.get(), 1024);
        assert_eq!(config.io_threads, 4);
        assert!(config.progress_callback.is_none());
    }

    #[test]
    fn test_fingerprint_config_builder() {
        let config = FingerprintConfig::default()
            .with_chunk_size(size(16))
            .with_io_threads(2);
        assert_eq!(config.chunk_size.get(), 16);
        assert_eq!(config.io_threads, 2);
    }

    #[test]
    fn test_table_write_once() {
        let mut table = FingerprintTable::new();
        assert!(table.insert(PathBuf::from("a"), Fingerprint::new(vec![1])));
        assert!(!table.insert(PathBuf::from("a"), Fingerprint::new(vec![2])));
        assert_eq!(table.get(Path::new("a")).unwrap().as_slice(), &[1]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_merge_keeps_existing() {
        let mut left: FingerprintTable = [
            (PathBuf::from("a"), Fingerprint::new(vec![1])),
            (PathBuf::from("b"), Fingerprint::new(vec![2])),
        ]
        .into_iter()
        .collect();
        let right: FingerprintTable = [
            (PathBuf::from("b"), Fingerprint::new(vec![9])),
            (PathBuf::from("c"), Fingerprint::new(vec![3])),
        ]
        .into_iter()
        .collect();

        assert_eq!(left.merge(right), 1);
        assert_eq!(left.len(), 3);
        assert_eq!(left.get(Path::new("b")).unwrap().as_slice(), &[2]);
        assert!(left.contains(Path::new("c")));
    }

    #[test]
    fn test_unique_paths_keeps_first_occurrence() {
        let paths = vec![
            PathBuf::from("b"),
            PathBuf::from("a"),
            PathBuf::from("b"),
            PathBuf::from("c"),
        ];
        assert_eq!(
            unique_paths(&paths),
            vec![PathBuf::from("b"), PathBuf::from("a"), PathBuf::from("c")]
        );
    }

    #[test]
    fn test_fingerprint_all_empty_input() {
        let outcome = fingerprint_all(&[], &FingerprintConfig::default());
        assert!(outcome.table.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.stats.input_files, 0);
    }

    #[test]
    fn test_fingerprint_all_success() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", &[0u8; 2048]);
        let b = write_file(&dir, "b.bin", &[5u8; 1024]);

        let outcome = fingerprint_all(&[a.clone(), b.clone()], &FingerprintConfig::default());

        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.table.get(&a).unwrap().as_slice(), &[0, 0]);
        assert_eq!(outcome.table.get(&b).unwrap().as_slice(), &[5120]);
        assert_eq!(outcome.stats.fingerprinted_files, 2);
        assert_eq!(outcome.stats.bytes_read, 3072);
        assert_eq!(outcome.stats.total_chunks, 3);
        assert!(!outcome.stats.interrupted);
    }

    #[test]
    fn test_fingerprint_all_handles_missing_file() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"content");
        let missing = dir.path().join("missing.bin");

        let outcome = fingerprint_all(&[a.clone(), missing.clone()], &FingerprintConfig::default());

        assert!(outcome.table.contains(&a));
        assert!(!outcome.table.contains(&missing));
        assert_eq!(outcome.stats.failed_files, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(outcome.failures[0], LoadError::NotFound(_)));
    }

    #[test]
    fn test_fingerprint_all_failures_in_input_order() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..20)
            .map(|i| dir.path().join(format!("missing_{i}.bin")))
            .collect();

        let outcome = fingerprint_all(&paths, &FingerprintConfig::default().with_io_threads(8));

        let reported: Vec<&Path> = outcome.failures.iter().map(LoadError::path).collect();
        let expected: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
        assert_eq!(reported, expected);
    }

    #[test]
    fn test_fingerprint_all_merges_worker_tables() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..64)
            .map(|i| {
                if i % 5 == 0 {
                    dir.path().join(format!("missing_{i}.bin"))
                } else {
                    write_file(&dir, &format!("f{i}.bin"), &[i as u8; 100])
                }
            })
            .collect();

        let outcome = fingerprint_all(&paths, &FingerprintConfig::default().with_io_threads(8));

        assert_eq!(outcome.table.len(), 51);
        assert_eq!(outcome.stats.fingerprinted_files, 51);
        assert_eq!(outcome.stats.failed_files, 13);
        assert_eq!(outcome.stats.bytes_read, 5100);
        for (i, path) in paths.iter().enumerate().filter(|(i, _)| i % 5 != 0) {
            assert_eq!(outcome.table.get(path).unwrap().as_slice(), &[100 * i as u64]);
        }
        let reported: Vec<&Path> = outcome.failures.iter().map(LoadError::path).collect();
        let expected: Vec<&Path> = paths.iter().step_by(5).map(PathBuf::as_path).collect();
        assert_eq!(reported, expected);
    }

    #[test]
    fn test_fingerprint_all_duplicate_paths_loaded_once() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"abc");

        let outcome = fingerprint_all(&[a.clone(), a.clone()], &FingerprintConfig::default());

        assert_eq!(outcome.stats.input_files, 1);
        assert_eq!(outcome.table.len(), 1);
    }

    #[test]
    fn test_fingerprint_all_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"abc");
        let b = write_file(&dir, "b.bin", b"def");

        let cancel = CancelToken::new();
        cancel.cancel();
        let config = FingerprintConfig::default().with_cancel_token(cancel);
        let outcome = fingerprint_all(&[a, b], &config);

        assert!(outcome.table.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.stats.skipped_files, 2);
        assert!(outcome.stats.interrupted);
    }

    struct CountingCallback {
        started: AtomicUsize,
        progressed: AtomicUsize,
        ended: AtomicUsize,
    }

    impl ProgressCallback for CountingCallback {
        fn on_phase_start(&self, _phase: &str, total: usize) {
            self.started.store(total, Ordering::SeqCst);
        }

        fn on_progress(&self, _phase: &str, _label: &str) {
            self.progressed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_phase_end(&self, _phase: &str) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fingerprint_all_progress_callback() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| write_file(&dir, &format!("f{i}.bin"), &[i as u8; 10]))
            .collect();

        let callback = Arc::new(CountingCallback {
            started: AtomicUsize::new(0),
            progressed: AtomicUsize::new(0),
            ended: AtomicUsize::new(0),
        });
        let config = FingerprintConfig::default().with_progress_callback(callback.clone());
        let _ = fingerprint_all(&paths, &config);

        assert_eq!(callback.started.load(Ordering::SeqCst), 5);
        assert_eq!(callback.progressed.load(Ordering::SeqCst), 5);
        assert_eq!(callback.ended.load(Ordering::SeqCst), 1);
    }
}
