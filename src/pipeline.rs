//! Pipeline driver wiring fingerprinting to pairwise comparison.
//!
//! Two variants are available:
//!
//! - [`Mode::Barrier`]: fingerprint every path, wait, then compare every
//!   pair over the frozen table.
//! - [`Mode::Streaming`]: compare a pair as soon as both of its
//!   fingerprints exist. A coordinator receives fingerprint completions
//!   over a channel and, when path `j` completes, schedules `(k, j)` for
//!   every path `k` that completed before it. Each pair is scheduled once,
//!   by whichever of its two paths finishes last.
//!
//! # Example
//!
//! ```no_run
//! use chunksim::pipeline::{Pipeline, PipelineConfig};
//! use std::path::PathBuf;
//!
//! let paths = vec![PathBuf::from("a.bin"), PathBuf::from("b.bin")];
//! let run = Pipeline::new(PipelineConfig::default()).run(&paths).unwrap();
//! for result in &run.results {
//!     println!("{result}");
//! }
//! ```

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::fingerprint::loader::{Loader, DEFAULT_MMAP_THRESHOLD};
use crate::fingerprint::stage::{
    fingerprint_all, fingerprint_one, report_failure, unique_paths, FingerprintConfig,
    FingerprintOutcome, FingerprintStats, FingerprintTable, Fingerprinted,
};
use crate::fingerprint::{Fingerprint, LoadError, DEFAULT_CHUNK_SIZE};
use crate::pool::build_pool;
use crate::progress::{ProgressCallback, PHASE_COMPARE, PHASE_FINGERPRINT};
use crate::signal::{CancelReason, CancelToken};
use crate::sums::{sum_all, SumReport};
use crate::similarity::pairs::{PairCounters, PairUnit};
use crate::similarity::{
    compare_all, CompareConfig, CompareStats, OrderPolicy, ResultStream, SimilarityResult,
};

/// How the two stages are wired together.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fingerprint everything, then compare everything.
    #[default]
    Barrier,
    /// Compare pairs as soon as both fingerprints are ready.
    Streaming,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Barrier => write!(f, "barrier"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run was rejected before any stage started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Ctrl+C stopped the run.
    #[error("Interrupted after {results} results")]
    Interrupted {
        /// Results emitted before the stop
        results: usize,
    },

    /// The global timeout expired.
    #[error("Timed out after {results} results")]
    TimedOut {
        /// Results emitted before the stop
        results: usize,
    },
}

/// Validated pipeline settings.
#[derive(Clone)]
pub struct PipelineConfig {
    pub chunk_size: NonZeroUsize,
    /// Threads for loading and reducing. In streaming mode the same pool
    /// also runs the comparisons.
    pub io_threads: usize,
    /// Threads for comparing in barrier mode (`0` = global pool, `1` = serial).
    pub compare_threads: usize,
    pub mode: Mode,
    pub order: OrderPolicy,
    pub mmap_threshold: u64,
    /// Abandon the run after this long.
    pub timeout: Option<Duration>,
    /// Externally controlled cancellation (Ctrl+C).
    pub cancel: CancelToken,
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("chunk_size", &self.chunk_size)
            .field("io_threads", &self.io_threads)
            .field("compare_threads", &self.compare_threads)
            .field("mode", &self.mode)
            .field("order", &self.order)
            .field("mmap_threshold", &self.mmap_threshold)
            .field("timeout", &self.timeout)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_threads: 4,
            compare_threads: 0,
            mode: Mode::Barrier,
            order: OrderPolicy::Sorted,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
            timeout: None,
            cancel: CancelToken::new(),
            progress_callback: None,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: OrderPolicy) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    #[must_use]
    pub fn with_compare_threads(mut self, threads: usize) -> Self {
        self.compare_threads = threads;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
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

    /// True when compare-thread settings are given but the streaming
    /// variant, which compares on the I/O pool, will not use them.
    #[must_use]
    pub fn ignores_compare_threads(&self) -> bool {
        self.mode == Mode::Streaming && self.compare_threads != 0
    }

    /// The run's cancel token, with the timeout armed from now.
    fn armed_cancel(&self) -> CancelToken {
        match self.timeout {
            Some(timeout) => self.cancel.clone().with_timeout(timeout),
            None => self.cancel.clone(),
        }
    }

    fn fingerprint_config(&self, cancel: &CancelToken) -> FingerprintConfig {
        FingerprintConfig {
            chunk_size: self.chunk_size,
            io_threads: self.io_threads,
            loader: Loader::new(self.mmap_threshold),
            cancel: cancel.clone(),
            progress_callback: self.progress_callback.clone(),
        }
    }

    fn compare_config(&self, cancel: &CancelToken) -> CompareConfig {
        CompareConfig {
            threads: self.compare_threads,
            order: self.order,
            cancel: cancel.clone(),
            progress_callback: self.progress_callback.clone(),
        }
    }
}

/// Everything a run learned apart from the results themselves.
#[derive(Debug)]
pub struct PipelineReport {
    pub mode: Mode,
    pub chunk_size: NonZeroUsize,
    /// Fingerprints of every successfully loaded path
    pub table: FingerprintTable,
    /// Load failures, in input order
    pub failures: Vec<LoadError>,
    pub fingerprint: FingerprintStats,
    pub compare: CompareStats,
    pub duration: Duration,
}

impl PipelineReport {
    /// True if some paths could not be loaded.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Results plus report of a completed run.
#[derive(Debug)]
pub struct PipelineRun {
    pub results: Vec<SimilarityResult>,
    pub report: PipelineReport,
}

/// Producer report of the streaming variant.
struct StreamingOutcome {
    fingerprint: FingerprintOutcome,
    compare: CompareStats,
}

/// Runs the two-stage pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline and collect every result.
    ///
    /// # Errors
    ///
    /// See [`run_with`](Self::run_with).
    pub fn run(&self, paths: &[PathBuf]) -> Result<PipelineRun, PipelineError> {
        let mut results = Vec::new();
        let report = self.run_with(paths, |result| results.push(result))?;
        Ok(PipelineRun { results, report })
    }

    /// Run the pipeline, handing each result to `on_result` as the result
    /// stream yields it.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Config`] if fewer than two distinct paths were given
    /// - [`PipelineError::Interrupted`] / [`PipelineError::TimedOut`] if the
    ///   run was cancelled; results emitted before the stop have already
    ///   been passed to `on_result`
    pub fn run_with<F>(&self, paths: &[PathBuf], mut on_result: F) -> Result<PipelineReport, PipelineError>
    where
        F: FnMut(SimilarityResult),
    {
        let start = Instant::now();
        let distinct = distinct_paths(paths);
        if distinct.len() < 2 {
            return Err(ConfigError::TooFewPaths {
                found: distinct.len(),
            }
            .into());
        }
        if self.config.ignores_compare_threads() {
            log::warn!(
                "Compare thread count {} has no effect in streaming mode; pairs are compared on the {} I/O threads",
                self.config.compare_threads,
                self.config.io_threads
            );
        }

        let cancel = self.config.armed_cancel();
        let ordered: Arc<[PathBuf]> = distinct.into();

        log::info!(
            "Starting {} pipeline over {} files (chunk size {} bytes)",
            self.config.mode,
            ordered.len(),
            self.config.chunk_size
        );

        let mut emitted = 0usize;
        let (fingerprint, compare) = match self.config.mode {
            Mode::Barrier => {
                let outcome = fingerprint_all(&ordered, &self.config.fingerprint_config(&cancel));
                let FingerprintOutcome {
                    table,
                    failures,
                    stats,
                } = outcome;

                let table = Arc::new(table);
                let mut stream = compare_all(
                    Arc::clone(&table),
                    Arc::clone(&ordered),
                    self.config.compare_config(&cancel),
                );
                for result in stream.by_ref() {
                    emitted += 1;
                    on_result(result);
                }
                let compare = stream.finish();
                let table = Arc::try_unwrap(table).unwrap_or_else(|shared| (*shared).clone());

                (
                    FingerprintOutcome {
                        table,
                        failures,
                        stats,
                    },
                    compare,
                )
            }
            Mode::Streaming => {
                let config = self.config.clone();
                let cancel = cancel.clone();
                let ordered = Arc::clone(&ordered);
                let mut stream = ResultStream::spawn(self.config.order, move |tx| {
                    stream_pipeline(&ordered, &config, &cancel, tx)
                });
                for result in stream.by_ref() {
                    emitted += 1;
                    on_result(result);
                }
                let outcome = stream.finish();
                (outcome.fingerprint, outcome.compare)
            }
        };

        let report = PipelineReport {
            mode: self.config.mode,
            chunk_size: self.config.chunk_size,
            table: fingerprint.table,
            failures: fingerprint.failures,
            fingerprint: fingerprint.stats,
            compare,
            duration: start.elapsed(),
        };

        if report.fingerprint.interrupted || report.compare.interrupted {
            return Err(cancelled(&cancel, emitted));
        }

        log::info!(
            "Pipeline complete: {} results, {} of {} files skipped ({:?})",
            emitted,
            report.failures.len(),
            ordered.len(),
            report.duration
        );
        Ok(report)
    }

    /// Sum every distinct path and group files with equal sums.
    ///
    /// Only the fingerprint settings apply; mode, order and compare threads
    /// are not used.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Config`] if no path was given
    /// - [`PipelineError::Interrupted`] / [`PipelineError::TimedOut`] if the
    ///   run was cancelled before every file was read
    pub fn sums(&self, paths: &[PathBuf]) -> Result<SumReport, PipelineError> {
        let distinct = distinct_paths(paths);
        if distinct.is_empty() {
            return Err(ConfigError::NoPaths.into());
        }

        let cancel = self.config.armed_cancel();
        let report = sum_all(&distinct, &self.config.fingerprint_config(&cancel));
        if report.stats.interrupted {
            return Err(cancelled(&cancel, report.sums.len()));
        }
        Ok(report)
    }
}

/// Deduplicate `paths`, warning about repeats.
fn distinct_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let distinct = unique_paths(paths);
    if distinct.len() < paths.len() {
        log::warn!(
            "Ignoring {} repeated path(s)",
            paths.len() - distinct.len()
        );
    }
    distinct
}

/// Error for a run stopped by `cancel` after `results` outputs.
fn cancelled(cancel: &CancelToken, results: usize) -> PipelineError {
    match cancel.reason() {
        Some(CancelReason::TimedOut) => PipelineError::TimedOut { results },
        _ => PipelineError::Interrupted { results },
    }
}

/// Shared, read-only state of one streaming run.
struct StreamContext<'a> {
    ordered: &'a [PathBuf],
    fingerprint: FingerprintConfig,
    compare: CompareConfig,
    counters: PairCounters,
}

/// Streaming variant, run on the result stream's producer thread.
///
/// The coordinator loop runs on the calling thread, outside the worker
/// pool, so blocking on the completion channel never starves the workers.
fn stream_pipeline(
    ordered: &[PathBuf],
    config: &PipelineConfig,
    cancel: &CancelToken,
    tx: Sender<SimilarityResult>,
) -> StreamingOutcome {
    let start = Instant::now();
    let ctx = StreamContext {
        ordered,
        fingerprint: config.fingerprint_config(cancel),
        compare: config.compare_config(cancel),
        counters: PairCounters::default(),
    };

    let n = ordered.len();
    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start(PHASE_FINGERPRINT, n);
        callback.on_phase_start(PHASE_COMPARE, n * n.saturating_sub(1) / 2);
    }

    let pool = build_pool(config.io_threads, "pipeline");
    let coordinated = match pool {
        Some(ref pool) => pool.in_place_scope(|scope| coordinate(scope, &ctx, &tx)),
        None => rayon::in_place_scope(|scope| coordinate(scope, &ctx, &tx)),
    };
    drop(tx);

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end(PHASE_FINGERPRINT);
        callback.on_phase_end(PHASE_COMPARE);
    }

    let Coordinated {
        slots,
        mut failures,
        mut stats,
        pairs_scheduled,
        ..
    } = coordinated;

    failures.sort_by_key(|(idx, _)| *idx);
    let table: FingerprintTable = slots
        .into_iter()
        .enumerate()
        .filter_map(|(idx, slot)| {
            slot.map(|fp| {
                let fp = Arc::try_unwrap(fp).unwrap_or_else(|shared| (*shared).clone());
                (ordered[idx].clone(), fp)
            })
        })
        .collect();

    stats.fingerprinted_files = table.len();
    stats.interrupted = stats.skipped_files > 0;
    stats.duration = start.elapsed();

    let compare = ctx.counters.into_stats(pairs_scheduled, start.elapsed());
    log::info!(
        "Streaming pipeline: {} files fingerprinted, {} pairs compared",
        stats.fingerprinted_files,
        compare.pairs_compared
    );

    StreamingOutcome {
        fingerprint: FingerprintOutcome {
            table,
            failures: failures.into_iter().map(|(_, e)| e).collect(),
            stats,
        },
        compare,
    }
}

/// What the coordinator accumulated.
struct Coordinated {
    slots: Vec<Option<Arc<Fingerprint>>>,
    failures: Vec<(usize, LoadError)>,
    stats: FingerprintStats,
    pairs_scheduled: usize,
    /// Pairs still expected, as shown on the compare bar
    compare_total: usize,
    /// Paths that will never have a fingerprint
    unloaded: usize,
}

impl Coordinated {
    /// Drop the pairs a path that failed to load can no longer join.
    ///
    /// Summed over every unloaded path this removes exactly the pairs with
    /// at least one unloaded side, so the total ends at `k * (k - 1) / 2`.
    fn lose_path(&mut self, n: usize, callback: Option<&Arc<dyn ProgressCallback>>) {
        self.compare_total -= n - 1 - self.unloaded;
        self.unloaded += 1;
        if let Some(callback) = callback {
            callback.on_total_changed(PHASE_COMPARE, self.compare_total);
        }
    }
}

fn coordinate<'scope>(
    scope: &rayon::Scope<'scope>,
    ctx: &'scope StreamContext<'scope>,
    tx: &Sender<SimilarityResult>,
) -> Coordinated {
    let n = ctx.ordered.len();
    let (done_tx, done_rx) = mpsc::channel::<(usize, Result<Fingerprinted, LoadError>)>();

    for idx in 0..n {
        let done_tx = done_tx.clone();
        scope.spawn(move |_| {
            let path = &ctx.ordered[idx];
            let result = fingerprint_one(path, &ctx.fingerprint);
            if let Err(ref e) = result {
                report_failure(e);
            }
            if let Some(ref callback) = ctx.fingerprint.progress_callback {
                callback.on_progress(PHASE_FINGERPRINT, path.to_string_lossy().as_ref());
            }
            let _ = done_tx.send((idx, result));
        });
    }
    drop(done_tx);

    let mut coordinated = Coordinated {
        slots: vec![None; n],
        failures: Vec::new(),
        stats: FingerprintStats {
            input_files: n,
            ..Default::default()
        },
        pairs_scheduled: 0,
        compare_total: n * n.saturating_sub(1) / 2,
        unloaded: 0,
    };
    let callback = ctx.compare.progress_callback.as_ref();
    let mut completed: Vec<usize> = Vec::with_capacity(n);

    // Ends once every fingerprint unit has reported.
    for (idx, result) in done_rx {
        let unit = match result {
            Ok(unit) => unit,
            Err(LoadError::Cancelled(_)) => {
                coordinated.stats.skipped_files += 1;
                coordinated.lose_path(n, callback);
                continue;
            }
            Err(e) => {
                coordinated.stats.failed_files += 1;
                coordinated.failures.push((idx, e));
                coordinated.lose_path(n, callback);
                continue;
            }
        };

        coordinated.stats.bytes_read += unit.bytes;
        coordinated.stats.total_chunks += unit.fingerprint.len();
        let fingerprint = Arc::new(unit.fingerprint);

        for &other in &completed {
            let (i, j) = if other < idx { (other, idx) } else { (idx, other) };
            let (fp_i, fp_j) = match (&coordinated.slots[i], &coordinated.slots[j]) {
                (Some(a), None) => (Arc::clone(a), Arc::clone(&fingerprint)),
                (None, Some(b)) => (Arc::clone(&fingerprint), Arc::clone(b)),
                _ => continue,
            };
            coordinated.pairs_scheduled += 1;

            let tx = tx.clone();
            scope.spawn(move |_| {
                PairUnit {
                    index: (i, j),
                    paths: (&ctx.ordered[i], &ctx.ordered[j]),
                    fingerprints: (&fp_i, &fp_j),
                }
                .run(&ctx.compare, &ctx.counters, &tx);
            });
        }

        coordinated.slots[idx] = Some(fingerprint);
        completed.push(idx);
    }

    coordinated
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

    fn streaming() -> PipelineConfig {
        PipelineConfig::default().with_mode(Mode::Streaming)
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Barrier.to_string(), "barrier");
        assert_eq!(Mode::Streaming.to_string(), "streaming");
    }

    #[test]
    fn test_too_few_paths() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let err = pipeline.run(&[PathBuf::from("only.bin")]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::TooFewPaths { found: 1 })
        ));
    }

    #[test]
    fn test_repeated_paths_count_once() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let path = PathBuf::from("same.bin");
        let err = pipeline.run(&[path.clone(), path]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::TooFewPaths { found: 1 })
        ));
    }

    #[test]
    fn test_barrier_identical_zero_files() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", &[0u8; 1024]);
        let b = write_file(&dir, "b.bin", &[0u8; 1024]);

        let run = Pipeline::new(PipelineConfig::default()).run(&[a, b]).unwrap();
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].ratio, 1.0);
        assert!(run.results[0].to_string().ends_with("100.000000%"));
        assert!(!run.report.is_partial());
    }

    #[test]
    fn test_streaming_matches_barrier() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..8)
            .map(|i| write_file(&dir, &format!("f{i}.bin"), &vec![(i % 3) as u8; 1024 * (1 + i % 2)]))
            .collect();

        let barrier = Pipeline::new(PipelineConfig::default()).run(&paths).unwrap();
        let streamed = Pipeline::new(streaming()).run(&paths).unwrap();

        assert_eq!(barrier.results, streamed.results);
        assert_eq!(barrier.report.table, streamed.report.table);
        assert_eq!(streamed.report.compare.pairs_total, 28);
        assert_eq!(streamed.report.compare.pairs_compared, 28);
    }

    #[test]
    fn test_streaming_single_thread_pool() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| write_file(&dir, &format!("f{i}.bin"), &[i as u8; 100]))
            .collect();

        let config = streaming().with_io_threads(1);
        let run = Pipeline::new(config).run(&paths).unwrap();
        assert_eq!(run.results.len(), 10);
    }

    #[test]
    fn test_streaming_excludes_failed_paths() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"aaaa");
        let missing = dir.path().join("missing.bin");
        let c = write_file(&dir, "c.bin", b"aaaa");

        let run = Pipeline::new(streaming())
            .run(&[a.clone(), missing.clone(), c.clone()])
            .unwrap();

        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].path_a, a);
        assert_eq!(run.results[0].path_b, c);
        assert_eq!(run.report.failures.len(), 1);
        assert_eq!(run.report.failures[0].path(), missing.as_path());
        assert!(run.report.is_partial());
    }

    #[test]
    fn test_cancelled_run_reports_interrupted() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"a");
        let b = write_file(&dir, "b.bin", b"b");

        let cancel = CancelToken::new();
        cancel.cancel();
        for mode in [Mode::Barrier, Mode::Streaming] {
            let config = PipelineConfig::default()
                .with_mode(mode)
                .with_cancel_token(cancel.clone());
            let err = Pipeline::new(config).run(&[a.clone(), b.clone()]).unwrap_err();
            assert!(matches!(err, PipelineError::Interrupted { results: 0 }));
        }
    }

    #[test]
    fn test_expired_timeout_reports_timed_out() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"a");
        let b = write_file(&dir, "b.bin", b"b");

        let config = PipelineConfig::default().with_timeout(Duration::ZERO);
        let err = Pipeline::new(config).run(&[a, b]).unwrap_err();
        assert!(matches!(err, PipelineError::TimedOut { .. }));
    }

    #[derive(Default)]
    struct CompareTally {
        total: AtomicUsize,
        done: AtomicUsize,
    }

    impl ProgressCallback for CompareTally {
        fn on_phase_start(&self, phase: &str, total: usize) {
            if phase == PHASE_COMPARE {
                self.total.store(total, Ordering::SeqCst);
            }
        }

        fn on_progress(&self, phase: &str, _label: &str) {
            if phase == PHASE_COMPARE {
                self.done.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_phase_end(&self, _phase: &str) {}

        fn on_total_changed(&self, phase: &str, total: usize) {
            if phase == PHASE_COMPARE {
                self.total.store(total, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_streaming_compare_total_shrinks_on_failures() {
        let dir = TempDir::new().unwrap();
        let mut paths: Vec<PathBuf> = (0..4)
            .map(|i| write_file(&dir, &format!("f{i}.bin"), &[i as u8; 64]))
            .collect();
        paths.insert(1, dir.path().join("missing_a.bin"));
        paths.push(dir.path().join("missing_b.bin"));

        for threads in [1, 4] {
            let tally = Arc::new(CompareTally::default());
            let config = streaming()
                .with_io_threads(threads)
                .with_progress_callback(tally.clone());
            let run = Pipeline::new(config).run(&paths).unwrap();

            assert_eq!(run.results.len(), 6);
            assert_eq!(tally.total.load(Ordering::SeqCst), 6);
            assert_eq!(tally.done.load(Ordering::SeqCst), 6);
        }
    }

    #[test]
    fn test_streaming_compare_total_all_failed() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| dir.path().join(format!("missing_{i}.bin")))
            .collect();

        let tally = Arc::new(CompareTally::default());
        let config = streaming().with_progress_callback(tally.clone());
        let run = Pipeline::new(config).run(&paths).unwrap();

        assert!(run.results.is_empty());
        assert_eq!(tally.total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ignores_compare_threads_only_when_streaming() {
        assert!(!PipelineConfig::default().ignores_compare_threads());
        assert!(!PipelineConfig::default()
            .with_compare_threads(1)
            .ignores_compare_threads());
        assert!(!streaming().ignores_compare_threads());
        assert!(streaming().with_compare_threads(1).ignores_compare_threads());
        assert!(streaming().with_compare_threads(8).ignores_compare_threads());
    }

    #[test]
    fn test_streaming_with_compare_threads_still_runs() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| write_file(&dir, &format!("f{i}.bin"), &[1u8; 10]))
            .collect();

        let run = Pipeline::new(streaming().with_compare_threads(1))
            .run(&paths)
            .unwrap();
        assert_eq!(run.results.len(), 6);
    }

    #[test]
    fn test_sums_groups_equal_files() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", &[2u8; 10]);
        let b = write_file(&dir, "b.bin", &[4u8; 5]);
        let c = write_file(&dir, "c.bin", &[1u8; 3]);

        let report = Pipeline::new(PipelineConfig::default())
            .sums(&[a.clone(), b.clone(), c, a.clone()])
            .unwrap();

        assert_eq!(report.total, 43);
        assert_eq!(report.stats.input_files, 3);
        let shared: Vec<(u64, Vec<PathBuf>)> =
            report.shared().map(|(sum, paths)| (sum, paths.to_vec())).collect();
        assert_eq!(shared, vec![(20, vec![a, b])]);
    }

    #[test]
    fn test_sums_single_path_allowed() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", &[3u8; 3]);

        let report = Pipeline::new(PipelineConfig::default()).sums(&[a]).unwrap();
        assert_eq!(report.total, 9);
    }

    #[test]
    fn test_sums_without_paths() {
        let err = Pipeline::new(PipelineConfig::default()).sums(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::NoPaths)));
    }

    #[test]
    fn test_sums_timed_out() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"a");

        let config = PipelineConfig::default().with_timeout(Duration::ZERO);
        let err = Pipeline::new(config).sums(&[a]).unwrap_err();
        assert!(matches!(err, PipelineError::TimedOut { results: 0 }));
    }

    #[test]
    fn test_run_with_streams_results() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| write_file(&dir, &format!("f{i}.bin"), &[1u8; 10]))
            .collect();

        let mut seen = 0;
        let config = PipelineConfig::default().with_order(OrderPolicy::Completion);
        let report = Pipeline::new(config)
            .run_with(&paths, |result| {
                assert_eq!(result.ratio, 1.0);
                seen += 1;
            })
            .unwrap();
        assert_eq!(seen, 6);
        assert_eq!(report.compare.pairs_compared, 6);
    }
}
