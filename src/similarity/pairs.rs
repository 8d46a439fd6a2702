//! Pairwise comparison over a frozen fingerprint table.
//!
//! Pairs `(i, j)` with `i < j` are enumerated over the input order, never
//! over table iteration order. Each pair is an independent unit reading
//! two immutable fingerprints. Results are sent over a channel; the
//! [`ResultStream`] ends once every producer has dropped its sender, which
//! happens exactly after the last pair was compared.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{compare, SimilarityResult};
use crate::fingerprint::stage::FingerprintTable;
use crate::fingerprint::Fingerprint;
use crate::pool::run_in_pool;
use crate::progress::{ProgressCallback, PHASE_COMPARE};
use crate::signal::CancelToken;

/// Order in which a [`ResultStream`] yields results.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderPolicy {
    /// Collect every result, then yield them sorted by `(i, j)`.
    #[default]
    Sorted,
    /// Yield results as workers finish them.
    Completion,
}

impl std::fmt::Display for OrderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sorted => write!(f, "sorted"),
            Self::Completion => write!(f, "completion"),
        }
    }
}

/// Configuration for the comparison stage.
#[derive(Clone, Default)]
pub struct CompareConfig {
    /// Worker threads. `0` uses the global rayon pool, `1` compares serially.
    pub threads: usize,
    pub order: OrderPolicy,
    /// Cancellation checked before each pair.
    pub cancel: CancelToken,
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for CompareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompareConfig")
            .field("threads", &self.threads)
            .field("order", &self.order)
            .field("cancel", &self.cancel)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl CompareConfig {
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: OrderPolicy) -> Self {
        self.order = order;
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

/// Statistics from the comparison stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareStats {
    /// Pairs scheduled for comparison
    pub pairs_total: usize,
    /// Pairs that produced a result
    pub pairs_compared: usize,
    /// Pairs dropped because the run was cancelled
    pub pairs_skipped: usize,
    pub interrupted: bool,
    pub duration: Duration,
}

/// Shared counters updated by comparison units.
#[derive(Debug, Default)]
pub(crate) struct PairCounters {
    compared: AtomicUsize,
    skipped: AtomicUsize,
}

impl PairCounters {
    pub(crate) fn into_stats(self, pairs_total: usize, duration: Duration) -> CompareStats {
        let pairs_skipped = self.skipped.into_inner();
        CompareStats {
            pairs_total,
            pairs_compared: self.compared.into_inner(),
            pairs_skipped,
            interrupted: pairs_skipped > 0,
            duration,
        }
    }
}

/// Indices `(i, j)`, `i < j`, of every pair whose two paths are in `table`.
///
/// Repeated paths only participate through their first occurrence.
#[must_use]
pub fn enumerate_pairs(ordered: &[PathBuf], table: &FingerprintTable) -> Vec<(usize, usize)> {
    let mut seen = HashSet::with_capacity(ordered.len());
    let mut participants = Vec::with_capacity(ordered.len());
    for (idx, path) in ordered.iter().enumerate() {
        if table.contains(path) && seen.insert(path.as_path()) {
            participants.push(idx);
        }
    }

    let k = participants.len();
    let mut pairs = Vec::with_capacity(k * k.saturating_sub(1) / 2);
    for (pos, &i) in participants.iter().enumerate() {
        for &j in &participants[pos + 1..] {
            pairs.push((i, j));
        }
    }
    pairs
}

/// One comparison unit: two fingerprints and where they came from.
pub(crate) struct PairUnit<'a> {
    pub(crate) index: (usize, usize),
    pub(crate) paths: (&'a Path, &'a Path),
    pub(crate) fingerprints: (&'a Fingerprint, &'a Fingerprint),
}

impl PairUnit<'_> {
    /// Compare and send the result. Returns `false` if the pair was skipped.
    pub(crate) fn run(
        self,
        config: &CompareConfig,
        counters: &PairCounters,
        tx: &Sender<SimilarityResult>,
    ) -> bool {
        if config.cancel.is_cancelled() {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let (path_a, path_b) = self.paths;
        let (a, b) = self.fingerprints;
        let result = SimilarityResult {
            path_a: path_a.to_path_buf(),
            path_b: path_b.to_path_buf(),
            index_a: self.index.0,
            index_b: self.index.1,
            ratio: compare(a, b),
        };
        log::trace!("{result}");

        if let Some(ref callback) = config.progress_callback {
            callback.on_progress(PHASE_COMPARE, path_b.to_string_lossy().as_ref());
        }
        counters.compared.fetch_add(1, Ordering::Relaxed);

        // The receiver only goes away if the consumer dropped the stream.
        if tx.send(result).is_err() {
            log::trace!("Result stream closed, dropping result");
        }
        true
    }
}

/// Look up both fingerprints of `(i, j)` and compare them.
fn compare_indexed(
    table: &FingerprintTable,
    ordered: &[PathBuf],
    (i, j): (usize, usize),
    config: &CompareConfig,
    counters: &PairCounters,
    tx: &Sender<SimilarityResult>,
) -> bool {
    let (path_a, path_b) = (&ordered[i], &ordered[j]);
    let (Some(a), Some(b)) = (table.get(path_a), table.get(path_b)) else {
        log::debug!(
            "Pair ({}, {}) has no fingerprint, not comparing",
            path_a.display(),
            path_b.display()
        );
        counters.skipped.fetch_add(1, Ordering::Relaxed);
        return false;
    };

    PairUnit {
        index: (i, j),
        paths: (path_a, path_b),
        fingerprints: (a, b),
    }
    .run(config, counters, tx)
}

/// Stream of similarity results.
///
/// Iteration ends once every pair has been compared (or skipped after
/// cancellation). Call [`finish`](Self::finish) afterwards for whatever the
/// producer reports (`S`, the comparison statistics by default).
pub struct ResultStream<S = CompareStats> {
    receiver: Receiver<SimilarityResult>,
    producer: JoinHandle<S>,
    order: OrderPolicy,
    sorted: Option<std::vec::IntoIter<SimilarityResult>>,
}

impl<S: Send + 'static> ResultStream<S> {
    /// Run `produce` on its own thread, streaming what it sends.
    pub(crate) fn spawn<F>(order: OrderPolicy, produce: F) -> Self
    where
        F: FnOnce(Sender<SimilarityResult>) -> S + Send + 'static,
    {
        let (tx, receiver) = mpsc::channel();
        let producer = std::thread::spawn(move || produce(tx));

        Self {
            receiver,
            producer,
            order,
            sorted: None,
        }
    }

    /// Order policy this stream was created with.
    #[must_use]
    pub fn order(&self) -> OrderPolicy {
        self.order
    }

    /// Wait for the producer and return its report.
    ///
    /// Results not yet consumed are discarded.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from the producer thread.
    pub fn finish(self) -> S {
        drop(self.receiver);
        match self.producer.join() {
            Ok(stats) => stats,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// Collect every remaining result and the producer's report.
    pub fn collect_with_stats(mut self) -> (Vec<SimilarityResult>, S) {
        let results: Vec<SimilarityResult> = self.by_ref().collect();
        (results, self.finish())
    }
}

impl<S> Iterator for ResultStream<S> {
    type Item = SimilarityResult;

    fn next(&mut self) -> Option<SimilarityResult> {
        match self.order {
            OrderPolicy::Completion => self.receiver.recv().ok(),
            OrderPolicy::Sorted => {
                if self.sorted.is_none() {
                    let mut all: Vec<SimilarityResult> = self.receiver.iter().collect();
                    all.sort_by_key(SimilarityResult::order_key);
                    self.sorted = Some(all.into_iter());
                }
                self.sorted.as_mut().and_then(Iterator::next)
            }
        }
    }
}

/// Compare every unordered pair of fingerprinted paths.
///
/// `ordered` is the input order. Paths missing from `table` are
/// excluded without being reported; the stream yields exactly
/// `k * (k - 1) / 2` results for `k` fingerprinted paths unless cancelled.
#[must_use]
pub fn compare_all(
    table: Arc<FingerprintTable>,
    ordered: Arc<[PathBuf]>,
    config: CompareConfig,
) -> ResultStream {
    let order = config.order;
    ResultStream::spawn(order, move |tx| {
        let start = Instant::now();
        let pairs = enumerate_pairs(&ordered, &table);
        let total = pairs.len();
        let counters = PairCounters::default();

        if let Some(ref callback) = config.progress_callback {
            callback.on_phase_start(PHASE_COMPARE, total);
        }
        log::info!("Comparing {} pairs across {} files", total, table.len());

        if config.threads == 1 {
            for pair in pairs {
                compare_indexed(&table, &ordered, pair, &config, &counters, &tx);
            }
        } else {
            run_in_pool(config.threads, "compare", || {
                pairs.into_par_iter().for_each_with(tx.clone(), |tx, pair| {
                    compare_indexed(&table, &ordered, pair, &config, &counters, tx);
                });
            });
        }
        drop(tx);

        if let Some(ref callback) = config.progress_callback {
            callback.on_phase_end(PHASE_COMPARE);
        }

        let stats = counters.into_stats(total, start.elapsed());
        if stats.interrupted {
            log::info!(
                "Comparison interrupted: {} of {} pairs skipped",
                stats.pairs_skipped,
                stats.pairs_total
            );
        }
        log::info!(
            "Comparison complete: {} pairs compared ({:?})",
            stats.pairs_compared,
            stats.duration
        );
        stats
    })
}
