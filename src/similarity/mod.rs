//! Positional fingerprint comparison.
//!
//! - [`compare`]: ratio of positionally equal checksums
//! - [`pairs`]: parallel comparison of every unordered pair of files

pub mod pairs;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::fingerprint::Fingerprint;

pub use pairs::{compare_all, enumerate_pairs, CompareConfig, CompareStats, OrderPolicy, ResultStream};

/// Fraction of positions `i < min(len a, len b)` where `a[i] == b[i]`.
///
/// Chunks past the shorter fingerprint are ignored. When either fingerprint
/// is empty there is nothing to compare and the result is `0.0`.
///
/// ```
/// use chunksim::fingerprint::Fingerprint;
/// use chunksim::similarity::compare;
///
/// let a = Fingerprint::new(vec![1, 2, 3]);
/// let b = Fingerprint::new(vec![1, 9]);
/// assert_eq!(compare(&a, &b), 0.5);
/// ```
#[must_use]
pub fn compare(a: &Fingerprint, b: &Fingerprint) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }

    let matches = a
        .as_slice()
        .iter()
        .zip(b.as_slice())
        .filter(|(x, y)| x == y)
        .count();

    matches as f64 / n as f64
}

/// Similarity of one unordered pair of files.
///
/// `path_a` precedes `path_b` in the input order (`index_a < index_b`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub path_a: PathBuf,
    pub path_b: PathBuf,
    /// Position of `path_a` in the input list
    #[serde(skip)]
    pub index_a: usize,
    /// Position of `path_b` in the input list
    #[serde(skip)]
    pub index_b: usize,
    /// Ratio in `[0.0, 1.0]`
    pub ratio: f64,
}

impl SimilarityResult {
    /// Ratio as a percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.ratio * 100.0
    }

    /// Key used to restore pair enumeration order.
    #[must_use]
    pub fn order_key(&self) -> (usize, usize) {
        (self.index_a, self.index_b)
    }
}

impl fmt::Display for SimilarityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Similarity between {} and {}: {:.6}%",
            self.path_a.display(),
            self.path_b.display(),
            self.percent()
        )
    }
}
