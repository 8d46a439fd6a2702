//! Chunk fingerprints and the stage that produces them.
//!
//! This module provides functionality for:
//! - Reducing a byte sequence to per-chunk checksums ([`reduce`])
//! - Loading file content, buffered or memory-mapped ([`loader`])
//! - Fingerprinting a whole set of paths in parallel ([`stage`])
//!
//! # Example
//!
//! ```
//! use chunksim::fingerprint::{reduce, DEFAULT_CHUNK_SIZE};
//!
//! let fingerprint = reduce(&[1u8; 2048], DEFAULT_CHUNK_SIZE);
//! assert_eq!(fingerprint.as_slice(), &[1024, 1024]);
//! ```

pub mod loader;
pub mod stage;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

pub use loader::{FileContent, Loader};
pub use stage::{fingerprint_all, FingerprintConfig, FingerprintOutcome, FingerprintStats};

/// Chunk size used when none is configured (1 KiB).
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(size) => size,
    None => unreachable!(),
};

/// Ordered per-chunk checksums of one file.
///
/// Position `i` holds the sum of the byte values in chunk `i`, so the
/// sequence encodes byte offsets as well as content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(Vec<u64>);

impl Fingerprint {
    /// Wrap an existing checksum sequence.
    #[must_use]
    pub fn new(checksums: Vec<u64>) -> Self {
        Self(checksums)
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the source content was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    /// Sum of every byte in the source content.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

impl From<Vec<u64>> for Fingerprint {
    fn from(checksums: Vec<u64>) -> Self {
        Self(checksums)
    }
}

/// Reduce `bytes` to one checksum per `chunk_size` window.
///
/// Windows are consecutive and non-overlapping; the final one may be
/// shorter. Empty input yields an empty fingerprint.
#[must_use]
pub fn reduce(bytes: &[u8], chunk_size: NonZeroUsize) -> Fingerprint {
    let checksums = bytes
        .chunks(chunk_size.get())
        .map(|chunk| chunk.iter().map(|&b| u64::from(b)).sum())
        .collect();
    Fingerprint(checksums)
}

/// Errors that can occur while loading a file for fingerprinting.
///
/// The source error is wrapped in an `Arc` so the error can be cloned into
/// both the run report and the log line.
#[derive(thiserror::Error, Debug, Clone)]
pub enum LoadError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path exists but is not a regular file.
    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The unit was skipped because the run was cancelled before it started.
    #[error("Skipped after cancellation: {0}")]
    Cancelled(PathBuf),
}

impl LoadError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io {
                path,
                source: Arc::new(err),
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound(path)
            | Self::PermissionDenied(path)
            | Self::NotAFile(path)
            | Self::Cancelled(path)
            | Self::Io { path, .. } => path,
        }
    }
}
