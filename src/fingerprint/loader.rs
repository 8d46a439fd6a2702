//! File loading for the fingerprint stage.
//!
//! Small files are read into a buffer; files at or above the configured
//! threshold are memory-mapped so the reducer can walk them without a
//! second copy.
//!
//! # Mapped files that shrink
//!
//! A mapping does not hold the file's length. If another process truncates
//! a mapped file while it is being reduced, touching the lost pages raises
//! SIGBUS and the whole process dies. No [`LoadError`] is produced and no
//! partial results are reported. Inputs that may change during a run should
//! be loaded with `mmap_threshold = 0` (`--mmap-threshold 0`), which reads
//! every file into memory and turns a concurrent truncation into a shorter
//! fingerprint instead.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

use super::LoadError;

/// Default size at which files are memory-mapped instead of buffered (64 MiB).
pub const DEFAULT_MMAP_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Immutable bytes of one file.
///
/// Owned by a single fingerprint unit and dropped once reduced.
#[derive(Debug)]
pub enum FileContent {
    /// Content read into memory.
    Buffered(Vec<u8>),
    /// Content mapped from disk.
    Mapped(Mmap),
}

impl Deref for FileContent {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Buffered(bytes) => bytes,
            Self::Mapped(map) => map,
        }
    }
}

impl AsRef<[u8]> for FileContent {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// Reads file content given a path.
///
/// See the [module docs](self) for what happens when a mapped file is
/// truncated during a run.
#[derive(Debug, Clone, Copy)]
pub struct Loader {
    mmap_threshold: u64,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        }
    }
}

impl Loader {
    /// Create a loader that maps files of at least `mmap_threshold` bytes.
    ///
    /// A threshold of `0` disables memory mapping.
    #[must_use]
    pub fn new(mmap_threshold: u64) -> Self {
        Self { mmap_threshold }
    }

    /// Whether a file of `len` bytes is mapped rather than read.
    #[must_use]
    pub fn maps(&self, len: u64) -> bool {
        self.mmap_threshold > 0 && len >= self.mmap_threshold
    }

    /// Load the content of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the path is missing, unreadable, or not a
    /// regular file.
    pub fn load(&self, path: &Path) -> Result<FileContent, LoadError> {
        let file = File::open(path).map_err(|e| LoadError::from_io(path.to_path_buf(), e))?;
        let metadata = file
            .metadata()
            .map_err(|e| LoadError::from_io(path.to_path_buf(), e))?;

        if !metadata.is_file() {
            return Err(LoadError::NotAFile(path.to_path_buf()));
        }

        let len = metadata.len();
        if self.maps(len) {
            // SAFETY: the map is read-only and dropped right after reduction.
            // A concurrent truncation by another process raises SIGBUS on
            // access; see the module docs.
            match unsafe { Mmap::map(&file) } {
                Ok(map) => {
                    log::trace!("Mapped {} ({} bytes)", path.display(), len);
                    return Ok(FileContent::Mapped(map));
                }
                Err(e) => {
                    log::debug!(
                        "Memory map failed for {}, falling back to buffered read: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        let bytes = std::fs::read(path).map_err(|e| LoadError::from_io(path.to_path_buf(), e))?;
        log::trace!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(FileContent::Buffered(bytes))
    }
}

/// Load `path` with the default loader settings.
///
/// # Errors
///
/// See [`Loader::load`].
pub fn load(path: &Path) -> Result<FileContent, LoadError> {
    Loader::default().load(path)
}
