//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. TOML config file (platform config dir, or `--config PATH`)
//! 3. Environment variables prefixed with `CHUNKSIM_` (`__` for nesting)
//! 4. Command-line flags (applied by the caller)
//!
//! [`Config::validate`] turns the user-facing values into a
//! [`PipelineConfig`], rejecting anything the pipeline cannot run with
//! before a single file is touched.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::loader::DEFAULT_MMAP_THRESHOLD;
use crate::pipeline::{Mode, PipelineConfig};
use crate::similarity::OrderPolicy;

/// Prefix for environment overrides, e.g. `CHUNKSIM_CHUNK_SIZE=4096`.
pub const ENV_PREFIX: &str = "CHUNKSIM_";

/// Errors detected before the pipeline starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Chunk size must be at least one byte.
    #[error("Invalid chunk size {0}: must be greater than zero")]
    InvalidChunkSize(usize),

    /// The requested chunk size does not fit in memory addresses here.
    #[error("Chunk size {0} is too large for this platform")]
    ChunkSizeTooLarge(u64),

    /// Nothing to read.
    #[error("At least one file path is required")]
    NoPaths,

    /// Similarity needs at least one pair.
    #[error("At least two distinct file paths are required, got {found}")]
    TooFewPaths {
        /// Distinct paths supplied
        found: usize,
    },

    /// The fingerprint stage needs at least one I/O thread.
    #[error("Invalid I/O thread count {0}: must be at least 1")]
    InvalidIoThreads(usize),

    /// A timeout of zero would cancel the run before it starts.
    #[error("Invalid timeout: must be at least one second")]
    InvalidTimeout,

    /// The layered configuration could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The configuration file could not be written.
    #[error("Failed to save configuration to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bytes per chunk.
    pub chunk_size: usize,
    /// Threads loading and reducing files.
    pub io_threads: usize,
    /// Threads comparing pairs (`0` = one per core, `1` = serial).
    pub compare_threads: usize,
    /// Barrier or streaming pipeline.
    pub mode: Mode,
    /// Result ordering.
    pub order: OrderPolicy,
    /// Files at least this large are memory-mapped (`0` disables).
    pub mmap_threshold: u64,
    /// Abandon the run after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            io_threads: 4,
            compare_threads: 0,
            mode: Mode::Barrier,
            order: OrderPolicy::Sorted,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Load defaults, the config file and environment overrides.
    ///
    /// With `path == None` the platform default file is used if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a source exists but cannot be
    /// parsed into a `Config`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        Self::figment(file.as_deref())
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// The figment used by [`load`](Self::load).
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            log::debug!("Reading configuration from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Platform-specific location of `config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "chunksim", "chunksim")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Write the configuration as TOML to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Save {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Save {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every value and build the pipeline settings.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<PipelineConfig, ConfigError> {
        let chunk_size =
            NonZeroUsize::new(self.chunk_size).ok_or(ConfigError::InvalidChunkSize(self.chunk_size))?;
        if self.io_threads == 0 {
            return Err(ConfigError::InvalidIoThreads(self.io_threads));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(PipelineConfig {
            chunk_size,
            io_threads: self.io_threads,
            compare_threads: self.compare_threads,
            mode: self.mode,
            order: self.order,
            mmap_threshold: self.mmap_threshold,
            timeout: self.timeout_secs.map(Duration::from_secs),
            ..PipelineConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.io_threads, 4);
        assert_eq!(config.mode, Mode::Barrier);
        assert_eq!(config.order, OrderPolicy::Sorted);
        assert!(config.timeout_secs.is_none());
    }

    #[test]
    fn test_validate_defaults() {
        let pipeline = Config::default().validate().unwrap();
        assert_eq!(pipeline.chunk_size.get(), 1024);
        assert!(pipeline.timeout.is_none());
    }

    #[test]
    fn test_validate_zero_chunk_size() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_validate_zero_io_threads() {
        let config = Config {
            io_threads: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIoThreads(0))
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = Config {
            timeout_secs: Some(0),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_validate_timeout() {
        let config = Config {
            timeout_secs: Some(30),
            ..Config::default()
        };
        assert_eq!(
            config.validate().unwrap().timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::TooFewPaths { found: 1 }.to_string(),
            "At least two distinct file paths are required, got 1"
        );
        assert_eq!(
            ConfigError::InvalidChunkSize(0).to_string(),
            "Invalid chunk size 0: must be greater than zero"
        );
        assert_eq!(
            ConfigError::ChunkSizeTooLarge(u64::MAX).to_string(),
            format!("Chunk size {} is too large for this platform", u64::MAX)
        );
    }
}
