//! Configuration for segwal
//!
//! Centralized configuration with sensible defaults. A `Config` is handed
//! to [`Wal::open`](crate::Wal::open) once and never changes afterwards.

use std::path::PathBuf;

use crate::error::{Result, WalError};

/// Default directory for segment files
pub const DEFAULT_BASE_PATH: &str = "log";

/// Default segment size cap (16 KB)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 16 << 10;

/// Rotate once fewer than this many bytes remain in the active segment
pub const DEFAULT_ROTATION_THRESHOLD: u64 = 64;

/// Main configuration for a log instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files
    /// Internal structure:
    ///   {base_path}/
    ///     ├── dat-0000000001.seg
    ///     ├── dat-00000000a4.seg
    ///     └── ...
    pub base_path: PathBuf,

    // -------------------------------------------------------------------------
    // Segment Configuration
    // -------------------------------------------------------------------------
    /// Size cap of a single segment file (in bytes)
    pub max_segment_size: u64,

    /// Remaining capacity (in bytes) below which the active segment rotates
    pub rotation_threshold: u64,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// fsync after every single write (batches always sync once at the end)
    pub sync_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(DEFAULT_BASE_PATH),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            sync_on_write: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the config before a log is opened with it
    pub fn validate(&self) -> Result<()> {
        if self.base_path.as_os_str().is_empty() {
            return Err(WalError::Config("base path must not be empty".to_string()));
        }
        if self.max_segment_size == 0 {
            return Err(WalError::Config(
                "max segment size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Threshold actually used for rotation decisions.
    ///
    /// Capped at half a segment so that small segments still hold more
    /// than one entry.
    pub fn effective_rotation_threshold(&self) -> u64 {
        self.rotation_threshold.min(self.max_segment_size / 2)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the directory holding the segment files
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_path = path.into();
        self
    }

    /// Set the segment size cap (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Set the rotation threshold (in bytes)
    pub fn rotation_threshold(mut self, bytes: u64) -> Self {
        self.config.rotation_threshold = bytes;
        self
    }

    /// Enable or disable fsync after every write
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.config.sync_on_write = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
