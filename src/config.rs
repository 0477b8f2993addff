//! Adapter configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Name the adapter reports to store-selection code
pub const ADAPTER_NAME: &str = "unitdb";

/// Maximum number of records returned by a query
pub const MAX_RESULTS: usize = 1024;

/// Maximum message retention
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// File name of the message log inside the adapter directory
pub const MESSAGE_LOG_FILE: &str = "messages.log";

const DEFAULT_DIR: &str = "./unitdb-data";
const DEFAULT_SIZE: u64 = 64 << 20;
const DEFAULT_EPOCH_MS: u64 = 1_000;

/// Adapter configuration
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Directory holding the message log
    pub dir: PathBuf,

    /// Target size in bytes: engine capacity, batch preallocation, log segment target
    pub size: u64,

    /// Epoch window; also bounds how long a flushed message stays unacknowledged
    pub epoch_window: Duration,

    /// Enable fsync on log commits (disable only for testing)
    pub fsync_enabled: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DIR),
            size: DEFAULT_SIZE,
            epoch_window: Duration::from_millis(DEFAULT_EPOCH_MS),
            fsync_enabled: true,
        }
    }
}

impl AdapterConfig {
    /// Config rooted at `dir` with default sizing
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            dir: std::env::var("UNITDB_DIR")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR)),
            size: std::env::var("UNITDB_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SIZE),
            epoch_window: Duration::from_millis(
                std::env::var("UNITDB_EPOCH_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_EPOCH_MS),
            ),
            fsync_enabled: std::env::var("UNITDB_FSYNC")
                .ok()
                .map(|s| s == "true" || s == "1")
                .unwrap_or(true),
        }
    }

    /// Check sizing and epoch window
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if size is zero or the epoch window is zero or longer than `MAX_TTL`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if self.epoch_window.is_zero() || self.epoch_window > MAX_TTL {
            return Err(ConfigError::InvalidEpochWindow(self.epoch_window));
        }
        Ok(())
    }

    /// Path of the message log
    #[must_use]
    pub fn wal_path(&self) -> PathBuf {
        self.dir.join(MESSAGE_LOG_FILE)
    }

    /// Initial batch buffer capacity, capped so a large engine size doesn't pin memory
    #[must_use]
    pub fn batch_capacity(&self) -> usize {
        usize::try_from(self.size).unwrap_or(usize::MAX).min(1 << 20)
    }
}
