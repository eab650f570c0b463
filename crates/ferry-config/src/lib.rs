//! TOML configuration for the ferry transfer queue.
//!
//! [`TransferConfig`] carries the knobs the queue reads at construction:
//! concurrency budget, batch-vs-legacy negotiation, retry cap, dry-run, and
//! an optional progress-log path. Every field has a default so a missing or
//! empty file yields a working configuration.
//!
//! [`FileConfig`] is the persistence half: it implements [`ConfigWriter`],
//! the seam through which the queue disables batch negotiation for future
//! invocations once a remote has answered "not implemented".

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Default number of simultaneous transfers an adapter may run.
pub const DEFAULT_CONCURRENT_TRANSFERS: usize = 3;

/// Default number of extra attempts permitted per object.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Errors reading or writing the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Filesystem error.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`TransferConfig`].
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered back to TOML.
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Transfer queue configuration, parsed from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Simultaneous byte-movement tasks the adapter may run, and the number
    /// of per-object negotiation workers in legacy mode.
    pub concurrent_transfers: usize,
    /// Negotiate metadata in batches (true) or per object (false).
    pub batch_transfer: bool,
    /// Extra attempts permitted per object after a retriable failure.
    pub max_retries: u32,
    /// Rehearse negotiation and accounting without moving bytes.
    pub dry_run: bool,
    /// Optional path for a machine-readable progress log.
    pub progress_log: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrent_transfers: DEFAULT_CONCURRENT_TRANSFERS,
            batch_transfer: true,
            max_retries: DEFAULT_MAX_RETRIES,
            dry_run: false,
            progress_log: None,
        }
    }
}

impl TransferConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Write to a TOML file, replacing any existing content.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let rendered = toml::to_string_pretty(self)?;
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

/// Persists configuration decisions the queue makes at runtime.
///
/// The only such decision today is permanently preferring legacy per-object
/// negotiation after a remote reports the batch endpoint unimplemented.
pub trait ConfigWriter: Send + Sync {
    /// Record `batch_transfer = false` so future invocations skip the
    /// doomed batch attempt.
    fn disable_batch_transfer(&self) -> Result<(), ConfigError>;
}

/// File-backed [`ConfigWriter`] that rewrites one TOML file in place.
pub struct FileConfig {
    path: PathBuf,
    // Serializes read-modify-write cycles against this path.
    write_lock: Mutex<()>,
}

impl FileConfig {
    /// Create a writer for the given config path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The path this writer rewrites.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigWriter for FileConfig {
    fn disable_batch_transfer(&self) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().expect("config lock poisoned");
        let mut config = TransferConfig::load(&self.path)?;
        config.batch_transfer = false;
        config.save(&self.path)?;
        info!(path = %self.path.display(), "persisted batch_transfer = false");
        Ok(())
    }
}
