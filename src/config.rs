//! Constants and runtime configuration

use std::fs::File;
use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{OsmdbError, Result};

/// Entities per entry: `major = id / ENTRY_SIZE`, `minor = id % ENTRY_SIZE`
pub const ENTRY_SIZE: i64 = 100;

/// Cache budget for `smem == 1.0` (bytes)
pub const CACHE_SIZE: usize = 1 << 30;

/// Operations per batched transaction before an intermediate commit
pub const BATCH_SIZE: usize = 10_000;

/// Low watermark as a fraction of the high watermark
pub const LOW_WATERMARK: f64 = 0.95;

/// Zoom levels that have tile-refs indices
pub const SUPPORTED_ZOOMS: [i32; 3] = [9, 12, 15];

// Debug logging macro - enabled via OSMDB_DEBUG=1
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if std::env::var_os("OSMDB_DEBUG").is_some() {
            eprintln!("[OSMDB DEBUG] {}", format!($($arg)*));
        }
    };
}
pub(crate) use debug_log;

/// How the index opens its table set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Concurrent readers, no writes
    #[default]
    ReadOnly,
    /// Single writer, creates the schema
    Create,
    /// Single writer, existing schema
    Append,
}

impl Mode {
    pub fn is_writable(self) -> bool {
        !matches!(self, Mode::ReadOnly)
    }
}

/// Index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub mode: Mode,
    /// Number of reader threads (thread ids `0..nth`)
    pub nth: usize,
    /// Cache scale in units of `CACHE_SIZE`
    pub smem: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            mode: Mode::ReadOnly,
            nth: 1,
            smem: 1.0,
        }
    }
}

impl IndexConfig {
    pub fn new(mode: Mode, nth: usize, smem: f64) -> Self {
        Self { mode, nth, smem }
    }

    pub fn read_only(nth: usize, smem: f64) -> Self {
        Self::new(Mode::ReadOnly, nth, smem)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: IndexConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nth == 0 {
            return Err(OsmdbError::Protocol("nth must be at least 1".into()));
        }
        if self.nth > 1 && self.mode.is_writable() {
            return Err(OsmdbError::Protocol(format!(
                "nth={} is only legal in read-only mode", self.nth
            )));
        }
        if !(self.smem.is_finite() && self.smem > 0.0) {
            return Err(OsmdbError::Protocol(format!("invalid smem {}", self.smem)));
        }
        Ok(())
    }

    /// High watermark in bytes
    pub fn high_watermark(&self) -> usize {
        (self.smem * CACHE_SIZE as f64) as usize
    }

    /// Low watermark in bytes
    pub fn low_watermark(&self) -> usize {
        (self.smem * CACHE_SIZE as f64 * LOW_WATERMARK) as usize
    }
}
