//! Configuration for InterchangeDB instances.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default page size in bytes (4KB), matching common OS and database page
/// sizes. `DatabaseConfig::page_size` may override this up to 64KB.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of pages with a 32-bit `PageId`.
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Maximum theoretical database size in bytes at the default page size.
pub const MAX_DB_SIZE_BYTES: u64 = MAX_PAGES * PAGE_SIZE as u64;

/// Which storage backend a `Database` should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// No persistence; data exists only in memory for the process lifetime.
    Memory,
    /// In-memory data backed by a logical write-ahead log and periodic
    /// snapshot checkpoints.
    Wal,
    /// One gob/bincode-encoded file per table under `<path>/<tenant>/`.
    Disk,
    /// Paged backend, schema-only memory residency; rows loaded on demand.
    Index,
    /// Paged backend with a bounded, LRU-evicted buffer pool.
    Hybrid,
    /// Alias for `Hybrid` used by callers that think in on-disk page terms.
    Paged,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::Memory
    }
}

/// Transaction isolation level offered by the MVCC manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        IsolationLevel::Snapshot
    }
}

/// Top-level configuration, passed to the `Database` constructor.
///
/// Mirrors the fields enumerated in the external-interfaces configuration
/// contract: storage mode, path, memory budget, durability knobs, checkpoint
/// thresholds, isolation level, and page/cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub mode: StorageMode,
    pub path: Option<PathBuf>,
    pub max_memory_bytes: u64,
    pub sync_on_mutate: bool,
    pub compress_files: bool,
    pub checkpoint_every: u64,
    #[serde(with = "duration_secs")]
    pub checkpoint_interval: Duration,
    pub isolation_level: IsolationLevel,
    pub page_size: usize,
    pub max_cache_pages: usize,
}

impl DatabaseConfig {
    /// Memory-only configuration: no path, no persistence.
    pub fn memory() -> Self {
        Self::defaults_for(StorageMode::Memory)
    }

    /// Paged/hybrid configuration rooted at `path`.
    pub fn hybrid(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::defaults_for(StorageMode::Hybrid)
        }
    }

    /// Per-file disk configuration rooted at `path`.
    pub fn disk(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::defaults_for(StorageMode::Disk)
        }
    }

    /// WAL-backed in-memory configuration rooted at `path`.
    pub fn wal(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::defaults_for(StorageMode::Wal)
        }
    }

    fn defaults_for(mode: StorageMode) -> Self {
        let (max_memory_bytes, checkpoint_every, checkpoint_interval) = match mode {
            StorageMode::Index => (64 << 20, 1000, Duration::from_secs(300)),
            StorageMode::Hybrid | StorageMode::Paged => {
                (256 << 20, 1000, Duration::from_secs(300))
            }
            _ => (256 << 20, 32, Duration::from_secs(30)),
        };
        Self {
            mode,
            path: None,
            max_memory_bytes,
            sync_on_mutate: false,
            compress_files: false,
            checkpoint_every,
            checkpoint_interval,
            isolation_level: IsolationLevel::default(),
            page_size: PAGE_SIZE,
            max_cache_pages: 1024,
        }
    }

    /// Validate the page size (power of two, 4096-65536) and that persistent
    /// modes carry a path.
    pub fn validate(&self) -> crate::common::Result<()> {
        if !self.page_size.is_power_of_two() || !(4096..=65536).contains(&self.page_size) {
            return Err(crate::common::Error::Schema(format!(
                "page_size must be a power of two in 4096..=65536, got {}",
                self.page_size
            )));
        }
        if matches!(
            self.mode,
            StorageMode::Wal
                | StorageMode::Disk
                | StorageMode::Index
                | StorageMode::Hybrid
                | StorageMode::Paged
        ) && self.path.is_none()
        {
            return Err(crate::common::Error::Schema(
                "a path is required for persistent storage modes".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::defaults_for(StorageMode::Memory)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_max_db_size() {
        let expected = 16 * 1024u64 * 1024 * 1024 * 1024;
        assert_eq!(MAX_DB_SIZE_BYTES, expected);
    }

    #[test]
    fn test_default_config_is_memory() {
        let cfg = DatabaseConfig::default();
        assert_eq!(cfg.mode, StorageMode::Memory);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_disk_requires_path() {
        let mut cfg = DatabaseConfig::default();
        cfg.mode = StorageMode::Disk;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_page_size_must_be_power_of_two() {
        let mut cfg = DatabaseConfig::default();
        cfg.page_size = 5000;
        assert!(cfg.validate().is_err());
        cfg.page_size = 8192;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_hybrid_defaults_use_larger_checkpoint_threshold() {
        let cfg = DatabaseConfig::hybrid("/tmp/db");
        assert_eq!(cfg.checkpoint_every, 1000);
        assert_eq!(cfg.checkpoint_interval, Duration::from_secs(300));
    }
}