//! Pluggable persistence backends.
//!
//! Every mode a [`crate::Database`] can run in implements the same
//! [`Backend`] contract; what differs is how (or whether) a table's rows
//! survive past the process:
//!
//! - [`memory`] — [`MemoryBackend`], no persistence (`StorageMode::Memory`)
//! - [`disk`] — [`DiskBackend`], one file per table (`StorageMode::Disk`)
//! - [`wal_memory`] — [`WalMemoryBackend`], RAM plus a logical WAL
//!   (`StorageMode::Wal`)
//! - [`paged`] — [`PagedBackend`], a B+Tree per table over the buffer pool
//!   (`StorageMode::Index`/`Hybrid`/`Paged`)
//! - [`estimator`] — per-table memory estimate used by the hybrid row cache
//! - [`cache`] — the hybrid backend's LRU row cache

mod cache;
mod disk;
mod estimator;
mod memory;
mod paged;
mod wal_memory;

pub use cache::{PinSet, TableCache};
pub use disk::DiskBackend;
pub use estimator::Estimator;
pub use memory::MemoryBackend;
pub use paged::PagedBackend;
pub use wal_memory::WalMemoryBackend;

use std::io::Write;
use std::path::Path;

use crate::common::config::StorageMode;
use crate::common::Result;
use crate::model::Table;

/// Snapshot of a backend's activity, returned by [`Backend::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendStats {
    pub tables_loaded: u64,
    pub tables_saved: u64,
    pub tables_deleted: u64,
    pub bytes_written: u64,
}

/// Reported by backends that durability-log through a WAL, so
/// [`crate::Database::wal`] has something to surface to callers deciding
/// whether to force a checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct WalStatus {
    pub should_checkpoint: bool,
}

/// The contract every storage backend implements: load, save, and delete a
/// tenant's table, enumerate what's present, and the lifecycle hooks a
/// `Database` drives at sync/close time.
///
/// Implementations must be safe to call from multiple threads concurrently;
/// `save_table`/`delete_table` for the same `(tenant, name)` pair are
/// serialized by the caller's transaction manager, not by the backend.
pub trait Backend: Send + Sync {
    /// Load the table's current persisted state, or `None` if it has never
    /// been saved (or was deleted).
    fn load_table(&self, tenant: &str, name: &str) -> Result<Option<Table>>;

    /// Persist `table`'s complete current state, replacing whatever was
    /// previously stored under its name.
    fn save_table(&self, tenant: &str, table: &Table) -> Result<()>;

    fn delete_table(&self, tenant: &str, name: &str) -> Result<()>;

    fn list_table_names(&self, tenant: &str) -> Result<Vec<String>>;

    fn table_exists(&self, tenant: &str, name: &str) -> Result<bool> {
        Ok(self
            .list_table_names(tenant)?
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Force whatever this backend holds buffered to stable storage, short
    /// of closing it.
    fn sync(&self) -> Result<()>;

    /// Flush and release any resources held open (files, pool memory). A
    /// backend must still answer `load_table` correctly after `open`-ing a
    /// fresh instance over the same storage.
    fn close(&self) -> Result<()>;

    fn mode(&self) -> StorageMode;

    fn stats(&self) -> BackendStats;

    /// `None` for backends with no WAL (memory, per-file, and — in this
    /// implementation — the paged backend, which durability-logs by
    /// reconciling whole B+Trees rather than a physiological WAL).
    fn wal_status(&self) -> Option<WalStatus> {
        None
    }
}

/// Write `bytes` to `path` via a same-directory temp file plus rename, so a
/// crash mid-write never leaves `path` holding a partial file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join("data.bin");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
