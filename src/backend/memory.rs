//! Pure in-memory backend: tables live only as long as the process, with an
//! optional snapshot file written on close and read back on open.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::common::config::StorageMode;
use crate::common::Result;
use crate::model::Table;

use super::{atomic_write, Backend, BackendStats};

type TableKey = (String, String);

#[derive(Default)]
struct Counters {
    tables_loaded: AtomicU64,
    tables_saved: AtomicU64,
    tables_deleted: AtomicU64,
    bytes_written: AtomicU64,
}

/// `StorageMode::Memory`: everything lives in `tables`, keyed by
/// `(tenant, lowercased table name)`. With no `snapshot_path` set this
/// backend is pure scratch space, gone at process exit.
pub struct MemoryBackend {
    tables: RwLock<HashMap<TableKey, Table>>,
    snapshot_path: Option<PathBuf>,
    counters: Counters,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            snapshot_path: None,
            counters: Counters::default(),
        }
    }

    /// Same as `new`, but reads `path` if it already exists, and writes a
    /// full snapshot there on `close`.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = if path.exists() {
            bincode::deserialize(&std::fs::read(&path)?)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            tables: RwLock::new(tables),
            snapshot_path: Some(path),
            counters: Counters::default(),
        })
    }

    fn key(tenant: &str, name: &str) -> TableKey {
        (tenant.to_string(), name.to_lowercase())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn load_table(&self, tenant: &str, name: &str) -> Result<Option<Table>> {
        let found = self.tables.read().get(&Self::key(tenant, name)).cloned();
        if found.is_some() {
            self.counters.tables_loaded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    fn save_table(&self, tenant: &str, table: &Table) -> Result<()> {
        self.tables
            .write()
            .insert(Self::key(tenant, table.name()), table.clone());
        self.counters.tables_saved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_table(&self, tenant: &str, name: &str) -> Result<()> {
        if self.tables.write().remove(&Self::key(tenant, name)).is_some() {
            self.counters.tables_deleted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn list_table_names(&self, tenant: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .read()
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, table)| table.name().to_string())
            .collect())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if let Some(path) = &self.snapshot_path {
            let bytes = bincode::serialize(&*self.tables.read())?;
            self.counters
                .bytes_written
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
            atomic_write(path, &bytes)?;
        }
        Ok(())
    }

    fn mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            tables_loaded: self.counters.tables_loaded.load(Ordering::Relaxed),
            tables_saved: self.counters.tables_saved.load(Ordering::Relaxed),
            tables_deleted: self.counters.tables_deleted.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
        }
    }
}
