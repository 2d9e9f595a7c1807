//! Paged backend: one B+Tree per table over the shared buffer pool, used by
//! `StorageMode::Index`, `Hybrid`, and its `Paged` alias.
//!
//! A table's root page id moves whenever its B+Tree root splits (see
//! `BTree::insert`), so the catalog mapping table name to root page can't
//! live at a fixed page id inside the paged file itself. It's kept instead
//! as a sidecar `<path>.catalog.json`, written with the same temp-file-plus-
//! rename technique the disk backend uses for its manifest.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::buffer::BufferPoolManager;
use crate::common::config::StorageMode;
use crate::common::{Error, PageId, Result, TxnId};
use crate::index::btree::BTree;
use crate::model::{Column, Row, Table};
use crate::recovery::PhysiologicalWal;
use crate::storage::page::Page;
use crate::storage::DiskManager;

use super::cache::TableCache;
use super::{atomic_write, Backend, BackendStats, WalStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    root_page: u32,
    columns: Vec<Column>,
    next_row_id: u64,
    version: u64,
    temporary: bool,
}

/// tenant -> lowercased table name -> entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    tables: HashMap<String, HashMap<String, CatalogEntry>>,
}

#[derive(Default)]
struct Counters {
    tables_loaded: AtomicU64,
    tables_saved: AtomicU64,
    tables_deleted: AtomicU64,
    bytes_written: AtomicU64,
}

pub struct PagedBackend {
    bpm: Arc<BufferPoolManager>,
    catalog_path: PathBuf,
    catalog: RwLock<Catalog>,
    /// Only present for `Hybrid`/`Paged` mode; `Index` mode keeps schemas
    /// catalog-resident but never materializes full tables in memory.
    cache: Option<TableCache>,
    mode: StorageMode,
    counters: Counters,
}

impl PagedBackend {
    /// Open (or create) a paged database file, replaying its physiological
    /// WAL before the buffer pool takes ownership of the disk manager.
    ///
    /// `checkpoint_every`/`checkpoint_interval` set the WAL's checkpoint
    /// trigger (see `DatabaseConfig::defaults_for`); `sync_on_mutate` is
    /// forwarded to the underlying `DiskManager`.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        path: impl AsRef<Path>,
        page_size: u32,
        pool_size: usize,
        mode: StorageMode,
        cache_budget_bytes: u64,
        checkpoint_every: u64,
        checkpoint_interval: Duration,
        sync_on_mutate: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let wal = PhysiologicalWal::open(Self::wal_path_for(path), checkpoint_every, checkpoint_interval)?;

        let mut disk_manager = DiskManager::open_or_create(path, page_size)?;
        disk_manager.set_sync_on_mutate(sync_on_mutate);

        // Replay any committed page writes that never made it past the WAL
        // before a prior crash, directly against the file, before any frame
        // gets cached over stale bytes.
        wal.recover(&mut |page_id, after| {
            let mut page = Page::with_size(disk_manager.page_size());
            page.as_mut_slice().copy_from_slice(after);
            let _ = disk_manager.write_page(page_id, &page);
        })?;

        let bpm = Arc::new(BufferPoolManager::with_wal(pool_size, disk_manager, wal));

        let catalog_path = Self::catalog_path_for(path);
        let catalog = if catalog_path.exists() {
            serde_json::from_slice(&std::fs::read(&catalog_path)?)?
        } else {
            Catalog::default()
        };

        let cache = matches!(mode, StorageMode::Hybrid | StorageMode::Paged).then(|| TableCache::new(cache_budget_bytes));

        Ok(Self {
            bpm,
            catalog_path,
            catalog: RwLock::new(catalog),
            cache,
            mode,
            counters: Counters::default(),
        })
    }

    fn catalog_path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".catalog.json");
        PathBuf::from(name)
    }

    fn wal_path_for(db_path: &Path) -> PathBuf {
        let mut name = db_path.as_os_str().to_owned();
        name.push(".wal");
        PathBuf::from(name)
    }

    fn persist_catalog(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&*self.catalog.read())?;
        atomic_write(&self.catalog_path, &bytes)
    }

    fn entry(&self, tenant: &str, name: &str) -> Option<CatalogEntry> {
        self.catalog
            .read()
            .tables
            .get(tenant)
            .and_then(|t| t.get(&name.to_lowercase()))
            .cloned()
    }

    pub fn pin_table(&self, table: &str) {
        if let Some(cache) = &self.cache {
            cache.pin_table(table);
        }
    }

    pub fn ignore_table(&self, table: &str) {
        if let Some(cache) = &self.cache {
            cache.ignore_table(table);
        }
    }

    /// Open a pager-level transaction spanning however many page writes
    /// follow, so they're logged to the WAL as one unit instead of each as
    /// its own singleton transaction. See `BufferPoolManager::begin_tx`.
    pub fn begin_tx(&self) -> Result<TxnId> {
        self.bpm.begin_tx()
    }

    pub fn commit_tx(&self, tx: TxnId) -> Result<()> {
        self.bpm.commit_tx(tx)
    }

    pub fn abort_tx(&self, tx: TxnId) -> Result<()> {
        self.bpm.abort_tx(tx)
    }

    /// Force a checkpoint now, regardless of whether the WAL's own trigger
    /// has fired.
    pub fn checkpoint(&self) -> Result<()> {
        self.bpm.checkpoint()
    }
}

impl Backend for PagedBackend {
    fn load_table(&self, tenant: &str, name: &str) -> Result<Option<Table>> {
        if let Some(cache) = &self.cache {
            if let Some(table) = cache.get(tenant, name) {
                return Ok(Some(table));
            }
        }

        let entry = match self.entry(tenant, name) {
            Some(e) => e,
            None => return Ok(None),
        };

        let tree = BTree::open(self.bpm.clone(), PageId::new(entry.root_page));
        let mut rows = HashMap::new();
        for (key, value) in tree.scan_range(None, None)? {
            let id_bytes: [u8; 8] = key
                .try_into()
                .map_err(|_| Error::Encoding("malformed row key in paged table".into()))?;
            let row: Row = bincode::deserialize(&value)?;
            rows.insert(u64::from_be_bytes(id_bytes), row);
        }

        let table = Table::from_parts(name, entry.columns, rows, entry.next_row_id, entry.version, entry.temporary);
        self.counters.tables_loaded.fetch_add(1, Ordering::Relaxed);

        if let Some(cache) = &self.cache {
            cache.put(tenant, table.clone());
        }
        Ok(Some(table))
    }

    /// Replaces the table's tree contents wholesale: the `Backend` contract
    /// hands `save_table` a complete `&Table`, not an incremental diff, so
    /// the simplest correct implementation reconciles the B+Tree's current
    /// row set against the given one rather than tracking row-level changes
    /// itself.
    fn save_table(&self, tenant: &str, table: &Table) -> Result<()> {
        let tenant_key = tenant.to_string();
        let name_key = table.name().to_lowercase();

        let existing_root = self
            .catalog
            .read()
            .tables
            .get(&tenant_key)
            .and_then(|t| t.get(&name_key))
            .map(|e| e.root_page);

        let root_page = match existing_root {
            Some(root) => root,
            None => BTree::new(self.bpm.clone())?.root_page_id().0,
        };
        let tree = BTree::open(self.bpm.clone(), PageId::new(root_page));

        let existing_ids: HashSet<u64> = tree
            .scan_range(None, None)?
            .into_iter()
            .map(|(key, _)| {
                let bytes: [u8; 8] = key.try_into().expect("row keys are always 8 bytes");
                u64::from_be_bytes(bytes)
            })
            .collect();
        let current_ids: HashSet<u64> = table.row_ids().collect();

        for id in existing_ids.difference(&current_ids) {
            tree.delete(&id.to_be_bytes())?;
        }
        let mut bytes_written = 0u64;
        for id in &current_ids {
            let row = table.get_row(*id).expect("id came from table.row_ids()");
            let encoded = bincode::serialize(row)?;
            bytes_written += encoded.len() as u64;
            tree.insert(&id.to_be_bytes(), &encoded)?;
        }

        let entry = CatalogEntry {
            root_page: tree.root_page_id().0,
            columns: table.columns().to_vec(),
            next_row_id: table.next_row_id(),
            version: table.version(),
            temporary: table.is_temporary(),
        };

        // Flush the tree's dirty pages (logging each one's after-image to
        // the WAL first) before the catalog comes to point at them, so a
        // reopen never sees a root page the catalog trusts but the file
        // doesn't have yet.
        self.bpm.flush_all_pages()?;

        self.catalog
            .write()
            .tables
            .entry(tenant_key)
            .or_default()
            .insert(name_key, entry);
        self.persist_catalog()?;
        self.counters.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
        self.counters.tables_saved.fetch_add(1, Ordering::Relaxed);

        if let Some(cache) = &self.cache {
            cache.put(tenant, table.clone());
        }
        Ok(())
    }

    fn delete_table(&self, tenant: &str, name: &str) -> Result<()> {
        let name_key = name.to_lowercase();
        let removed = {
            let mut catalog = self.catalog.write();
            catalog.tables.get_mut(tenant).and_then(|t| t.remove(&name_key))
        };
        if let Some(entry) = removed {
            let tree = BTree::open(self.bpm.clone(), PageId::new(entry.root_page));
            tree.free_all_pages()?;
            self.persist_catalog()?;
            if let Some(cache) = &self.cache {
                cache.remove(tenant, name);
            }
            self.counters.tables_deleted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn list_table_names(&self, tenant: &str) -> Result<Vec<String>> {
        Ok(self
            .catalog
            .read()
            .tables
            .get(tenant)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn sync(&self) -> Result<()> {
        self.bpm.sync()?;
        self.persist_catalog()
    }

    fn close(&self) -> Result<()> {
        self.bpm.checkpoint()?;
        self.persist_catalog()
    }

    fn mode(&self) -> StorageMode {
        self.mode
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            tables_loaded: self.counters.tables_loaded.load(Ordering::Relaxed),
            tables_saved: self.counters.tables_saved.load(Ordering::Relaxed),
            tables_deleted: self.counters.tables_deleted.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
        }
    }

    fn wal_status(&self) -> Option<WalStatus> {
        Some(WalStatus {
            should_checkpoint: self.bpm.should_checkpoint(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PAGE_SIZE;
    use crate::model::{ColumnType, Value};
    use tempfile::tempdir;

    fn open_test(path: impl AsRef<Path>, mode: StorageMode, cache_budget_bytes: u64) -> PagedBackend {
        PagedBackend::open(path, PAGE_SIZE as u32, 16, mode, cache_budget_bytes, 1000, Duration::from_secs(300), true).unwrap()
    }

    fn sample_table() -> Table {
        let mut t = Table::new("widgets", vec![Column::new("id", ColumnType::Int), Column::new("name", ColumnType::Text)]).unwrap();
        t.insert_row(vec![Some(Value::Int(1)), Some(Value::Text("a".into()))]).unwrap();
        t.insert_row(vec![Some(Value::Int(2)), Some(Value::Text("b".into()))]).unwrap();
        t
    }

    #[test]
    fn test_save_then_load_round_trips_rows_and_schema() {
        let dir = tempdir().unwrap();
        let backend = open_test(dir.path().join("db.dat"), StorageMode::Index, 0);

        let table = sample_table();
        backend.save_table("acme", &table).unwrap();
        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();

        assert_eq!(loaded.row_count(), 2);
        assert_eq!(loaded.columns().len(), 2);
        assert_eq!(loaded.next_row_id(), table.next_row_id());
        assert_eq!(loaded.get_row(1).unwrap().cells[1], Some(Value::Text("a".into())));
    }

    #[test]
    fn test_catalog_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.dat");
        {
            let backend = open_test(&path, StorageMode::Index, 0);
            backend.save_table("acme", &sample_table()).unwrap();
        }
        let backend = open_test(&path, StorageMode::Index, 0);
        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 2);
    }

    #[test]
    fn test_resave_reflects_deleted_rows() {
        let dir = tempdir().unwrap();
        let backend = open_test(dir.path().join("db.dat"), StorageMode::Index, 0);

        let mut table = sample_table();
        backend.save_table("acme", &table).unwrap();

        table.delete_row(1).unwrap();
        backend.save_table("acme", &table).unwrap();

        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 1);
        assert!(loaded.get_row(1).is_none());
    }

    #[test]
    fn test_delete_table_frees_catalog_entry() {
        let dir = tempdir().unwrap();
        let backend = open_test(dir.path().join("db.dat"), StorageMode::Index, 0);
        backend.save_table("acme", &sample_table()).unwrap();
        backend.delete_table("acme", "widgets").unwrap();
        assert!(backend.load_table("acme", "widgets").unwrap().is_none());
    }

    #[test]
    fn test_hybrid_mode_serves_second_load_from_cache() {
        let dir = tempdir().unwrap();
        let backend = open_test(dir.path().join("db.dat"), StorageMode::Hybrid, 1 << 20);
        backend.save_table("acme", &sample_table()).unwrap();

        backend.load_table("acme", "widgets").unwrap();
        let stats_before = backend.stats().tables_loaded;
        backend.load_table("acme", "widgets").unwrap();
        // Cache hit path still increments nothing further, since it returns
        // before the backend's own load counter is touched.
        assert_eq!(backend.stats().tables_loaded, stats_before);
    }

    #[test]
    fn test_wal_status_reports_checkpoint_due() {
        let dir = tempdir().unwrap();
        let backend = PagedBackend::open(
            dir.path().join("db.dat"),
            PAGE_SIZE as u32,
            16,
            StorageMode::Index,
            0,
            1, // checkpoint after every commit
            Duration::from_secs(300),
            true,
        )
        .unwrap();
        backend.save_table("acme", &sample_table()).unwrap();
        assert!(backend.wal_status().unwrap().should_checkpoint);

        backend.checkpoint().unwrap();
        assert!(!backend.wal_status().unwrap().should_checkpoint);
    }

    #[test]
    fn test_explicit_tx_groups_writes_under_one_wal_transaction() {
        let dir = tempdir().unwrap();
        let backend = open_test(dir.path().join("db.dat"), StorageMode::Index, 0);

        let tx = backend.begin_tx().unwrap();
        backend.save_table("acme", &sample_table()).unwrap();
        backend.sync().unwrap();
        backend.commit_tx(tx).unwrap();

        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 2);
    }

    /// Simulates a crash between a transaction's WAL commit and the data
    /// page landing in the main file: append a committed page write to the
    /// WAL sidecar directly (bypassing the buffer pool entirely), then
    /// confirm the next `PagedBackend::open` replays it into the file
    /// before anything else touches that page.
    #[test]
    fn test_open_replays_committed_wal_writes_never_flushed_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.dat");
        {
            let backend = open_test(&path, StorageMode::Index, 0);
            backend.save_table("acme", &sample_table()).unwrap();
        }

        let target_page = {
            let backend = open_test(&path, StorageMode::Index, 0);
            PageId::new(backend.entry("acme", "widgets").unwrap().root_page)
        };

        {
            let wal = PhysiologicalWal::open(PagedBackend::wal_path_for(&path), 1000, Duration::from_secs(300)).unwrap();
            let tx = TxnId::new(999_999);
            let after = vec![0xEE_u8; PAGE_SIZE];
            wal.log_begin(tx).unwrap();
            wal.log_write_page(tx, target_page, after).unwrap();
            wal.log_commit(tx).unwrap();
        }

        let _backend = open_test(&path, StorageMode::Index, 0);
        let mut dm = DiskManager::open_or_create(&path, PAGE_SIZE as u32).unwrap();
        let page = dm.read_page(target_page).unwrap();
        assert!(page.as_slice().iter().all(|&b| b == 0xEE));
    }
}
