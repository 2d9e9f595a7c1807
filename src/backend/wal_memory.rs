//! WAL-backed in-memory backend (`StorageMode::Wal`): tables are
//! RAM-resident, durability comes from a logical write-ahead log of
//! row-level mutations, periodically snapshotted and truncated.
//!
//! `Backend::save_table` only ever hands this backend a complete table, not
//! a change log, so `save_table` diffs the incoming table against its own
//! previously-stored copy to recover the row-level inserts/updates/deletes
//! `LogicalWal::log_insert`/`log_update`/`log_delete` expect. A table's
//! schema is treated as rare, DDL-level state: it's persisted immediately to
//! a `schemas.json` sidecar the moment a table is first saved, so recovery
//! can pre-seed an empty `Table` for the WAL replay to populate even if the
//! table was created after the last snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::common::config::StorageMode;
use crate::common::{Counter, Result, TxnId};
use crate::model::{Column, Table};
use crate::recovery::{LogicalOp, LogicalWal};

use super::{atomic_write, Backend, BackendStats, WalStatus};
use std::sync::atomic::{AtomicU64, Ordering};

type TableKey = (String, String);

/// tenant -> lowercased table name -> columns, persisted synchronously on
/// first save so a crash before the next checkpoint doesn't lose the schema
/// of a brand-new table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SchemaRegistry {
    tables: HashMap<String, HashMap<String, Vec<Column>>>,
}

#[derive(Default)]
struct Counters {
    tables_loaded: AtomicU64,
    tables_saved: AtomicU64,
    tables_deleted: AtomicU64,
    bytes_written: AtomicU64,
}

pub struct WalMemoryBackend {
    tables: RwLock<HashMap<TableKey, Table>>,
    wal: LogicalWal,
    snapshot_path: PathBuf,
    schema_path: PathBuf,
    txn_counter: Counter,
    counters: Counters,
}

impl WalMemoryBackend {
    pub fn open(root: impl AsRef<Path>, checkpoint_every: u64, checkpoint_interval: Duration) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;

        let snapshot_path = root.join("snapshot.bin");
        let schema_path = root.join("schemas.json");
        let wal = LogicalWal::open(root.join("wal.log"), checkpoint_every, checkpoint_interval)?;

        let mut tables: HashMap<TableKey, Table> = if snapshot_path.exists() {
            bincode::deserialize(&std::fs::read(&snapshot_path)?)?
        } else {
            HashMap::new()
        };

        if schema_path.exists() {
            let registry: SchemaRegistry = serde_json::from_slice(&std::fs::read(&schema_path)?)?;
            for (tenant, by_name) in registry.tables {
                for (name, columns) in by_name {
                    let key = (tenant.clone(), name.clone());
                    if !tables.contains_key(&key) {
                        tables.insert(key, Table::new(&name, columns)?);
                    }
                }
            }
        }

        let mut replayed = 0u64;
        wal.recover(&mut |op| {
            if Self::apply_logical_op(&mut tables, op) {
                replayed += 1;
            }
        })?;

        Ok(Self {
            tables: RwLock::new(tables),
            wal,
            snapshot_path,
            schema_path,
            txn_counter: Counter::starting_at(replayed.max(1)),
            counters: Counters::default(),
        })
    }

    fn next_txn(&self) -> TxnId {
        TxnId::new(self.txn_counter.next())
    }

    fn register_schema(&self, tenant: &str, table: &Table) -> Result<()> {
        let path = &self.schema_path;
        let mut registry: SchemaRegistry = if path.exists() {
            serde_json::from_slice(&std::fs::read(path)?)?
        } else {
            SchemaRegistry::default()
        };
        registry
            .tables
            .entry(tenant.to_string())
            .or_default()
            .insert(table.name().to_lowercase(), table.columns().to_vec());
        atomic_write(path, &serde_json::to_vec_pretty(&registry)?)
    }

    fn unregister_schema(&self, tenant: &str, name: &str) -> Result<()> {
        if !self.schema_path.exists() {
            return Ok(());
        }
        let mut registry: SchemaRegistry = serde_json::from_slice(&std::fs::read(&self.schema_path)?)?;
        if let Some(by_name) = registry.tables.get_mut(tenant) {
            by_name.remove(&name.to_lowercase());
        }
        atomic_write(&self.schema_path, &serde_json::to_vec_pretty(&registry)?)
    }

    fn write_snapshot(&self) -> Result<u64> {
        let bytes = bincode::serialize(&*self.tables.read())?;
        let len = bytes.len() as u64;
        atomic_write(&self.snapshot_path, &bytes)?;
        Ok(len)
    }

    /// Applies a replayed op to the in-memory table state, returning whether
    /// it found a matching table to apply to.
    fn apply_logical_op(tables: &mut HashMap<TableKey, Table>, op: &LogicalOp) -> bool {
        let (tenant, name) = match op {
            LogicalOp::Insert { tenant, table, .. }
            | LogicalOp::Update { tenant, table, .. }
            | LogicalOp::Delete { tenant, table, .. } => (tenant.clone(), table.to_lowercase()),
        };
        let Some(t) = tables.get_mut(&(tenant, name)) else {
            return false;
        };
        match op {
            LogicalOp::Insert { after, .. } | LogicalOp::Update { after, .. } => {
                t.put_row(after.clone());
                true
            }
            LogicalOp::Delete { row_id, .. } => t.delete_row(*row_id).is_ok(),
        }
    }
}

impl Backend for WalMemoryBackend {
    fn load_table(&self, tenant: &str, name: &str) -> Result<Option<Table>> {
        let found = self.tables.read().get(&(tenant.to_string(), name.to_lowercase())).cloned();
        if found.is_some() {
            self.counters.tables_loaded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    fn save_table(&self, tenant: &str, table: &Table) -> Result<()> {
        let key = (tenant.to_string(), table.name().to_lowercase());
        let is_new_table = !self.tables.read().contains_key(&key);
        if is_new_table {
            self.register_schema(tenant, table)?;
        }

        let tx = self.next_txn();
        self.wal.log_begin(tx)?;
        {
            let mut tables = self.tables.write();
            let previous = tables.get(&key).cloned().unwrap_or_else(|| {
                Table::new(table.name(), table.columns().to_vec()).expect("columns already validated by the caller's table")
            });
            let previous_ids: std::collections::HashSet<u64> = previous.row_ids().collect();
            let current_ids: std::collections::HashSet<u64> = table.row_ids().collect();

            for id in previous_ids.difference(&current_ids) {
                let before = previous.get_row(*id).expect("id came from previous.row_ids()").clone();
                self.wal.log_delete(tx, tenant, table.name(), *id, before)?;
            }
            for id in current_ids.intersection(&previous_ids) {
                let before = previous.get_row(*id).expect("id came from previous.row_ids()").clone();
                let after = table.get_row(*id).expect("id came from table.row_ids()").clone();
                if before != after {
                    self.wal.log_update(tx, tenant, table.name(), *id, before, after)?;
                }
            }
            for id in current_ids.difference(&previous_ids) {
                let after = table.get_row(*id).expect("id came from table.row_ids()").clone();
                self.wal.log_insert(tx, tenant, table.name(), *id, after)?;
            }

            tables.insert(key, table.clone());
        }
        self.wal.log_commit(tx)?;
        self.counters.tables_saved.fetch_add(1, Ordering::Relaxed);

        if self.wal.should_checkpoint() {
            let bytes_written = self.write_snapshot()?;
            self.wal.checkpoint(self.next_txn())?;
            self.counters.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
        }
        Ok(())
    }

    fn delete_table(&self, tenant: &str, name: &str) -> Result<()> {
        let key = (tenant.to_string(), name.to_lowercase());
        let removed = self.tables.write().remove(&key).is_some();
        if removed {
            self.unregister_schema(tenant, name)?;
            let bytes_written = self.write_snapshot()?;
            self.wal.checkpoint(self.next_txn())?;
            self.counters.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
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
        let bytes_written = self.write_snapshot()?;
        self.wal.checkpoint(self.next_txn())?;
        self.counters.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.sync()
    }

    fn mode(&self) -> StorageMode {
        StorageMode::Wal
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
            should_checkpoint: self.wal.should_checkpoint(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnType, Value};
    use tempfile::tempdir;

    fn sample_table() -> Table {
        let mut t = Table::new("widgets", vec![Column::new("id", ColumnType::Int)]).unwrap();
        t.insert_row(vec![Some(Value::Int(1))]).unwrap();
        t
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let backend = WalMemoryBackend::open(dir.path(), 1000, Duration::from_secs(300)).unwrap();
        backend.save_table("acme", &sample_table()).unwrap();
        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 1);
    }

    #[test]
    fn test_recovery_replays_uncheckpointed_writes() {
        let dir = tempdir().unwrap();
        {
            let backend = WalMemoryBackend::open(dir.path(), 1000, Duration::from_secs(300)).unwrap();
            backend.save_table("acme", &sample_table()).unwrap();
        }
        let backend = WalMemoryBackend::open(dir.path(), 1000, Duration::from_secs(300)).unwrap();
        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 1);
    }

    #[test]
    fn test_checkpoint_then_restart_still_has_rows() {
        let dir = tempdir().unwrap();
        {
            let backend = WalMemoryBackend::open(dir.path(), 1, Duration::from_secs(300)).unwrap();
            backend.save_table("acme", &sample_table()).unwrap();
            assert!(!backend.wal.should_checkpoint());
        }
        let backend = WalMemoryBackend::open(dir.path(), 1, Duration::from_secs(300)).unwrap();
        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 1);
    }

    #[test]
    fn test_resave_logs_row_level_diff() {
        let dir = tempdir().unwrap();
        let backend = WalMemoryBackend::open(dir.path(), 1000, Duration::from_secs(300)).unwrap();
        let mut table = sample_table();
        backend.save_table("acme", &table).unwrap();

        table.insert_row(vec![Some(Value::Int(2))]).unwrap();
        table.delete_row(1).unwrap();
        backend.save_table("acme", &table).unwrap();

        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 1);
        assert!(loaded.get_row(1).is_none());
        assert!(loaded.get_row(2).is_some());
    }

    #[test]
    fn test_delete_table_removes_it_and_persists() {
        let dir = tempdir().unwrap();
        let backend = WalMemoryBackend::open(dir.path(), 1000, Duration::from_secs(300)).unwrap();
        backend.save_table("acme", &sample_table()).unwrap();
        backend.delete_table("acme", "widgets").unwrap();
        assert!(backend.load_table("acme", "widgets").unwrap().is_none());

        let reopened = WalMemoryBackend::open(dir.path(), 1000, Duration::from_secs(300)).unwrap();
        assert!(reopened.load_table("acme", "widgets").unwrap().is_none());
    }
}
