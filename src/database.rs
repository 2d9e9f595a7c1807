//! The database façade: the single entry point an executor talks to.
//!
//! Wraps a [`backend::Backend`] with the in-memory tenant/table registry
//! §4.7 describes (`get` loads-and-caches, `put`/`drop` write straight
//! through) and the [`MvccManager`] every mutation's visibility is checked
//! against. Locking follows the same per-concern `RwLock` layout the buffer
//! pool and MVCC manager already use, rather than one lock around the whole
//! façade.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::backend::{
    Backend, BackendStats, DiskBackend, MemoryBackend, PagedBackend, WalMemoryBackend, WalStatus,
};
use crate::common::config::{DatabaseConfig, IsolationLevel, StorageMode};
use crate::common::{Error, Result, Timestamp};
use crate::concurrency::{MvccManager, TxHandle};
use crate::model::Table;

type TenantKey = String;
type TableKey = String;

/// A single embedded database instance: one backend, one tenant registry,
/// one MVCC manager.
pub struct Database {
    config: DatabaseConfig,
    backend: Box<dyn Backend>,
    mvcc: MvccManager,
    tenants: RwLock<HashMap<TenantKey, HashMap<TableKey, Table>>>,
    /// Version last handed to `backend.save_table`, so `sync` can tell a
    /// table apart from one that hasn't changed since its last save.
    synced_versions: RwLock<HashMap<(TenantKey, TableKey), u64>>,
}

impl Database {
    /// Open (or create) a database under `config`, selecting the backend
    /// that matches `config.mode`.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;

        let backend: Box<dyn Backend> = match config.mode {
            StorageMode::Memory => Box::new(MemoryBackend::new()),
            StorageMode::Disk => {
                let path = config.path.clone().expect("validate() requires a path for Disk");
                Box::new(DiskBackend::open(path, config.compress_files)?)
            }
            StorageMode::Wal => {
                let path = config.path.clone().expect("validate() requires a path for Wal");
                Box::new(WalMemoryBackend::open(path, config.checkpoint_every, config.checkpoint_interval)?)
            }
            StorageMode::Index | StorageMode::Hybrid | StorageMode::Paged => {
                let path = config.path.clone().expect("validate() requires a path for paged modes");
                Box::new(PagedBackend::open(
                    path,
                    config.page_size as u32,
                    config.max_cache_pages,
                    config.mode,
                    config.max_memory_bytes,
                    config.checkpoint_every,
                    config.checkpoint_interval,
                    config.sync_on_mutate,
                )?)
            }
        };

        Ok(Self {
            config,
            backend,
            mvcc: MvccManager::new(),
            tenants: RwLock::new(HashMap::new()),
            synced_versions: RwLock::new(HashMap::new()),
        })
    }

    fn canon(s: &str) -> String {
        s.to_lowercase()
    }

    /// Return a table, preferring the in-memory registry; on a miss, load it
    /// from the backend and install it before returning.
    pub fn get(&self, tenant: &str, table: &str) -> Result<Table> {
        let tenant_key = Self::canon(tenant);
        let table_key = Self::canon(table);

        if let Some(t) = self.tenants.read().get(&tenant_key).and_then(|m| m.get(&table_key)) {
            return Ok(t.clone());
        }

        let loaded = self
            .backend
            .load_table(&tenant_key, table)?
            .ok_or_else(|| Error::TableNotFound {
                tenant: tenant.to_string(),
                table: table.to_string(),
            })?;

        self.tenants
            .write()
            .entry(tenant_key.clone())
            .or_default()
            .insert(table_key.clone(), loaded.clone());
        self.synced_versions.write().insert((tenant_key, table_key), loaded.version());
        Ok(loaded)
    }

    /// Install `table` in memory and persist it via the backend.
    pub fn put(&self, tenant: &str, table: Table) -> Result<()> {
        let tenant_key = Self::canon(tenant);
        let table_key = Self::canon(table.name());

        self.backend.save_table(&tenant_key, &table)?;
        self.synced_versions
            .write()
            .insert((tenant_key.clone(), table_key.clone()), table.version());
        self.tenants.write().entry(tenant_key).or_default().insert(table_key, table);
        Ok(())
    }

    /// Remove a table from memory and the backend. Errors if it exists in
    /// neither.
    pub fn drop_table(&self, tenant: &str, name: &str) -> Result<()> {
        let tenant_key = Self::canon(tenant);
        let table_key = Self::canon(name);

        let was_in_memory = self
            .tenants
            .write()
            .get_mut(&tenant_key)
            .map(|m| m.remove(&table_key).is_some())
            .unwrap_or(false);
        let was_in_backend = self.backend.table_exists(&tenant_key, name)?;
        if !was_in_memory && !was_in_backend {
            return Err(Error::TableNotFound {
                tenant: tenant.to_string(),
                table: name.to_string(),
            });
        }

        self.backend.delete_table(&tenant_key, name)?;
        self.synced_versions.write().remove(&(tenant_key, table_key));
        Ok(())
    }

    /// The union of in-memory and backend-reported table names for a
    /// tenant, sorted for stable output.
    pub fn list_tables(&self, tenant: &str) -> Result<Vec<String>> {
        let tenant_key = Self::canon(tenant);
        let mut names: std::collections::HashSet<String> =
            self.backend.list_table_names(&tenant_key)?.into_iter().collect();
        if let Some(m) = self.tenants.read().get(&tenant_key) {
            names.extend(m.values().map(|t| t.name().to_string()));
        }
        let mut out: Vec<String> = names.into_iter().collect();
        out.sort();
        Ok(out)
    }

    /// Drop a table from memory only; the next `get` reloads it from the
    /// backend.
    pub fn evict(&self, tenant: &str, name: &str) {
        let tenant_key = Self::canon(tenant);
        if let Some(m) = self.tenants.write().get_mut(&tenant_key) {
            m.remove(&Self::canon(name));
        }
    }

    /// Persist every in-memory table whose version has moved since its last
    /// save, then flush the backend itself.
    pub fn sync(&self) -> Result<()> {
        let dirty: Vec<(TenantKey, Table)> = {
            let tenants = self.tenants.read();
            let synced = self.synced_versions.read();
            tenants
                .iter()
                .flat_map(|(tenant_key, tables)| {
                    tables.values().filter_map(move |table| {
                        let key = (tenant_key.clone(), Self::canon(table.name()));
                        let is_dirty = synced.get(&key).map_or(true, |&v| v != table.version());
                        is_dirty.then(|| (tenant_key.clone(), table.clone()))
                    })
                })
                .collect()
        };

        for (tenant_key, table) in dirty {
            self.backend.save_table(&tenant_key, &table)?;
            self.synced_versions
                .write()
                .insert((tenant_key, Self::canon(table.name())), table.version());
        }
        self.backend.sync()
    }

    /// Flush everything, then release the backend's resources. Consumes the
    /// database, matching §4.7's "close calls sync, then backend.close".
    pub fn close(self) -> Result<()> {
        self.sync()?;
        self.backend.close()
    }

    /// WAL status for backends that durability-log through one, or `None`
    /// for backends that don't.
    pub fn wal(&self) -> Option<WalStatus> {
        self.backend.wal_status()
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.backend.mode()
    }

    pub fn backend_stats(&self) -> BackendStats {
        self.backend.stats()
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Begin a transaction under the database's configured isolation level
    /// unless the caller overrides it.
    pub fn begin(&self, isolation: Option<IsolationLevel>) -> TxHandle {
        self.mvcc.begin_tx(isolation.unwrap_or(self.config.isolation_level))
    }

    pub fn commit(&self, tx: TxHandle) -> Result<Timestamp> {
        self.mvcc.commit_tx(tx)
    }

    pub fn abort(&self, tx: TxHandle) -> Result<()> {
        self.mvcc.abort_tx(tx)
    }

    /// Row-level version access for the executor, layered over the table a
    /// `get`/`put` call already materialized. See [`MvccManager`] for the
    /// visibility predicate.
    pub fn mvcc(&self) -> &MvccManager {
        &self.mvcc
    }
}
