//! Per-file disk backend: one encoded file per table under
//! `<root>/<tenant>/<lowercased name>.tbl[.gz]`, tracked by a `manifest.json`
//! sidecar. Durability comes from atomic file replacement on every save;
//! unlike the paged and WAL-memory backends this mode needs no WAL.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::common::config::StorageMode;
use crate::common::Result;
use crate::model::Table;

use super::{atomic_write, Backend, BackendStats};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestEntry {
    relative_path: String,
    row_count: usize,
    version: u64,
}

/// tenant -> lowercased table name -> entry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    tables: HashMap<String, HashMap<String, ManifestEntry>>,
}

#[derive(Default)]
struct Counters {
    tables_loaded: AtomicU64,
    tables_saved: AtomicU64,
    tables_deleted: AtomicU64,
    bytes_written: AtomicU64,
}

pub struct DiskBackend {
    root: PathBuf,
    compress: bool,
    manifest_path: PathBuf,
    manifest: RwLock<Manifest>,
    counters: Counters,
}

impl DiskBackend {
    pub fn open(root: impl Into<PathBuf>, compress: bool) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let manifest_path = root.join("manifest.json");
        let manifest = if manifest_path.exists() {
            serde_json::from_slice(&fs::read(&manifest_path)?)?
        } else {
            Manifest::default()
        };

        Ok(Self {
            root,
            compress,
            manifest_path,
            manifest: RwLock::new(manifest),
            counters: Counters::default(),
        })
    }

    fn table_path(&self, tenant: &str, name: &str) -> PathBuf {
        let ext = if self.compress { "tbl.gz" } else { "tbl" };
        self.root.join(tenant).join(format!("{}.{}", name.to_lowercase(), ext))
    }

    fn persist_manifest(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&*self.manifest.read())?;
        atomic_write(&self.manifest_path, &bytes)
    }
}

impl Backend for DiskBackend {
    fn load_table(&self, tenant: &str, name: &str) -> Result<Option<Table>> {
        let key = name.to_lowercase();
        let exists = self
            .manifest
            .read()
            .tables
            .get(tenant)
            .map_or(false, |t| t.contains_key(&key));
        if !exists {
            return Ok(None);
        }

        let path = self.table_path(tenant, name);
        let raw = fs::read(&path)?;
        let bytes = if self.compress {
            let mut decoder = GzDecoder::new(&raw[..]);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            out
        } else {
            raw
        };
        let table: Table = bincode::deserialize(&bytes)?;
        self.counters.tables_loaded.fetch_add(1, Ordering::Relaxed);
        Ok(Some(table))
    }

    fn save_table(&self, tenant: &str, table: &Table) -> Result<()> {
        let key = table.name().to_lowercase();
        let path = self.table_path(tenant, table.name());

        let bytes = bincode::serialize(table)?;
        let encoded = if self.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?
        } else {
            bytes
        };
        atomic_write(&path, &encoded)?;
        self.counters.bytes_written.fetch_add(encoded.len() as u64, Ordering::Relaxed);

        let relative = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        self.manifest.write().tables.entry(tenant.to_string()).or_default().insert(
            key,
            ManifestEntry {
                relative_path: relative,
                row_count: table.row_count(),
                version: table.version(),
            },
        );
        self.persist_manifest()?;
        self.counters.tables_saved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_table(&self, tenant: &str, name: &str) -> Result<()> {
        let key = name.to_lowercase();
        let removed = self.manifest.write().tables.get_mut(tenant).and_then(|t| t.remove(&key));
        if removed.is_some() {
            self.persist_manifest()?;
            let path = self.table_path(tenant, name);
            if path.exists() {
                fs::remove_file(path)?;
            }
            self.counters.tables_deleted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn list_table_names(&self, tenant: &str) -> Result<Vec<String>> {
        Ok(self
            .manifest
            .read()
            .tables
            .get(tenant)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn sync(&self) -> Result<()> {
        self.persist_manifest()
    }

    fn close(&self) -> Result<()> {
        self.persist_manifest()
    }

    fn mode(&self) -> StorageMode {
        StorageMode::Disk
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ColumnType, Value};
    use tempfile::tempdir;

    fn sample_table() -> Table {
        let mut t = Table::new("widgets", vec![Column::new("id", ColumnType::Int)]).unwrap();
        t.insert_row(vec![Some(Value::Int(1))]).unwrap();
        t
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::open(dir.path(), false).unwrap();
        backend.save_table("acme", &sample_table()).unwrap();
        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 1);
    }

    #[test]
    fn test_compressed_round_trip() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::open(dir.path(), true).unwrap();
        backend.save_table("acme", &sample_table()).unwrap();
        let loaded = backend.load_table("acme", "widgets").unwrap().unwrap();
        assert_eq!(loaded.row_count(), 1);
    }

    #[test]
    fn test_manifest_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = DiskBackend::open(dir.path(), false).unwrap();
            backend.save_table("acme", &sample_table()).unwrap();
        }
        let backend = DiskBackend::open(dir.path(), false).unwrap();
        assert_eq!(backend.list_table_names("acme").unwrap(), vec!["widgets"]);
        assert!(backend.load_table("acme", "widgets").unwrap().is_some());
    }

    #[test]
    fn test_delete_removes_file_and_manifest_entry() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::open(dir.path(), false).unwrap();
        backend.save_table("acme", &sample_table()).unwrap();
        backend.delete_table("acme", "widgets").unwrap();
        assert!(backend.load_table("acme", "widgets").unwrap().is_none());
        assert!(!backend.table_path("acme", "widgets").exists());
    }
}
