//! Transaction ids, snapshots, visibility, and version-chain GC.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::config::IsolationLevel;
use crate::common::{Counter, Error, Result, Timestamp, TxnId};
use crate::model::RowVersion;

use super::transaction::{RowKey, TxHandle, TxState, TxStatus};
use super::version::gc_chain;

/// `begin_tx`/`commit_tx`/`abort_tx`/`is_visible`/`gc_watermark`, plus the
/// version chains themselves — keyed by `(tenant, table, row id)` — since GC
/// needs the same watermark computation the commit path already maintains.
///
/// Storage backends own the *current* row (`model::Table`); this manager
/// owns the MVCC *history* layered on top of it.
pub struct MvccManager {
    txn_counter: Counter,
    ts_counter: Counter,
    active: RwLock<HashMap<TxnId, TxState>>,
    start_ts: RwLock<HashMap<TxnId, Timestamp>>,
    committed: RwLock<HashMap<TxnId, Timestamp>>,
    /// `(commit_ts, write_set)` for transactions still young enough that an
    /// active transaction's serializable check might need them.
    committed_write_sets: RwLock<Vec<(Timestamp, HashSet<RowKey>)>>,
    versions: RwLock<HashMap<RowKey, Arc<RowVersion>>>,
}

impl MvccManager {
    pub fn new() -> Self {
        Self {
            txn_counter: Counter::default(),
            ts_counter: Counter::default(),
            active: RwLock::new(HashMap::new()),
            start_ts: RwLock::new(HashMap::new()),
            committed: RwLock::new(HashMap::new()),
            committed_write_sets: RwLock::new(Vec::new()),
            versions: RwLock::new(HashMap::new()),
        }
    }

    pub fn begin_tx(&self, isolation: IsolationLevel) -> TxHandle {
        let txid = TxnId::new(self.txn_counter.next());
        let start_ts = Timestamp::new(self.ts_counter.next());
        self.active.write().insert(txid, TxState::default());
        self.start_ts.write().insert(txid, start_ts);
        TxHandle { txid, start_ts, isolation }
    }

    pub fn record_read(&self, tx: &TxHandle, key: RowKey) {
        if let Some(state) = self.active.write().get_mut(&tx.txid) {
            state.read_set.insert(key);
        }
    }

    pub fn record_write(&self, tx: &TxHandle, key: RowKey) {
        if let Some(state) = self.active.write().get_mut(&tx.txid) {
            state.write_set.insert(key);
        }
    }

    /// Install `version` as the new chain head for `key`. Callers build the
    /// updated `RowVersion` (via `RowVersion::new`/`mark_deleted`) themselves
    /// and hand the result here.
    pub fn set_version(&self, key: RowKey, version: Arc<RowVersion>) {
        self.versions.write().insert(key, version);
    }

    pub fn version(&self, key: &RowKey) -> Option<Arc<RowVersion>> {
        self.versions.read().get(key).cloned()
    }

    fn status_of(&self, txid: TxnId) -> TxStatus {
        if let Some(&ts) = self.committed.read().get(&txid) {
            return TxStatus::Committed(ts);
        }
        if self.active.read().contains_key(&txid) {
            return TxStatus::InProgress;
        }
        TxStatus::Aborted
    }

    /// The visibility predicate: `v.xmin == T.id` (T's own write, unless T
    /// also deleted it), or `v.xmin` committed at-or-before `T`'s snapshot
    /// and `v.xmax` either unset, uncommitted, or committed after it.
    pub fn is_visible(&self, tx: &TxHandle, version: &RowVersion) -> bool {
        if version.xmin == tx.txid {
            return version.xmax != Some(tx.txid);
        }

        let xmin_visible = matches!(
            self.status_of(version.xmin),
            TxStatus::Committed(ts) if ts <= tx.start_ts
        );
        if !xmin_visible {
            return false;
        }

        match version.xmax {
            None => true,
            Some(xmax) => match self.status_of(xmax) {
                TxStatus::InProgress | TxStatus::Aborted => true,
                TxStatus::Committed(ts) => ts > tx.start_ts,
            },
        }
    }

    /// Walk `key`'s chain newest-to-oldest and return the first version
    /// visible to `tx`, recording the read for the serializable check.
    pub fn visible_version(&self, tx: &TxHandle, key: &RowKey) -> Option<Arc<RowVersion>> {
        self.record_read(tx, key.clone());
        let mut cur = self.version(key);
        while let Some(v) = cur {
            if self.is_visible(tx, &v) {
                return Some(v);
            }
            cur = v.prev.clone();
        }
        None
    }

    /// Commit `tx`. For serializable isolation, aborts with
    /// `Error::Serialization` if any transaction that committed after
    /// `tx.start_ts` wrote to a row in `tx`'s read set.
    pub fn commit_tx(&self, tx: TxHandle) -> Result<Timestamp> {
        let state = self
            .active
            .read()
            .get(&tx.txid)
            .cloned()
            .ok_or(Error::TxNotActive(tx.txid.0))?;

        if tx.isolation == IsolationLevel::Serializable && !state.read_set.is_empty() {
            let conflict = self
                .committed_write_sets
                .read()
                .iter()
                .any(|(commit_ts, write_set)| {
                    *commit_ts > tx.start_ts && state.read_set.iter().any(|k| write_set.contains(k))
                });
            if conflict {
                self.abort_tx(tx)?;
                return Err(Error::Serialization);
            }
        }

        let commit_ts = Timestamp::new(self.ts_counter.next());
        self.committed.write().insert(tx.txid, commit_ts);
        if !state.write_set.is_empty() {
            self.committed_write_sets.write().push((commit_ts, state.write_set));
        }
        self.active.write().remove(&tx.txid);
        self.start_ts.write().remove(&tx.txid);
        self.run_gc();
        Ok(commit_ts)
    }

    pub fn abort_tx(&self, tx: TxHandle) -> Result<()> {
        if self.active.write().remove(&tx.txid).is_none() {
            return Err(Error::TxNotActive(tx.txid.0));
        }
        self.start_ts.write().remove(&tx.txid);
        Ok(())
    }

    /// `min(active start timestamps)`, or the current timestamp if none are
    /// active.
    pub fn gc_watermark(&self) -> Timestamp {
        self.start_ts
            .read()
            .values()
            .copied()
            .min()
            .unwrap_or_else(|| Timestamp::new(self.ts_counter.peek()))
    }

    /// Splice dead segments out of every version chain, drop entirely-dead
    /// chains, and prune committed write-sets no serializable check can still
    /// need.
    pub fn run_gc(&self) {
        let watermark = self.gc_watermark();

        let mut versions = self.versions.write();
        let keys: Vec<RowKey> = versions.keys().cloned().collect();
        for key in keys {
            let head = versions.get(&key).expect("key just read from this map").clone();
            match gc_chain(&head, watermark) {
                Some(spliced) => {
                    versions.insert(key, spliced);
                }
                None => {
                    versions.remove(&key);
                }
            }
        }
        drop(versions);

        self.committed_write_sets.write().retain(|(ts, _)| *ts >= watermark);
    }
}

impl Default for MvccManager {
    fn default() -> Self {
        Self::new()
    }
}
