//! Logical WAL: per-transaction table diffs, used by the memory and
//! per-file-backed backends.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{Lsn, Result, TxnId};
use crate::model::Row;

use super::engine::WalEngine;
use super::record::WalRecord;

/// A single row mutation, carrying whichever before/after image its kind
/// needs: `Insert` only an after-image, `Delete` only a before-image,
/// `Update` both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogicalOp {
    Insert {
        tenant: String,
        table: String,
        row_id: u64,
        after: Row,
    },
    Update {
        tenant: String,
        table: String,
        row_id: u64,
        before: Row,
        after: Row,
    },
    Delete {
        tenant: String,
        table: String,
        row_id: u64,
        before: Row,
    },
}

pub struct LogicalWal {
    engine: WalEngine<LogicalOp>,
}

impl LogicalWal {
    pub fn open(path: impl AsRef<Path>, checkpoint_every: u64, checkpoint_interval: Duration) -> Result<Self> {
        Ok(Self {
            engine: WalEngine::open(path, checkpoint_every, checkpoint_interval)?,
        })
    }

    pub fn log_begin(&self, tx: TxnId) -> Result<Lsn> {
        self.engine.log_begin(tx)
    }

    pub fn log_insert(&self, tx: TxnId, tenant: &str, table: &str, row_id: u64, after: Row) -> Result<Lsn> {
        self.engine.log_mutation(
            tx,
            LogicalOp::Insert {
                tenant: tenant.to_string(),
                table: table.to_string(),
                row_id,
                after,
            },
        )
    }

    pub fn log_update(&self, tx: TxnId, tenant: &str, table: &str, row_id: u64, before: Row, after: Row) -> Result<Lsn> {
        self.engine.log_mutation(
            tx,
            LogicalOp::Update {
                tenant: tenant.to_string(),
                table: table.to_string(),
                row_id,
                before,
                after,
            },
        )
    }

    pub fn log_delete(&self, tx: TxnId, tenant: &str, table: &str, row_id: u64, before: Row) -> Result<Lsn> {
        self.engine.log_mutation(
            tx,
            LogicalOp::Delete {
                tenant: tenant.to_string(),
                table: table.to_string(),
                row_id,
                before,
            },
        )
    }

    pub fn log_commit(&self, tx: TxnId) -> Result<Lsn> {
        self.engine.log_commit(tx)
    }

    pub fn log_abort(&self, tx: TxnId) -> Result<Lsn> {
        self.engine.log_abort(tx)
    }

    pub fn checkpoint(&self, tx: TxnId) -> Result<Lsn> {
        self.engine.checkpoint(tx)
    }

    pub fn should_checkpoint(&self) -> bool {
        self.engine.should_checkpoint()
    }

    /// Replay every committed transaction's operations, in order, against
    /// `apply`. Transactions with no matching COMMIT (still pending, or
    /// explicitly aborted) are discarded. Returns the number of operations
    /// replayed.
    pub fn recover(&self, apply: &mut dyn FnMut(&LogicalOp)) -> Result<usize> {
        let entries = self.engine.read_all()?;

        let start = entries
            .iter()
            .rposition(|e| matches!(e.record, WalRecord::Checkpoint))
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut pending: HashMap<TxnId, Vec<LogicalOp>> = HashMap::new();
        let mut replayed = 0;
        for entry in &entries[start..] {
            match &entry.record {
                WalRecord::Begin => {
                    pending.insert(entry.txid, Vec::new());
                }
                WalRecord::Mutation(op) => {
                    pending.entry(entry.txid).or_default().push(op.clone());
                }
                WalRecord::Commit => {
                    if let Some(ops) = pending.remove(&entry.txid) {
                        for op in &ops {
                            apply(op);
                            replayed += 1;
                        }
                    }
                }
                WalRecord::Abort => {
                    pending.remove(&entry.txid);
                }
                WalRecord::Checkpoint => {
                    pending.clear();
                }
            }
        }
        Ok(replayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(id: u64) -> Row {
        Row::new(id, vec![])
    }

    #[test]
    fn test_committed_transaction_is_replayed() {
        let dir = tempdir().unwrap();
        let wal = LogicalWal::open(dir.path().join("wal.log"), 32, Duration::from_secs(30)).unwrap();

        let tx = TxnId::new(1);
        wal.log_begin(tx).unwrap();
        wal.log_insert(tx, "acme", "widgets", 1, row(1)).unwrap();
        wal.log_commit(tx).unwrap();

        let mut applied = Vec::new();
        let replayed = wal.recover(&mut |op| applied.push(op.clone())).unwrap();
        assert_eq!(replayed, 1);
        assert!(matches!(applied[0], LogicalOp::Insert { row_id: 1, .. }));
    }

    #[test]
    fn test_uncommitted_transaction_is_discarded() {
        let dir = tempdir().unwrap();
        let wal = LogicalWal::open(dir.path().join("wal.log"), 32, Duration::from_secs(30)).unwrap();

        let tx = TxnId::new(1);
        wal.log_begin(tx).unwrap();
        wal.log_insert(tx, "acme", "widgets", 1, row(1)).unwrap();
        // no commit

        let mut applied = Vec::new();
        let replayed = wal.recover(&mut |op| applied.push(op.clone())).unwrap();
        assert_eq!(replayed, 0);
    }

    #[test]
    fn test_aborted_transaction_is_discarded() {
        let dir = tempdir().unwrap();
        let wal = LogicalWal::open(dir.path().join("wal.log"), 32, Duration::from_secs(30)).unwrap();

        let tx = TxnId::new(1);
        wal.log_begin(tx).unwrap();
        wal.log_delete(tx, "acme", "widgets", 1, row(1)).unwrap();
        wal.log_abort(tx).unwrap();

        let mut applied = Vec::new();
        assert_eq!(wal.recover(&mut |op| applied.push(op.clone())).unwrap(), 0);
    }

    #[test]
    fn test_checkpoint_drops_prior_history() {
        let dir = tempdir().unwrap();
        let wal = LogicalWal::open(dir.path().join("wal.log"), 32, Duration::from_secs(30)).unwrap();

        let tx1 = TxnId::new(1);
        wal.log_begin(tx1).unwrap();
        wal.log_insert(tx1, "acme", "widgets", 1, row(1)).unwrap();
        wal.log_commit(tx1).unwrap();
        wal.checkpoint(tx1).unwrap();

        let mut applied = Vec::new();
        assert_eq!(wal.recover(&mut |op| applied.push(op.clone())).unwrap(), 0);
    }

    #[test]
    fn test_should_checkpoint_after_threshold_commits() {
        let dir = tempdir().unwrap();
        let wal = LogicalWal::open(dir.path().join("wal.log"), 2, Duration::from_secs(3600)).unwrap();

        for i in 1..=2u64 {
            let tx = TxnId::new(i);
            wal.log_begin(tx).unwrap();
            wal.log_commit(tx).unwrap();
        }
        assert!(wal.should_checkpoint());
    }

    #[test]
    fn test_corrupt_tail_is_truncated_and_earlier_commits_survive() {
        use std::fs::OpenOptions;
        use std::io::Write as _;

        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let wal = LogicalWal::open(&path, 32, Duration::from_secs(30)).unwrap();

        let tx = TxnId::new(1);
        wal.log_begin(tx).unwrap();
        wal.log_insert(tx, "acme", "widgets", 1, row(1)).unwrap();
        wal.log_commit(tx).unwrap();
        drop(wal);

        // Simulate a crash mid-append: garbage bytes with no valid trailer.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02]).unwrap();
        drop(file);

        let wal = LogicalWal::open(&path, 32, Duration::from_secs(30)).unwrap();
        let mut applied = Vec::new();
        let replayed = wal.recover(&mut |op| applied.push(op.clone())).unwrap();
        assert_eq!(replayed, 1);
    }
}
