//! Physiological WAL: full page after-images, used by the paged backend.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{Lsn, PageId, Result, TxnId};

use super::engine::WalEngine;
use super::record::WalRecord;

/// A full after-image of one page, written before the in-memory frame is
/// mutated (§4.2's write path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageWrite {
    pub page_id: PageId,
    pub after: Vec<u8>,
}

pub struct PhysiologicalWal {
    engine: WalEngine<PageWrite>,
}

impl PhysiologicalWal {
    pub fn open(path: impl AsRef<Path>, checkpoint_every: u64, checkpoint_interval: Duration) -> Result<Self> {
        Ok(Self {
            engine: WalEngine::open(path, checkpoint_every, checkpoint_interval)?,
        })
    }

    pub fn log_begin(&self, tx: TxnId) -> Result<Lsn> {
        self.engine.log_begin(tx)
    }

    /// Log the full after-image of `page_id`. Called before the buffer
    /// pool's cached frame is overwritten, so a crash between the two never
    /// loses the write.
    pub fn log_write_page(&self, tx: TxnId, page_id: PageId, after: Vec<u8>) -> Result<Lsn> {
        self.engine.log_mutation(tx, PageWrite { page_id, after })
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

    /// Replay every committed transaction's page writes, in order, against
    /// `apply(page_id, after_image)`. Returns the number of pages replayed.
    pub fn recover(&self, apply: &mut dyn FnMut(PageId, &[u8])) -> Result<usize> {
        let entries = self.engine.read_all()?;

        let start = entries
            .iter()
            .rposition(|e| matches!(e.record, WalRecord::Checkpoint))
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut pending: HashMap<TxnId, Vec<PageWrite>> = HashMap::new();
        let mut replayed = 0;
        for entry in &entries[start..] {
            match &entry.record {
                WalRecord::Begin => {
                    pending.insert(entry.txid, Vec::new());
                }
                WalRecord::Mutation(write) => {
                    pending.entry(entry.txid).or_default().push(write.clone());
                }
                WalRecord::Commit => {
                    if let Some(writes) = pending.remove(&entry.txid) {
                        for write in &writes {
                            apply(write.page_id, &write.after);
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
