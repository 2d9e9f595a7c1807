//! File handling, checksum-truncation recovery, and checkpoint-trigger
//! bookkeeping shared by [`super::LogicalWal`] and [`super::PhysiologicalWal`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{Counter, Lsn, Result, Timestamp, TxnId};

use super::record::{decode_entry, encode_entry, WalEntry, WalRecord};

/// The file I/O and checkpoint-trigger plumbing common to both WAL flavors.
/// `Op` is the flavor-specific mutation payload; everything else (framing,
/// checksums, the begin/commit/abort/checkpoint envelope, the checkpoint
/// clock) is identical between them.
pub struct WalEngine<Op> {
    file: Mutex<File>,
    path: PathBuf,
    lsn_counter: Counter,
    checkpoint_every: u64,
    checkpoint_interval: Duration,
    commits_since_checkpoint: AtomicU64,
    last_checkpoint_at: Mutex<Instant>,
    _marker: PhantomData<Op>,
}

impl<Op: Serialize + DeserializeOwned + Clone> WalEngine<Op> {
    pub fn open(path: impl AsRef<Path>, checkpoint_every: u64, checkpoint_interval: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).append(true).create(true).open(&path)?;
        let engine = Self {
            file: Mutex::new(file),
            path,
            lsn_counter: Counter::default(),
            checkpoint_every,
            checkpoint_interval,
            commits_since_checkpoint: AtomicU64::new(0),
            last_checkpoint_at: Mutex::new(Instant::now()),
            _marker: PhantomData,
        };
        let max_lsn = engine.read_all()?.iter().map(|e| e.lsn.0).max().unwrap_or(0);
        if max_lsn > 0 {
            engine.lsn_counter.advance_to_at_least(max_lsn + 1);
        }
        Ok(engine)
    }

    fn append(&self, txid: TxnId, record: WalRecord<Op>) -> Result<Lsn> {
        let lsn = Lsn::new(self.lsn_counter.next());
        let entry = WalEntry {
            lsn,
            txid,
            timestamp: Timestamp::new(lsn.0),
            record,
        };
        let bytes = encode_entry(&entry)?;
        let mut file = self.file.lock();
        file.write_all(&bytes)?;
        Ok(lsn)
    }

    pub fn log_begin(&self, txid: TxnId) -> Result<Lsn> {
        self.append(txid, WalRecord::Begin)
    }

    pub fn log_mutation(&self, txid: TxnId, op: Op) -> Result<Lsn> {
        self.append(txid, WalRecord::Mutation(op))
    }

    /// Durable only once this returns: appends COMMIT and fsyncs.
    pub fn log_commit(&self, txid: TxnId) -> Result<Lsn> {
        let lsn = self.append(txid, WalRecord::Commit)?;
        self.file.lock().sync_all()?;
        self.commits_since_checkpoint.fetch_add(1, Ordering::SeqCst);
        Ok(lsn)
    }

    pub fn log_abort(&self, txid: TxnId) -> Result<Lsn> {
        let lsn = self.append(txid, WalRecord::Abort)?;
        self.file.lock().sync_all()?;
        Ok(lsn)
    }

    /// Appends a CHECKPOINT record, fsyncs, then truncates the log: every
    /// transaction committed before this point is assumed durable in the
    /// main store by the time the caller invokes this, so replaying past it
    /// is never needed again. Any transaction that was still open — never
    /// committed or aborted — is abandoned along with the truncated bytes.
    pub fn checkpoint(&self, txid: TxnId) -> Result<Lsn> {
        let lsn = self.append(txid, WalRecord::Checkpoint)?;
        let mut file = self.file.lock();
        file.sync_all()?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        drop(file);
        self.commits_since_checkpoint.store(0, Ordering::SeqCst);
        *self.last_checkpoint_at.lock() = Instant::now();
        Ok(lsn)
    }

    pub fn should_checkpoint(&self) -> bool {
        self.commits_since_checkpoint.load(Ordering::SeqCst) >= self.checkpoint_every
            || self.last_checkpoint_at.lock().elapsed() >= self.checkpoint_interval
    }

    /// Read every decodable record in file order. On a checksum mismatch or
    /// short trailing record, stop there and truncate the file to the last
    /// good offset — a torn write from a crash mid-append leaves no further
    /// records to trust.
    pub fn read_all(&self) -> Result<Vec<WalEntry<Op>>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut entries = Vec::new();
        let mut offset = 0usize;
        loop {
            match decode_entry::<Op>(&buf[offset..], offset as u64) {
                Ok(Some((entry, consumed))) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }

        if offset < buf.len() {
            file.set_len(offset as u64)?;
        }
        file.seek(SeekFrom::End(0))?;
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
