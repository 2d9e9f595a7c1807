//! The on-disk record shape shared by both WAL flavors.
//!
//! `Record format: LSN | txid | op-type | ... | timestamp | checksum`. Every
//! flavor's payload (`Op`) is wrapped in the same `Begin`/`Mutation`/
//! `Commit`/`Abort`/`Checkpoint` envelope and framed the same way on disk —
//! a 4-byte length prefix, the bincode-encoded entry, and a trailing CRC32
//! over the entry bytes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Lsn, Result, Timestamp, TxnId};

/// Control frame every flavor shares, or a flavor-specific mutation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalRecord<Op> {
    Begin,
    Mutation(Op),
    Commit,
    Abort,
    Checkpoint,
}

/// One on-disk record: the control/mutation frame plus its LSN, owning
/// transaction, and wall-clock timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry<Op> {
    pub lsn: Lsn,
    pub txid: TxnId,
    pub timestamp: Timestamp,
    pub record: WalRecord<Op>,
}

/// Length-prefix + bincode + trailing CRC32 over the bincode bytes.
pub fn encode_entry<Op: Serialize>(entry: &WalEntry<Op>) -> Result<Vec<u8>> {
    let body = bincode::serialize(entry)?;
    let checksum = crc32fast::hash(&body);
    let mut out = Vec::with_capacity(4 + body.len() + 4);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&checksum.to_le_bytes());
    Ok(out)
}

/// Decode one entry starting at `bytes[0]`. Returns the entry and the number
/// of bytes consumed. Returns `Err(Error::WalCorrupt)` (checksum mismatch) if
/// the recorded checksum doesn't match, and `None` on a short/incomplete
/// trailing record (not yet an error: could be a torn write in progress when
/// the process died) — both cases tell the caller to stop and truncate at
/// `offset`.
pub fn decode_entry<Op: DeserializeOwned>(bytes: &[u8], offset: u64) -> Result<Option<(WalEntry<Op>, usize)>> {
    if bytes.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let total = 4 + len + 4;
    if bytes.len() < total {
        return Ok(None);
    }
    let body = &bytes[4..4 + len];
    let stored_checksum = u32::from_le_bytes(bytes[4 + len..total].try_into().unwrap());
    if crc32fast::hash(body) != stored_checksum {
        return Err(Error::WalCorrupt(offset));
    }
    let entry = bincode::deserialize(body)?;
    Ok(Some((entry, total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let entry: WalEntry<u32> = WalEntry {
            lsn: Lsn::new(1),
            txid: TxnId::new(1),
            timestamp: Timestamp::new(1),
            record: WalRecord::Mutation(42),
        };
        let bytes = encode_entry(&entry).unwrap();
        let (decoded, consumed) = decode_entry::<u32>(&bytes, 0).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.lsn, entry.lsn);
        assert!(matches!(decoded.record, WalRecord::Mutation(42)));
    }

    #[test]
    fn test_corrupt_checksum_rejected() {
        let entry: WalEntry<u32> = WalEntry {
            lsn: Lsn::new(1),
            txid: TxnId::new(1),
            timestamp: Timestamp::new(1),
            record: WalRecord::Commit,
        };
        let mut bytes = encode_entry(&entry).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(decode_entry::<u32>(&bytes, 0), Err(Error::WalCorrupt(0))));
    }

    #[test]
    fn test_short_trailing_bytes_yield_none() {
        let entry: WalEntry<u32> = WalEntry {
            lsn: Lsn::new(1),
            txid: TxnId::new(1),
            timestamp: Timestamp::new(1),
            record: WalRecord::Commit,
        };
        let bytes = encode_entry(&entry).unwrap();
        let torn = &bytes[..bytes.len() - 2];
        assert!(decode_entry::<u32>(torn, 0).unwrap().is_none());
    }
}
