//! Version-chain garbage collection.

use std::sync::Arc;

use crate::common::Timestamp;
use crate::model::RowVersion;

/// Splice dead entries out of a version chain.
///
/// A version is dead once its `deleted_at` falls before `watermark`: no
/// transaction currently active or yet to begin can have a snapshot old
/// enough to need it (every live snapshot's start timestamp is ≥
/// `watermark`). Returns the new chain head, or `None` if every version —
/// including the newest — is dead, meaning the whole chain can be dropped.
pub fn gc_chain(head: &Arc<RowVersion>, watermark: Timestamp) -> Option<Arc<RowVersion>> {
    let mut retained = Vec::new();
    let mut cur = Some(head.clone());
    while let Some(v) = cur {
        let dead = matches!(v.deleted_at, Some(ts) if ts < watermark);
        if !dead {
            retained.push(RowVersion {
                xmin: v.xmin,
                xmax: v.xmax,
                created_at: v.created_at,
                deleted_at: v.deleted_at,
                data: v.data.clone(),
                prev: None,
            });
        }
        cur = v.prev.clone();
    }

    let mut chain: Option<Arc<RowVersion>> = None;
    for mut v in retained.into_iter().rev() {
        v.prev = chain.take();
        chain = Some(Arc::new(v));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TxnId;
    use crate::model::Row;

    fn version(xmin: u64, created: u64, deleted: Option<u64>, prev: Option<Arc<RowVersion>>) -> Arc<RowVersion> {
        Arc::new(RowVersion {
            xmin: TxnId::new(xmin),
            xmax: deleted.map(|_| TxnId::new(xmin + 1)),
            created_at: Timestamp::new(created),
            deleted_at: deleted.map(Timestamp::new),
            data: Row::new(1, vec![]),
            prev,
        })
    }

    #[test]
    fn test_retains_live_head_and_drops_dead_tail() {
        let oldest = version(1, 1, Some(5), None);
        let head = version(2, 5, None, Some(oldest));

        let spliced = gc_chain(&head, Timestamp::new(10)).unwrap();
        assert_eq!(spliced.xmin, TxnId::new(2));
        assert!(spliced.prev.is_none(), "dead oldest version should be spliced out");
    }

    #[test]
    fn test_entirely_dead_chain_is_dropped() {
        let oldest = version(1, 1, Some(2), None);
        let head = version(2, 2, Some(3), Some(oldest));

        assert!(gc_chain(&head, Timestamp::new(10)).is_none());
    }

    #[test]
    fn test_nothing_dead_keeps_whole_chain() {
        let oldest = version(1, 1, Some(8), None);
        let head = version(2, 8, None, Some(oldest));

        let spliced = gc_chain(&head, Timestamp::new(5)).unwrap();
        assert!(spliced.prev.is_some());
    }
}
