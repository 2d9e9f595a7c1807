//! On-disk B+Tree index: a byte-string key/value store built on the
//! buffer pool.
//!
//! Keys and values are arbitrary byte strings compared lexicographically.
//! Leaves chain left-to-right via `next_leaf`/`prev_leaf` for range scans;
//! internal nodes hold separator keys plus a catch-all `right_child`. Nodes
//! carry no parent pointer, so every operation walks down from the root,
//! and inserts collect that walk so a split can propagate back up.
//!
//! Values larger than a quarter of the page size are written to an
//! overflow chain instead of inline, mirroring how [`crate::storage::page`]
//! already stores oversized leaf values.

mod node;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{Error, PageId, Result};
use crate::storage::page::{OverflowPage, OverflowPageRef, PageHeader, SlottedPage, SlottedPageRef};

/// An on-disk B+Tree keyed by arbitrary byte strings.
pub struct BTree {
    bpm: Arc<BufferPoolManager>,
    root: Mutex<PageId>,
}

impl BTree {
    /// Create a brand new, empty tree (a single leaf page).
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let mut guard = bpm.allocate_page()?;
        node::init_leaf(&mut guard);
        let root = guard.page_id();
        drop(guard);
        Ok(Self {
            bpm,
            root: Mutex::new(root),
        })
    }

    /// Reopen a tree whose root page id was persisted elsewhere (e.g. a
    /// table catalog entry).
    pub fn open(bpm: Arc<BufferPoolManager>, root: PageId) -> Self {
        Self {
            bpm,
            root: Mutex::new(root),
        }
    }

    /// The current root page id, for callers that need to persist it.
    pub fn root_page_id(&self) -> PageId {
        *self.root.lock()
    }

    /// Look up `key`, resolving an overflow chain if the value doesn't fit
    /// inline.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let leaf_pid = self.find_leaf(key)?;
        let guard = self.bpm.fetch_page_read(leaf_pid)?;
        match node::leaf_find(&guard, key) {
            None => Ok(None),
            Some((_, decoded)) => match decoded.overflow_page {
                Some(head) => {
                    let value_len = decoded.value_len;
                    drop(guard);
                    Ok(Some(self.read_overflow(head, value_len)?))
                }
                None => Ok(Some(decoded.value.to_vec())),
            },
        }
    }

    /// Insert or overwrite `key` with `value`, splitting nodes as needed.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let path = self.descend_path(key)?;
        let leaf_pid = *path.last().expect("descend_path always returns at least the root");

        let mut pending = self.insert_into_leaf(leaf_pid, key, value)?;
        let mut old_child = leaf_pid.0;

        for &ancestor_pid in path[..path.len() - 1].iter().rev() {
            let Some((sep_key, new_child)) = pending.take() else {
                break;
            };
            pending = self.insert_into_internal(ancestor_pid, old_child, &sep_key, new_child)?;
            old_child = ancestor_pid.0;
        }

        if let Some((sep_key, new_child)) = pending {
            let mut new_root = self.bpm.allocate_page()?;
            let new_root_pid = new_root.page_id();
            node::rewrite_internal(&mut new_root, &[(old_child, sep_key)], new_child);
            drop(new_root);
            *self.root.lock() = new_root_pid;
        }

        Ok(())
    }

    /// Remove `key`, returning whether it was present. Underfull leaves are
    /// left as-is rather than merged with a sibling - the tree trades a
    /// little wasted space after heavy deletion for not having to chase
    /// parent pointers we don't keep.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let leaf_pid = self.find_leaf(key)?;
        let mut guard = self.bpm.fetch_page_write(leaf_pid)?;

        let (idx, overflow) = match node::leaf_find(&guard, key) {
            Some((idx, decoded)) => (idx, decoded.overflow_page),
            None => return Ok(false),
        };

        let mut slotted = SlottedPage::new(&mut guard);
        slotted.delete(idx);
        drop(guard);

        if let Some(head) = overflow {
            self.free_overflow_chain(head)?;
        }

        Ok(true)
    }

    /// Collect every `(key, value)` pair with `start <= key < end`. Either
    /// bound may be omitted to scan from the first or to the last key.
    pub fn scan_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut pid = match start {
            Some(key) => self.find_leaf(key)?,
            None => self.leftmost_leaf()?,
        };

        let mut out = Vec::new();
        loop {
            let (records, next) = {
                let guard = self.bpm.fetch_page_read(pid)?;
                (node::all_leaf_records(&guard), SlottedPageRef::new(&guard).next_leaf())
            };

            for (key, value, overflow, value_len) in records {
                if let Some(s) = start {
                    if key.as_slice() < s {
                        continue;
                    }
                }
                if let Some(e) = end {
                    if key.as_slice() >= e {
                        return Ok(out);
                    }
                }
                let full_value = match overflow {
                    Some(head) => self.read_overflow(head, value_len)?,
                    None => value,
                };
                out.push((key, full_value));
            }

            match next {
                Some(n) => pid = PageId::new(n),
                None => break,
            }
        }

        Ok(out)
    }

    /// Count live entries by walking every leaf.
    pub fn count(&self) -> Result<usize> {
        let mut pid = self.leftmost_leaf()?;
        let mut total = 0usize;
        loop {
            let (live, next) = {
                let guard = self.bpm.fetch_page_read(pid)?;
                let view = SlottedPageRef::new(&guard);
                let live = (0..view.slot_count()).filter(|&i| view.record(i).is_some()).count();
                (live, view.next_leaf())
            };
            total += live;
            match next {
                Some(n) => pid = PageId::new(n),
                None => break,
            }
        }
        Ok(total)
    }

    /// Free every page belonging to this tree, including overflow chains.
    /// The tree must not be used afterward.
    pub fn free_all_pages(&self) -> Result<()> {
        self.free_subtree(*self.root.lock())
    }

    // ========================================================================
    // Internal: traversal
    // ========================================================================

    fn find_leaf(&self, key: &[u8]) -> Result<PageId> {
        let mut pid = *self.root.lock();
        loop {
            let guard = self.bpm.fetch_page_read(pid)?;
            if node::is_leaf(&guard) {
                return Ok(pid);
            }
            let child = node::child_for_key(&guard, key)?;
            drop(guard);
            pid = PageId::new(child);
        }
    }

    /// Like `find_leaf`, but returns every page visited root-to-leaf so an
    /// insert-triggered split can propagate separators back up.
    fn descend_path(&self, key: &[u8]) -> Result<Vec<PageId>> {
        let mut path = vec![*self.root.lock()];
        loop {
            let pid = *path.last().unwrap();
            let guard = self.bpm.fetch_page_read(pid)?;
            if node::is_leaf(&guard) {
                break;
            }
            let child = node::child_for_key(&guard, key)?;
            drop(guard);
            path.push(PageId::new(child));
        }
        Ok(path)
    }

    fn leftmost_leaf(&self) -> Result<PageId> {
        let mut pid = *self.root.lock();
        loop {
            let (is_leaf, child) = {
                let guard = self.bpm.fetch_page_read(pid)?;
                if node::is_leaf(&guard) {
                    (true, 0)
                } else {
                    (false, node::leftmost_child(&guard)?)
                }
            };
            if is_leaf {
                return Ok(pid);
            }
            pid = PageId::new(child);
        }
    }

    fn free_subtree(&self, pid: PageId) -> Result<()> {
        enum Contents {
            Leaf { overflow_heads: Vec<u32> },
            Internal { children: Vec<u32> },
        }

        let contents = {
            let guard = self.bpm.fetch_page_read(pid)?;
            if node::is_leaf(&guard) {
                let overflow_heads = node::all_leaf_records(&guard)
                    .into_iter()
                    .filter_map(|(_, _, overflow, _)| overflow)
                    .collect();
                Contents::Leaf { overflow_heads }
            } else {
                let mut children: Vec<u32> = node::all_separators(&guard)?
                    .into_iter()
                    .map(|(child, _)| child)
                    .collect();
                children.push(
                    SlottedPageRef::new(&guard)
                        .right_child()
                        .ok_or_else(|| Error::Encoding("internal node missing right_child".into()))?,
                );
                Contents::Internal { children }
            }
        };

        match contents {
            Contents::Leaf { overflow_heads } => {
                for head in overflow_heads {
                    self.free_overflow_chain(head)?;
                }
            }
            Contents::Internal { children } => {
                for child in children {
                    self.free_subtree(PageId::new(child))?;
                }
            }
        }

        self.bpm.free_page(pid)
    }

    // ========================================================================
    // Internal: leaf and internal-node mutation
    // ========================================================================

    fn insert_into_leaf(&self, leaf_pid: PageId, key: &[u8], value: &[u8]) -> Result<Option<(Vec<u8>, u32)>> {
        let page_size = self.bpm.page_size();
        let mut records = {
            let guard = self.bpm.fetch_page_read(leaf_pid)?;
            node::all_leaf_records(&guard)
        };

        if let Some(pos) = records.iter().position(|(k, _, _, _)| k.as_slice() == key) {
            let (_, _, overflow, _) = records.remove(pos);
            if let Some(head) = overflow {
                self.free_overflow_chain(head)?;
            }
        }

        // Values past a quarter of the page live in an overflow chain, the
        // same threshold a single large row column would need anyway.
        let overflow_threshold = page_size / 4;
        let (stored_value, overflow_page, value_len) = if value.len() > overflow_threshold {
            (Vec::new(), Some(self.write_overflow(value)?), value.len())
        } else {
            (value.to_vec(), None, value.len())
        };

        let insert_at = records.partition_point(|(k, _, _, _)| k.as_slice() < key);
        records.insert(insert_at, (key.to_vec(), stored_value, overflow_page, value_len));

        if node::leaf_records_fit(page_size, &records) {
            let mut guard = self.bpm.fetch_page_write(leaf_pid)?;
            let (prev, next) = {
                let view = SlottedPageRef::new(&guard);
                (view.prev_leaf(), view.next_leaf())
            };
            node::rewrite_leaf(&mut guard, &records);
            let mut slotted = SlottedPage::new(&mut guard);
            slotted.set_prev_leaf(prev);
            slotted.set_next_leaf(next);
            return Ok(None);
        }

        let mid = records.len() / 2;
        let right_records = records.split_off(mid);
        let left_records = records;
        let separator_key = right_records[0].0.clone();

        let old_next = {
            let guard = self.bpm.fetch_page_read(leaf_pid)?;
            SlottedPageRef::new(&guard).next_leaf()
        };
        let old_prev = {
            let guard = self.bpm.fetch_page_read(leaf_pid)?;
            SlottedPageRef::new(&guard).prev_leaf()
        };

        let new_right_pid = {
            let mut guard = self.bpm.allocate_page()?;
            node::rewrite_leaf(&mut guard, &right_records);
            let mut slotted = SlottedPage::new(&mut guard);
            slotted.set_prev_leaf(Some(leaf_pid.0));
            slotted.set_next_leaf(old_next);
            guard.page_id().0
        };

        {
            let mut guard = self.bpm.fetch_page_write(leaf_pid)?;
            node::rewrite_leaf(&mut guard, &left_records);
            let mut slotted = SlottedPage::new(&mut guard);
            slotted.set_prev_leaf(old_prev);
            slotted.set_next_leaf(Some(new_right_pid));
        }

        if let Some(next_id) = old_next {
            let mut guard = self.bpm.fetch_page_write(PageId::new(next_id))?;
            let mut slotted = SlottedPage::new(&mut guard);
            slotted.set_prev_leaf(Some(new_right_pid));
        }

        Ok(Some((separator_key, new_right_pid)))
    }

    fn insert_into_internal(
        &self,
        pid: PageId,
        old_child: u32,
        sep_key: &[u8],
        new_child: u32,
    ) -> Result<Option<(Vec<u8>, u32)>> {
        let (mut separators, right_child) = {
            let guard = self.bpm.fetch_page_read(pid)?;
            let seps = node::all_separators(&guard)?;
            let rc = SlottedPageRef::new(&guard)
                .right_child()
                .ok_or_else(|| Error::Encoding("internal node missing right_child".into()))?;
            (seps, rc)
        };

        // The child that just split was referenced either by an existing
        // separator or by `right_child`. Either way, the split's upper half
        // (`new_child`) takes over that exact slot, and a fresh separator
        // for `sep_key` is inserted pointing at the original (lower) half.
        let new_right_child = if right_child == old_child {
            separators.push((old_child, sep_key.to_vec()));
            new_child
        } else {
            let idx = separators
                .iter()
                .position(|(child, _)| *child == old_child)
                .ok_or_else(|| Error::Encoding("split child not found in parent node".into()))?;
            separators[idx].0 = new_child;
            separators.insert(idx, (old_child, sep_key.to_vec()));
            right_child
        };

        let page_size = self.bpm.page_size();
        if node::internal_records_fit(page_size, &separators) {
            let mut guard = self.bpm.fetch_page_write(pid)?;
            node::rewrite_internal(&mut guard, &separators, new_right_child);
            return Ok(None);
        }

        let n = separators.len();
        let mid = n / 2;
        let promoted_key = separators[mid].1.clone();
        let left_right_child = separators[mid].0;
        let left_seps = separators[..mid].to_vec();
        let right_seps = separators[mid + 1..].to_vec();

        {
            let mut guard = self.bpm.fetch_page_write(pid)?;
            node::rewrite_internal(&mut guard, &left_seps, left_right_child);
        }
        let new_right_pid = {
            let mut guard = self.bpm.allocate_page()?;
            node::rewrite_internal(&mut guard, &right_seps, new_right_child);
            guard.page_id().0
        };

        Ok(Some((promoted_key, new_right_pid)))
    }

    // ========================================================================
    // Internal: overflow chains for oversized values
    // ========================================================================

    fn write_overflow(&self, value: &[u8]) -> Result<u32> {
        let capacity = self.bpm.page_size() - PageHeader::SIZE;
        let mut chunks: Vec<&[u8]> = value.chunks(capacity.max(1)).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        let mut next_id: Option<u32> = None;
        for chunk in chunks.into_iter().rev() {
            let mut guard = self.bpm.allocate_page()?;
            OverflowPage::init(&mut guard);
            {
                let mut page = OverflowPage::new(&mut guard);
                page.write_body(chunk);
                page.set_next(next_id);
            }
            next_id = Some(guard.page_id().0);
        }

        Ok(next_id.expect("at least one overflow chunk is always written"))
    }

    fn read_overflow(&self, head: u32, total_len: usize) -> Result<Vec<u8>> {
        let capacity = self.bpm.page_size() - PageHeader::SIZE;
        let mut out = Vec::with_capacity(total_len);
        let mut cur = Some(head);

        while let Some(id) = cur {
            let guard = self.bpm.fetch_page_read(PageId::new(id))?;
            let view = OverflowPageRef::new(&guard);
            let remaining = total_len - out.len();
            let take = remaining.min(capacity);
            out.extend_from_slice(view.read_body(take));
            cur = view.next();
        }

        Ok(out)
    }

    fn free_overflow_chain(&self, head: u32) -> Result<()> {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let pid = PageId::new(id);
            let next = {
                let guard = self.bpm.fetch_page_read(pid)?;
                OverflowPageRef::new(&guard).next()
            };
            self.bpm.free_page(pid)?;
            cur = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskManager;

    fn create_tree(pool_size: usize, page_size: u32) -> (BTree, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btree.db");
        let dm = DiskManager::create(&path, page_size).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
        (BTree::new(bpm).unwrap(), dir)
    }

    #[test]
    fn test_insert_and_get() {
        let (tree, _dir) = create_tree(64, 4096);
        tree.insert(b"alice", b"30").unwrap();
        tree.insert(b"bob", b"25").unwrap();
        assert_eq!(tree.get(b"alice").unwrap(), Some(b"30".to_vec()));
        assert_eq!(tree.get(b"bob").unwrap(), Some(b"25".to_vec()));
        assert_eq!(tree.get(b"carol").unwrap(), None);
    }

    #[test]
    fn test_overwrite_existing_key() {
        let (tree, _dir) = create_tree(64, 4096);
        tree.insert(b"k", b"v1").unwrap();
        tree.insert(b"k", b"v2").unwrap();
        assert_eq!(tree.get(b"k").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(tree.count().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let (tree, _dir) = create_tree(64, 4096);
        tree.insert(b"k", b"v").unwrap();
        assert!(tree.delete(b"k").unwrap());
        assert_eq!(tree.get(b"k").unwrap(), None);
        assert!(!tree.delete(b"k").unwrap());
    }

    #[test]
    fn test_split_leaf_and_scan_in_order() {
        let (tree, _dir) = create_tree(256, 256);
        let mut keys: Vec<String> = (0..200).map(|i| format!("key{:04}", i)).collect();
        for (i, k) in keys.iter().enumerate() {
            tree.insert(k.as_bytes(), format!("val{i}").as_bytes()).unwrap();
        }
        keys.sort();

        let scanned = tree.scan_range(None, None).unwrap();
        let scanned_keys: Vec<String> = scanned
            .iter()
            .map(|(k, _)| String::from_utf8(k.clone()).unwrap())
            .collect();
        assert_eq!(scanned_keys, keys);
        assert_eq!(tree.count().unwrap(), 200);
    }

    #[test]
    fn test_scan_range_bounds() {
        let (tree, _dir) = create_tree(256, 256);
        for i in 0..50u32 {
            let key = format!("k{:03}", i);
            tree.insert(key.as_bytes(), b"v").unwrap();
        }
        let result = tree.scan_range(Some(b"k010"), Some(b"k020")).unwrap();
        assert_eq!(result.len(), 10);
        assert_eq!(result[0].0, b"k010");
        assert_eq!(result.last().unwrap().0, b"k019");
    }

    #[test]
    fn test_overflow_value_roundtrip() {
        let (tree, _dir) = create_tree(64, 512);
        let big_value = vec![0x5Au8; 2000];
        tree.insert(b"big", &big_value).unwrap();
        assert_eq!(tree.get(b"big").unwrap(), Some(big_value));
    }

    #[test]
    fn test_delete_frees_overflow_chain() {
        let (tree, _dir) = create_tree(64, 512);
        let big_value = vec![0x11u8; 3000];
        tree.insert(b"big", &big_value).unwrap();
        assert!(tree.delete(b"big").unwrap());
        assert_eq!(tree.get(b"big").unwrap(), None);
    }

    #[test]
    fn test_many_inserts_cause_root_split() {
        let (tree, _dir) = create_tree(512, 128);
        for i in 0..500u32 {
            let key = i.to_be_bytes();
            tree.insert(&key, b"x").unwrap();
        }
        assert_eq!(tree.count().unwrap(), 500);
        for i in 0..500u32 {
            let key = i.to_be_bytes();
            assert_eq!(tree.get(&key).unwrap(), Some(b"x".to_vec()));
        }
    }

    #[test]
    fn test_free_all_pages_does_not_error() {
        let (tree, _dir) = create_tree(256, 256);
        for i in 0..100u32 {
            tree.insert(&i.to_be_bytes(), b"v").unwrap();
        }
        tree.free_all_pages().unwrap();
    }
}
