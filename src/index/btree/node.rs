//! B-tree node encoding on top of slotted pages.
//!
//! A leaf node is a slotted page of `encode_leaf_record`/`decode_leaf_record`
//! entries, keyed in sorted order. An internal node is a slotted page whose
//! records are `[child_page_id:4][key_len varint][key bytes]` separator
//! entries; `header.right_child` holds the pointer for keys greater than
//! every separator. Neither kind keeps parent pointers - the tree walks
//! root-to-leaf on every operation instead.

use crate::common::{Error, Result};
use crate::storage::page::{
    decode_leaf_record, read_varint, write_varint, DecodedRecord, Page, PageHeader, PageType,
    SlottedPage, SlottedPageRef,
};

/// Decode an internal-node separator record into `(child_page_id, key)`.
pub fn decode_separator(record: &[u8]) -> Result<(u32, &[u8])> {
    if record.len() < 4 {
        return Err(Error::Encoding("truncated separator record".into()));
    }
    let child = u32::from_le_bytes(record[0..4].try_into().unwrap());
    let (key_len, consumed) = read_varint(&record[4..])
        .ok_or_else(|| Error::Encoding("truncated separator key length".into()))?;
    let start = 4 + consumed;
    let end = start + key_len as usize;
    if record.len() < end {
        return Err(Error::Encoding("truncated separator key".into()));
    }
    Ok((child, &record[start..end]))
}

/// Encode an internal-node separator record.
pub fn encode_separator(child_page_id: u32, key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 5 + key.len());
    buf.extend_from_slice(&child_page_id.to_le_bytes());
    write_varint(&mut buf, key.len() as u64);
    buf.extend_from_slice(key);
    buf
}

/// True if `page` is a leaf (as opposed to an internal node).
pub fn is_leaf(page: &Page) -> bool {
    page.header().page_type.is_leaf()
}

/// Initialize a fresh leaf page.
pub fn init_leaf(page: &mut Page) {
    let header = PageHeader::new(PageType::BTreeLeaf, page.size());
    page.set_header(&header);
}

/// Initialize a fresh internal page.
pub fn init_internal(page: &mut Page) {
    let header = PageHeader::new(PageType::BTreeInternal, page.size());
    page.set_header(&header);
}

/// Find the child page id to descend into for `key` within an internal node.
pub fn child_for_key(page: &Page, key: &[u8]) -> Result<u32> {
    let view = SlottedPageRef::new(page);
    let count = view.slot_count();
    for i in 0..count {
        let Some(record) = view.record(i) else {
            continue;
        };
        let (child, sep_key) = decode_separator(record)?;
        if key < sep_key {
            return Ok(child);
        }
    }
    view.right_child()
        .ok_or_else(|| Error::Encoding("internal node missing right_child".into()))
}

/// The child to descend into to reach the smallest key under `page`.
pub fn leftmost_child(page: &Page) -> Result<u32> {
    let view = SlottedPageRef::new(page);
    if let Some(record) = view.record(0) {
        let (child, _) = decode_separator(record)?;
        Ok(child)
    } else {
        view.right_child()
            .ok_or_else(|| Error::Encoding("empty internal node".into()))
    }
}

/// Binary search (linear, since slots aren't kept key-sorted after splits)
/// a leaf page for `key`, returning the matching slot index and record.
pub fn leaf_find<'a>(page: &'a Page, key: &[u8]) -> Option<(u16, DecodedRecord<'a>)> {
    let view = SlottedPageRef::new(page);
    for i in 0..view.slot_count() {
        let record = view.record(i)?;
        let decoded = decode_leaf_record(record)?;
        if decoded.key == key {
            return Some((i, decoded));
        }
    }
    None
}

/// Collect `(key, separator_record_index)` pairs for every live record in a
/// node, in slot order (not necessarily key order once entries have moved
/// during splits).
pub fn all_separators(page: &Page) -> Result<Vec<(u32, Vec<u8>)>> {
    let view = SlottedPageRef::new(page);
    let mut out = Vec::with_capacity(view.slot_count() as usize);
    for i in 0..view.slot_count() {
        if let Some(record) = view.record(i) {
            let (child, key) = decode_separator(record)?;
            out.push((child, key.to_vec()));
        }
    }
    Ok(out)
}

/// Collect every live leaf record as owned `(key, value-or-overflow)` pairs,
/// used when splitting or merging a leaf.
pub fn all_leaf_records(page: &Page) -> Vec<(Vec<u8>, Vec<u8>, Option<u32>, usize)> {
    let view = SlottedPageRef::new(page);
    let mut out = Vec::with_capacity(view.slot_count() as usize);
    for i in 0..view.slot_count() {
        if let Some(record) = view.record(i) {
            if let Some(decoded) = decode_leaf_record(record) {
                out.push((
                    decoded.key.to_vec(),
                    decoded.value.to_vec(),
                    decoded.overflow_page,
                    decoded.value_len,
                ));
            }
        }
    }
    out
}

/// Encode a leaf record for storage, given the already-decoded value
/// components. When `overflow_page` is set, the real value bytes live in an
/// overflow chain and only `value_len` needs to round-trip here.
pub fn encode_stored(key: &[u8], value: &[u8], overflow_page: Option<u32>, value_len: usize) -> Vec<u8> {
    match overflow_page {
        Some(_) => crate::storage::page::encode_leaf_record(key, &vec![0u8; value_len], overflow_page),
        None => crate::storage::page::encode_leaf_record(key, value, None),
    }
}

/// Check whether `records` all fit on a single leaf page without actually
/// writing them anywhere.
pub fn leaf_records_fit(page_size: usize, records: &[(Vec<u8>, Vec<u8>, Option<u32>, usize)]) -> bool {
    let mut scratch = Page::with_size(page_size);
    init_leaf(&mut scratch);
    let mut slotted = SlottedPage::new(&mut scratch);
    for (key, value, overflow, value_len) in records {
        let encoded = encode_stored(key, value, *overflow, *value_len);
        if slotted.insert(&encoded).is_none() {
            return false;
        }
    }
    true
}

/// Rebuild a leaf page from scratch with exactly `records`, in key order.
/// Callers must have already confirmed the set fits via `leaf_records_fit`.
pub fn rewrite_leaf(page: &mut Page, records: &[(Vec<u8>, Vec<u8>, Option<u32>, usize)]) {
    init_leaf(page);
    let mut slotted = SlottedPage::new(page);
    for (key, value, overflow, value_len) in records {
        let encoded = encode_stored(key, value, *overflow, *value_len);
        slotted
            .insert(&encoded)
            .expect("rewrite_leaf: caller must verify fit with leaf_records_fit first");
    }
}

/// Check whether `separators` plus a right-child pointer fit on a single
/// internal page.
pub fn internal_records_fit(page_size: usize, separators: &[(u32, Vec<u8>)]) -> bool {
    let mut scratch = Page::with_size(page_size);
    init_internal(&mut scratch);
    let mut slotted = SlottedPage::new(&mut scratch);
    for (child, key) in separators {
        let encoded = encode_separator(*child, key);
        if slotted.insert(&encoded).is_none() {
            return false;
        }
    }
    true
}

/// Rebuild an internal page from scratch with `separators` plus a
/// `right_child` pointer, in key order.
pub fn rewrite_internal(page: &mut Page, separators: &[(u32, Vec<u8>)], right_child: u32) {
    init_internal(page);
    let mut slotted = SlottedPage::new(page);
    for (child, key) in separators {
        let encoded = encode_separator(*child, key);
        slotted
            .insert(&encoded)
            .expect("rewrite_internal: records must fit, caller already split to size");
    }
    slotted.set_right_child(Some(right_child));
}
