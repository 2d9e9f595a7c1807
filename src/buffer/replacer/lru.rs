//! Least-recently-used page replacement policy.
//!
//! The spec's default eviction policy. Unlike [`super::FifoReplacer`],
//! re-accessing a frame moves it to the most-recently-used end, so a hot
//! frame that's accessed repeatedly is never the next victim.

use std::collections::{HashSet, VecDeque};

use crate::common::{FrameId, PageId};

/// LRU replacement policy.
///
/// `order` holds every tracked frame from least- to most-recently accessed;
/// `evictable` is the subset currently unpinned. Eviction scans `order`
/// front-to-back for the first evictable entry — O(n) in the pool size, the
/// same trade-off the teacher's `FifoReplacer` already makes for simplicity
/// over a doubly-linked intrusive list.
pub struct LruReplacer {
    order: VecDeque<FrameId>,
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
            evictable: HashSet::new(),
        }
    }

    /// Record an access, moving `frame_id` to the most-recently-used end.
    pub fn record_access(&mut self, frame_id: FrameId, _page_id: PageId) {
        self.order.retain(|&f| f != frame_id);
        self.order.push_back(frame_id);
    }

    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Evict the least-recently-used evictable frame.
    pub fn evict(&mut self) -> Option<FrameId> {
        let position = self.order.iter().position(|f| self.evictable.contains(f))?;
        let frame_id = self.order.remove(position)?;
        self.evictable.remove(&frame_id);
        Some(frame_id)
    }

    pub fn remove(&mut self, frame_id: FrameId) {
        self.order.retain(|&f| f != frame_id);
        self.evictable.remove(&frame_id);
    }

    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
