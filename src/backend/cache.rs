//! The hybrid paged backend's row cache: a memory budget, LRU eviction, a
//! pin list exempt from eviction, and an ignore list exempt from caching at
//! all.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::model::Table;

use super::estimator::Estimator;

const DEFAULT_THRESHOLD: f64 = 0.8;
const DEFAULT_BATCH_SIZE: usize = 8;

type CacheKey = (String, String);

/// Table names exempt from eviction (`pinned`) or from caching altogether
/// (`ignored`), keyed case-insensitively on the table name.
#[derive(Debug, Default, Clone)]
pub struct PinSet {
    pinned: HashSet<String>,
    ignored: HashSet<String>,
}

impl PinSet {
    pub fn pin(&mut self, table: &str) {
        self.pinned.insert(table.to_lowercase());
    }

    pub fn unpin(&mut self, table: &str) {
        self.pinned.remove(&table.to_lowercase());
    }

    pub fn ignore(&mut self, table: &str) {
        self.ignored.insert(table.to_lowercase());
    }

    pub fn is_pinned(&self, table: &str) -> bool {
        self.pinned.contains(&table.to_lowercase())
    }

    pub fn is_ignored(&self, table: &str) -> bool {
        self.ignored.contains(&table.to_lowercase())
    }
}

struct Inner {
    entries: HashMap<CacheKey, Table>,
    order: VecDeque<CacheKey>,
}

/// An LRU cache of fully materialized tables, evicted by estimated memory
/// footprint rather than entry count. Mirrors
/// [`crate::buffer::replacer::LruReplacer`]'s recency-list approach but is
/// keyed by `(tenant, table)` rather than a frame id, since this sits above
/// the page-level buffer pool, not inside it.
pub struct TableCache {
    inner: RwLock<Inner>,
    pins: RwLock<PinSet>,
    budget_bytes: u64,
    /// Evict once usage exceeds this fraction of `budget_bytes`.
    threshold: f64,
    batch_size: usize,
    used_bytes: AtomicU64,
}

impl TableCache {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            pins: RwLock::new(PinSet::default()),
            budget_bytes,
            threshold: DEFAULT_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            used_bytes: AtomicU64::new(0),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn pins(&self) -> PinSet {
        self.pins.read().clone()
    }

    pub fn pin_table(&self, table: &str) {
        self.pins.write().pin(table);
    }

    pub fn ignore_table(&self, table: &str) {
        self.pins.write().ignore(table);
    }

    pub fn get(&self, tenant: &str, table: &str) -> Option<Table> {
        let key = (tenant.to_string(), table.to_lowercase());
        let mut inner = self.inner.write();
        let found = inner.entries.get(&key).cloned();
        if found.is_some() {
            inner.order.retain(|k| k != &key);
            inner.order.push_back(key);
        }
        found
    }

    /// Insert or refresh `table`, then evict least-recently-used unpinned
    /// entries until usage is back under `threshold * budget_bytes`.
    pub fn put(&self, tenant: &str, table: Table) {
        let name_lower = table.name().to_lowercase();
        if self.pins.read().is_ignored(&name_lower) {
            return;
        }
        let key = (tenant.to_string(), name_lower);
        let size = Estimator::estimate(&table);

        {
            let mut inner = self.inner.write();
            if let Some(old) = inner.entries.insert(key.clone(), table) {
                self.subtract_used(Estimator::estimate(&old));
            }
            inner.order.retain(|k| k != &key);
            inner.order.push_back(key);
        }
        self.used_bytes.fetch_add(size, Ordering::Relaxed);

        self.evict_if_needed();
    }

    pub fn remove(&self, tenant: &str, table: &str) {
        let key = (tenant.to_string(), table.to_lowercase());
        let mut inner = self.inner.write();
        if let Some(old) = inner.entries.remove(&key) {
            inner.order.retain(|k| k != &key);
            self.subtract_used(Estimator::estimate(&old));
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    fn subtract_used(&self, amount: u64) {
        self.used_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| Some(used.saturating_sub(amount)))
            .ok();
    }

    fn evict_if_needed(&self) {
        let ceiling = (self.budget_bytes as f64 * self.threshold) as u64;
        if self.used_bytes.load(Ordering::Relaxed) <= ceiling {
            return;
        }

        let pins = self.pins.read();
        let mut inner = self.inner.write();
        let mut evicted = 0;
        let mut i = 0;
        while evicted < self.batch_size && self.used_bytes.load(Ordering::Relaxed) > ceiling && i < inner.order.len() {
            let key = inner.order[i].clone();
            if pins.is_pinned(&key.1) {
                i += 1;
                continue;
            }
            inner.order.remove(i);
            if let Some(old) = inner.entries.remove(&key) {
                self.subtract_used(Estimator::estimate(&old));
            }
            evicted += 1;
        }
    }
}
