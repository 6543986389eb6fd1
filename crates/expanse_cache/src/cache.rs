//! Reclaimable in-memory cache of decoded range maps.
//!
//! Decoding a range map record is cheap compared to keeping every decoded
//! map alive, so entries here are disposable: the cache may drop any entry at
//! any time and a miss only means "load it again". Residency is bounded by an
//! LRU of strong references; every entry additionally keeps a [`Weak`] so a
//! map that is still in use somewhere is re-adopted instead of re-decoded.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use expanse_source::RangeMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::fingerprint::ExpansionFile;

/// Default number of strongly held range maps.
pub const DEFAULT_CAPACITY: usize = 256;

/// Hit/miss counters, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served by a strongly held entry.
    pub hits: u64,
    /// Lookups served by re-adopting a weakly held entry.
    pub revived: u64,
    /// Lookups that had to call the loader.
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
}

struct Resident {
    map: Arc<RangeMap>,
    /// Recency stamp; matches the newest `order` record for this file.
    stamp: u64,
}

struct CacheInner {
    capacity: usize,
    resident: FxHashMap<ExpansionFile, Resident>,
    /// Recency queue, oldest first. Records whose stamp no longer matches the
    /// resident entry are stale and skipped on eviction.
    order: VecDeque<(ExpansionFile, u64)>,
    weak: FxHashMap<ExpansionFile, Weak<RangeMap>>,
    next_stamp: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn touch(&mut self, file: &ExpansionFile) -> Option<Arc<RangeMap>> {
        let stamp = self.next_stamp;
        let entry = self.resident.get_mut(file)?;
        entry.stamp = stamp;
        let map = Arc::clone(&entry.map);
        self.next_stamp += 1;
        self.order.push_back((file.clone(), stamp));
        self.compact_order();
        Some(map)
    }

    fn admit(&mut self, file: ExpansionFile, map: Arc<RangeMap>) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.weak.insert(file.clone(), Arc::downgrade(&map));
        self.order.push_back((file.clone(), stamp));
        self.resident.insert(file, Resident { map, stamp });
        self.evict_over_capacity();
        self.compact_order();
    }

    fn evict_over_capacity(&mut self) {
        while self.resident.len() > self.capacity {
            let Some((file, stamp)) = self.order.pop_front() else {
                break;
            };
            if self.resident.get(&file).is_some_and(|r| r.stamp == stamp) {
                self.resident.remove(&file);
                self.stats.evictions += 1;
                tracing::debug!(%file, "evicted range map from cache");
            }
        }
        if self.weak.len() > self.capacity.saturating_mul(2) {
            self.weak.retain(|_, map| map.strong_count() > 0);
        }
    }

    /// Rebuilds the recency queue once stale records dominate it.
    fn compact_order(&mut self) {
        if self.order.len() <= self.capacity.saturating_mul(4).max(64) {
            return;
        }
        let mut live: Vec<(ExpansionFile, u64)> = self
            .resident
            .iter()
            .map(|(file, r)| (file.clone(), r.stamp))
            .collect();
        live.sort_unstable_by_key(|(_, stamp)| *stamp);
        self.order = live.into();
    }
}

/// Bounded, thread-safe cache of decoded range maps keyed by expansion file.
pub struct RangeMapCache {
    inner: Mutex<CacheInner>,
}

impl RangeMapCache {
    /// Creates a cache holding at most `capacity` maps strongly.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity: capacity.max(1),
                resident: FxHashMap::default(),
                order: VecDeque::new(),
                weak: FxHashMap::default(),
                next_stamp: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Returns the cached map without loading.
    pub fn get(&self, file: &ExpansionFile) -> Option<Arc<RangeMap>> {
        let mut inner = self.inner.lock();
        if let Some(map) = inner.touch(file) {
            inner.stats.hits += 1;
            return Some(map);
        }
        let revived = inner.weak.get(file).and_then(Weak::upgrade)?;
        inner.stats.revived += 1;
        inner.admit(file.clone(), Arc::clone(&revived));
        Some(revived)
    }

    /// Returns the cached map, or calls `loader` and caches what it produces.
    ///
    /// The loader runs without the cache lock held. A `None` from the loader
    /// is not cached: absence is always re-checked.
    pub fn get_or_load(
        &self,
        file: &ExpansionFile,
        loader: impl FnOnce() -> Option<RangeMap>,
    ) -> Option<Arc<RangeMap>> {
        if let Some(map) = self.get(file) {
            return Some(map);
        }
        self.inner.lock().stats.misses += 1;

        let map = Arc::new(loader()?);
        tracing::debug!(%file, pairs = map.len(), "loaded range map into cache");
        Some(self.insert(file.clone(), map))
    }

    /// Caches `map` for `file`, replacing any previous entry.
    pub fn insert(&self, file: ExpansionFile, map: Arc<RangeMap>) -> Arc<RangeMap> {
        self.inner.lock().admit(file, Arc::clone(&map));
        map
    }

    /// Replaces the entry for `file` only if one is currently cached.
    /// Returns `true` if an entry was replaced.
    pub fn refresh_if_resident(&self, file: &ExpansionFile, map: Arc<RangeMap>) -> bool {
        let mut inner = self.inner.lock();
        let live = inner.resident.contains_key(file)
            || inner.weak.get(file).is_some_and(|w| w.strong_count() > 0);
        if live {
            inner.admit(file.clone(), map);
        }
        live
    }

    /// Drops any entry for `file`, strong or weak.
    pub fn invalidate(&self, file: &ExpansionFile) {
        let mut inner = self.inner.lock();
        inner.resident.remove(file);
        inner.weak.remove(file);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.resident.clear();
        inner.weak.clear();
        inner.order.clear();
    }

    /// Releases every strong reference, keeping only weak ones. Maps still in
    /// use elsewhere can be re-adopted; the rest are freed.
    pub fn relieve_pressure(&self) {
        let mut inner = self.inner.lock();
        let released = inner.resident.len();
        inner.resident.clear();
        inner.order.clear();
        inner.weak.retain(|_, map| map.strong_count() > 0);
        tracing::debug!(released, "released cached range maps");
    }

    /// Number of strongly held maps.
    pub fn len(&self) -> usize {
        self.inner.lock().resident.len()
    }

    /// Returns `true` if no map is strongly held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

impl Default for RangeMapCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
