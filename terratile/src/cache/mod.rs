//! Generic size-bounded LRU cache
//!
//! [`LruCache`] accounts capacity per entry size rather than per entry
//! count, and evicts least-recently-used entries down to a low-water mark
//! whenever an insert would exceed capacity. Recency is tracked with a
//! monotonic logical clock so eviction order is deterministic.
//!
//! The cache performs no internal locking: by convention exactly one thread
//! (the consumer thread that owns all query calls) mutates it, and worker
//! threads hand results over through a pending queue instead of touching
//! the cache directly. See [`crate::resource::ResourceCacheAdapter`].

use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;

/// Errors raised by cache construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// Capacity must be at least 1.
    #[error("cache capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// The low-water mark must be strictly below the capacity.
    #[error("low-water mark {low_water} must be less than capacity {capacity}")]
    InvalidLowWater { capacity: usize, low_water: usize },
}

/// Hook invoked once per removed entry, whether displaced, removed,
/// cleared, or evicted. The final argument is `true` only for entries
/// removed by an eviction sweep.
pub type ReleaseHook<K, V> = Box<dyn FnMut(&K, &V, bool) + Send>;

struct Entry<V> {
    value: V,
    size: usize,
    last_used: u64,
}

/// A size-bounded cache with least-recently-used eviction to a low-water
/// mark.
///
/// Eviction collects and sorts all entries by last use, which trades
/// asymptotic efficiency for simplicity; sweeps are rare relative to reads,
/// so the full sort has not shown up in profiles.
pub struct LruCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    capacity: usize,
    low_water: usize,
    used_capacity: usize,
    clock: u64,
    release_hook: Option<ReleaseHook<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates a cache with the given capacity and low-water mark, both in
    /// caller-defined size units (typically bytes).
    pub fn new(capacity: usize, low_water: usize) -> Result<Self, CacheError> {
        if capacity < 1 {
            return Err(CacheError::InvalidCapacity(capacity));
        }
        if low_water >= capacity {
            return Err(CacheError::InvalidLowWater { capacity, low_water });
        }
        Ok(Self {
            entries: HashMap::new(),
            capacity,
            low_water,
            used_capacity: 0,
            clock: 0,
            release_hook: None,
        })
    }

    /// Creates a cache with a low-water mark at 75% of capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, CacheError> {
        Self::new(capacity, capacity.saturating_mul(3) / 4)
    }

    /// Installs a hook invoked for every entry leaving the cache.
    pub fn set_release_hook(&mut self, hook: ReleaseHook<K, V>) {
        self.release_hook = Some(hook);
    }

    /// Total capacity in size units.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Eviction target in size units.
    #[inline]
    pub fn low_water(&self) -> usize {
        self.low_water
    }

    /// Sum of the sizes of all live entries.
    #[inline]
    pub fn used_capacity(&self) -> usize {
        self.used_capacity
    }

    /// Number of live entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds an entry for `key`. Does not touch recency.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.clock += 1;
        let now = self.clock;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used = now;
            &entry.value
        })
    }

    /// Inserts `value` under `key`, accounting `size` against capacity.
    ///
    /// If the insert would exceed capacity, least-recently-used entries are
    /// evicted first until usage is at or below the low-water mark and the
    /// new entry fits. A displaced entry for the same key is passed to the
    /// release hook and returned.
    ///
    /// An entry larger than the entire capacity can never be cached; it is
    /// handed to the release hook and dropped so the capacity bound holds
    /// after every put.
    pub fn put(&mut self, key: K, value: V, size: usize) -> Option<V> {
        if size > self.capacity {
            tracing::warn!(
                size,
                capacity = self.capacity,
                "cache entry exceeds total capacity, not cached"
            );
            if let Some(hook) = self.release_hook.as_mut() {
                hook(&key, &value, false);
            }
            return None;
        }

        if self.used_capacity + size > self.capacity {
            self.make_space(size);
        }

        self.clock += 1;
        let entry = Entry {
            value,
            size,
            last_used: self.clock,
        };
        self.used_capacity += size;

        let displaced = self.entries.insert(key.clone(), entry);
        displaced.map(|old| {
            self.used_capacity -= old.size;
            if let Some(hook) = self.release_hook.as_mut() {
                hook(&key, &old.value, false);
            }
            old.value
        })
    }

    /// Removes the entry for `key`, running the release hook.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| {
            self.used_capacity -= entry.size;
            if let Some(hook) = self.release_hook.as_mut() {
                hook(key, &entry.value, false);
            }
            entry.value
        })
    }

    /// Removes every entry, running the release hook for each.
    pub fn clear(&mut self) {
        for (key, entry) in self.entries.drain() {
            if let Some(hook) = self.release_hook.as_mut() {
                hook(&key, &entry.value, false);
            }
        }
        self.used_capacity = 0;
    }

    /// Evicts least-recently-used entries until usage drops to the
    /// low-water mark and `required` size units fit.
    fn make_space(&mut self, required: usize) {
        let mut order: Vec<(K, u64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_used))
            .collect();
        order.sort_by_key(|&(_, last_used)| last_used);

        let mut evicted = 0usize;
        for (key, _) in order {
            if self.used_capacity > self.low_water
                || self.capacity - self.used_capacity < required
            {
                if let Some(entry) = self.entries.remove(&key) {
                    self.used_capacity -= entry.size;
                    evicted += entry.size;
                    if let Some(hook) = self.release_hook.as_mut() {
                        hook(&key, &entry.value, true);
                    }
                }
            } else {
                break;
            }
        }

        tracing::debug!(
            evicted,
            used = self.used_capacity,
            capacity = self.capacity,
            "cache eviction sweep"
        );
    }
}
