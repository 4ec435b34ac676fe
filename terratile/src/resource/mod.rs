//! Cache-plus-retriever pairing with single-writer discipline
//!
//! [`ResourceCacheAdapter`] combines an [`LruCache`] with a [`Retriever`]
//! behind a single non-blocking lookup call. Worker threads never touch
//! the cache; their results arrive on the retriever's outcome channel (the
//! pending queue) and are merged into the cache at the start of the next
//! lookup, on the consumer thread that owns the adapter. That keeps all
//! cache mutation on one thread without any locking inside the cache.
//!
//! ```text
//!  consumer thread                     worker threads
//!  ───────────────                     ──────────────
//!  retrieve(key)
//!    ├─ drain pending ◄────channel──── fetch outcomes
//!    ├─ cache hit? ──► Some(&value)
//!    └─ miss: schedule fetch ──► None
//! ```
//!
//! Failed outcomes are logged and absorbed during the drain; the sampler
//! simply falls back to coarser data and the tile is fetched again the
//! next time a query wants it.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::cache::{CacheError, LruCache, ReleaseHook};
use crate::retriever::{Fetcher, Outcome, Retriever};

/// A value whose cache footprint can be measured.
///
/// The cache accounts capacity in bytes; resources report their own size
/// once at insertion.
pub trait CacheResource {
    /// Size of the resource in bytes.
    fn size_bytes(&self) -> usize;
}

impl<T> CacheResource for Arc<Vec<T>> {
    fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }
}

/// Pairs a size-bounded cache with a deduplicating retriever.
///
/// The adapter is `Send` but deliberately not shareable: exactly one
/// consumer thread calls [`ResourceCacheAdapter::retrieve`], which is what
/// lets the cache stay lock-free.
pub struct ResourceCacheAdapter<K, V> {
    cache: LruCache<K, V>,
    retriever: Retriever<K, V>,
    pending: Receiver<Outcome<K, V>>,
}

impl<K, V> ResourceCacheAdapter<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + 'static,
    V: CacheResource + Send + 'static,
{
    /// Creates an adapter with the given cache capacity in bytes, low-water
    /// mark, and maximum number of simultaneous background fetches.
    pub fn new(
        capacity: usize,
        low_water: usize,
        max_retrievals: usize,
        fetcher: Arc<dyn Fetcher<K, V>>,
    ) -> Result<Self, CacheError> {
        let cache = LruCache::new(capacity, low_water)?;
        let (retriever, pending) = Retriever::new(max_retrievals, fetcher);
        tracing::debug!(
            capacity,
            low_water,
            max_retrievals,
            "resource cache adapter initialized"
        );
        Ok(Self {
            cache,
            retriever,
            pending,
        })
    }

    /// Installs a hook invoked for every entry leaving the cache, used to
    /// release external handles tied to cached values.
    pub fn set_release_hook(&mut self, hook: ReleaseHook<K, V>) {
        self.cache.set_release_hook(hook);
    }

    /// Returns the cached value for `key`, scheduling a background fetch
    /// and returning `None` on a miss.
    ///
    /// Completed fetch outcomes are merged into the cache first, so a value
    /// fetched since the previous call is a hit here. The call never
    /// blocks; a miss with a fetch already in flight (or a saturated
    /// retriever) is also `None`.
    pub fn retrieve(&mut self, key: &K) -> Option<&V> {
        self.drain_pending();

        if self.cache.contains_key(key) {
            return self.cache.get(key);
        }

        self.retriever.retrieve(key.clone());
        None
    }

    /// Returns the cached value for `key` without scheduling a fetch on a
    /// miss. Completed fetch outcomes are merged first, as in
    /// [`ResourceCacheAdapter::retrieve`].
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.drain_pending();
        self.cache.get(key)
    }

    /// Merges all completed fetch outcomes into the cache.
    fn drain_pending(&mut self) {
        for outcome in self.pending.try_iter() {
            match outcome {
                Outcome::Succeeded { key, value } => {
                    let size = value.size_bytes();
                    self.cache.put(key, value, size);
                }
                Outcome::Failed { key, error } => {
                    tracing::debug!(key = ?key, %error, "dropping failed fetch outcome");
                }
            }
        }
    }

    /// Removes every cached entry.
    ///
    /// Fetches already in flight are not cancelled; their results land in
    /// the cache on a later drain.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Whether a fetch for `key` is currently in flight.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.retriever.is_in_flight(key)
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_len(&self) -> usize {
        self.retriever.in_flight_len()
    }

    /// Total cache capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Sum of the sizes of all cached entries, in bytes.
    pub fn used_capacity(&self) -> usize {
        self.cache.used_capacity()
    }

    /// Number of cached entries.
    pub fn entry_count(&self) -> usize {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::RetrieveError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Fetcher returning a one-element buffer of the key value, recording
    /// every key it is asked for.
    struct CountingFetcher {
        calls: Mutex<Vec<u64>>,
        fail: HashSet<u64>,
    }

    impl CountingFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: HashSet::new(),
            })
        }

        fn failing_on(keys: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: keys.iter().copied().collect(),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Fetcher<u64, Arc<Vec<i16>>> for CountingFetcher {
        fn fetch(&self, key: &u64) -> Result<Arc<Vec<i16>>, RetrieveError> {
            self.calls.lock().unwrap().push(*key);
            if self.fail.contains(key) {
                return Err(RetrieveError::Failed("no such tile".to_string()));
            }
            Ok(Arc::new(vec![*key as i16]))
        }
    }

    fn retrieve_until_hit(
        adapter: &mut ResourceCacheAdapter<u64, Arc<Vec<i16>>>,
        key: u64,
    ) -> Arc<Vec<i16>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(value) = adapter.retrieve(&key) {
                return Arc::clone(value);
            }
            assert!(Instant::now() < deadline, "fetch did not land within 5s");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn miss_schedules_fetch_and_later_call_hits() {
        let fetcher = CountingFetcher::new();
        let mut adapter: ResourceCacheAdapter<u64, Arc<Vec<i16>>> =
            ResourceCacheAdapter::new(1024, 768, 4, fetcher.clone()).unwrap();

        assert!(adapter.retrieve(&5).is_none());
        let value = retrieve_until_hit(&mut adapter, 5);
        assert_eq!(*value, vec![5i16]);
        assert_eq!(adapter.entry_count(), 1);
        assert_eq!(adapter.used_capacity(), 2);
    }

    #[test]
    fn repeated_misses_fetch_once() {
        let fetcher = CountingFetcher::new();
        let mut adapter: ResourceCacheAdapter<u64, Arc<Vec<i16>>> =
            ResourceCacheAdapter::new(1024, 768, 4, fetcher.clone()).unwrap();

        // Hammer the same key; the in-flight set coalesces every call into
        // a single fetch.
        retrieve_until_hit(&mut adapter, 9);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn failed_fetch_is_absorbed_and_retried_on_demand() {
        let fetcher = CountingFetcher::failing_on(&[3]);
        let mut adapter: ResourceCacheAdapter<u64, Arc<Vec<i16>>> =
            ResourceCacheAdapter::new(1024, 768, 4, fetcher.clone()).unwrap();

        assert!(adapter.retrieve(&3).is_none());
        let deadline = Instant::now() + Duration::from_secs(5);
        while adapter.is_in_flight(&3) {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }

        // The failure never becomes a cache entry; the next miss schedules
        // a fresh fetch.
        assert!(adapter.retrieve(&3).is_none());
        let deadline = Instant::now() + Duration::from_secs(5);
        while fetcher.call_count() < 2 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(adapter.entry_count(), 0);
    }

    #[test]
    fn clear_empties_cache_without_cancelling_fetches() {
        let fetcher = CountingFetcher::new();
        let mut adapter: ResourceCacheAdapter<u64, Arc<Vec<i16>>> =
            ResourceCacheAdapter::new(1024, 768, 4, fetcher.clone()).unwrap();

        retrieve_until_hit(&mut adapter, 1);
        adapter.clear();
        assert_eq!(adapter.entry_count(), 0);
        assert_eq!(adapter.used_capacity(), 0);

        // Still retrievable afterwards.
        retrieve_until_hit(&mut adapter, 1);
        assert_eq!(fetcher.call_count(), 2);
    }

    #[test]
    fn capacity_and_usage_are_observable() {
        let fetcher = CountingFetcher::new();
        let mut adapter: ResourceCacheAdapter<u64, Arc<Vec<i16>>> =
            ResourceCacheAdapter::new(1024, 768, 4, fetcher).unwrap();

        assert_eq!(adapter.capacity(), 1024);
        assert_eq!(adapter.used_capacity(), 0);

        retrieve_until_hit(&mut adapter, 5);
        assert_eq!(adapter.capacity(), 1024);
        assert_eq!(adapter.used_capacity(), 2);
    }

    #[test]
    fn arc_vec_reports_element_size() {
        let buffer: Arc<Vec<i16>> = Arc::new(vec![0; 256 * 256]);
        assert_eq!(buffer.size_bytes(), 256 * 256 * 2);
    }
}
