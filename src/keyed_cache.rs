use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;

use crate::cache_entry::CachedEntry;
use crate::clock::{Clock, SystemClock};
use crate::expiration::Expiration;
use crate::stats::CacheStats;
use crate::sweeper::Sweeper;

/// A thread-safe keyed cache with lazy expiration.
///
/// Values are stored per key and judged against a single cache-wide
/// [`Expiration`] policy. Expiration is lazy: storing a value never schedules
/// anything, and an entry only learns it is expired when a validity-checking
/// read or a cleanup pass looks at it. Expired entries keep occupying memory
/// until [`cleanup`] removes them; an optional background sweeper can run
/// that pass periodically.
///
/// Two read flavors exist. [`get`] is a raw read: it answers with whatever is
/// stored, expired or not, and only distinguishes present from absent.
/// [`get_valid`] applies the policy and only returns live values. The
/// `_or_release` variant additionally drops the value of an entry it finds
/// expired, freeing the payload early while leaving the entry in place.
///
/// # Statistics
///
/// Hits and misses are counted on every read, and cleanup passes record
/// their count and duration; see [`CacheStats`]. A raw [`get`] counts a hit
/// for any present entry, while [`get_valid`] counts a hit only for a live
/// one. [`clear`] resets the counters, [`close`] does not.
///
/// # Thread Safety
///
/// The store is a [`DashMap`], so reads and writes from any number of
/// threads are fine. Counter totals are exact; two threads racing a
/// validity read on the same dying entry may both count a miss, which is the
/// honest answer since neither got a value.
///
/// [`cleanup`]: KeyedCache::cleanup
/// [`get`]: KeyedCache::get
/// [`get_valid`]: KeyedCache::get_valid
/// [`clear`]: KeyedCache::clear
/// [`close`]: KeyedCache::close
///
/// # Examples
///
/// ```
/// use refresca::{Expiration, KeyedCache};
/// use std::time::Duration;
///
/// let cache: KeyedCache<String, u32> =
///     KeyedCache::new(Expiration::After(Duration::from_secs(60)));
///
/// cache.insert("answer".to_string(), 42);
/// assert_eq!(cache.get_valid(&"answer".to_string()), Some(42));
/// assert_eq!(cache.stats().hits(), 1);
/// ```
pub struct KeyedCache<K, V, C = SystemClock> {
    inner: Arc<Inner<K, V, C>>,
    sweeper: Mutex<Option<Sweeper>>,
    closed: AtomicBool,
}

/// State shared with the background sweeper thread.
struct Inner<K, V, C> {
    store: DashMap<K, CachedEntry<V>>,
    policy: Expiration<V>,
    clock: C,
    stats: Arc<CacheStats>,
}

/// Outcome of a validity-checking lookup, resolved while the map guard is
/// held so the verdict and the value are consistent.
enum Lookup<V> {
    Valid(V),
    Invalid,
    Absent,
}

impl<K, V> KeyedCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache with the given expiration policy and no background
    /// cleanup.
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::{Expiration, KeyedCache};
    ///
    /// let cache: KeyedCache<u64, String> = KeyedCache::new(Expiration::Never);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(policy: Expiration<V>) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<K, V> KeyedCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache that runs [`cleanup`] on a background thread every
    /// `cleanup_interval`.
    ///
    /// A zero interval disables the sweeper, making this equivalent to
    /// [`new`].
    ///
    /// [`cleanup`]: KeyedCache::cleanup
    /// [`new`]: KeyedCache::new
    pub fn with_cleanup_interval(policy: Expiration<V>, cleanup_interval: Duration) -> Self {
        Self::with_cleanup_interval_and_clock(policy, cleanup_interval, SystemClock)
    }
}

impl<K, V, C> KeyedCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    /// Creates a cache that reads time from `clock`.
    ///
    /// Mainly useful with a mock clock in tests; production code normally
    /// goes through [`new`].
    ///
    /// [`new`]: KeyedCache::new
    pub fn with_clock(policy: Expiration<V>, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: DashMap::new(),
                policy,
                clock,
                stats: Arc::new(CacheStats::new()),
            }),
            sweeper: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Stores a value under a key, replacing any previous entry.
    ///
    /// The new entry starts with fresh timestamps and a fresh expiration
    /// state, so re-inserting a key revives it even if the old entry had
    /// expired. Inserting is not counted in the statistics.
    pub fn insert(&self, key: K, value: V) {
        let entry = CachedEntry::with_clock(value, &self.inner.clock);
        self.inner.store.insert(key, entry);
    }

    /// Stores every `(key, value)` pair from an iterator.
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::{Expiration, KeyedCache};
    ///
    /// let cache: KeyedCache<&str, u32> = KeyedCache::new(Expiration::Never);
    /// cache.insert_many([("a", 1), ("b", 2), ("c", 3)]);
    /// assert_eq!(cache.len(), 3);
    /// ```
    pub fn insert_many<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.insert(key, value);
        }
    }

    /// Returns the stored value for a key without checking validity.
    ///
    /// Any present entry counts as a hit, even an expired one; only an
    /// absent key counts as a miss. A present entry whose value has been
    /// released yields a hit and `None`.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.inner.store.get(key).map(|entry| entry.value.clone());
        match found {
            Some(value) => {
                self.inner.stats.record_hit();
                value
            }
            None => {
                self.inner.stats.record_miss();
                None
            }
        }
    }

    /// Returns the value for a key if it is present and not expired.
    ///
    /// An expired or absent entry counts as a miss and yields `None`; the
    /// expired entry itself is left untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::{Expiration, KeyedCache, MockClock};
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::new();
    /// let cache = KeyedCache::with_clock(
    ///     Expiration::After(Duration::from_secs(5)),
    ///     clock.clone(),
    /// );
    ///
    /// cache.insert("k", 1);
    /// assert_eq!(cache.get_valid(&"k"), Some(1));
    ///
    /// clock.advance(Duration::from_secs(6));
    /// assert_eq!(cache.get_valid(&"k"), None);
    /// assert_eq!(cache.len(), 1); // still stored, just expired
    /// ```
    pub fn get_valid(&self, key: &K) -> Option<V> {
        self.lookup_valid(key, false)
    }

    /// Returns the value for a key if valid, releasing it if expired.
    ///
    /// Same read semantics as [`get_valid`], but when the lookup finds an
    /// expired entry its value is dropped on the spot. The emptied entry
    /// remains until a cleanup pass removes it.
    ///
    /// [`get_valid`]: KeyedCache::get_valid
    pub fn get_valid_or_release(&self, key: &K) -> Option<V> {
        self.lookup_valid(key, true)
    }

    fn lookup_valid(&self, key: &K, release_if_invalid: bool) -> Option<V> {
        let inner = &self.inner;

        let lookup = match inner.store.get(key) {
            Some(entry) if !entry.is_expired(&inner.policy, &inner.clock) => {
                match &entry.value {
                    Some(value) => Lookup::Valid(value.clone()),
                    None => Lookup::Invalid,
                }
            }
            Some(_) => Lookup::Invalid,
            None => Lookup::Absent,
        };

        match lookup {
            Lookup::Valid(value) => {
                inner.stats.record_hit();
                Some(value)
            }
            Lookup::Invalid => {
                if release_if_invalid {
                    if let Some(mut entry) = inner.store.get_mut(key) {
                        // Re-check under the write lock; the key may have been
                        // re-inserted since the verdict.
                        if entry.is_expired(&inner.policy, &inner.clock) {
                            entry.expire(true);
                        }
                    }
                }
                inner.stats.record_miss();
                None
            }
            Lookup::Absent => {
                inner.stats.record_miss();
                None
            }
        }
    }

    /// Returns a snapshot of the whole entry for a key.
    ///
    /// Present entries count as a hit whatever their expiration state, so
    /// callers can inspect timestamps of entries that [`get_valid`] would
    /// refuse.
    ///
    /// [`get_valid`]: KeyedCache::get_valid
    pub fn get_entry(&self, key: &K) -> Option<CachedEntry<V>> {
        let snapshot = self
            .inner
            .store
            .get(key)
            .map(|entry| CachedEntry::clone(&entry));
        match snapshot {
            Some(entry) => {
                self.inner.stats.record_hit();
                Some(entry)
            }
            None => {
                self.inner.stats.record_miss();
                None
            }
        }
    }

    /// Forces a key's entry to expire, keeping its value in place.
    ///
    /// Not counted in the statistics.
    ///
    /// # Returns
    ///
    /// `true` if the key was present.
    pub fn expire(&self, key: &K) -> bool {
        self.mark_expired(key, false)
    }

    /// Forces a key's entry to expire and drops its value.
    ///
    /// # Returns
    ///
    /// `true` if the key was present.
    pub fn expire_and_release(&self, key: &K) -> bool {
        self.mark_expired(key, true)
    }

    fn mark_expired(&self, key: &K, release_value: bool) -> bool {
        match self.inner.store.get_mut(key) {
            Some(mut entry) => {
                entry.expire(release_value);
                true
            }
            None => false,
        }
    }

    /// Returns whether a key holds a live value.
    ///
    /// Not counted in the statistics.
    pub fn is_valid(&self, key: &K) -> bool {
        self.inner
            .store
            .get(key)
            .map(|entry| !entry.is_expired(&self.inner.policy, &self.inner.clock))
            .unwrap_or(false)
    }

    /// Removes every expired entry from the store.
    ///
    /// This is the only operation that physically frees expired entries.
    /// Records one cleanup pass and its duration in the statistics.
    ///
    /// # Returns
    ///
    /// The number of entries removed.
    pub fn cleanup(&self) -> usize {
        self.inner.cleanup()
    }

    /// Empties the cache and resets its statistics to zero.
    pub fn clear(&self) {
        self.inner.store.clear();
        self.inner.stats.reset();
    }

    /// Shuts the cache down: stops the background sweeper (if any) and
    /// empties the store.
    ///
    /// Statistics are kept, so totals remain readable after shutdown.
    /// Idempotent; a closed cache still accepts operations, it just no
    /// longer sweeps itself.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        self.inner.store.clear();
        debug!("keyed cache closed");
    }

    /// Returns whether [`close`] has been called.
    ///
    /// [`close`]: KeyedCache::close
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Returns whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Returns a snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        (*self.inner.stats).clone()
    }

    /// Returns the live statistics handle.
    ///
    /// Useful for registering the cache in the
    /// [`stats_registry`](crate::stats_registry).
    pub fn stats_handle(&self) -> Arc<CacheStats> {
        Arc::clone(&self.inner.stats)
    }
}

impl<K, V, C> KeyedCache<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    /// Creates a cache with both a background cleanup interval and a custom
    /// clock.
    ///
    /// The sweeper wakes on real time regardless of the clock, so a test can
    /// freeze entry age with a mock clock while still exercising the sweep
    /// machinery. A zero interval disables the sweeper.
    pub fn with_cleanup_interval_and_clock(
        policy: Expiration<V>,
        cleanup_interval: Duration,
        clock: C,
    ) -> Self {
        let cache = Self::with_clock(policy, clock);
        if !cleanup_interval.is_zero() {
            let inner = Arc::clone(&cache.inner);
            let sweeper = Sweeper::spawn(cleanup_interval, move || {
                inner.cleanup();
            });
            *cache.sweeper.lock() = Some(sweeper);
        }
        cache
    }
}

impl<K, V, C> Inner<K, V, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    fn cleanup(&self) -> usize {
        let started = self.clock.now();

        let expired_keys: Vec<K> = self
            .store
            .iter()
            .filter(|entry| entry.value().is_expired(&self.policy, &self.clock))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in &expired_keys {
            // Re-check under the write lock; the key may have been
            // re-inserted since the scan.
            let removed_entry = self
                .store
                .remove_if(key, |_, entry| entry.is_expired(&self.policy, &self.clock));
            if removed_entry.is_some() {
                removed += 1;
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(started);
        self.stats.set_last_cleanup_duration(elapsed);
        self.stats.record_cleanup();
        debug!("cleanup pass removed {} expired entries", removed);
        removed
    }
}
