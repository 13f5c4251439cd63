use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache_entry::CachedEntry;
use crate::clock::{Clock, SystemClock};
use crate::expiration::Expiration;
use crate::stats::CacheStats;

/// Factory signature shared by the refreshing caches.
///
/// Called with the key being (re)generated; an `Err` is propagated to the
/// caller (or logged, for background refreshes) and leaves the store
/// untouched.
pub type RefreshFn<K, V, E> = Box<dyn Fn(&K) -> Result<V, E> + Send + Sync>;

/// A self-populating cache that regenerates values on demand.
///
/// Every value comes from the factory handed to [`new`]: a lookup for an
/// absent key generates the value on the spot, and a lookup that finds an
/// expired entry regenerates it synchronously before returning. Callers
/// therefore always receive a value the [`Expiration`] policy considers
/// live, at the cost of paying the regeneration latency on the read path.
///
/// Regeneration is fail-open: if the factory returns an error, [`get`]
/// propagates it and the previous (expired) entry stays in the store, so a
/// later call can try again.
///
/// There is no per-key coordination between concurrent lookups. Two threads
/// that miss (or find the same entry expired) both run the factory; both
/// stores land, the later one wins, and each caller returns the value it
/// generated.
///
/// # Statistics
///
/// Every [`get`] counts a request plus exactly one of hit (entry was
/// present, expired or not) or miss. Stored values count updates, explicit
/// removals count evictions, and [`clean`]/[`clear`] count cleanups; see
/// [`CacheStats`].
///
/// [`new`]: OnDemandCache::new
/// [`get`]: OnDemandCache::get
/// [`clean`]: OnDemandCache::clean
/// [`clear`]: OnDemandCache::clear
///
/// # Examples
///
/// ```
/// use refresca::{Expiration, OnDemandCache};
/// use std::time::Duration;
///
/// let cache: OnDemandCache<u32, String, String> = OnDemandCache::new(
///     Expiration::After(Duration::from_secs(60)),
///     |id| Ok(format!("user-{}", id)),
/// );
///
/// assert_eq!(cache.get(&7), Ok("user-7".to_string()));
/// assert_eq!(cache.stats().misses(), 1);
///
/// // Second read is served from the store.
/// assert_eq!(cache.get(&7), Ok("user-7".to_string()));
/// assert_eq!(cache.stats().hits(), 1);
/// ```
pub struct OnDemandCache<K, V, E, C = SystemClock> {
    store: DashMap<K, CachedEntry<V>>,
    policy: Expiration<V>,
    clock: C,
    stats: Arc<CacheStats>,
    factory: RefreshFn<K, V, E>,
    closed: AtomicBool,
}

/// Classification of a lookup, resolved before any regeneration so no map
/// guard is held while the factory runs.
enum Lookup<V> {
    Fresh(V),
    Stale,
    Absent,
}

impl<K, V, E> OnDemandCache<K, V, E, SystemClock>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    E: 'static,
{
    /// Creates a cache that fills itself through `factory`.
    pub fn new<F>(policy: Expiration<V>, factory: F) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        Self::with_clock(policy, factory, SystemClock)
    }
}

impl<K, V, E, C> OnDemandCache<K, V, E, C>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
    E: 'static,
    C: Clock,
{
    /// Creates a cache that reads time from `clock`.
    pub fn with_clock<F>(policy: Expiration<V>, factory: F, clock: C) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        Self {
            store: DashMap::new(),
            policy,
            clock,
            stats: Arc::new(CacheStats::new()),
            factory: Box::new(factory),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the value for a key, regenerating it if absent or expired.
    ///
    /// A present entry counts a hit even when expired (the entry was there;
    /// it just needed refreshing). Factory errors propagate unchanged and
    /// leave the store as it was.
    pub fn get(&self, key: &K) -> Result<V, E> {
        self.stats.record_request();

        let lookup = match self.store.get(key) {
            Some(entry) if !entry.is_expired(&self.policy, &self.clock) => match &entry.value {
                Some(value) => Lookup::Fresh(value.clone()),
                None => Lookup::Stale,
            },
            Some(_) => Lookup::Stale,
            None => Lookup::Absent,
        };

        match lookup {
            Lookup::Fresh(value) => {
                self.stats.record_hit();
                Ok(value)
            }
            Lookup::Stale => {
                self.stats.record_hit();
                self.regenerate(key)
            }
            Lookup::Absent => {
                self.stats.record_miss();
                self.regenerate(key)
            }
        }
    }

    /// Runs the factory and stores the result. No map guard may be held
    /// here; the factory is arbitrary user code.
    fn regenerate(&self, key: &K) -> Result<V, E> {
        let value = (self.factory)(key)?;
        self.store
            .insert(key.clone(), CachedEntry::with_clock(value.clone(), &self.clock));
        self.stats.record_update();
        Ok(value)
    }

    /// Stores a value directly, without consulting the factory.
    ///
    /// First write wins: if the key is already present (even expired) the
    /// stored entry is kept and `false` is returned. The attempt counts an
    /// update either way.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.stats.record_update();
        match self.store.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CachedEntry::with_clock(value, &self.clock));
                true
            }
        }
    }

    /// Stores a value produced by `make`, without consulting the cache's own
    /// factory.
    ///
    /// `make` runs eagerly, before the occupancy check, so it is invoked
    /// even when the key turns out to be taken.
    pub fn insert_with<F>(&self, key: K, make: F) -> bool
    where
        F: FnOnce(&K) -> V,
    {
        let value = make(&key);
        self.insert(key, value)
    }

    /// Removes a key's entry.
    ///
    /// The removal request counts an eviction whether or not the key was
    /// present.
    ///
    /// # Returns
    ///
    /// `true` if an entry was removed.
    pub fn remove(&self, key: &K) -> bool {
        self.stats.record_eviction();
        self.store.remove(key).is_some()
    }

    /// Removes every expired entry, without regenerating anything.
    ///
    /// The pass visits the whole store even when removals fail, and counts
    /// one cleanup.
    ///
    /// # Returns
    ///
    /// `true` if every entry seen expired during the scan was removed.
    /// A concurrent re-insert or removal of such an entry yields `false`.
    pub fn clean(&self) -> bool {
        self.stats.record_cleanup();

        let expired_keys: Vec<K> = self
            .store
            .iter()
            .filter(|entry| entry.value().is_expired(&self.policy, &self.clock))
            .map(|entry| entry.key().clone())
            .collect();

        let mut all_removed = true;
        for key in &expired_keys {
            let removed = self
                .store
                .remove_if(key, |_, entry| entry.is_expired(&self.policy, &self.clock));
            if removed.is_none() {
                all_removed = false;
            }
        }
        all_removed
    }

    /// Empties the store.
    ///
    /// Counts one cleanup; all other counters keep their totals.
    pub fn clear(&self) {
        self.store.clear();
        self.stats.record_cleanup();
    }

    /// Shuts the cache down by emptying the store.
    ///
    /// Idempotent. A closed cache still works; the next [`get`] simply
    /// starts repopulating it.
    ///
    /// [`get`]: OnDemandCache::get
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.clear();
    }

    /// Returns whether [`close`] has been called.
    ///
    /// [`close`]: OnDemandCache::close
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns a snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        (*self.stats).clone()
    }

    /// Returns the live statistics handle.
    pub fn stats_handle(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Cache whose factory counts its calls and can be told to fail.
    fn counting_cache(
        ttl: Duration,
    ) -> (
        OnDemandCache<String, String, String, MockClock>,
        MockClock,
        Arc<AtomicUsize>,
        Arc<AtomicBool>,
    ) {
        let clock = MockClock::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));

        let factory_calls = Arc::clone(&calls);
        let factory_fail = Arc::clone(&fail);
        let cache = OnDemandCache::with_clock(
            Expiration::After(ttl),
            move |key: &String| {
                let call = factory_calls.fetch_add(1, Ordering::SeqCst);
                if factory_fail.load(Ordering::SeqCst) {
                    Err(format!("factory down for {}", key))
                } else {
                    Ok(format!("{}-v{}", key, call))
                }
            },
            clock.clone(),
        );
        (cache, clock, calls, fail)
    }

    #[test]
    fn test_miss_generates_and_stores() {
        let (cache, _clock, calls, _fail) = counting_cache(Duration::from_secs(10));

        assert_eq!(cache.get(&"a".to_string()), Ok("a-v0".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.requests(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.updates(), 1);
    }

    #[test]
    fn test_hit_skips_factory() {
        let (cache, _clock, calls, _fail) = counting_cache(Duration::from_secs(10));

        cache.get(&"a".to_string()).unwrap();
        assert_eq!(cache.get(&"a".to_string()), Ok("a-v0".to_string()));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.requests(), 2);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
    }

    #[test]
    fn test_expired_entry_regenerates_as_hit() {
        let (cache, clock, calls, _fail) = counting_cache(Duration::from_secs(10));

        cache.get(&"a".to_string()).unwrap();
        clock.advance(Duration::from_secs(11));

        assert_eq!(cache.get(&"a".to_string()), Ok("a-v1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.updates(), 2);
    }

    #[test]
    fn test_always_policy_regenerates_every_read() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory_calls = Arc::clone(&calls);
        let cache: OnDemandCache<String, String, String> =
            OnDemandCache::new(Expiration::Always, move |key: &String| {
                Ok(format!("{}-v{}", key, factory_calls.fetch_add(1, Ordering::SeqCst)))
            });

        assert_eq!(cache.get(&"a".to_string()), Ok("a-v0".to_string()));
        assert_eq!(cache.get(&"a".to_string()), Ok("a-v1".to_string()));
        assert_eq!(cache.get(&"a".to_string()), Ok("a-v2".to_string()));

        // One miss, then hits that each regenerate.
        let stats = cache.stats();
        assert_eq!(stats.requests(), 3);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.updates(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_factory_error_on_miss_stores_nothing() {
        let (cache, _clock, _calls, fail) = counting_cache(Duration::from_secs(10));
        fail.store(true, Ordering::SeqCst);

        let result = cache.get(&"a".to_string());
        assert_eq!(result, Err("factory down for a".to_string()));
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.updates(), 0);
    }

    #[test]
    fn test_factory_error_keeps_stale_entry() {
        let (cache, clock, _calls, fail) = counting_cache(Duration::from_secs(10));

        cache.get(&"a".to_string()).unwrap();
        clock.advance(Duration::from_secs(11));
        fail.store(true, Ordering::SeqCst);

        assert!(cache.get(&"a".to_string()).is_err());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().updates(), 1);

        // Once the factory recovers, the same key refreshes normally.
        fail.store(false, Ordering::SeqCst);
        assert_eq!(cache.get(&"a".to_string()), Ok("a-v2".to_string()));
        assert_eq!(cache.stats().updates(), 2);
    }

    #[test]
    fn test_insert_first_write_wins() {
        let (cache, _clock, calls, _fail) = counting_cache(Duration::from_secs(10));

        assert!(cache.insert("a".to_string(), "manual".to_string()));
        assert!(!cache.insert("a".to_string(), "ignored".to_string()));

        // Both attempts count as updates.
        assert_eq!(cache.stats().updates(), 2);
        assert_eq!(cache.get(&"a".to_string()), Ok("manual".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_insert_does_not_replace_expired_entry() {
        let (cache, clock, _calls, _fail) = counting_cache(Duration::from_secs(10));

        cache.insert("a".to_string(), "old".to_string());
        clock.advance(Duration::from_secs(11));

        assert!(!cache.insert("a".to_string(), "new".to_string()));
        // The expired entry is still the stored one; the next get refreshes
        // it through the factory instead.
        assert_eq!(cache.get(&"a".to_string()), Ok("a-v0".to_string()));
    }

    #[test]
    fn test_insert_with_runs_eagerly() {
        let (cache, _clock, _calls, _fail) = counting_cache(Duration::from_secs(10));
        cache.insert("a".to_string(), "taken".to_string());

        let ran = AtomicBool::new(false);
        let stored = cache.insert_with("a".to_string(), |_| {
            ran.store(true, Ordering::SeqCst);
            "late".to_string()
        });

        assert!(!stored);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_remove_counts_eviction_unconditionally() {
        let (cache, _clock, _calls, _fail) = counting_cache(Duration::from_secs(10));
        cache.insert("a".to_string(), "x".to_string());

        assert!(cache.remove(&"a".to_string()));
        assert!(!cache.remove(&"a".to_string()));
        assert_eq!(cache.stats().evictions(), 2);
    }

    #[test]
    fn test_clean_removes_expired_only() {
        let (cache, clock, _calls, _fail) = counting_cache(Duration::from_secs(10));

        cache.insert("old".to_string(), "x".to_string());
        clock.advance(Duration::from_secs(8));
        cache.insert("fresh".to_string(), "y".to_string());
        clock.advance(Duration::from_secs(4));

        assert!(cache.clean());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().cleanups(), 1);
        assert_eq!(cache.get(&"fresh".to_string()), Ok("y".to_string()));
    }

    #[test]
    fn test_clear_keeps_counters() {
        let (cache, _clock, _calls, _fail) = counting_cache(Duration::from_secs(10));

        cache.get(&"a".to_string()).unwrap();
        cache.clear();

        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.requests(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.updates(), 1);
        assert_eq!(stats.cleanups(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (cache, _clock, _calls, _fail) = counting_cache(Duration::from_secs(10));
        cache.insert("a".to_string(), "x".to_string());

        cache.close();
        cache.close();

        assert!(cache.is_closed());
        assert!(cache.is_empty());
        // Only the first close ran the clear.
        assert_eq!(cache.stats().cleanups(), 1);
    }

    #[test]
    fn test_usable_after_close() {
        let (cache, _clock, _calls, _fail) = counting_cache(Duration::from_secs(10));
        cache.close();

        assert_eq!(cache.get(&"a".to_string()), Ok("a-v0".to_string()));
        assert_eq!(cache.len(), 1);
    }
}
