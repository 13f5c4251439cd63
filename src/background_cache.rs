use std::fmt::Display;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::cache_entry::CachedEntry;
use crate::clock::{Clock, SystemClock};
use crate::expiration::Expiration;
use crate::on_demand_cache::RefreshFn;
use crate::stats::CacheStats;
use crate::sweeper::Sweeper;

/// A self-populating cache that refreshes expired values in the background.
///
/// Like [`OnDemandCache`](crate::OnDemandCache) every value comes from the
/// factory, and a lookup for an absent key still generates synchronously.
/// The difference is the expired case: [`get`] hands back the stale value
/// immediately, and a dedicated refresh thread regenerates expired entries
/// on a fixed interval. Readers trade freshness for never paying the
/// regeneration latency once a key is populated.
///
/// A failed regeneration is logged and the stale value stays in place, so
/// readers keep getting the last good value until the factory recovers.
///
/// # Statistics
///
/// Lookup counting matches the on-demand cache: each [`get`] is a request
/// plus a hit (present, however stale) or a miss. Background regenerations
/// count updates; the refresh passes themselves are not counted as
/// cleanups, since they replace values rather than remove them.
///
/// [`get`]: BackgroundCache::get
///
/// # Examples
///
/// ```no_run
/// use refresca::{BackgroundCache, Expiration};
/// use std::time::Duration;
///
/// let cache: BackgroundCache<String, String, String> = BackgroundCache::new(
///     Expiration::After(Duration::from_secs(30)),
///     Duration::from_secs(5),
///     |key| Ok(format!("loaded {}", key)),
/// );
///
/// // First read populates, later reads never block on the factory.
/// let value = cache.get(&"config".to_string())?;
/// # let _ = value;
/// # cache.close();
/// # Ok::<(), String>(())
/// ```
pub struct BackgroundCache<K, V, E, C = SystemClock> {
    inner: Arc<Inner<K, V, E, C>>,
    sweeper: Mutex<Option<Sweeper>>,
    closed: AtomicBool,
}

/// State shared with the refresh thread.
struct Inner<K, V, E, C> {
    store: DashMap<K, CachedEntry<V>>,
    policy: Expiration<V>,
    clock: C,
    stats: Arc<CacheStats>,
    factory: RefreshFn<K, V, E>,
}

/// Classification of a lookup, resolved before any factory call so no map
/// guard is held while user code runs.
enum Lookup<V> {
    Present(V),
    Absent,
}

impl<K, V, E> BackgroundCache<K, V, E, SystemClock>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Display + 'static,
{
    /// Creates a cache whose expired entries are regenerated every
    /// `refresh_interval` by a background thread.
    ///
    /// The first refresh pass runs one full interval after construction. A
    /// zero interval disables background refreshing entirely, leaving a
    /// cache that serves stale values forever.
    pub fn new<F>(policy: Expiration<V>, refresh_interval: Duration, factory: F) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        Self::with_clock(policy, refresh_interval, factory, SystemClock)
    }
}

impl<K, V, E, C> BackgroundCache<K, V, E, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Display + 'static,
    C: Clock + 'static,
{
    /// Creates a cache that reads time from `clock`.
    ///
    /// The refresh thread still wakes on real time; only entry age and
    /// calendar checks go through the clock.
    pub fn with_clock<F>(
        policy: Expiration<V>,
        refresh_interval: Duration,
        factory: F,
        clock: C,
    ) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        let inner = Arc::new(Inner {
            store: DashMap::new(),
            policy,
            clock,
            stats: Arc::new(CacheStats::new()),
            factory: Box::new(factory),
        });

        let sweeper = if refresh_interval.is_zero() {
            None
        } else {
            let refresh_inner = Arc::clone(&inner);
            Some(Sweeper::spawn(refresh_interval, move || {
                refresh_inner.refresh_expired();
            }))
        };

        Self {
            inner,
            sweeper: Mutex::new(sweeper),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the value for a key, generating it only if absent.
    ///
    /// A present entry is returned as-is, expired or not; refreshing is the
    /// background thread's job. Factory errors can therefore only surface
    /// here for keys that were never populated.
    pub fn get(&self, key: &K) -> Result<V, E> {
        let inner = &self.inner;
        inner.stats.record_request();

        let lookup = match inner.store.get(key) {
            Some(entry) => match &entry.value {
                Some(value) => Lookup::Present(value.clone()),
                None => Lookup::Absent,
            },
            None => Lookup::Absent,
        };

        match lookup {
            Lookup::Present(value) => {
                inner.stats.record_hit();
                Ok(value)
            }
            Lookup::Absent => {
                inner.stats.record_miss();
                let value = (inner.factory)(key)?;
                inner
                    .store
                    .insert(key.clone(), CachedEntry::with_clock(value.clone(), &inner.clock));
                inner.stats.record_update();
                Ok(value)
            }
        }
    }

    /// Stores a value directly, without consulting the factory.
    ///
    /// First write wins; the attempt counts an update either way.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.inner.stats.record_update();
        match self.inner.store.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CachedEntry::with_clock(value, &self.inner.clock));
                true
            }
        }
    }

    /// Stores a value produced by `make`, without consulting the cache's own
    /// factory.
    ///
    /// `make` runs eagerly, before the occupancy check.
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
    pub fn remove(&self, key: &K) -> bool {
        self.inner.stats.record_eviction();
        self.inner.store.remove(key).is_some()
    }

    /// Removes every expired entry instead of refreshing it.
    ///
    /// Counts one cleanup. Useful when a set of keys has gone out of use
    /// and regenerating them forever would be wasted work.
    ///
    /// # Returns
    ///
    /// `true` if every entry seen expired during the scan was removed.
    pub fn clean(&self) -> bool {
        let inner = &self.inner;
        inner.stats.record_cleanup();

        let expired_keys: Vec<K> = inner
            .store
            .iter()
            .filter(|entry| entry.value().is_expired(&inner.policy, &inner.clock))
            .map(|entry| entry.key().clone())
            .collect();

        let mut all_removed = true;
        for key in &expired_keys {
            let removed = inner
                .store
                .remove_if(key, |_, entry| entry.is_expired(&inner.policy, &inner.clock));
            if removed.is_none() {
                all_removed = false;
            }
        }
        all_removed
    }

    /// Empties the store.
    ///
    /// Counts one cleanup; all other counters keep their totals. The
    /// refresh thread keeps running and will repopulate nothing until reads
    /// do.
    pub fn clear(&self) {
        self.inner.store.clear();
        self.inner.stats.record_cleanup();
    }

    /// Shuts the cache down: stops the refresh thread, then empties the
    /// store.
    ///
    /// Idempotent. A closed cache still answers [`get`], it just never
    /// refreshes in the background again.
    ///
    /// [`get`]: BackgroundCache::get
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        self.clear();
        debug!("background cache closed");
    }

    /// Returns whether [`close`] has been called.
    ///
    /// [`close`]: BackgroundCache::close
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
    pub fn stats_handle(&self) -> Arc<CacheStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Runs one refresh pass immediately, on the calling thread.
    ///
    /// Exactly what the background thread does every interval; exposed so
    /// callers can force a refresh (for example right after a config
    /// change) without waiting for the next tick.
    pub fn refresh_now(&self) {
        self.inner.refresh_expired();
    }
}

impl<K, V, E, C> Inner<K, V, E, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Display,
    C: Clock,
{
    /// Regenerates every expired entry in place.
    ///
    /// Failures keep the stale entry; nothing is ever removed here.
    fn refresh_expired(&self) {
        let expired_keys: Vec<K> = self
            .store
            .iter()
            .filter(|entry| entry.value().is_expired(&self.policy, &self.clock))
            .map(|entry| entry.key().clone())
            .collect();

        if expired_keys.is_empty() {
            return;
        }
        debug!("refreshing {} expired entries", expired_keys.len());

        for key in expired_keys {
            // No guard held; the factory is arbitrary user code.
            match (self.factory)(&key) {
                Ok(value) => {
                    self.store
                        .insert(key, CachedEntry::with_clock(value, &self.clock));
                    self.stats.record_update();
                }
                Err(error) => {
                    warn!("background refresh failed, keeping stale value: {}", error);
                }
            }
        }
    }
}
