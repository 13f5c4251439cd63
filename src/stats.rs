use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cache statistics for monitoring access patterns and maintenance work.
///
/// All counters are atomic with `Relaxed` ordering, so recording is cheap
/// and safe from any thread. Which counters a cache drives depends on the
/// cache type: the keyed cache records hits, misses and cleanups, while the
/// refreshing caches additionally track requests, updates and evictions.
/// Counters a cache never touches simply stay at zero.
///
/// # Examples
///
/// ```
/// use refresca::CacheStats;
///
/// let stats = CacheStats::new();
///
/// stats.record_hit();
/// stats.record_hit();
/// stats.record_miss();
///
/// assert_eq!(stats.hits(), 2);
/// assert_eq!(stats.misses(), 1);
/// assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    updates: AtomicU64,
    evictions: AtomicU64,
    cleanups: AtomicU64,
    last_cleanup_micros: AtomicU64,
}

impl CacheStats {
    /// Creates a new `CacheStats` instance with zero counters.
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
            last_cleanup_micros: AtomicU64::new(0),
        }
    }

    /// Records a lookup request, before it is classified as hit or miss.
    #[inline]
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache hit (lookup found a usable entry).
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::CacheStats;
    ///
    /// let stats = CacheStats::new();
    /// stats.record_hit();
    /// assert_eq!(stats.hits(), 1);
    /// ```
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss (lookup found nothing usable).
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::CacheStats;
    ///
    /// let stats = CacheStats::new();
    /// stats.record_miss();
    /// assert_eq!(stats.misses(), 1);
    /// ```
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a stored value (insert or regeneration).
    #[inline]
    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an explicit removal request.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cleanup pass over the cache.
    #[inline]
    pub fn record_cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::Relaxed);
    }

    /// Stores how long the most recent cleanup pass took.
    ///
    /// Kept at microsecond granularity so fast sweeps still register.
    pub fn set_last_cleanup_duration(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.last_cleanup_micros.store(micros, Ordering::Relaxed);
    }

    /// Returns the total number of lookup requests.
    #[inline]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Returns the total number of cache hits.
    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Returns the total number of cache misses.
    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns the total number of stored values.
    #[inline]
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns the total number of removal requests.
    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Returns the total number of cleanup passes.
    #[inline]
    pub fn cleanups(&self) -> u64 {
        self.cleanups.load(Ordering::Relaxed)
    }

    /// Returns the duration of the most recent cleanup pass.
    pub fn last_cleanup_duration(&self) -> Duration {
        Duration::from_micros(self.last_cleanup_micros.load(Ordering::Relaxed))
    }

    /// Returns the total number of classified lookups (hits + misses).
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::CacheStats;
    ///
    /// let stats = CacheStats::new();
    /// stats.record_hit();
    /// stats.record_miss();
    /// assert_eq!(stats.total_accesses(), 2);
    /// ```
    #[inline]
    pub fn total_accesses(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Calculates the hit rate as a fraction (0.0 to 1.0).
    ///
    /// Returns 0.0 if there have been no classified lookups.
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::CacheStats;
    ///
    /// let stats = CacheStats::new();
    /// stats.record_hit();
    /// stats.record_hit();
    /// stats.record_miss();
    /// assert!((stats.hit_rate() - 0.6666).abs() < 0.001);
    /// ```
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Calculates the miss rate as a fraction (0.0 to 1.0).
    #[inline]
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    /// Resets every counter (and the recorded cleanup duration) to zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::CacheStats;
    ///
    /// let stats = CacheStats::new();
    /// stats.record_hit();
    /// stats.record_update();
    ///
    /// stats.reset();
    /// assert_eq!(stats.hits(), 0);
    /// assert_eq!(stats.updates(), 0);
    /// ```
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.updates.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.cleanups.store(0, Ordering::Relaxed);
        self.last_cleanup_micros.store(0, Ordering::Relaxed);
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            requests: AtomicU64::new(self.requests()),
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            updates: AtomicU64::new(self.updates()),
            evictions: AtomicU64::new(self.evictions()),
            cleanups: AtomicU64::new(self.cleanups()),
            last_cleanup_micros: AtomicU64::new(self.last_cleanup_micros.load(Ordering::Relaxed)),
        }
    }
}
