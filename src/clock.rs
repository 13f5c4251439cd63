use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

/// A source of time for caches.
///
/// Expiration decisions need two notions of time: a monotonic one for
/// measuring entry age (`now`) and a wall-clock one for calendar-based
/// policies (`system_time`). Production code uses [`SystemClock`]; tests can
/// inject a [`MockClock`] and move time forward explicitly instead of
/// sleeping.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time.
    fn system_time(&self) -> SystemTime;
}

/// The real system clock.
///
/// Zero-sized; every cache defaults to it.
///
/// # Examples
///
/// ```
/// use refresca::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let a = clock.now();
/// let b = clock.now();
/// assert!(b >= a);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A controllable clock for tests.
///
/// Time is frozen at construction and only moves when [`advance`] or
/// [`set_elapsed`] is called. Clones share the same offset, so a clone handed
/// to a cache and a clone kept by the test observe the same time.
///
/// [`advance`]: MockClock::advance
/// [`set_elapsed`]: MockClock::set_elapsed
///
/// # Examples
///
/// ```
/// use refresca::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let start = clock.now();
///
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(clock.now() - start, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    base_system_time: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Creates a mock clock frozen at the current time.
    pub fn new() -> Self {
        Self::with_base_time(SystemTime::now())
    }

    /// Creates a mock clock whose wall clock starts at `base`.
    ///
    /// Useful for calendar-based expiration tests that need to start from a
    /// known time of day.
    pub fn with_base_time(base: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            base_system_time: base,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed += duration;
    }

    /// Sets the total elapsed time since construction.
    pub fn set_elapsed(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed = duration;
    }

    /// Returns the total elapsed time since construction.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + *self.elapsed.lock()
    }
}
