use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::clock::{Clock, SystemClock};
use crate::expiration::{EntryView, Expiration};

/// A cached value together with its insertion timestamps and expiration
/// state.
///
/// Each stored value is wrapped in a `CachedEntry`, which records when the
/// value arrived on both the monotonic clock (for age) and the wall clock
/// (for calendar policies). Expiration is evaluated lazily against an
/// [`Expiration`] policy and the verdict is sticky: once an entry has been
/// seen expired it stays expired, even if the policy would answer
/// differently on a later check.
///
/// The value can be released early via [`expire`] to drop a large payload
/// while keeping the entry in place. A released entry is always expired.
///
/// [`expire`]: CachedEntry::expire
///
/// # Fields
///
/// * `value` - The cached value, `None` once released
/// * `inserted_at` - Monotonic instant at which the value was stored
/// * `inserted_time` - Wall-clock time at which the value was stored
///
/// # Examples
///
/// ```
/// use refresca::{CachedEntry, Expiration, SystemClock};
/// use std::time::Duration;
///
/// let entry = CachedEntry::new(42);
/// let policy = Expiration::After(Duration::from_secs(60));
///
/// assert_eq!(entry.value, Some(42));
/// assert!(!entry.is_expired(&policy, &SystemClock));
/// ```
#[derive(Debug)]
pub struct CachedEntry<V> {
    pub value: Option<V>,
    pub inserted_at: Instant,
    pub inserted_time: SystemTime,
    expired: AtomicBool,
}

impl<V> CachedEntry<V> {
    /// Creates an entry timestamped with the system clock.
    pub fn new(value: V) -> Self {
        Self::with_clock(value, &SystemClock)
    }

    /// Creates an entry timestamped with the given clock.
    pub fn with_clock<C: Clock>(value: V, clock: &C) -> Self {
        Self {
            value: Some(value),
            inserted_at: clock.now(),
            inserted_time: clock.system_time(),
            expired: AtomicBool::new(false),
        }
    }

    /// Returns the entry age as measured by `clock`.
    ///
    /// Saturates to zero if the clock reads earlier than the insertion
    /// instant.
    pub fn age<C: Clock>(&self, clock: &C) -> Duration {
        clock.now().saturating_duration_since(self.inserted_at)
    }

    /// Checks whether this entry is expired under `policy`.
    ///
    /// The check is lazy and sticky: the policy is only consulted while the
    /// entry has never been seen expired, and the first `true` verdict is
    /// memoized so later checks short-circuit. An entry whose value has been
    /// released is expired without consulting the policy.
    pub fn is_expired<C: Clock>(&self, policy: &Expiration<V>, clock: &C) -> bool {
        if self.expired.load(Ordering::Relaxed) {
            return true;
        }

        let expired = match &self.value {
            Some(value) => policy.is_expired(EntryView {
                value,
                age: self.age(clock),
                inserted_time: self.inserted_time,
                now: clock.system_time(),
            }),
            None => true,
        };

        if expired {
            self.expired.store(true, Ordering::Relaxed);
        }
        expired
    }

    /// Marks the entry as expired.
    ///
    /// With `release_value` set the stored value is dropped immediately; the
    /// entry itself stays in place until a cleanup pass removes it. The
    /// transition is one-way: an expired entry never becomes valid again.
    pub fn expire(&mut self, release_value: bool) {
        self.expired.store(true, Ordering::Relaxed);
        if release_value {
            self.value = None;
        }
    }

    /// Returns whether the expired flag has already been set.
    ///
    /// Unlike [`is_expired`] this never consults the policy, so it only
    /// reflects verdicts already reached.
    ///
    /// [`is_expired`]: CachedEntry::is_expired
    #[inline]
    pub fn expired_flag(&self) -> bool {
        self.expired.load(Ordering::Relaxed)
    }
}

// Manual impl to snapshot the atomic flag.
impl<V: Clone> Clone for CachedEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            inserted_at: self.inserted_at,
            inserted_time: self.inserted_time,
            expired: AtomicBool::new(self.expired.load(Ordering::Relaxed)),
        }
    }
}
