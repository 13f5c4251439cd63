use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};

/// A read-only view of a cached entry, handed to custom expiration
/// predicates.
///
/// # Fields
///
/// * `value` - The cached value
/// * `age` - Time elapsed since the value was stored
/// * `inserted_time` - Wall-clock time at which the value was stored
/// * `now` - Wall-clock time of the current expiration check
pub struct EntryView<'a, V> {
    pub value: &'a V,
    pub age: Duration,
    pub inserted_time: SystemTime,
    pub now: SystemTime,
}

impl<'a, V> Clone for EntryView<'a, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, V> Copy for EntryView<'a, V> {}

/// Cache-wide expiration policy.
///
/// A policy is stateless: it inspects a single entry through an
/// [`EntryView`] and answers whether that entry is expired. The same policy
/// value is shared by every entry of a cache and can be cloned freely
/// (cloning a [`Custom`] policy shares the underlying predicate).
///
/// Expiration is evaluated lazily on access, never by a clock interrupt, so
/// an expired entry stays in the store until a lookup notices it or a cleanup
/// pass removes it.
///
/// # Variants
///
/// * `Never` - Entries never expire (default)
/// * `Always` - Entries are expired as soon as they are stored
/// * `After(duration)` - Entries expire once strictly older than `duration`;
///   an entry aged exactly `duration` is still valid, and a zero duration
///   disables expiration entirely
/// * `NextDay` - Entries expire when the local calendar date changes, however
///   close to midnight they were stored
/// * `Custom(predicate)` - Entries expire when the predicate returns `true`
///
/// [`Custom`]: Expiration::Custom
///
/// # Examples
///
/// ```
/// use refresca::Expiration;
/// use std::time::Duration;
///
/// // Time-to-live of one minute.
/// let ttl: Expiration<String> = Expiration::After(Duration::from_secs(60));
///
/// // Expire entries whose value has been emptied upstream.
/// let custom = Expiration::when(|entry: refresca::EntryView<'_, String>| {
///     entry.value.is_empty()
/// });
/// # let _ = (ttl, custom);
/// ```
pub enum Expiration<V> {
    Never,
    Always,
    After(Duration),
    NextDay,
    Custom(ExpirationPredicate<V>),
}

/// Shared predicate used by [`Expiration::Custom`].
pub type ExpirationPredicate<V> = Arc<dyn Fn(EntryView<'_, V>) -> bool + Send + Sync>;

impl<V> Expiration<V> {
    /// Builds a [`Expiration::Custom`] policy from a predicate.
    ///
    /// # Examples
    ///
    /// ```
    /// use refresca::{EntryView, Expiration};
    /// use std::time::Duration;
    ///
    /// // Expire negative readings immediately, everything else after 5s.
    /// let policy = Expiration::when(|entry: EntryView<'_, i64>| {
    ///     *entry.value < 0 || entry.age > Duration::from_secs(5)
    /// });
    /// # let _ = policy;
    /// ```
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(EntryView<'_, V>) -> bool + Send + Sync + 'static,
    {
        Expiration::Custom(Arc::new(predicate))
    }

    /// Evaluates the policy against one entry.
    ///
    /// # Returns
    ///
    /// `true` if the entry should be considered expired.
    pub fn is_expired(&self, entry: EntryView<'_, V>) -> bool {
        match self {
            Expiration::Never => false,
            Expiration::Always => true,
            Expiration::After(duration) => !duration.is_zero() && entry.age > *duration,
            Expiration::NextDay => local_date(entry.inserted_time) != local_date(entry.now),
            Expiration::Custom(predicate) => predicate(entry),
        }
    }
}

/// The local calendar date of a wall-clock time.
fn local_date(time: SystemTime) -> chrono::NaiveDate {
    DateTime::<Local>::from(time).date_naive()
}

impl<V> Default for Expiration<V> {
    fn default() -> Self {
        Expiration::Never
    }
}

// Manual impl so cloning never requires `V: Clone`.
impl<V> Clone for Expiration<V> {
    fn clone(&self) -> Self {
        match self {
            Expiration::Never => Expiration::Never,
            Expiration::Always => Expiration::Always,
            Expiration::After(duration) => Expiration::After(*duration),
            Expiration::NextDay => Expiration::NextDay,
            Expiration::Custom(predicate) => Expiration::Custom(Arc::clone(predicate)),
        }
    }
}

impl<V> fmt::Debug for Expiration<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiration::Never => f.write_str("Never"),
            Expiration::Always => f.write_str("Always"),
            Expiration::After(duration) => f.debug_tuple("After").field(duration).finish(),
            Expiration::NextDay => f.write_str("NextDay"),
            Expiration::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
