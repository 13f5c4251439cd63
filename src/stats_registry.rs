//! Global registry for cache statistics.
//!
//! Caches are plain values and carry no name of their own, so registration
//! is explicit: hand the registry a name and the cache's shared stats handle
//! and any part of the process (a metrics exporter, an admin endpoint) can
//! look the counters up without holding a reference to the cache itself.
//!
//! # Thread Safety
//!
//! The registry is thread-safe and can be accessed from multiple threads
//! concurrently.
//!
//! # Examples
//!
//! ```
//! use refresca::{stats_registry, KeyedCache, Expiration};
//!
//! let cache: KeyedCache<String, u32> = KeyedCache::new(Expiration::Never);
//! stats_registry::register("sessions", cache.stats_handle());
//!
//! if let Some(stats) = stats_registry::get("sessions") {
//!     println!("hit rate: {:.2}%", stats.hit_rate() * 100.0);
//! }
//! # stats_registry::unregister("sessions");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::CacheStats;

static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<CacheStats>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a cache's statistics under a given name.
///
/// Re-registering a name replaces the previous handle.
pub fn register(name: &str, stats: Arc<CacheStats>) {
    let mut registry = STATS_REGISTRY.write();
    registry.insert(name.to_string(), stats);
}

/// Removes a registered name.
///
/// # Returns
///
/// * `true` - If the name was registered and has been removed
/// * `false` - If no cache with that name was registered
pub fn unregister(name: &str) -> bool {
    let mut registry = STATS_REGISTRY.write();
    registry.remove(name).is_some()
}

/// Gets statistics for a registered cache by name.
///
/// Returns a cloned snapshot of the statistics at the time of the call.
///
/// # Examples
///
/// ```
/// use refresca::stats_registry;
///
/// if let Some(stats) = stats_registry::get("sessions") {
///     println!("hits: {}", stats.hits());
/// }
/// ```
pub fn get(name: &str) -> Option<CacheStats> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).map(|stats| (**stats).clone())
}

/// Gets the live stats handle for a registered cache by name.
///
/// Unlike [`get`] this shares the counters with the cache, so later reads
/// observe new activity without another registry lookup.
pub fn handle(name: &str) -> Option<Arc<CacheStats>> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).cloned()
}

/// Lists all registered cache names.
pub fn list() -> Vec<String> {
    let registry = STATS_REGISTRY.read();
    registry.keys().cloned().collect()
}

/// Resets the counters of a registered cache to zero.
///
/// # Returns
///
/// * `true` - If the cache was found and its counters were reset
/// * `false` - If no cache with that name is registered
pub fn reset(name: &str) -> bool {
    let registry = STATS_REGISTRY.read();
    if let Some(stats) = registry.get(name) {
        stats.reset();
        true
    } else {
        false
    }
}

/// Clears the registry.
///
/// This removes every registration but does not reset the statistics
/// themselves; caches keep counting into their own handles.
pub fn clear() {
    let mut registry = STATS_REGISTRY.write();
    registry.clear();
}
