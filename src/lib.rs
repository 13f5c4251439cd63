//! # Refresca
//!
//! Thread-safe in-memory caches with pluggable expiration and on-demand or
//! background refresh.
//!
//! Three cache shapes cover the common ways a process keeps derived values
//! around:
//!
//! - [`KeyedCache`] - a plain keyed store. Callers insert values, reads can
//!   check validity, and expired entries linger until a cleanup pass (manual
//!   or on a background thread) removes them.
//! - [`OnDemandCache`] - a self-populating cache. A factory regenerates
//!   absent or expired values synchronously on the read path, so callers
//!   always see live data.
//! - [`BackgroundCache`] - a self-populating cache that serves stale values
//!   and regenerates expired entries on a dedicated refresh thread, so reads
//!   never block on the factory once a key is populated.
//!
//! ## Features
//!
//! - **Pluggable expiration**: never, immediate, time-to-live, local
//!   calendar-day change, or a custom predicate over the entry
//! - **Lazy expiration**: entries are judged on access, and a verdict is
//!   sticky once reached
//! - **Value release**: drop a large payload early while keeping the entry
//!   in place
//! - **Statistics**: atomic hit/miss/update/eviction/cleanup counters per
//!   cache, with an optional process-wide [`stats_registry`]
//! - **Testable time**: every cache accepts a [`Clock`], so expiration can
//!   be driven by a [`MockClock`] instead of sleeps
//!
//! ## Module Organization
//!
//! - [`CachedEntry`] - Value wrapper with insertion timestamps and the
//!   sticky expired flag
//! - [`Expiration`] - The expiration policies and the [`EntryView`] handed
//!   to custom predicates
//! - [`Clock`] - Time injection (system and mock clocks)
//! - [`CacheStats`] - Atomic per-cache counters
//! - [`stats_registry`] - Name-based registry of stats handles
//!
//! ## Quick Start
//!
//! ```
//! use refresca::{Expiration, KeyedCache};
//! use std::time::Duration;
//!
//! let cache: KeyedCache<String, String> =
//!     KeyedCache::new(Expiration::After(Duration::from_secs(300)));
//!
//! cache.insert("greeting".to_string(), "hola".to_string());
//! assert_eq!(cache.get_valid(&"greeting".to_string()), Some("hola".to_string()));
//!
//! let stats = cache.stats();
//! assert_eq!(stats.hits(), 1);
//! ```

mod background_cache;
mod cache_entry;
mod clock;
mod expiration;
mod keyed_cache;
mod on_demand_cache;
mod stats;
mod sweeper;

pub mod stats_registry;

pub use background_cache::BackgroundCache;
pub use cache_entry::CachedEntry;
pub use clock::{Clock, MockClock, SystemClock};
pub use expiration::{EntryView, Expiration, ExpirationPredicate};
pub use keyed_cache::KeyedCache;
pub use on_demand_cache::{OnDemandCache, RefreshFn};
pub use stats::CacheStats;
