//! Telemetry metric name constants.
//!
//! Centralised metric names for almanac caches. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `almanac_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `cache`: cache name (e.g. "config_pool", "i18n")
//! - `cause`: eviction cause: "capacity", "idle", "cleared" or "explicit"
//! - `kind`: pooled object type name

/// Lookups answered by a resident (or in-flight) entry.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "almanac_cache_hits_total";

/// Lookups that ran the factory.
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "almanac_cache_misses_total";

/// Entries removed from a cache.
///
/// Labels: `cache`, `cause`.
pub const CACHE_EVICTIONS_TOTAL: &str = "almanac_cache_evictions_total";

/// Insertions rejected because every entry was pinned.
///
/// Labels: `cache`.
pub const CACHE_FULL_TOTAL: &str = "almanac_cache_full_total";

/// Unpooled instances handed out by `ConfigPool::try_get` under pool pressure.
///
/// Labels: `kind`.
pub const POOL_UNPOOLED_TOTAL: &str = "almanac_pool_unpooled_total";

/// Translation lookups that resolved to the missing-key sentinel.
pub const I18N_MISSING_TOTAL: &str = "almanac_i18n_missing_total";
