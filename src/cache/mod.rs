//! Caching subsystem.
//!
//! [`RecencyCache`] is the one cache engine in the crate. Two independently
//! tuned instances sit behind the public facades:
//!
//! - [`ConfigPool`](crate::ConfigPool): one lazily constructed instance per
//!   pooled kind, default 50 entries / 10 minute idle window.
//! - [`LocalizationStore`](crate::LocalizationStore): hot cache over the
//!   loaded translation table, default 1,000 entries / 8 minute idle window.

pub mod recency;

pub use recency::{CacheConfig, EvictionCause, EvictionListener, RecencyCache, SweeperHandle};
