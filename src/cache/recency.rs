//! Bounded recency cache with hybrid eviction.
//!
//! [`RecencyCache`] maps keys to lazily produced values and bounds its size
//! two ways:
//!
//! - **Capacity**: at most `max_entries` live entries. Inserting into a full
//!   cache evicts the least-recently-used entry that is not pinned. When
//!   every entry is pinned the insert fails with
//!   [`AlmanacError::CacheFull`].
//! - **Idle time**: entries untouched for `idle_ttl` are removed by the
//!   periodic sweep ([`RecencyCache::spawn_idle_sweeper`]) and treated as
//!   expired when a lookup finds them first.
//!
//! # Construction
//!
//! A miss reserves the key with an in-flight slot before the factory runs,
//! then releases the structural lock. Concurrent callers for the same key
//! block on that slot and share its result, so one miss runs one factory.
//! In-flight slots count toward capacity and are always pinned.
//!
//! # Locking
//!
//! One mutex guards the key map and the recency order. Factories, eviction
//! listeners and waiting on in-flight slots all happen outside it, which is
//! why lock poisoning is recovered rather than reported: no user code ever
//! runs while the guard is held.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::telemetry;
use crate::{AlmanacError, Result};

/// Configuration for a [`RecencyCache`].
///
/// ```rust
/// # use almanac::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new("textures")
///     .max_entries(64)
///     .ttl(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache name, used as the `cache` label on metrics and in logs.
    pub name: &'static str,
    /// Maximum number of live entries. Default: 1,000.
    pub max_entries: usize,
    /// Idle window after which an untouched entry is dropped. Default: 10 minutes.
    pub idle_ttl: Duration,
    /// Period of the background idle sweep. Defaults to `idle_ttl`.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "cache",
            max_entries: 1_000,
            idle_ttl: Duration::from_secs(600),
            sweep_interval: None,
        }
    }
}

impl CacheConfig {
    /// Create a named config with default limits.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Set the maximum number of live entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the idle window.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Run the idle sweep at `interval` instead of once per idle window.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// The effective sweep period.
    pub fn effective_sweep_interval(&self) -> Duration {
        self.sweep_interval.unwrap_or(self.idle_ttl)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(AlmanacError::Configuration(format!(
                "cache '{}': max_entries must be at least 1",
                self.name
            )));
        }
        if self.idle_ttl.is_zero() || self.effective_sweep_interval().is_zero() {
            return Err(AlmanacError::Configuration(format!(
                "cache '{}': idle window and sweep interval must be non-zero",
                self.name
            )));
        }
        Ok(())
    }
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// Made room for a new key in a full cache.
    Capacity,
    /// Idle for at least the configured window.
    Idle,
    /// Removed by [`RecencyCache::clear`].
    Cleared,
    /// Removed by [`RecencyCache::invalidate`].
    Explicit,
}

impl EvictionCause {
    /// Label value used on the eviction counter.
    pub fn as_str(self) -> &'static str {
        match self {
            EvictionCause::Capacity => "capacity",
            EvictionCause::Idle => "idle",
            EvictionCause::Cleared => "cleared",
            EvictionCause::Explicit => "explicit",
        }
    }
}

/// Callback invoked once per evicted value, after it is unreachable.
pub type EvictionListener<K, V> = Arc<dyn Fn(K, V, EvictionCause) + Send + Sync>;

/// Result of an in-flight construction, shared with waiting callers.
enum Outcome<V> {
    Ready(V),
    Abandoned,
}

struct Inflight<V> {
    outcome: Mutex<Option<Outcome<V>>>,
    done: Condvar,
}

impl<V: Clone> Inflight<V> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    /// Block until the constructing caller finishes. `None` means the
    /// factory failed and the waiter should retry.
    fn wait(&self) -> Option<V> {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        while outcome.is_none() {
            outcome = self
                .done
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match outcome.as_ref() {
            Some(Outcome::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    fn finish(&self, result: Outcome<V>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.done.notify_all();
    }
}

enum Slot<V> {
    Building(Arc<Inflight<V>>),
    Ready(V),
}

struct Entry<V> {
    slot: Slot<V>,
    /// Position in the recency order; larger is more recent.
    seq: u64,
    touched: Instant,
    pins: usize,
}

impl<V> Entry<V> {
    fn is_pinned(&self) -> bool {
        self.pins > 0 || matches!(self.slot, Slot::Building(_))
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.touched) >= ttl
    }

    fn into_ready(self) -> Option<V> {
        match self.slot {
            Slot::Ready(value) => Some(value),
            Slot::Building(_) => None,
        }
    }
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// seq -> key, least recent first.
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K, V> Inner<K, V>
where
    K: Clone + Eq + Hash,
{
    fn insert(&mut self, key: K, slot: Slot<V>, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key,
            Entry {
                slot,
                seq,
                touched: now,
                pins: 0,
            },
        );
    }

    /// Move `key` to the most-recently-used end.
    fn touch(&mut self, key: &K, now: Instant) -> bool {
        let seq = self.next_seq;
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        self.next_seq += 1;
        self.order.remove(&entry.seq);
        entry.seq = seq;
        entry.touched = now;
        self.order.insert(seq, key.clone());
        true
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    /// Evict the least-recently-used unpinned entry.
    fn pop_lru_unpinned(&mut self) -> Option<(K, V)> {
        let victim = self
            .order
            .values()
            .find(|key| self.entries.get(*key).is_some_and(|e| !e.is_pinned()))
            .cloned()?;
        let value = self.remove(&victim)?.into_ready()?;
        Some((victim, value))
    }

    fn drain_idle(&mut self, now: Instant, ttl: Duration) -> Vec<(K, V)> {
        // The order is by touch time, so idle entries form a prefix.
        let expired: Vec<K> = self
            .order
            .values()
            .map_while(|key| self.entries.get(key).map(|e| (key, e)))
            .take_while(|(_, e)| e.is_idle(now, ttl))
            .filter(|(_, e)| !e.is_pinned())
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                let value = self.remove(&key)?.into_ready()?;
                Some((key, value))
            })
            .collect()
    }
}

/// Thread-safe bounded cache with LRU + idle-time eviction and pinning.
///
/// Values are handed out by clone, so `V` is typically an `Arc` or a
/// cheap handle. See the module docs for the eviction and locking rules.
pub struct RecencyCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    name: &'static str,
    capacity: usize,
    idle_ttl: Duration,
    sweep_interval: Duration,
    listener: Option<EvictionListener<K, V>>,
}

impl<K, V> RecencyCache<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(config.max_entries),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            name: config.name,
            capacity: config.max_entries,
            idle_ttl: config.idle_ttl,
            sweep_interval: config.effective_sweep_interval(),
            listener: None,
        })
    }

    /// Create an empty cache that reports every eviction to `listener`.
    ///
    /// The listener runs exactly once per evicted value, after the entry
    /// has been removed and the cache lock released.
    pub fn with_listener(config: &CacheConfig, listener: EvictionListener<K, V>) -> Result<Self> {
        let mut cache = Self::new(config)?;
        cache.listener = Some(listener);
        Ok(cache)
    }

    /// Return the cached value for `key`, or build it with `factory`.
    pub fn get_or_add<F>(&self, key: K, factory: F) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        self.get_or_try_add(key, || Ok(factory()))
    }

    /// Like [`get_or_add`](Self::get_or_add) with a fallible factory.
    ///
    /// A factory error is returned to this caller only; the key is released
    /// and callers that were waiting on it retry with their own factory.
    pub fn get_or_try_add<F>(&self, key: K, factory: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        loop {
            let mut evicted = Vec::new();
            let mut inner = self.lock();
            let now = Instant::now();

            let mut stale = false;
            if let Some(entry) = inner.entries.get(&key) {
                match &entry.slot {
                    Slot::Building(inflight) => {
                        let inflight = Arc::clone(inflight);
                        drop(inner);
                        if let Some(value) = inflight.wait() {
                            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.name)
                                .increment(1);
                            return Ok(value);
                        }
                        continue;
                    }
                    Slot::Ready(_) if !entry.is_pinned() && entry.is_idle(now, self.idle_ttl) => {
                        stale = true;
                    }
                    Slot::Ready(value) => {
                        let value = value.clone();
                        inner.touch(&key, now);
                        drop(inner);
                        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.name)
                            .increment(1);
                        return Ok(value);
                    }
                }
            }

            if stale && let Some(value) = inner.remove(&key).and_then(Entry::into_ready) {
                evicted.push((key.clone(), value, EvictionCause::Idle));
            }

            if inner.entries.len() >= self.capacity {
                match inner.pop_lru_unpinned() {
                    Some((victim, value)) => {
                        evicted.push((victim, value, EvictionCause::Capacity));
                    }
                    None => {
                        drop(inner);
                        self.notify(evicted);
                        metrics::counter!(telemetry::CACHE_FULL_TOTAL, "cache" => self.name)
                            .increment(1);
                        return Err(AlmanacError::CacheFull {
                            capacity: self.capacity,
                        });
                    }
                }
            }

            let inflight = Arc::new(Inflight::new());
            inner.insert(key.clone(), Slot::Building(Arc::clone(&inflight)), now);
            drop(inner);

            self.notify(evicted);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => self.name).increment(1);
            debug!(cache = self.name, ?key, "cache miss, constructing value");

            let build = BuildGuard {
                cache: self,
                key: &key,
                inflight: &inflight,
                finished: false,
            };
            return build.finish(factory());
        }
    }

    /// Mark `key` as used now. Returns `false` if the key is absent.
    pub fn mark_usage(&self, key: &K) -> bool {
        self.lock().touch(key, Instant::now())
    }

    /// Mark `key` as used only if its resident value satisfies `matches`.
    ///
    /// Lets a value that may already have been evicted and replaced touch
    /// its own entry and nobody else's.
    pub fn mark_usage_if<P>(&self, key: &K, matches: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let mut inner = self.lock();
        let current = match inner.entries.get(key).map(|e| &e.slot) {
            Some(Slot::Ready(value)) => matches(value),
            _ => false,
        };
        current && inner.touch(key, Instant::now())
    }

    /// Look up `key` without constructing it. Touches the entry on a hit.
    ///
    /// An unpinned entry idle for at least the idle window is evicted and
    /// reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();
        let entry = inner.entries.get(key)?;
        let Slot::Ready(value) = &entry.slot else {
            return None;
        };
        if !entry.is_pinned() && entry.is_idle(now, self.idle_ttl) {
            let expired = inner.remove(key).and_then(Entry::into_ready);
            drop(inner);
            if let Some(value) = expired {
                self.notify(vec![(key.clone(), value, EvictionCause::Idle)]);
            }
            return None;
        }
        let value = value.clone();
        inner.touch(key, now);
        Some(value)
    }

    /// Protect a resident entry from capacity eviction and idle sweeps.
    ///
    /// Pins are counted; each [`pin`](Self::pin) needs a matching
    /// [`unpin`](Self::unpin). Returns `false` if the key is absent.
    pub fn pin(&self, key: &K) -> bool {
        match self.lock().entries.get_mut(key) {
            Some(entry) => {
                entry.pins += 1;
                true
            }
            None => false,
        }
    }

    /// Release one pin on `key`. Returns `false` if the key is absent or
    /// was not pinned.
    pub fn unpin(&self, key: &K) -> bool {
        match self.lock().entries.get_mut(key) {
            Some(entry) if entry.pins > 0 => {
                entry.pins -= 1;
                true
            }
            _ => false,
        }
    }

    /// Pin `key` only if its resident value satisfies `matches`.
    pub fn pin_if<P>(&self, key: &K, matches: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(key) else {
            return false;
        };
        let owned = match &entry.slot {
            Slot::Ready(value) => matches(value),
            Slot::Building(_) => false,
        };
        if owned {
            entry.pins += 1;
        }
        owned
    }

    /// Release one pin on `key` only if its resident value satisfies
    /// `matches`.
    pub fn unpin_if<P>(&self, key: &K, matches: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(key) else {
            return false;
        };
        let owned = match &entry.slot {
            Slot::Ready(value) => entry.pins > 0 && matches(value),
            Slot::Building(_) => false,
        };
        if owned {
            entry.pins -= 1;
        }
        owned
    }

    /// Remove `key` if it is resident and unpinned.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = {
            let mut inner = self.lock();
            match inner.entries.get(key) {
                Some(entry) if !entry.is_pinned() => inner.remove(key).and_then(Entry::into_ready),
                _ => None,
            }
        };
        match removed {
            Some(value) => {
                self.notify(vec![(key.clone(), value, EvictionCause::Explicit)]);
                true
            }
            None => false,
        }
    }

    /// Remove every entry.
    ///
    /// In-flight constructions still complete for their callers, but their
    /// value is not retained. Pins do not survive a clear.
    pub fn clear(&self) {
        let drained: Vec<(K, Entry<V>)> = {
            let mut inner = self.lock();
            inner.order.clear();
            inner.entries.drain().collect()
        };
        let evicted = drained
            .into_iter()
            .filter_map(|(key, entry)| Some((key, entry.into_ready()?, EvictionCause::Cleared)))
            .collect::<Vec<_>>();
        debug!(cache = self.name, count = evicted.len(), "cache cleared");
        self.notify(evicted);
    }

    /// Drop every unpinned entry idle for at least the idle window.
    ///
    /// Returns the number of entries removed. The background sweeper calls
    /// this once per sweep interval.
    pub fn sweep_idle(&self) -> usize {
        let expired = self.lock().drain_idle(Instant::now(), self.idle_ttl);
        let count = expired.len();
        if count > 0 {
            debug!(cache = self.name, count, "idle sweep evicted entries");
        }
        self.notify(
            expired
                .into_iter()
                .map(|(key, value)| (key, value, EvictionCause::Idle))
                .collect(),
        );
        count
    }

    /// Start the periodic idle sweep on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped. Dropping the returned handle stops it.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> Result<SweeperHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| AlmanacError::NoRuntime)?;
        let weak = Arc::downgrade(self);
        let period = self.sweep_interval;
        let name = self.name;

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                cache.sweep_idle();
            }
            debug!(cache = name, "idle sweeper stopped");
        });

        Ok(SweeperHandle { task })
    }

    /// Whether `key` is resident (ready or under construction).
    pub fn contains_key(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Resident keys, least recently used first.
    pub fn keys(&self) -> Vec<K> {
        self.lock().order.values().cloned().collect()
    }

    /// Number of live entries, including those under construction.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of live entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Idle window after which untouched entries are dropped.
    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Cache name used for metrics and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, evicted: Vec<(K, V, EvictionCause)>) {
        for (key, value, cause) in evicted {
            metrics::counter!(
                telemetry::CACHE_EVICTIONS_TOTAL,
                "cache" => self.name,
                "cause" => cause.as_str()
            )
            .increment(1);
            debug!(cache = self.name, ?key, cause = cause.as_str(), "evicted entry");
            if let Some(listener) = &self.listener {
                listener(key, value, cause);
            }
        }
    }
}

/// Publishes a factory result, or releases the key if the factory panics.
struct BuildGuard<'a, K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: &'a RecencyCache<K, V>,
    key: &'a K,
    inflight: &'a Arc<Inflight<V>>,
    finished: bool,
}

impl<K, V> BuildGuard<'_, K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn finish(mut self, result: Result<V>) -> Result<V> {
        self.finished = true;
        match result {
            Ok(value) => {
                {
                    let mut inner = self.cache.lock();
                    if let Some(entry) = self.owned_entry(&mut inner) {
                        entry.slot = Slot::Ready(value.clone());
                        inner.touch(self.key, Instant::now());
                    }
                }
                self.inflight.finish(Outcome::Ready(value.clone()));
                Ok(value)
            }
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    /// The key's entry, provided it is still this construction's slot.
    /// A clear (and possibly a new miss) may have replaced it meanwhile.
    fn owned_entry<'i>(&self, inner: &'i mut Inner<K, V>) -> Option<&'i mut Entry<V>> {
        inner
            .entries
            .get_mut(self.key)
            .filter(|entry| matches!(&entry.slot, Slot::Building(f) if Arc::ptr_eq(f, self.inflight)))
    }

    fn release(&self) {
        {
            let mut inner = self.cache.lock();
            if self.owned_entry(&mut inner).is_some() {
                inner.remove(self.key);
            }
        }
        self.inflight.finish(Outcome::Abandoned);
    }
}

impl<K, V> Drop for BuildGuard<'_, K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

/// Handle to a running idle sweeper. Dropping it stops the sweep.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper.
    pub fn stop(self) {
        self.task.abort();
    }

    /// Whether the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(max: usize) -> RecencyCache<&'static str, u32> {
        RecencyCache::new(&CacheConfig::new("test").max_entries(max)).unwrap()
    }

    #[test]
    fn lru_scenario_evicts_least_recent() {
        let cache = cache(2);
        cache.get_or_add("a", || 1).unwrap();
        cache.get_or_add("b", || 2).unwrap();
        assert!(cache.mark_usage(&"a"));
        cache.get_or_add("c", || 3).unwrap();

        assert_eq!(cache.keys(), vec!["a", "c"]);
        assert!(!cache.contains_key(&"b"));
    }

    #[test]
    fn hit_does_not_rerun_factory() {
        let cache = cache(4);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cache
                .get_or_add("k", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    7
                })
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hit_moves_entry_to_most_recent() {
        let cache = cache(3);
        cache.get_or_add("a", || 1).unwrap();
        cache.get_or_add("b", || 2).unwrap();
        cache.get_or_add("a", || 99).unwrap();
        assert_eq!(cache.keys(), vec!["b", "a"]);
    }

    #[test]
    fn pinned_entry_is_skipped_by_capacity_eviction() {
        let cache = cache(2);
        cache.get_or_add("a", || 1).unwrap();
        cache.get_or_add("b", || 2).unwrap();
        assert!(cache.pin(&"a"));
        cache.get_or_add("c", || 3).unwrap();
        assert_eq!(cache.keys(), vec!["a", "c"]);
    }

    #[test]
    fn all_pinned_reports_cache_full() {
        let cache = cache(2);
        cache.get_or_add("a", || 1).unwrap();
        cache.get_or_add("b", || 2).unwrap();
        cache.pin(&"a");
        cache.pin(&"b");

        let err = cache.get_or_add("c", || 3).unwrap_err();
        assert!(matches!(err, AlmanacError::CacheFull { capacity: 2 }));
        assert!(err.is_retriable());
        assert_eq!(cache.len(), 2);

        cache.unpin(&"b");
        assert_eq!(cache.get_or_add("c", || 3).unwrap(), 3);
        assert_eq!(cache.keys(), vec!["a", "c"]);
    }

    #[test]
    fn unpin_without_pin_is_rejected() {
        let cache = cache(2);
        cache.get_or_add("a", || 1).unwrap();
        assert!(!cache.unpin(&"a"));
        assert!(!cache.pin(&"missing"));
    }

    #[test]
    fn factory_error_releases_key() {
        let cache = cache(2);
        let err = cache
            .get_or_try_add("a", || Err(AlmanacError::construction::<u32>("boom")))
            .unwrap_err();
        assert!(matches!(err, AlmanacError::Construction { .. }));
        assert!(!cache.contains_key(&"a"));
        assert_eq!(cache.get_or_add("a", || 5).unwrap(), 5);
    }

    #[test]
    fn factory_panic_releases_key() {
        let cache = cache(2);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cache.get_or_add("a", || panic!("factory panicked"))
        }));
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_add("a", || 1).unwrap(), 1);
    }

    #[test]
    fn clear_forces_factory_on_next_lookup() {
        let cache = cache(2);
        cache.get_or_add("a", || 1).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_add("a", || 2).unwrap(), 2);
    }

    #[test]
    fn clear_during_construction_drops_result() {
        let cache = cache(2);
        let value = cache
            .get_or_add("a", || {
                cache.clear();
                10
            })
            .unwrap();
        assert_eq!(value, 10);
        assert!(!cache.contains_key(&"a"));
    }

    #[test]
    fn idle_entries_are_swept() {
        let cache: RecencyCache<&str, u32> =
            RecencyCache::new(&CacheConfig::new("test").ttl(Duration::from_millis(20))).unwrap();
        cache.get_or_add("old", || 1).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        cache.get_or_add("fresh", || 2).unwrap();

        assert_eq!(cache.sweep_idle(), 1);
        assert_eq!(cache.keys(), vec!["fresh"]);
    }

    #[test]
    fn idle_sweep_skips_pinned_entries() {
        let cache: RecencyCache<&str, u32> =
            RecencyCache::new(&CacheConfig::new("test").ttl(Duration::from_millis(10))).unwrap();
        cache.get_or_add("keep", || 1).unwrap();
        cache.pin(&"keep");
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.sweep_idle(), 0);
        assert!(cache.contains_key(&"keep"));
    }

    #[test]
    fn expired_entry_is_rebuilt_on_lookup() {
        let cache: RecencyCache<&str, u32> =
            RecencyCache::new(&CacheConfig::new("test").ttl(Duration::from_millis(10))).unwrap();
        cache.get_or_add("a", || 1).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get_or_add("a", || 2).unwrap(), 2);
    }

    #[test]
    fn get_does_not_revive_idle_entry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache: RecencyCache<&str, u32> = RecencyCache::with_listener(
            &CacheConfig::new("test").ttl(Duration::from_millis(10)),
            Arc::new(move |key: &'static str, _value: u32, cause: EvictionCause| {
                sink.lock().unwrap().push((key, cause))
            }),
        )
        .unwrap();
        cache.get_or_add("cold", || 1).unwrap();
        cache.get_or_add("pinned", || 2).unwrap();
        cache.pin(&"pinned");
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.get(&"cold"), None);
        assert!(!cache.contains_key(&"cold"));
        assert_eq!(cache.get(&"pinned"), Some(2));
        assert_eq!(*seen.lock().unwrap(), vec![("cold", EvictionCause::Idle)]);
    }

    #[test]
    fn pin_if_checks_resident_value() {
        let cache = cache(2);
        cache.get_or_add("a", || 1).unwrap();
        assert!(!cache.pin_if(&"a", |v| *v == 2));
        assert!(!cache.unpin_if(&"a", |v| *v == 1));
        assert!(cache.pin_if(&"a", |v| *v == 1));
        assert!(!cache.invalidate(&"a"));
        assert!(!cache.unpin_if(&"a", |v| *v == 2));
        assert!(cache.unpin_if(&"a", |v| *v == 1));
        assert!(cache.invalidate(&"a"));
    }

    #[test]
    fn listener_sees_each_eviction_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache: RecencyCache<&str, u32> = RecencyCache::with_listener(
            &CacheConfig::new("test").max_entries(1),
            Arc::new(move |key: &'static str, _value: u32, cause: EvictionCause| {
                sink.lock().unwrap().push((key, cause))
            }),
        )
        .unwrap();

        cache.get_or_add("a", || 1).unwrap();
        cache.get_or_add("b", || 2).unwrap();
        assert!(cache.invalidate(&"b"));
        assert!(!cache.invalidate(&"b"));
        cache.get_or_add("c", || 3).unwrap();
        cache.clear();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("a", EvictionCause::Capacity),
                ("b", EvictionCause::Explicit),
                ("c", EvictionCause::Cleared),
            ]
        );
    }

    #[test]
    fn listener_runs_after_entry_is_unreachable() {
        let cache: Arc<RecencyCache<&str, u32>> = Arc::new_cyclic(|weak: &std::sync::Weak<_>| {
            let weak = weak.clone();
            RecencyCache::with_listener(
                &CacheConfig::new("test").max_entries(1),
                Arc::new(move |key: &'static str, _value: u32, _cause: EvictionCause| {
                    let cache: Arc<RecencyCache<&str, u32>> = weak.upgrade().unwrap();
                    assert!(!cache.contains_key(&key));
                }),
            )
            .unwrap()
        });
        cache.get_or_add("a", || 1).unwrap();
        cache.get_or_add("b", || 2).unwrap();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result: Result<RecencyCache<&str, u32>> =
            RecencyCache::new(&CacheConfig::new("test").max_entries(0));
        assert!(matches!(result, Err(AlmanacError::Configuration(_))));
    }

    #[test]
    fn sweeper_requires_runtime() {
        let cache = Arc::new(cache(1));
        assert!(matches!(
            cache.spawn_idle_sweeper(),
            Err(AlmanacError::NoRuntime)
        ));
    }
}
