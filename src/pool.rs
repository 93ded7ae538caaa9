//! Object pool for lazily constructed configuration kinds.
//!
//! [`ConfigPool`] keeps at most one live instance per pooled kind (one
//! Rust type implementing [`PooledObject`]), keyed by the type's identity.
//! Each kind is an aggregate, typically a whole data table, not a single
//! record.
//!
//! Allocation and construction are separate steps. [`ConfigPool::get`]
//! allocates a cheap [`Pooled<T>`] shell through the cache; the expensive
//! [`PooledObject::construct`] runs on the first call to
//! [`Pooled::data`], once, under the [`LazyInit`] protocol. Every access
//! through `data()` marks the instance as recently used in the pool.
//!
//! # Eviction
//!
//! When the pool evicts an instance it calls [`PooledObject::on_dispose`]
//! exactly once. Callers still holding the `Arc` keep a valid object; the
//! memory goes away when the last holder drops it.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::cache::{EvictionCause, RecencyCache, SweeperHandle};
use crate::config::PoolConfig;
use crate::lazy::{InitState, LazyInit};
use crate::telemetry;
use crate::{AlmanacError, Result};

/// A kind that can be managed by [`ConfigPool`].
///
/// `Self` is the cheap shell allocated on a pool miss; [`Data`](Self::Data)
/// is what [`construct`](Self::construct) builds on first use.
pub trait PooledObject: Send + Sync + 'static {
    /// The constructed contents.
    type Data: Send + Sync + 'static;

    /// Build the contents. Runs at most once successfully per instance;
    /// an error leaves the instance uninitialized for a later retry.
    fn construct(&self) -> Result<Self::Data>;

    /// Runs after a successful construction, before the instance is
    /// published as ready.
    fn on_initialized(&self, _data: &Self::Data) {}

    /// Runs once when the instance leaves the pool, or when an unpooled
    /// instance is dropped.
    fn on_dispose(&self) {}
}

/// Pool key: the identity of a pooled kind.
#[derive(Clone, Copy)]
pub struct PoolKey {
    id: TypeId,
    name: &'static str,
}

impl PoolKey {
    /// Key for kind `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type name of the kind.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for PoolKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PoolKey {}

impl Hash for PoolKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erased view of a `Pooled<T>` as stored in the cache.
trait PoolSlot: Send + Sync {
    fn dispose(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn addr(&self) -> *const ();
}

type PoolCache = RecencyCache<PoolKey, Arc<dyn PoolSlot>>;

/// A pooled kind together with its lazily constructed contents.
pub struct Pooled<T: PooledObject> {
    object: T,
    init: LazyInit<T::Data>,
    owner: Option<Weak<PoolCache>>,
    disposed: AtomicBool,
}

impl<T: PooledObject> Pooled<T> {
    fn new(object: T, owner: Option<Weak<PoolCache>>) -> Self {
        Self {
            object,
            init: LazyInit::new(),
            owner,
            disposed: AtomicBool::new(false),
        }
    }

    /// The constructed contents, building them on first access.
    ///
    /// Marks this instance as recently used in its pool. The pool entry is
    /// pinned while construction runs. Construction errors are returned
    /// as-is; the next call retries.
    pub fn data(&self) -> Result<&T::Data> {
        let data = self.init.get_or_try_init(|| {
            let _pin = self.pin_while_constructing();
            let data = self.object.construct()?;
            self.object.on_initialized(&data);
            debug!(kind = std::any::type_name::<T>(), "constructed pooled object");
            Ok(data)
        })?;
        self.track_usage();
        Ok(data)
    }

    /// The unconstructed shell.
    pub fn object(&self) -> &T {
        &self.object
    }

    /// Construction state.
    pub fn state(&self) -> InitState {
        self.init.state()
    }

    /// Whether this instance was handed out by the pool (as opposed to an
    /// unpooled overflow allocation).
    pub fn is_pooled(&self) -> bool {
        self.owner.is_some()
    }

    /// Whether the disposal hook has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn track_usage(&self) {
        let Some(cache) = self.owner.as_ref().and_then(Weak::upgrade) else {
            return;
        };
        let me = self.addr();
        cache.mark_usage_if(&PoolKey::of::<T>(), |slot| slot.addr() == me);
    }

    /// Pin this instance's pool entry, if it is still the resident one.
    fn pin_while_constructing(&self) -> Option<ConstructionPin> {
        let cache = self.owner.as_ref().and_then(Weak::upgrade)?;
        let key = PoolKey::of::<T>();
        let addr = self.addr();
        if !cache.pin_if(&key, |slot| slot.addr() == addr) {
            return None;
        }
        Some(ConstructionPin { cache, key, addr })
    }
}

/// Releases the construction pin, including when `construct` unwinds.
struct ConstructionPin {
    cache: Arc<PoolCache>,
    key: PoolKey,
    addr: *const (),
}

impl Drop for ConstructionPin {
    fn drop(&mut self) {
        let addr = self.addr;
        self.cache.unpin_if(&self.key, |slot| slot.addr() == addr);
    }
}

impl<T: PooledObject> PoolSlot for Pooled<T> {
    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.object.on_dispose();
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn addr(&self) -> *const () {
        self as *const Self as *const ()
    }
}

impl<T: PooledObject> Drop for Pooled<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: PooledObject + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("object", &self.object)
            .field("state", &self.state())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

/// Result of [`ConfigPool::try_get`].
///
/// `Pooled` instances are shared and deduplicated per kind. `Unpooled`
/// instances were allocated outside the pool because it was full; they are
/// not shared, not tracked for eviction, and repeated calls under pressure
/// return independent instances.
pub enum Lease<T: PooledObject> {
    Pooled(Arc<Pooled<T>>),
    Unpooled(Arc<Pooled<T>>),
}

impl<T: PooledObject> Lease<T> {
    /// Whether the instance is the pool's shared one.
    pub fn is_pooled(&self) -> bool {
        matches!(self, Lease::Pooled(_))
    }

    /// The instance, regardless of provenance.
    pub fn into_inner(self) -> Arc<Pooled<T>> {
        match self {
            Lease::Pooled(p) | Lease::Unpooled(p) => p,
        }
    }
}

impl<T: PooledObject> Deref for Lease<T> {
    type Target = Pooled<T>;

    fn deref(&self) -> &Pooled<T> {
        match self {
            Lease::Pooled(p) | Lease::Unpooled(p) => p,
        }
    }
}

/// Pool of lazily constructed configuration kinds.
///
/// One pool is meant to live for the whole process and be shared by
/// reference (or `Arc`) with its consumers.
pub struct ConfigPool {
    cache: Arc<PoolCache>,
}

impl ConfigPool {
    /// Create an empty pool.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let cache = RecencyCache::with_listener(
            &config.cache_config(),
            Arc::new(|key: PoolKey, slot: Arc<dyn PoolSlot>, cause: EvictionCause| {
                debug!(kind = key.name(), cause = cause.as_str(), "releasing pooled object");
                slot.dispose();
            }),
        )?;
        Ok(Self {
            cache: Arc::new(cache),
        })
    }

    /// The shared instance of kind `T`, allocating it on a miss.
    ///
    /// Construction is deferred to the first [`Pooled::data`] call. Fails
    /// with [`AlmanacError::CacheFull`] when every resident kind is pinned.
    pub fn get<T>(&self) -> Result<Arc<Pooled<T>>>
    where
        T: PooledObject + Default,
    {
        let key = PoolKey::of::<T>();
        let owner = Arc::downgrade(&self.cache);
        let slot = self.cache.get_or_add(key, move || {
            Arc::new(Pooled::new(T::default(), Some(owner))) as Arc<dyn PoolSlot>
        })?;
        slot.into_any()
            .downcast::<Pooled<T>>()
            .map_err(|_| AlmanacError::KindMismatch(key.name()))
    }

    /// Like [`get`](Self::get), but falls back to an unpooled instance when
    /// the pool is full so the caller is never blocked by pool pressure.
    ///
    /// Any other error is returned.
    pub fn try_get<T>(&self) -> Result<Lease<T>>
    where
        T: PooledObject + Default,
    {
        match self.get::<T>() {
            Ok(pooled) => Ok(Lease::Pooled(pooled)),
            Err(AlmanacError::CacheFull { capacity }) => {
                let kind = std::any::type_name::<T>();
                warn!(kind, capacity, "config pool full, allocating unpooled instance");
                metrics::counter!(telemetry::POOL_UNPOOLED_TOTAL, "kind" => kind).increment(1);
                Ok(Lease::Unpooled(Arc::new(Pooled::new(T::default(), None))))
            }
            Err(err) => Err(err),
        }
    }

    /// Whether kind `T` is resident.
    pub fn contains<T: PooledObject>(&self) -> bool {
        self.cache.contains_key(&PoolKey::of::<T>())
    }

    /// Protect kind `T` from eviction until a matching [`unpin`](Self::unpin).
    pub fn pin<T: PooledObject>(&self) -> bool {
        self.cache.pin(&PoolKey::of::<T>())
    }

    /// Release one pin on kind `T`.
    pub fn unpin<T: PooledObject>(&self) -> bool {
        self.cache.unpin(&PoolKey::of::<T>())
    }

    /// Release kind `T` now, if resident and unpinned.
    pub fn evict<T: PooledObject>(&self) -> bool {
        self.cache.invalidate(&PoolKey::of::<T>())
    }

    /// Release every resident kind.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Release kinds idle for at least the idle window.
    pub fn sweep_idle(&self) -> usize {
        self.cache.sweep_idle()
    }

    /// Start the periodic idle sweep on the current tokio runtime.
    pub fn spawn_idle_sweeper(&self) -> Result<SweeperHandle> {
        self.cache.spawn_idle_sweeper()
    }

    /// Number of resident kinds.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no kinds are resident.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Maximum number of resident kinds.
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }
}
