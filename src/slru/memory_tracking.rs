use super::{AsyncCacheValue, AsyncSlruCache, CacheBuilder};
use crate::common::builder_utils;

use std::{collections::hash_map::RandomState, fmt, hash::BuildHasher, ops::Deref, sync::Arc};

/// An external accounter charged with the weight of the values linked into a
/// [`MemoryTrackingCache`].
pub trait MemoryUsageTracker: Send + Sync + 'static {
    fn set_limit(&self, limit: i64);

    fn acquire(&self, size: i64);

    fn release(&self, size: i64);
}

/// An [`AsyncSlruCache`] whose linked values are accounted in a
/// [`MemoryUsageTracker`].
///
/// The limit of the tracker follows the capacity of the cache, whichever handle
/// reconfigures it. The limit is reset to zero when the shared cache is dropped,
/// that is, once every clone of it and every insert cookie are gone. The
/// weigher of the cache is expected to report sizes in bytes.
///
/// Every method of the underlying cache is available through `Deref`. Note that
/// [`AsyncSlruCache::clear`] does not deliver removal notifications, so the
/// values it unlinks are not released from the tracker.
pub struct MemoryTrackingCache<V: AsyncCacheValue, S = RandomState> {
    cache: AsyncSlruCache<V, S>,
}

/// Owned by the listeners of the cache, so it is dropped together with the
/// cache itself.
struct TrackerLimit(Arc<dyn MemoryUsageTracker>);

impl Drop for TrackerLimit {
    fn drop(&mut self) {
        self.0.set_limit(0);
    }
}

impl<V: AsyncCacheValue> MemoryTrackingCache<V, RandomState> {
    /// Builds the cache from `builder`. Listeners already set on the builder are
    /// called after the tracker has been updated.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn new(
        builder: CacheBuilder<V, AsyncSlruCache<V, RandomState>>,
        tracker: Arc<dyn MemoryUsageTracker>,
    ) -> Self {
        Self::with_hasher(builder, tracker, RandomState::default())
    }

    /// Like [`new`](#method.new), with the given `hasher`.
    pub fn with_hasher<S>(
        builder: CacheBuilder<V, AsyncSlruCache<V, RandomState>>,
        tracker: Arc<dyn MemoryUsageTracker>,
        hasher: S,
    ) -> MemoryTrackingCache<V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        builder_utils::ensure_config_or_panic(&builder.config);
        tracker.set_limit(builder.config.capacity);
        let limit = Arc::new(TrackerLimit(tracker));

        let weigher = builder.weigher.clone();
        let weight = move |value: &Arc<V>| weigher.as_ref().map_or(1, |w| w(value.as_ref()));

        let user_added = builder.added_listener.clone();
        let user_removed = builder.removal_listener.clone();
        let (l1, w1) = (Arc::clone(&limit), weight.clone());
        let (l2, w2) = (Arc::clone(&limit), weight);

        let mut builder = builder
            .on_added(move |value| {
                l1.0.acquire(w1(value));
                if let Some(listener) = &user_added {
                    listener(value);
                }
            })
            .on_removed(move |value, cause| {
                l2.0.release(w2(value));
                if let Some(listener) = &user_removed {
                    listener(value, cause);
                }
            });
        builder.capacity_listener = Some(Arc::new(move |capacity: i64| {
            limit.0.set_limit(capacity);
        }));

        MemoryTrackingCache {
            cache: builder.build_with_hasher(hasher),
        }
    }
}

impl<V: AsyncCacheValue, S> MemoryTrackingCache<V, S> {
    /// Returns the underlying cache.
    pub fn cache(&self) -> &AsyncSlruCache<V, S> {
        &self.cache
    }
}

impl<V: AsyncCacheValue, S> Deref for MemoryTrackingCache<V, S> {
    type Target = AsyncSlruCache<V, S>;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}

impl<V, S> fmt::Debug for MemoryTrackingCache<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTrackingCache")
            .field("cache", &self.cache)
            .finish()
    }
}
