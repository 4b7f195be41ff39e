use super::{
    base_cache::{BeginInsert, Inner},
    value::ValueOwner,
    AsyncCacheValue, CacheBuilder, CapacityListener, InsertCookie, ValueFuture, Weigher,
};
use crate::{
    common::builder_utils,
    config::{SlruCacheConfig, SlruCacheDynamicConfig},
    notification::{notifier::Notifier, AddedListener, RemovalListener},
    stats::CacheStats,
    Error, Policy,
};

use std::{
    collections::hash_map::RandomState,
    fmt,
    future::Future,
    hash::BuildHasher,
    sync::{Arc, Weak},
};

/// A thread-safe, sharded, weight-bounded segmented LRU cache whose values are
/// produced asynchronously.
///
/// # Segments
///
/// Every shard keeps its linked values in two LRU lists. A freshly inserted
/// value enters the _younger_ segment. A value that is looked up again is
/// promoted to the _older_ segment. When the older segment grows beyond its
/// share of the capacity its least recently used values are demoted back to the
/// younger segment, and only younger values are ever evicted. Scans of values
/// that are used once therefore cannot flush the frequently used ones.
///
/// Promotions are batched. A lookup only records the value in a per-shard touch
/// buffer under a read lock, and the buffer is applied under the write lock once
/// it fills up or the next time the shard is modified. When the buffer is full,
/// further touches are not recorded until it is drained.
///
/// # In-flight deduplication
///
/// [`begin_insert`](#method.begin_insert) makes sure that at most one caller
/// produces the value for a key at a time. The other callers receive a
/// [`ValueFuture`] that resolves when the producer finishes.
///
/// # Resurrection
///
/// The cache remembers every value it has linked for as long as the value is
/// alive. If an evicted value is still held somewhere else, the next lookup of
/// its key links it back instead of reporting a miss. Resurrection can be
/// turned off with [`CacheBuilder::support_resurrection`][support-resurrection].
///
/// [support-resurrection]: ./struct.CacheBuilder.html#method.support_resurrection
///
/// # Examples
///
/// ```rust
/// use async_slru::{AsyncCacheValue, AsyncSlruCache, ValueBase};
/// use std::sync::Arc;
///
/// struct Schema {
///     base: ValueBase<String>,
///     columns: Vec<String>,
/// }
///
/// impl AsyncCacheValue for Schema {
///     type Key = String;
///
///     fn value_base(&self) -> &ValueBase<String> {
///         &self.base
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let cache = AsyncSlruCache::new(100);
///
///     let cookie = cache.begin_insert("users".to_string());
///     assert!(cookie.is_active());
///
///     // Other callers asking for the same key now wait for this producer.
///     let pending = cache.lookup(&"users".to_string()).unwrap();
///
///     cookie.end_insert(Arc::new(Schema {
///         base: ValueBase::new("users".to_string()),
///         columns: vec!["id".into(), "name".into()],
///     }));
///
///     let schema = pending.await.unwrap();
///     assert_eq!(schema.columns.len(), 2);
///     assert!(cache.find(&"users".to_string()).is_some());
/// }
/// ```
pub struct AsyncSlruCache<V: AsyncCacheValue, S = RandomState> {
    inner: Arc<Inner<V, S>>,
}

impl<V: AsyncCacheValue, S> Clone for AsyncSlruCache<V, S> {
    /// Makes a clone of this shared cache.
    ///
    /// This operation is cheap as it only creates thread-safe reference counted
    /// pointers to the shared internal data structures.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, S> fmt::Debug for AsyncSlruCache<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSlruCache")
            .field("name", &self.name())
            .field("capacity", &self.capacity())
            .field("entry_count", &self.entry_count())
            .finish()
    }
}

impl<V: AsyncCacheValue> AsyncSlruCache<V, RandomState> {
    /// Constructs a new `AsyncSlruCache<V>` whose total weight is bounded by
    /// `capacity`, with the default knobs.
    ///
    /// To adjust various configuration knobs, use the
    /// [`CacheBuilder`](./struct.CacheBuilder.html) instead.
    pub fn new(capacity: i64) -> Self {
        let config = SlruCacheConfig::with_capacity(capacity);
        builder_utils::ensure_config_or_panic(&config);
        Self::with_everything(
            None,
            config,
            RandomState::default(),
            None,
            None,
            None,
            None,
            true,
        )
    }

    /// Returns a [`CacheBuilder`](./struct.CacheBuilder.html), which can build
    /// an `AsyncSlruCache` with various configuration knobs.
    pub fn builder() -> CacheBuilder<V, AsyncSlruCache<V, RandomState>> {
        CacheBuilder::default()
    }
}

impl<V, S> AsyncSlruCache<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_everything(
        name: Option<String>,
        config: SlruCacheConfig,
        build_hasher: S,
        weigher: Option<Weigher<V>>,
        added_listener: Option<AddedListener<V>>,
        removal_listener: Option<RemovalListener<V>>,
        capacity_listener: Option<CapacityListener>,
        supports_resurrection: bool,
    ) -> Self {
        let notifier = Notifier::new(added_listener, removal_listener, name.clone());
        Self {
            inner: Arc::new(Inner::new(
                name,
                config,
                build_hasher,
                weigher,
                notifier,
                capacity_listener,
                supports_resurrection,
            )),
        }
    }

    /// Returns the name of this cache.
    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    /// Returns a read-only cache policy of this cache.
    pub fn policy(&self) -> Policy {
        self.inner.policy()
    }

    /// Returns the current capacity of this cache.
    pub fn capacity(&self) -> i64 {
        self.inner.capacity()
    }

    /// Returns an approximate number of items in this cache, including the ones
    /// whose values are still being produced.
    pub fn entry_count(&self) -> usize {
        self.inner.entry_count()
    }

    /// Returns a snapshot of the hit, miss and segment statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    /// Returns the value for the key if it is linked into the cache.
    ///
    /// Never waits. Returns `None` if the value is still being produced, and
    /// does not resurrect evicted values.
    pub fn find(&self, key: &V::Key) -> Option<Arc<V>> {
        self.inner.find(key)
    }

    /// Returns a future for the value of the key, if the value is cached, being
    /// produced, or can be resurrected. Returns `None` on a miss.
    ///
    /// Unlike [`begin_insert`](#method.begin_insert), a miss does not make the
    /// caller responsible for producing the value.
    pub fn lookup(&self, key: &V::Key) -> Option<ValueFuture<V>> {
        self.inner.lookup(key)
    }

    /// Starts inserting a value for the key.
    ///
    /// If the key has a cached, in-flight or resurrectable value, the returned
    /// cookie is inactive and only carries the future of that value. Otherwise
    /// the cookie is active: the caller is the only producer of the value and
    /// must finish the insertion with [`InsertCookie::end_insert`] or
    /// [`InsertCookie::cancel`]. Dropping an active cookie cancels the insertion
    /// with [`Error::Canceled`].
    pub fn begin_insert(&self, key: V::Key) -> InsertCookie<V, S> {
        match self.inner.begin_insert(&key) {
            BeginInsert::Existing(future) => InsertCookie::inactive(key, future),
            BeginInsert::Active(future) => InsertCookie::active(key, self.clone(), future),
        }
    }

    /// Returns the value of the key, producing it with `init` if nobody else
    /// has it or is producing it.
    ///
    /// If another caller is producing the value, waits for it instead of
    /// running `init`. An error is returned only if that other producer fails.
    ///
    /// If the returned future is dropped before `init` completes, the insertion
    /// is cancelled and the other waiters receive [`Error::Canceled`].
    ///
    /// # Panics
    ///
    /// Panics if `init` resolves to a value with a different key.
    pub async fn get_with(
        &self,
        key: V::Key,
        init: impl Future<Output = Arc<V>>,
    ) -> Result<Arc<V>, Error> {
        let cookie = self.begin_insert(key);
        if cookie.is_active() {
            cookie.end_insert(init.await);
        }
        cookie.value().await
    }

    /// Like [`get_with`](#method.get_with), but `init` may fail. Its error is
    /// delivered to every caller waiting for the same key.
    ///
    /// # Panics
    ///
    /// Panics if `init` resolves to a value with a different key.
    pub async fn try_get_with<E>(
        &self,
        key: V::Key,
        init: impl Future<Output = Result<Arc<V>, E>>,
    ) -> Result<Arc<V>, Error>
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        let cookie = self.begin_insert(key);
        if cookie.is_active() {
            match init.await {
                Ok(value) => cookie.end_insert(value),
                Err(e) => cookie.cancel(Error::from(e.into())),
            }
        }
        cookie.value().await
    }

    /// Promotes the value in its segment, if this very value is linked into the
    /// cache.
    pub fn touch(&self, value: &Arc<V>) {
        self.inner.touch_value(value);
    }

    /// Recomputes the weight of the value linked for the key and evicts values
    /// if the cache is now over its capacity.
    ///
    /// Does nothing if no value is linked for the key.
    pub fn update_weight(&self, key: &V::Key) {
        self.inner.update_weight(key);
    }

    /// Removes the value of the key from the cache.
    ///
    /// Unless `forbid_resurrection` is `true`, a removed value that is still
    /// held elsewhere can be resurrected by a later lookup, provided the cache
    /// supports resurrection.
    pub fn try_remove(&self, key: &V::Key, forbid_resurrection: bool) {
        self.inner.try_remove(key, forbid_resurrection);
    }

    /// Like [`try_remove`](#method.try_remove), but does nothing unless the
    /// cache knows this very value for its key.
    pub fn try_remove_value(&self, value: &Arc<V>, forbid_resurrection: bool) {
        self.inner.try_remove_value(value, forbid_resurrection);
    }

    /// Unlinks every value. In-flight insertions are not affected.
    ///
    /// No removal notifications are delivered.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Applies new limits and trims every shard right away. A knob that is not
    /// set in `config` returns to the value the cache was built with.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid.
    pub fn reconfigure(&self, config: &SlruCacheDynamicConfig) {
        builder_utils::ensure_dynamic_config_or_panic(config);
        self.inner.reconfigure(config);
    }

    /// Returns every value known to the cache that is still alive. This includes
    /// evicted values that are held elsewhere when resurrection is supported.
    pub fn get_all(&self) -> Vec<Arc<V>> {
        self.inner.get_all()
    }

    /// Returns the weight of the value, as the cache computes it.
    pub fn weight(&self, value: &Arc<V>) -> i64 {
        self.inner.weight(value)
    }

    pub(crate) fn end_insert(&self, value: Arc<V>) {
        let inner: Weak<Inner<V, S>> = Arc::downgrade(&self.inner);
        let owner: Weak<dyn ValueOwner<V::Key>> = inner;
        self.inner.end_insert(value, owner);
    }

    pub(crate) fn cancel_insert(&self, key: &V::Key, error: Error) {
        self.inner.cancel_insert(key, error);
    }

    pub(crate) fn abort_insert(&self, key: &V::Key, error: Error) -> bool {
        self.inner.abort_insert(key, error)
    }
}

#[cfg(test)]
impl<V, S> AsyncSlruCache<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn check_invariants(&self) {
        self.inner.check_invariants();
    }

    pub(crate) fn shard_weights(&self) -> Vec<(i64, i64)> {
        self.inner.shard_weights()
    }

    pub(crate) fn segment_keys(&self, segment: crate::common::Segment) -> Vec<V::Key> {
        self.inner.segment_keys(segment)
    }
}
