use std::{
    fmt,
    hash::Hash,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

/// The contract every value stored in an [`AsyncSlruCache`][cache-struct] must
/// satisfy.
///
/// A cacheable value embeds a [`ValueBase`], which holds its immutable key and a
/// weak back-reference to the cache that linked it. Through the back-reference a
/// value can ask the cache to recompute its weight or to promote it, and when the
/// value is destroyed it tells the cache to forget it.
///
/// # Examples
///
/// ```rust
/// use async_slru::{AsyncCacheValue, ValueBase};
///
/// struct ChunkMeta {
///     base: ValueBase<u64>,
///     block_count: usize,
/// }
///
/// impl AsyncCacheValue for ChunkMeta {
///     type Key = u64;
///
///     fn value_base(&self) -> &ValueBase<u64> {
///         &self.base
///     }
/// }
///
/// let meta = ChunkMeta { base: ValueBase::new(42), block_count: 8 };
/// assert_eq!(*meta.key(), 42);
/// ```
///
/// [cache-struct]: ./slru/struct.AsyncSlruCache.html
pub trait AsyncCacheValue: Send + Sync + Sized + 'static {
    type Key: Hash + Eq + Clone + Send + Sync + 'static;

    fn value_base(&self) -> &ValueBase<Self::Key>;

    fn key(&self) -> &Self::Key {
        self.value_base().key()
    }
}

/// The cache operations a value may trigger on its owning cache through its
/// back-reference.
pub(crate) trait ValueOwner<K>: Send + Sync {
    /// Erases the resurrection entry of a value that is being destroyed.
    fn unregister(&self, key: &K);

    fn update_weight(&self, key: &K);

    fn touch(&self, key: &K);
}

/// The part of a cacheable value managed by the cache.
pub struct ValueBase<K> {
    key: K,
    // Set while the value is known to a cache (linked, or evicted but still
    // resurrectable).
    cache: Mutex<Option<Weak<dyn ValueOwner<K>>>>,
}

impl<K> ValueBase<K> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            cache: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Asks the owning cache to recompute the weight of this value. Call it after
    /// the value has grown or shrunk.
    ///
    /// Does nothing if the value is not linked into a cache.
    pub fn update_weight(&self) {
        if let Some(cache) = self.owner() {
            cache.update_weight(&self.key);
        }
    }

    /// Promotes this value in the owning cache, as if it had been looked up.
    pub fn touch(&self) {
        if let Some(cache) = self.owner() {
            cache.touch(&self.key);
        }
    }

    /// Returns `true` if a live cache still knows about this value.
    pub fn is_cached(&self) -> bool {
        self.owner().is_some()
    }

    pub(crate) fn attach(&self, cache: Weak<dyn ValueOwner<K>>) {
        *self.cache.lock() = Some(cache);
    }

    pub(crate) fn detach(&self) {
        *self.cache.lock() = None;
    }

    fn owner(&self) -> Option<Arc<dyn ValueOwner<K>>> {
        self.cache.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl<K> Drop for ValueBase<K> {
    fn drop(&mut self) {
        // NOTE: The strong count of the enclosing value is already zero here, so
        // the cache cannot hand this value out anymore.
        if let Some(cache) = self.cache.get_mut().take().and_then(|w| w.upgrade()) {
            cache.unregister(&self.key);
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for ValueBase<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueBase")
            .field("key", &self.key)
            .field("is_cached", &self.is_cached())
            .finish()
    }
}
