use super::{AsyncCacheValue, AsyncSlruCache, CapacityListener, Weigher};
use crate::{
    common::builder_utils,
    config::SlruCacheConfig,
    notification::{AddedListener, RemovalCause, RemovalListener},
};

use std::{
    collections::hash_map::RandomState,
    hash::BuildHasher,
    marker::PhantomData,
    sync::Arc,
};

/// Builds an [`AsyncSlruCache`][cache-struct] with various configuration knobs.
///
/// [cache-struct]: ./struct.AsyncSlruCache.html
///
/// # Examples
///
/// ```rust
/// use async_slru::{AsyncCacheValue, AsyncSlruCache, ValueBase};
///
/// struct Block {
///     base: ValueBase<u64>,
///     data: Vec<u8>,
/// }
///
/// impl AsyncCacheValue for Block {
///     type Key = u64;
///
///     fn value_base(&self) -> &ValueBase<u64> {
///         &self.base
///     }
/// }
///
/// let cache = AsyncSlruCache::builder()
///     // Up to 64 MiB of block data.
///     .capacity(64 * 1024 * 1024)
///     // A quarter of it is reserved for blocks that were used only once.
///     .younger_size_fraction(0.25)
///     .weigher(|block: &Block| block.data.len() as i64)
///     .name("blocks")
///     .build();
///
/// assert_eq!(cache.capacity(), 64 * 1024 * 1024);
/// ```
///
#[must_use]
pub struct CacheBuilder<V: AsyncCacheValue, C> {
    pub(crate) config: SlruCacheConfig,
    pub(crate) name: Option<String>,
    pub(crate) weigher: Option<Weigher<V>>,
    pub(crate) added_listener: Option<AddedListener<V>>,
    pub(crate) removal_listener: Option<RemovalListener<V>>,
    pub(crate) capacity_listener: Option<CapacityListener>,
    pub(crate) supports_resurrection: bool,
    cache_type: PhantomData<C>,
}

impl<V> Default for CacheBuilder<V, AsyncSlruCache<V, RandomState>>
where
    V: AsyncCacheValue,
{
    fn default() -> Self {
        Self::from_config(SlruCacheConfig::default())
    }
}

impl<V> CacheBuilder<V, AsyncSlruCache<V, RandomState>>
where
    V: AsyncCacheValue,
{
    /// Construct a new `CacheBuilder` that will be used to build an
    /// `AsyncSlruCache` whose total weight is bounded by `capacity`.
    pub fn new(capacity: i64) -> Self {
        Self::from_config(SlruCacheConfig::with_capacity(capacity))
    }

    /// Construct a new `CacheBuilder` with every knob of `config`.
    pub fn from_config(config: SlruCacheConfig) -> Self {
        Self {
            config,
            name: None,
            weigher: None,
            added_listener: None,
            removal_listener: None,
            capacity_listener: None,
            supports_resurrection: true,
            cache_type: PhantomData,
        }
    }

    /// Builds an `AsyncSlruCache<V>`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. Call
    /// [`SlruCacheConfig::validate`][validate] beforehand to check it without
    /// panicking.
    ///
    /// [validate]: ../struct.SlruCacheConfig.html#method.validate
    pub fn build(self) -> AsyncSlruCache<V, RandomState> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds an `AsyncSlruCache<V, S>` with the given `hasher` of type `S`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn build_with_hasher<S>(self, hasher: S) -> AsyncSlruCache<V, S>
    where
        S: BuildHasher + Clone + Send + Sync + 'static,
    {
        builder_utils::ensure_config_or_panic(&self.config);
        AsyncSlruCache::with_everything(
            self.name,
            self.config,
            hasher,
            self.weigher,
            self.added_listener,
            self.removal_listener,
            self.capacity_listener,
            self.supports_resurrection,
        )
    }
}

impl<V: AsyncCacheValue, C> CacheBuilder<V, C> {
    /// Sets the capacity of the cache, in units of the weigher.
    pub fn capacity(self, capacity: i64) -> Self {
        Self {
            config: SlruCacheConfig {
                capacity,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the share of the capacity reserved for values that have not been
    /// touched since they were linked.
    pub fn younger_size_fraction(self, fraction: f64) -> Self {
        Self {
            config: SlruCacheConfig {
                younger_size_fraction: fraction,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the number of internal shards. Must be a power of two.
    pub fn shard_count(self, count: usize) -> Self {
        Self {
            config: SlruCacheConfig {
                shard_count: count,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the total number of touch buffer slots, which are split evenly
    /// among the shards.
    pub fn touch_buffer_capacity(self, capacity: usize) -> Self {
        Self {
            config: SlruCacheConfig {
                touch_buffer_capacity: capacity,
                ..self.config
            },
            ..self
        }
    }

    /// Sets the name of the cache. The name is shown in log messages.
    pub fn name(self, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..self
        }
    }

    /// Sets the weigher closure. Without one every value weighs 1.
    ///
    /// The weigher is called while a shard lock is held, so it must not call
    /// back into the cache.
    pub fn weigher(self, weigher: impl Fn(&V) -> i64 + Send + Sync + 'static) -> Self {
        Self {
            weigher: Some(Arc::new(weigher)),
            ..self
        }
    }

    /// Sets a listener called after a value has been linked into the cache.
    pub fn on_added(self, listener: impl Fn(&Arc<V>) + Send + Sync + 'static) -> Self {
        Self {
            added_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Sets a listener called after a linked value has been removed from the
    /// cache, either explicitly or by eviction.
    pub fn on_removed(
        self,
        listener: impl Fn(&Arc<V>, RemovalCause) + Send + Sync + 'static,
    ) -> Self {
        Self {
            removal_listener: Some(Arc::new(listener)),
            ..self
        }
    }

    /// Enables or disables resurrection (enabled by default).
    ///
    /// When enabled, an evicted value that is still held elsewhere is linked
    /// back by the next lookup of its key instead of being produced again.
    pub fn support_resurrection(self, enabled: bool) -> Self {
        Self {
            supports_resurrection: enabled,
            ..self
        }
    }
}
