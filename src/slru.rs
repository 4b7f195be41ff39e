//! Provides the sharded, segmented LRU cache and the types its users interact
//! with.

use std::sync::Arc;

mod base_cache;
mod builder;
mod cache;
mod cookie;
mod item;
mod memory_tracking;
mod router;
mod shard;
mod value;
mod value_future;

pub use {
    builder::CacheBuilder,
    cache::AsyncSlruCache,
    cookie::InsertCookie,
    memory_tracking::{MemoryTrackingCache, MemoryUsageTracker},
    value::{AsyncCacheValue, ValueBase},
    value_future::ValueFuture,
};

pub(crate) type Weigher<V> = Arc<dyn Fn(&V) -> i64 + Send + Sync + 'static>;

/// Called with the new capacity every time the cache is reconfigured.
pub(crate) type CapacityListener = Arc<dyn Fn(i64) + Send + Sync + 'static>;
