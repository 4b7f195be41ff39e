#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! An asynchronous, sharded, segmented LRU cache with in-flight deduplication.
//!
//! [`AsyncSlruCache`] bounds the total _weight_ of its values. Every shard keeps
//! two LRU segments: values enter the younger one, move to the older one when
//! they are used again, and are only ever evicted from the younger one.
//!
//! Values are produced outside of the cache. [`AsyncSlruCache::begin_insert`]
//! returns an [`InsertCookie`]; if the cookie is active its holder produces the
//! value and finishes with [`InsertCookie::end_insert`], while every other
//! caller asking for the same key awaits a [`ValueFuture`] for the same result.
//!
//! Cached values implement [`AsyncCacheValue`] by embedding a [`ValueBase`],
//! which lets a value touch itself, report a changed weight, and be resurrected
//! after eviction for as long as somebody else holds it.
//!
//! # Example
//!
//! ```rust
//! use async_slru::{AsyncCacheValue, AsyncSlruCache, ValueBase};
//! use std::sync::Arc;
//!
//! struct Page {
//!     base: ValueBase<u32>,
//!     text: String,
//! }
//!
//! impl AsyncCacheValue for Page {
//!     type Key = u32;
//!
//!     fn value_base(&self) -> &ValueBase<u32> {
//!         &self.base
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = AsyncSlruCache::builder()
//!         .capacity(1024 * 1024)
//!         .weigher(|page: &Page| page.text.len() as i64)
//!         .build();
//!
//!     let page = cache
//!         .get_with(7, async {
//!             Arc::new(Page {
//!                 base: ValueBase::new(7),
//!                 text: "Hello, world!".to_string(),
//!             })
//!         })
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(page.text, "Hello, world!");
//!     assert_eq!(cache.stats().missed_count(), 1);
//! }
//! ```

pub(crate) mod common;
pub(crate) mod config;
pub(crate) mod notification;
pub(crate) mod policy;
pub mod slru;
pub(crate) mod stats;

pub use {
    common::error::{ConfigError, Error},
    config::{SlruCacheConfig, SlruCacheDynamicConfig},
    notification::RemovalCause,
    policy::Policy,
    slru::{
        AsyncCacheValue, AsyncSlruCache, CacheBuilder, InsertCookie, MemoryTrackingCache,
        MemoryUsageTracker, ValueBase, ValueFuture,
    },
    stats::CacheStats,
};
