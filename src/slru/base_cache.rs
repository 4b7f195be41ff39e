use std::{
    hash::BuildHasher,
    ptr::NonNull,
    sync::{
        atomic::{AtomicI64, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use crossbeam_utils::atomic::AtomicCell;
use smallvec::SmallVec;

use super::{
    item::{Item, ItemNode},
    router::ShardRouter,
    shard::{Evicted, Shard, ShardInner, TrimLimits},
    value::{AsyncCacheValue, ValueOwner},
    value_future::ValueFuture,
    CapacityListener, Weigher,
};
use crate::{
    common::deque::DeqNode,
    config::{SlruCacheConfig, SlruCacheDynamicConfig},
    notification::{notifier::Notifier, RemovalCause},
    stats::{CacheStats, StatsCounter},
    Error, Policy,
};

/// The outcome of `Inner::begin_insert`.
pub(crate) enum BeginInsert<V> {
    /// The value is cached, being computed by somebody else, or was resurrected.
    Existing(ValueFuture<V>),
    /// The caller became the producer of the value.
    Active(ValueFuture<V>),
}

pub(crate) struct Inner<V: AsyncCacheValue, S> {
    name: Option<String>,
    config: SlruCacheConfig,
    capacity: AtomicI64,
    younger_size_fraction: AtomicCell<f64>,
    supports_resurrection: bool,
    router: ShardRouter<S>,
    shards: Box<[Shard<V, S>]>,
    entry_count: AtomicUsize,
    stats: StatsCounter,
    weigher: Option<Weigher<V>>,
    notifier: Notifier<V>,
    capacity_listener: Option<CapacityListener>,
}

impl<V, S> Inner<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// # Panics
    ///
    /// Panics if `config.shard_count` is not a power of two.
    pub(crate) fn new(
        name: Option<String>,
        config: SlruCacheConfig,
        build_hasher: S,
        weigher: Option<Weigher<V>>,
        notifier: Notifier<V>,
        capacity_listener: Option<CapacityListener>,
        supports_resurrection: bool,
    ) -> Self {
        let router = ShardRouter::new(build_hasher.clone(), config.shard_count);
        let touch_buffer_capacity = config.touch_buffer_capacity_per_shard();
        let shards = (0..config.shard_count)
            .map(|_| Shard::new(build_hasher.clone(), touch_buffer_capacity))
            .collect();

        Self {
            name,
            capacity: AtomicI64::new(config.capacity),
            younger_size_fraction: AtomicCell::new(config.younger_size_fraction),
            config,
            supports_resurrection,
            router,
            shards,
            entry_count: AtomicUsize::default(),
            stats: StatsCounter::default(),
            weigher,
            notifier,
            capacity_listener,
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn policy(&self) -> Policy {
        Policy::new(
            self.capacity(),
            self.younger_size_fraction.load(),
            self.shards.len(),
            self.config.touch_buffer_capacity_per_shard(),
            self.supports_resurrection,
        )
    }

    pub(crate) fn capacity(&self) -> i64 {
        self.capacity.load(Ordering::Acquire)
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub(crate) fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub(crate) fn find(&self, key: &V::Key) -> Option<Arc<V>> {
        let shard = self.shard(key);
        let guard = shard.read();

        let node = guard.item_map.get(key).copied();
        let Some((node, value)) = node.and_then(|n| item(n).value.clone().map(|v| (n, v))) else {
            drop(guard);
            self.stats.record_miss();
            return None;
        };

        let need_to_drain = guard.touch(node);
        self.stats.record_sync_hit(item(node).cached_weight);
        drop(guard);

        if need_to_drain {
            shard.write().drain_touch_buffer(&self.stats);
        }
        Some(value)
    }

    pub(crate) fn lookup(&self, key: &V::Key) -> Option<ValueFuture<V>> {
        let future = self.do_lookup(self.shard(key), key);
        if future.is_none() {
            self.stats.record_miss();
        }
        future
    }

    pub(crate) fn begin_insert(&self, key: &V::Key) -> BeginInsert<V> {
        let shard = self.shard(key);

        if let Some(future) = self.do_lookup(shard, key) {
            return BeginInsert::Existing(future);
        }

        loop {
            let mut guard = shard.write();
            guard.drain_touch_buffer(&self.stats);

            if let Some(&node) = guard.item_map.get(key) {
                guard.touch(node);
                let future = self.record_hit(node);
                guard.drain_touch_buffer(&self.stats);
                return BeginInsert::Existing(future);
            }

            let existing = guard.value_map.get(key).map(Weak::upgrade);
            match existing {
                None => {
                    let node = ItemNode::new(Item::pending()).into_raw();
                    let future = item(node).value_future();
                    let prev = guard.item_map.insert(key.clone(), node);
                    debug_assert!(prev.is_none());
                    self.entry_count.fetch_add(1, Ordering::Relaxed);
                    self.stats.record_miss();
                    return BeginInsert::Active(future);
                }
                Some(Some(value)) => {
                    self.resurrect(&mut guard, key, &value);
                    let evicted = guard.trim(self.trim_limits(), &self.stats, &self.entry_count);
                    drop(guard);
                    self.notify_inserted(evicted, &value);
                    return BeginInsert::Existing(ValueFuture::ready(value));
                }
                Some(None) => {
                    // The value is being destroyed and will unregister itself
                    // shortly. Back off and retry.
                    drop(guard);
                    #[cfg(feature = "logging")]
                    log::trace!(
                        "{}Backing off an insert while a dying value unregisters",
                        self.log_prefix()
                    );
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Links the value produced for an in-flight item and wakes up its awaiters.
    ///
    /// # Panics
    ///
    /// Panics if there is no in-flight item for the key of `value`.
    pub(crate) fn end_insert(&self, value: Arc<V>, owner: Weak<dyn ValueOwner<V::Key>>) {
        let key = value.key();
        let shard = self.shard(key);
        let mut guard = shard.write();
        guard.drain_touch_buffer(&self.stats);

        let Some(&node) = guard.item_map.get(key) else {
            panic!("No in-flight cache item to finish the insertion with");
        };
        assert!(
            item(node).value.is_none(),
            "The cache item insertion has already been finished"
        );

        // Nothing may change before the weigher returns, so that a panicking
        // weigher leaves the item in flight.
        let weight = self.weight(&value);

        let (promise, async_hit_count) = {
            let item = unsafe { &mut (*node.as_ptr()).element };
            item.value = Some(Arc::clone(&value));
            (
                item.promise.clone(),
                item.async_hit_count.load(Ordering::Relaxed),
            )
        };

        value.value_base().attach(owner);
        let prev = guard
            .value_map
            .insert(key.clone(), Arc::downgrade(&value));
        debug_assert!(prev.map_or(true, |p| p.strong_count() == 0));

        unsafe { guard.push_to_younger(node, weight, &self.stats) };
        // The missed and async hit counts were recorded in `begin_insert`.
        self.stats.record_missed_weight(weight);
        self.stats
            .record_async_hit_weight(weight.saturating_mul(async_hit_count as i64));

        let evicted = guard.trim(self.trim_limits(), &self.stats, &self.entry_count);
        drop(guard);

        self.notify_inserted(evicted, &value);
        promise.set(Ok(value));
    }

    /// Drops an in-flight item and fails its awaiters with `error`.
    ///
    /// # Panics
    ///
    /// Panics if there is no in-flight item for `key`.
    pub(crate) fn cancel_insert(&self, key: &V::Key, error: Error) {
        assert!(
            self.abort_insert(key, error),
            "No in-flight cache item to cancel"
        );
    }

    /// Like `cancel_insert`, but returns `false` instead of panicking if there
    /// is no in-flight item for `key`.
    pub(crate) fn abort_insert(&self, key: &V::Key, error: Error) -> bool {
        let shard = self.shard(key);
        let mut guard = shard.write();
        guard.drain_touch_buffer(&self.stats);

        let node = match guard.item_map.get(key) {
            Some(&node) if item(node).value.is_none() => node,
            _ => return false,
        };

        guard.item_map.remove(key);
        self.entry_count.fetch_sub(1, Ordering::Relaxed);
        // Safety: an in-flight item is never linked and the map no longer owns it.
        let item = unsafe { DeqNode::free(node) };
        drop(guard);

        #[cfg(feature = "logging")]
        log::trace!("{}Cancelled a cache item insertion: {error}", self.log_prefix());

        item.promise.set(Err(error));
        true
    }

    pub(crate) fn try_remove(&self, key: &V::Key, forbid_resurrection: bool) {
        self.do_try_remove(key, None, forbid_resurrection);
    }

    pub(crate) fn try_remove_value(&self, value: &Arc<V>, forbid_resurrection: bool) {
        self.do_try_remove(value.key(), Some(value), forbid_resurrection);
    }

    pub(crate) fn touch_value(&self, value: &Arc<V>) {
        self.do_touch(value.key(), Some(value));
    }

    pub(crate) fn update_weight(&self, key: &V::Key) {
        let shard = self.shard(key);
        let mut guard = shard.write();
        guard.drain_touch_buffer(&self.stats);

        let Some(&node) = guard.item_map.get(key) else {
            return;
        };
        let Some(value) = &item(node).value else {
            return;
        };

        let new_weight = self.weight(value);
        let delta = unsafe { guard.update_cached_weight(node, new_weight, &self.stats) };
        // A grown value means some parts of it were missing from the cache.
        if delta > 0 {
            self.stats.record_missed_weight(delta);
        }

        self.trim_and_notify(guard);
    }

    pub(crate) fn clear(&self) {
        for shard in self.shards.iter() {
            let items = {
                let mut guard = shard.write();
                guard.take_linked(self.supports_resurrection, &self.stats, &self.entry_count)
            };
            // Values may unregister themselves while being dropped, so they must
            // die outside of the critical section.
            drop(items);
        }

        #[cfg(feature = "logging")]
        log::debug!("{}Cleared the cache", self.log_prefix());
    }

    pub(crate) fn reconfigure(&self, config: &SlruCacheDynamicConfig) {
        let capacity = config.capacity.unwrap_or(self.config.capacity);
        let younger_size_fraction = config
            .younger_size_fraction
            .unwrap_or(self.config.younger_size_fraction);
        self.capacity.store(capacity, Ordering::Release);
        self.younger_size_fraction.store(younger_size_fraction);
        if let Some(listener) = &self.capacity_listener {
            listener(capacity);
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "{}Reconfigured the cache (capacity: {capacity}, younger_size_fraction: {younger_size_fraction})",
            self.log_prefix()
        );

        for shard in self.shards.iter() {
            let mut guard = shard.write();
            guard.drain_touch_buffer(&self.stats);
            self.trim_and_notify(guard);
        }
    }

    pub(crate) fn get_all(&self) -> Vec<Arc<V>> {
        let mut values = Vec::with_capacity(self.entry_count());
        for shard in self.shards.iter() {
            let guard = shard.read();
            values.extend(guard.value_map.values().filter_map(Weak::upgrade));
        }
        values
    }

    pub(crate) fn weight(&self, value: &Arc<V>) -> i64 {
        self.weigher.as_ref().map_or(1, |w| w(value.as_ref()))
    }
}

// Private methods
impl<V, S> Inner<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    #[inline]
    fn shard(&self, key: &V::Key) -> &Shard<V, S> {
        &self.shards[self.router.shard_index(key)]
    }

    fn trim_limits(&self) -> TrimLimits {
        TrimLimits {
            capacity: self.capacity(),
            younger_size_fraction: self.younger_size_fraction.load(),
            shard_count: self.router.shard_count(),
            supports_resurrection: self.supports_resurrection,
        }
    }

    fn do_lookup(&self, shard: &Shard<V, S>, key: &V::Key) -> Option<ValueFuture<V>> {
        let guard = shard.read();

        if let Some(&node) = guard.item_map.get(key) {
            let need_to_drain = guard.touch(node);
            let future = self.record_hit(node);
            drop(guard);

            if need_to_drain {
                shard.write().drain_touch_buffer(&self.stats);
            }
            return Some(future);
        }

        let value = guard.value_map.get(key).and_then(Weak::upgrade);
        drop(guard);
        // A dying (or unknown) value cannot be resurrected.
        let value = value?;

        let mut guard = shard.write();

        if let Some(&node) = guard.item_map.get(key) {
            guard.touch(node);
            let future = self.record_hit(node);
            guard.drain_touch_buffer(&self.stats);
            drop(guard);
            return Some(future);
        }

        guard.drain_touch_buffer(&self.stats);

        // The value may have been removed for good in the meantime.
        let still_registered = guard
            .value_map
            .get(key)
            .map_or(false, |w| std::ptr::eq(w.as_ptr(), Arc::as_ptr(&value)));
        if !still_registered {
            drop(guard);
            return None;
        }

        self.resurrect(&mut guard, key, &value);
        let evicted = guard.trim(self.trim_limits(), &self.stats, &self.entry_count);
        drop(guard);

        self.notify_inserted(evicted, &value);
        Some(ValueFuture::ready(value))
    }

    /// Relinks a value that is still alive but has no item.
    fn resurrect(&self, guard: &mut ShardInner<V, S>, key: &V::Key, value: &Arc<V>) {
        let weight = self.weight(value);
        let node = ItemNode::new(Item::with_value(Arc::clone(value))).into_raw();
        let prev = guard.item_map.insert(key.clone(), node);
        debug_assert!(prev.is_none());
        self.entry_count.fetch_add(1, Ordering::Relaxed);

        unsafe { guard.push_to_younger(node, weight, &self.stats) };
        self.stats.record_sync_hit(weight);
    }

    fn record_hit(&self, node: NonNull<ItemNode<V>>) -> ValueFuture<V> {
        let item = item(node);
        if item.value.is_some() {
            self.stats.record_sync_hit(item.cached_weight);
        } else {
            self.stats.record_async_hit();
            item.async_hit_count.fetch_add(1, Ordering::Relaxed);
        }
        item.value_future()
    }

    fn do_touch(&self, key: &V::Key, value: Option<&Arc<V>>) {
        let shard = self.shard(key);
        let guard = shard.read();

        let Some(&node) = guard.item_map.get(key) else {
            return;
        };
        let linked = match (&item(node).value, value) {
            (Some(linked), Some(value)) => Arc::ptr_eq(linked, value),
            (linked, None) => linked.is_some(),
            (None, Some(_)) => false,
        };
        if !linked {
            return;
        }

        let need_to_drain = guard.touch(node);
        drop(guard);

        if need_to_drain {
            shard.write().drain_touch_buffer(&self.stats);
        }
    }

    fn do_try_remove(&self, key: &V::Key, value: Option<&Arc<V>>, forbid_resurrection: bool) {
        // Declared before the guard so that these values are dropped after the
        // lock has been released.
        let mut graveyard = SmallVec::<[Arc<V>; 2]>::new();

        let shard = self.shard(key);
        let mut guard = shard.write();
        guard.drain_touch_buffer(&self.stats);

        let Some(weak) = guard.value_map.get(key) else {
            return;
        };
        if let Some(value) = value {
            if !std::ptr::eq(weak.as_ptr(), Arc::as_ptr(value)) {
                return;
            }
        }

        if forbid_resurrection || !self.supports_resurrection {
            if let Some(alive) = weak.upgrade() {
                alive.value_base().detach();
                graveyard.push(alive);
            }
            guard.value_map.remove(key);
        }

        let Some(&node) = guard.item_map.get(key) else {
            return;
        };
        if item(node).value.is_none() {
            return;
        }

        guard.item_map.remove(key);
        self.entry_count.fetch_sub(1, Ordering::Relaxed);
        unsafe { guard.pop(node, &self.stats) };
        // Safety: the node was unlinked above and the map no longer owns it.
        let item = unsafe { DeqNode::free(node) };
        drop(guard);

        if let Some(removed) = item.value {
            debug_assert!(value.map_or(true, |v| Arc::ptr_eq(v, &removed)));
            self.notifier.notify_removed(&removed, RemovalCause::Explicit);
        }
    }

    fn trim_and_notify(&self, mut guard: parking_lot::RwLockWriteGuard<'_, ShardInner<V, S>>) {
        let evicted = guard.trim(self.trim_limits(), &self.stats, &self.entry_count);
        drop(guard);

        for value in &evicted {
            self.notifier.notify_removed(value, RemovalCause::Size);
        }
    }

    /// Reports an insertion and the evictions it caused.
    ///
    /// If the inserted value was evicted right away (the capacity is too small to
    /// hold it), neither `on_added` nor `on_removed` is reported for it.
    fn notify_inserted(&self, evicted: Evicted<V>, inserted: &Arc<V>) {
        let mut immediately_removed = false;
        for value in &evicted {
            if Arc::ptr_eq(value, inserted) {
                immediately_removed = true;
                continue;
            }
            self.notifier.notify_removed(value, RemovalCause::Size);
        }
        if !immediately_removed {
            self.notifier.notify_added(inserted);
        }
    }

    #[cfg(feature = "logging")]
    fn log_prefix(&self) -> String {
        self.name
            .as_ref()
            .map(|name| format!("[{name}] "))
            .unwrap_or_default()
    }
}

impl<V, S> ValueOwner<V::Key> for Inner<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn unregister(&self, key: &V::Key) {
        let shard = self.shard(key);
        let mut guard = shard.write();
        guard.drain_touch_buffer(&self.stats);

        // A live value may have taken over the key in the meantime.
        if guard
            .value_map
            .get(key)
            .map_or(false, |w| w.strong_count() == 0)
        {
            guard.value_map.remove(key);
        }
    }

    fn update_weight(&self, key: &V::Key) {
        Inner::update_weight(self, key);
    }

    fn touch(&self, key: &V::Key) {
        self.do_touch(key, None);
    }
}

/// Returns a reference to the item of a node.
///
/// The caller must hold the lock of the shard owning the node, and must not keep
/// the reference beyond it.
#[inline]
fn item<'a, V>(node: NonNull<ItemNode<V>>) -> &'a Item<V> {
    unsafe { &(*node.as_ptr()).element }
}

#[cfg(test)]
impl<V, S> Inner<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn check_invariants(&self) {
        let mut total = 0;
        for shard in self.shards.iter() {
            let guard = shard.read();
            guard.check_invariants();
            total += guard.item_map.len();
        }
        assert_eq!(total, self.entry_count());
    }

    pub(crate) fn shard_weights(&self) -> Vec<(i64, i64)> {
        self.shards.iter().map(|s| s.read().weights()).collect()
    }

    pub(crate) fn segment_keys(&self, segment: crate::common::Segment) -> Vec<V::Key> {
        self.shards
            .iter()
            .flat_map(|s| s.read().segment_keys(segment))
            .collect()
    }
}
