use std::{
    collections::HashMap,
    hash::BuildHasher,
    ptr::NonNull,
    sync::{
        atomic::{AtomicPtr, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use crossbeam_utils::CachePadded;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;

use super::{
    item::{Item, ItemNode},
    value::AsyncCacheValue,
};
use crate::{
    common::{
        deque::{DeqNode, Deque},
        Segment,
    },
    stats::StatsCounter,
};

pub(crate) type Evicted<V> = SmallVec<[Arc<V>; 4]>;

/// The knobs `trim` works with, captured once per call.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TrimLimits {
    pub(crate) capacity: i64,
    pub(crate) younger_size_fraction: f64,
    pub(crate) shard_count: usize,
    pub(crate) supports_resurrection: bool,
}

/// One partition of the key space.
pub(crate) struct Shard<V: AsyncCacheValue, S> {
    inner: RwLock<ShardInner<V, S>>,
}

// The raw item pointers are only dereferenced under the shard lock.
unsafe impl<V, S> Send for Shard<V, S>
where
    V: AsyncCacheValue,
    S: Send + Sync,
{
}

unsafe impl<V, S> Sync for Shard<V, S>
where
    V: AsyncCacheValue,
    S: Send + Sync,
{
}

impl<V, S> Shard<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone,
{
    pub(crate) fn new(build_hasher: S, touch_buffer_capacity: usize) -> Self {
        let touch_buffer = std::iter::repeat_with(|| AtomicPtr::new(std::ptr::null_mut()))
            .take(touch_buffer_capacity)
            .collect();
        Self {
            inner: RwLock::new(ShardInner {
                item_map: HashMap::with_hasher(build_hasher.clone()),
                value_map: HashMap::with_hasher(build_hasher),
                younger: Deque::new(Segment::Younger),
                older: Deque::new(Segment::Older),
                younger_weight: 0,
                older_weight: 0,
                touch_buffer,
                touch_position: CachePadded::new(AtomicUsize::new(0)),
            }),
        }
    }
}

impl<V: AsyncCacheValue, S> Shard<V, S> {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ShardInner<V, S>> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ShardInner<V, S>> {
        self.inner.write()
    }
}

pub(crate) struct ShardInner<V: AsyncCacheValue, S> {
    /// Every item of this shard, linked or in flight. Owns the item nodes.
    pub(crate) item_map: HashMap<V::Key, NonNull<ItemNode<V>>, S>,
    /// Every value known to this shard, including evicted values that are still
    /// alive somewhere else and thus can be resurrected.
    pub(crate) value_map: HashMap<V::Key, Weak<V>, S>,
    younger: Deque<Item<V>>,
    older: Deque<Item<V>>,
    younger_weight: i64,
    older_weight: i64,
    // Written under the read lock, drained under the write lock.
    touch_buffer: Box<[AtomicPtr<ItemNode<V>>]>,
    touch_position: CachePadded<AtomicUsize>,
}

impl<V: AsyncCacheValue, S> Drop for ShardInner<V, S> {
    fn drop(&mut self) {
        self.younger.take_all();
        self.older.take_all();
        for (_key, node) in self.item_map.drain() {
            // Safety: every node was unlinked above and the map was its only owner.
            drop(unsafe { DeqNode::free(node) });
        }
    }
}

impl<V, S> ShardInner<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher,
{
    /// Records a reference to a linked item without reordering the segments.
    ///
    /// Returns `true` if this call filled up the touch buffer, in which case the
    /// caller must take the write lock and drain it. Touches arriving while the
    /// buffer is full are dropped.
    pub(crate) fn touch(&self, node: NonNull<ItemNode<V>>) -> bool {
        if unsafe { node.as_ref() }.element.value.is_none() {
            return false;
        }

        let capacity = self.touch_buffer.len();
        let index = self.touch_position.fetch_add(1, Ordering::Relaxed);
        if index >= capacity {
            // Another thread has already been made responsible for draining.
            return false;
        }

        self.touch_buffer[index].store(node.as_ptr(), Ordering::Relaxed);
        index == capacity - 1
    }

    /// Promotes every buffered item to the most recent end of the older segment.
    pub(crate) fn drain_touch_buffer(&mut self, stats: &StatsCounter) {
        let count = (*self.touch_position.get_mut()).min(self.touch_buffer.len());
        for index in 0..count {
            let ptr = std::mem::replace(self.touch_buffer[index].get_mut(), std::ptr::null_mut());
            if let Some(node) = NonNull::new(ptr) {
                // Safety: items are only freed under the write lock, after the
                // buffer has been drained or discarded.
                unsafe { self.move_to_older(node, stats) };
            }
        }
        *self.touch_position.get_mut() = 0;
    }

    /// Forgets every buffered touch. Used before freeing items wholesale.
    pub(crate) fn discard_touch_buffer(&mut self) {
        *self.touch_position.get_mut() = 0;
    }

    /// Links an unlinked item with a value as the most recent younger item.
    ///
    /// # Safety
    ///
    /// `node` must be owned by this shard's item map.
    pub(crate) unsafe fn push_to_younger(
        &mut self,
        node: NonNull<ItemNode<V>>,
        weight: i64,
        stats: &StatsCounter,
    ) {
        {
            let item = &mut (*node.as_ptr()).element;
            debug_assert!(!item.is_linked());
            debug_assert!(item.value.is_some());
            item.cached_weight = weight;
            item.segment = Some(self.younger.segment());
        }
        self.younger.push_back(node);
        self.younger_weight += weight;
        stats.add_younger(weight, 1);
    }

    unsafe fn move_to_younger(&mut self, node: NonNull<ItemNode<V>>, stats: &StatsCounter) {
        let (segment, weight) = Self::segment_and_weight(node);
        match segment {
            Some(Segment::Younger) => self.younger.move_to_back(node),
            Some(Segment::Older) => {
                self.older.unlink(node);
                self.younger.push_back(node);
                (*node.as_ptr()).element.segment = Some(self.younger.segment());
                self.older_weight -= weight;
                self.younger_weight += weight;
                stats.add_older(-weight, -1);
                stats.add_younger(weight, 1);
            }
            None => debug_assert!(false, "Cannot demote an unlinked item"),
        }
    }

    unsafe fn move_to_older(&mut self, node: NonNull<ItemNode<V>>, stats: &StatsCounter) {
        let (segment, weight) = Self::segment_and_weight(node);
        match segment {
            Some(Segment::Older) => self.older.move_to_back(node),
            Some(Segment::Younger) => {
                self.younger.unlink(node);
                self.older.push_back(node);
                (*node.as_ptr()).element.segment = Some(self.older.segment());
                self.younger_weight -= weight;
                self.older_weight += weight;
                stats.add_younger(-weight, -1);
                stats.add_older(weight, 1);
            }
            None => debug_assert!(false, "Cannot promote an unlinked item"),
        }
    }

    /// Unlinks an item from whichever segment it is in. Does nothing for an
    /// unlinked item.
    ///
    /// # Safety
    ///
    /// `node` must be owned by this shard's item map.
    pub(crate) unsafe fn pop(&mut self, node: NonNull<ItemNode<V>>, stats: &StatsCounter) {
        let (segment, weight) = Self::segment_and_weight(node);
        match segment {
            Some(Segment::Younger) => {
                debug_assert!(self.younger.contains(node.as_ref()));
                self.younger.unlink(node);
                self.younger_weight -= weight;
                stats.add_younger(-weight, -1);
            }
            Some(Segment::Older) => {
                debug_assert!(self.older.contains(node.as_ref()));
                self.older.unlink(node);
                self.older_weight -= weight;
                stats.add_older(-weight, -1);
            }
            None => return,
        }
        (*node.as_ptr()).element.segment = None;
    }

    /// Replaces the cached weight of a linked item and returns the delta.
    ///
    /// # Safety
    ///
    /// `node` must be owned by this shard's item map.
    pub(crate) unsafe fn update_cached_weight(
        &mut self,
        node: NonNull<ItemNode<V>>,
        new_weight: i64,
        stats: &StatsCounter,
    ) -> i64 {
        let (segment, old_weight) = Self::segment_and_weight(node);
        let delta = new_weight - old_weight;
        match segment {
            Some(Segment::Younger) => {
                self.younger_weight += delta;
                stats.add_younger(delta, 0);
            }
            Some(Segment::Older) => {
                self.older_weight += delta;
                stats.add_older(delta, 0);
            }
            None => panic!("Cannot update the weight of an unlinked cache item"),
        }
        (*node.as_ptr()).element.cached_weight = new_weight;
        delta
    }

    /// Restores the capacity bounds of this shard and returns the evicted values.
    ///
    /// First the least recently touched older items are demoted while the older
    /// segment exceeds its share, then the least recently used younger items are
    /// evicted while the whole shard exceeds its share. Each share is estimated by
    /// multiplying this shard's weight by the number of shards.
    ///
    /// The returned values must be dropped (and reported) only after the write
    /// lock has been released.
    pub(crate) fn trim(
        &mut self,
        limits: TrimLimits,
        stats: &StatsCounter,
        entry_count: &AtomicUsize,
    ) -> Evicted<V> {
        let shard_count = limits.shard_count as i64;
        let older_capacity = limits.capacity as f64 * (1.0 - limits.younger_size_fraction);

        while (shard_count * self.older_weight) as f64 > older_capacity {
            let Some(node) = self.older.peek_front_ptr() else {
                break;
            };
            unsafe { self.move_to_younger(node, stats) };
        }

        let mut evicted = Evicted::new();
        while shard_count * (self.younger_weight + self.older_weight) > limits.capacity {
            let Some(node) = self.younger.peek_front_ptr() else {
                break;
            };
            unsafe { self.pop(node, stats) };

            let item = unsafe { DeqNode::free(node) };
            let Some(value) = item.value else {
                unreachable!("A linked cache item has no value");
            };
            let removed = self.item_map.remove(value.key());
            debug_assert_eq!(removed, Some(node));
            entry_count.fetch_sub(1, Ordering::Relaxed);

            if !limits.supports_resurrection {
                self.value_map.remove(value.key());
                value.value_base().detach();
            }

            evicted.push(value);
        }

        evicted
    }

    /// Unlinks and frees every linked item. In-flight items stay untouched.
    ///
    /// Returns the freed items so that they can be dropped outside of the lock.
    pub(crate) fn take_linked(
        &mut self,
        supports_resurrection: bool,
        stats: &StatsCounter,
        entry_count: &AtomicUsize,
    ) -> Vec<Item<V>> {
        self.discard_touch_buffer();

        let younger = self.younger.take_all();
        let older = self.older.take_all();
        stats.add_younger(-self.younger_weight, -(younger.len() as i64));
        stats.add_older(-self.older_weight, -(older.len() as i64));
        self.younger_weight = 0;
        self.older_weight = 0;

        let mut items = Vec::with_capacity(younger.len() + older.len());
        for node in younger.into_iter().chain(older) {
            let mut item = unsafe { DeqNode::free(node) };
            item.segment = None;
            if let Some(value) = &item.value {
                self.item_map.remove(value.key());
                if !supports_resurrection {
                    self.value_map.remove(value.key());
                    value.value_base().detach();
                }
            }
            items.push(item);
        }
        entry_count.fetch_sub(items.len(), Ordering::Relaxed);
        items
    }

    unsafe fn segment_and_weight(node: NonNull<ItemNode<V>>) -> (Option<Segment>, i64) {
        let item = &(*node.as_ptr()).element;
        (item.segment, item.cached_weight)
    }
}

#[cfg(test)]
impl<V, S> ShardInner<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher,
{
    /// Panics if the segment bookkeeping of this shard is inconsistent.
    pub(crate) fn check_invariants(&self) {
        let mut linked = 0;
        for (deque, weight) in [
            (&self.younger, self.younger_weight),
            (&self.older, self.older_weight),
        ] {
            let mut sum = 0;
            for item in deque.iter() {
                assert_eq!(item.segment, Some(deque.segment()));
                assert!(item.value.is_some(), "linked item without a value");
                sum += item.cached_weight;
            }
            assert_eq!(sum, weight, "{} weight mismatch", deque.segment().name());
            linked += deque.len();
        }

        let in_flight = self
            .item_map
            .values()
            .filter(|node| unsafe { node.as_ref() }.element.value.is_none())
            .count();
        assert_eq!(linked + in_flight, self.item_map.len());
    }

    pub(crate) fn weights(&self) -> (i64, i64) {
        (self.younger_weight, self.older_weight)
    }

    pub(crate) fn segment_keys(&self, segment: Segment) -> Vec<V::Key> {
        let deque = match segment {
            Segment::Younger => &self.younger,
            Segment::Older => &self.older,
        };
        deque
            .iter()
            .filter_map(|item| item.value.as_ref().map(|v| v.key().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Item, ItemNode, Shard};
    use crate::{
        common::{test_utils::Blob, Segment},
        stats::StatsCounter,
    };

    use std::collections::hash_map::RandomState;

    fn link(shard: &Shard<Blob, RandomState>, key: &str, stats: &StatsCounter) {
        let mut guard = shard.write();
        let node = ItemNode::new(Item::with_value(Blob::new(key))).into_raw();
        guard.item_map.insert(key.to_string(), node);
        unsafe { guard.push_to_younger(node, 1, stats) };
    }

    #[test]
    fn touches_are_dropped_while_the_buffer_is_full() {
        let stats = StatsCounter::default();
        let shard = Shard::new(RandomState::default(), 2);
        for key in ["a", "b", "c"] {
            link(&shard, key, &stats);
        }

        {
            let guard = shard.read();
            let node = |key: &str| guard.item_map[key];
            assert!(!guard.touch(node("a")));
            // This one fills the buffer and makes the caller responsible for
            // draining it.
            assert!(guard.touch(node("b")));
            assert!(!guard.touch(node("c")));
            assert!(!guard.touch(node("c")));
        }

        shard.write().drain_touch_buffer(&stats);
        {
            let guard = shard.read();
            assert_eq!(guard.segment_keys(Segment::Older), ["a", "b"]);
            assert_eq!(guard.segment_keys(Segment::Younger), ["c"]);
            guard.check_invariants();

            // The drained buffer records touches again.
            assert!(!guard.touch(guard.item_map["c"]));
        }

        shard.write().drain_touch_buffer(&stats);
        let guard = shard.read();
        assert_eq!(guard.segment_keys(Segment::Older), ["a", "b", "c"]);
        assert!(guard.segment_keys(Segment::Younger).is_empty());
        guard.check_invariants();
    }
}
