use std::sync::{atomic::AtomicU64, Arc};

use super::value_future::{ValueFuture, ValuePromise};
use crate::common::{deque::DeqNode, Segment};

/// A cache slot.
///
/// An item without a value stands for an in-flight computation and is never
/// linked into an LRU segment. An item with a value is always linked into
/// exactly one of the two segments.
pub(crate) struct Item<V> {
    pub(crate) value: Option<Arc<V>>,
    pub(crate) promise: ValuePromise<V>,
    /// The weight of the value at the time it was linked, or at the last
    /// `update_weight`.
    pub(crate) cached_weight: i64,
    /// `None` while not linked.
    pub(crate) segment: Option<Segment>,
    /// The number of lookups that joined the computation while it was in flight.
    pub(crate) async_hit_count: AtomicU64,
}

pub(crate) type ItemNode<V> = DeqNode<Item<V>>;

impl<V> Item<V> {
    pub(crate) fn pending() -> Self {
        Self {
            value: None,
            promise: ValuePromise::new(),
            cached_weight: 0,
            segment: None,
            async_hit_count: AtomicU64::default(),
        }
    }

    pub(crate) fn with_value(value: Arc<V>) -> Self {
        let promise = ValuePromise::new();
        promise.set(Ok(Arc::clone(&value)));
        Self {
            value: Some(value),
            promise,
            cached_weight: 0,
            segment: None,
            async_hit_count: AtomicU64::default(),
        }
    }

    pub(crate) fn value_future(&self) -> ValueFuture<V> {
        self.promise.to_future()
    }

    pub(crate) fn is_linked(&self) -> bool {
        self.segment.is_some()
    }
}
