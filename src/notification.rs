use std::sync::Arc;

pub(crate) mod notifier;

/// A listener called after a value has been linked into the cache.
pub(crate) type AddedListener<V> = Arc<dyn Fn(&Arc<V>) + Send + Sync + 'static>;

/// A listener called after a linked value has been removed from the cache.
pub(crate) type RemovalListener<V> = Arc<dyn Fn(&Arc<V>, RemovalCause) + Send + Sync + 'static>;

// NOTE: Neither `clear` nor dropping the cache deliver removal notifications.
// `clear` discards the segments wholesale, and a cache that is being dropped has
// nobody left to report to.

/// Indicates the reason why a linked value was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalCause {
    /// The value was manually removed by `try_remove` or `try_remove_value`.
    Explicit,
    /// The value was evicted from the younger segment due to capacity
    /// constraints.
    Size,
}

impl RemovalCause {
    pub fn was_evicted(&self) -> bool {
        matches!(self, Self::Size)
    }
}
