use super::{AsyncCacheValue, AsyncSlruCache, ValueFuture};
use crate::Error;

use std::{
    collections::hash_map::RandomState,
    fmt,
    hash::BuildHasher,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// The handle returned by [`AsyncSlruCache::begin_insert`][begin-insert].
///
/// An _inactive_ cookie only carries the future of a value that is cached or
/// being produced by somebody else. Calling `end_insert` or `cancel` on it does
/// nothing.
///
/// An _active_ cookie makes its holder the only producer of the value for its
/// key. Exactly one of [`end_insert`](#method.end_insert) or
/// [`cancel`](#method.cancel) takes effect. If neither is called before the
/// cookie is dropped, the insertion is cancelled with [`Error::Canceled`] so
/// that nobody waits forever.
///
/// [begin-insert]: ./struct.AsyncSlruCache.html#method.begin_insert
pub struct InsertCookie<V, S = RandomState>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    key: V::Key,
    // `None` for an inactive cookie.
    cache: Option<AsyncSlruCache<V, S>>,
    value_future: ValueFuture<V>,
    active: AtomicBool,
}

impl<V, S> InsertCookie<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn inactive(key: V::Key, value_future: ValueFuture<V>) -> Self {
        Self {
            key,
            cache: None,
            value_future,
            active: AtomicBool::new(false),
        }
    }

    pub(crate) fn active(
        key: V::Key,
        cache: AsyncSlruCache<V, S>,
        value_future: ValueFuture<V>,
    ) -> Self {
        Self {
            key,
            cache: Some(cache),
            value_future,
            active: AtomicBool::new(true),
        }
    }

    pub fn key(&self) -> &V::Key {
        &self.key
    }

    /// Returns the future of the value. For an active cookie it resolves once
    /// the insertion has been finished or cancelled.
    pub fn value(&self) -> ValueFuture<V> {
        self.value_future.clone()
    }

    /// Returns `true` if the holder must produce the value and the insertion has
    /// not been finished or cancelled yet.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Links the produced value into the cache and wakes up everybody waiting
    /// for it. Does nothing if the cookie is not active.
    ///
    /// # Panics
    ///
    /// Panics if the cookie is active and the key of `value` differs from the
    /// key of this cookie. The insertion is then cancelled with
    /// [`Error::Canceled`], as it is if the weigher panics.
    pub fn end_insert(&self, value: Arc<V>) {
        if let Some(cache) = self.take_active() {
            let guard = CancelOnUnwind {
                cache,
                key: &self.key,
                finished: false,
            };
            assert!(
                value.key() == &self.key,
                "The inserted value must have the key of its insert cookie"
            );
            cache.end_insert(value);
            guard.finish();
        }
    }

    /// Cancels the insertion. Everybody waiting for the value receives `error`.
    /// Does nothing if the cookie is not active.
    pub fn cancel(&self, error: Error) {
        if let Some(cache) = self.take_active() {
            cache.cancel_insert(&self.key, error);
        }
    }

    fn take_active(&self) -> Option<&AsyncSlruCache<V, S>> {
        self.active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .and(self.cache.as_ref())
    }
}

/// Cancels the insertion if linking the value unwinds, because the cookie is no
/// longer active by then and will not cancel on drop.
struct CancelOnUnwind<'a, V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    cache: &'a AsyncSlruCache<V, S>,
    key: &'a V::Key,
    finished: bool,
}

impl<V, S> CancelOnUnwind<'_, V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn finish(mut self) {
        self.finished = true;
    }
}

impl<V, S> Drop for CancelOnUnwind<'_, V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            // The item may already be linked if the panic came after that.
            self.cache.abort_insert(self.key, Error::Canceled);
        }
    }
}

impl<V, S> Drop for InsertCookie<V, S>
where
    V: AsyncCacheValue,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cancel(Error::Canceled);
    }
}

impl<V, S> fmt::Debug for InsertCookie<V, S>
where
    V: AsyncCacheValue,
    V::Key: fmt::Debug,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertCookie")
            .field("key", &self.key)
            .field("is_active", &self.is_active())
            .field("value", &self.value_future)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{common::test_utils::Blob, AsyncSlruCache, Error};

    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn cache() -> AsyncSlruCache<Blob> {
        AsyncSlruCache::builder().capacity(10).shard_count(1).build()
    }

    #[test]
    fn finalizing_twice_is_a_no_op() {
        let cache = cache();
        let cookie = cache.begin_insert("k".into());
        assert!(cookie.is_active());

        cookie.cancel(Error::Canceled);
        assert!(!cookie.is_active());
        // Neither panics on the missing in-flight item.
        cookie.cancel(Error::Canceled);
        cookie.end_insert(Blob::new("k"));

        assert!(cookie.value().try_get().unwrap().unwrap_err().is_canceled());
        assert!(cache.find(&"k".into()).is_none());
        drop(cookie);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn dropping_an_active_cookie_cancels() {
        let cache = cache();
        let cookie = cache.begin_insert("k".into());
        let waiter = cookie.value();
        drop(cookie);

        assert!(waiter.wait_blocking().unwrap_err().is_canceled());
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.begin_insert("k".into()).is_active());
    }

    #[test]
    fn inactive_cookie_ignores_finalization() {
        let cache = cache();
        let producer = cache.begin_insert("k".into());
        let joined = cache.begin_insert("k".into());
        assert!(!joined.is_active());

        joined.cancel(Error::Canceled);
        drop(joined);
        assert!(!producer.value().is_ready());

        let value = Blob::new("k");
        producer.end_insert(std::sync::Arc::clone(&value));
        assert!(cache.find(&"k".into()).is_some());
    }

    #[test]
    #[should_panic(expected = "must have the key of its insert cookie")]
    fn rejects_value_with_another_key() {
        let cache = cache();
        let cookie = cache.begin_insert("k".into());
        cookie.end_insert(Blob::new("other"));
    }

    #[test]
    fn rejected_value_cancels_the_insertion() {
        let cache = cache();
        let cookie = cache.begin_insert("k".into());
        let waiter = cookie.value();

        let result = catch_unwind(AssertUnwindSafe(|| cookie.end_insert(Blob::new("other"))));
        assert!(result.is_err());
        assert!(waiter.try_get().unwrap().unwrap_err().is_canceled());
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.begin_insert("k".into()).is_active());
    }

    #[test]
    fn inactive_cookie_ignores_value_with_another_key() {
        let cache = cache();
        let producer = cache.begin_insert("k".into());
        let joined = cache.begin_insert("k".into());
        assert!(!joined.is_active());

        joined.end_insert(Blob::new("other"));
        assert!(!producer.value().is_ready());
        assert!(cache.find(&"other".into()).is_none());
    }

    #[test]
    fn panicking_weigher_cancels_the_insertion() {
        let cache: AsyncSlruCache<Blob> = AsyncSlruCache::builder()
            .capacity(10)
            .shard_count(1)
            .weigher(|b: &Blob| {
                assert!(b.weight() != 7, "unweighable");
                b.weight()
            })
            .build();

        let cookie = cache.begin_insert("k".into());
        let waiter = cache.lookup(&"k".into()).unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| {
            cookie.end_insert(Blob::with_weight("k", 7));
        }));
        assert!(result.is_err());
        assert!(!cookie.is_active());

        assert!(waiter.wait_blocking().unwrap_err().is_canceled());
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.get_all().is_empty());
        cache.check_invariants();

        let retry = cache.begin_insert("k".into());
        assert!(retry.is_active());
        retry.end_insert(Blob::with_weight("k", 3));
        assert!(cache.find(&"k".into()).is_some());
        cache.check_invariants();
    }
}
